//! JSON manifest snapshots.
//!
//! A manifest describes a whole snapshot in one file:
//!
//! ```json
//! {
//!   "name": "nightly-2",
//!   "global": { "index_templates": { "logs": { "index_patterns": ["logs-*"] } } },
//!   "indices": [{
//!     "metadata": { "name": "logs", "number_of_shards": 1, "number_of_replicas": 0 },
//!     "shards": [{
//!       "shard": 0,
//!       "segments": [{
//!         "name": "_0",
//!         "deleted": [1],
//!         "documents": [
//!           { "id": "a", "source": { "msg": "hello" } },
//!           { "id": "b", "routing": "u1", "source": { "msg": "bye" } }
//!         ]
//!       }]
//!     }]
//!   }]
//! }
//! ```
//!
//! A segment's `max_doc` is its document count; `deleted` lists ordinals that
//! are no longer live.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shardshift_proto::{GlobalMetadataSnapshot, IndexMetadataSnapshot, ShardId};

use super::memory::{MemorySegment, MemoryShard};
use super::reader::{RawDocument, ShardReader};
use crate::error::{Error, Result};
use crate::ports::{ShardOpener, SnapshotReader};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestDocument {
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<String>,
    pub source: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestSegment {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deleted: Vec<usize>,
    pub documents: Vec<ManifestDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestShard {
    pub shard: u32,
    pub segments: Vec<ManifestSegment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestIndex {
    metadata: IndexMetadataSnapshot,
    #[serde(default)]
    shards: Vec<ManifestShard>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestFile {
    name: String,
    #[serde(default)]
    global: GlobalMetadataSnapshot,
    #[serde(default)]
    indices: Vec<ManifestIndex>,
}

struct LoadedIndex {
    metadata: IndexMetadataSnapshot,
    shards: BTreeMap<u32, Arc<MemoryShard>>,
}

/// Snapshot loaded from a JSON manifest.
pub struct ManifestSnapshot {
    name: String,
    global: GlobalMetadataSnapshot,
    indices: BTreeMap<String, LoadedIndex>,
}

impl ManifestSnapshot {
    /// Load and validate a manifest file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let file: ManifestFile = serde_json::from_slice(bytes)?;

        let mut indices = BTreeMap::new();
        for index in file.indices {
            let name = index.metadata.name.clone();
            let mut shards = BTreeMap::new();
            for shard in index.shards {
                let number = shard.shard;
                if shards
                    .insert(number, Arc::new(build_shard(shard)?))
                    .is_some()
                {
                    return Err(Error::Source(format!(
                        "manifest '{}' lists shard {}/{} twice",
                        file.name, name, number
                    )));
                }
            }
            let loaded = LoadedIndex {
                metadata: index.metadata,
                shards,
            };
            if indices.insert(name.clone(), loaded).is_some() {
                return Err(Error::Source(format!(
                    "manifest '{}' lists index '{}' twice",
                    file.name, name
                )));
            }
        }

        Ok(Self {
            name: file.name,
            global: file.global,
            indices,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn index(&self, index: &str) -> Result<&LoadedIndex> {
        self.indices
            .get(index)
            .ok_or_else(|| Error::Source(format!("unknown index '{}' in '{}'", index, self.name)))
    }
}

fn build_shard(shard: ManifestShard) -> Result<MemoryShard> {
    let mut seen = HashSet::new();
    let mut segments = Vec::with_capacity(shard.segments.len());
    for segment in shard.segments {
        if !seen.insert(segment.name.clone()) {
            return Err(Error::Segment {
                segment: segment.name,
                message: format!("duplicate segment in shard {}", shard.shard),
            });
        }
        let max_doc = segment.documents.len();
        if let Some(bad) = segment.deleted.iter().find(|ord| **ord >= max_doc) {
            return Err(Error::Segment {
                segment: segment.name,
                message: format!("deleted ordinal {} out of range (max_doc {})", bad, max_doc),
            });
        }

        let documents = segment
            .documents
            .into_iter()
            .map(|doc| {
                let source = serde_json::to_vec(&doc.source)
                    .map_err(|e| Error::Serialization(e.to_string()))?;
                let mut raw = RawDocument::new(doc.id, source);
                raw.doc_type = doc.doc_type;
                raw.routing = doc.routing;
                Ok(raw)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut built = MemorySegment::new(segment.name, documents);
        if !segment.deleted.is_empty() {
            built = built.with_deletions(segment.deleted);
        }
        segments.push(built);
    }
    Ok(MemoryShard::new(segments))
}

#[async_trait]
impl SnapshotReader for ManifestSnapshot {
    async fn list_indices(&self) -> Result<Vec<String>> {
        Ok(self.indices.keys().cloned().collect())
    }

    async fn list_shards(&self, index: &str) -> Result<Vec<ShardId>> {
        let loaded = self.index(index)?;
        Ok(loaded
            .shards
            .keys()
            .map(|shard| ShardId::new(self.name.clone(), index, *shard))
            .collect())
    }

    async fn read_index_metadata(&self, index: &str) -> Result<IndexMetadataSnapshot> {
        Ok(self.index(index)?.metadata.clone())
    }

    async fn read_global_metadata(&self) -> Result<GlobalMetadataSnapshot> {
        Ok(self.global.clone())
    }
}

impl ShardOpener for ManifestSnapshot {
    fn open_shard(&self, index: &str, shard: u32) -> Result<Option<Arc<dyn ShardReader>>> {
        Ok(self
            .indices
            .get(index)
            .and_then(|loaded| loaded.shards.get(&shard))
            .map(|shard| Arc::clone(shard) as Arc<dyn ShardReader>))
    }
}
