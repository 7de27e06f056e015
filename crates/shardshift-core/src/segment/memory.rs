use std::sync::Arc;

use shardshift_proto::DocBitSet;

use super::reader::{RawDocument, SegmentReader, ShardReader};
use crate::error::{Error, Result};

/// Segment held entirely in memory.
///
/// Cloning shares the document storage; [`MemorySegment::with_deletions`]
/// models the next point-in-time view of the same immutable segment.
#[derive(Debug, Clone)]
pub struct MemorySegment {
    name: String,
    docs: Arc<Vec<RawDocument>>,
    live: Option<Arc<DocBitSet>>,
    corrupt: Option<usize>,
}

impl MemorySegment {
    pub fn new(name: impl Into<String>, docs: Vec<RawDocument>) -> Self {
        Self {
            name: name.into(),
            docs: Arc::new(docs),
            live: None,
            corrupt: None,
        }
    }

    /// A later view of this segment with `deleted` ordinals also removed.
    ///
    /// Ordinals past the end of the segment are ignored.
    pub fn with_deletions(&self, deleted: impl IntoIterator<Item = usize>) -> Self {
        let max_doc = self.docs.len();
        let mut live = match &self.live {
            Some(live) => (**live).clone(),
            None => DocBitSet::full(max_doc),
        };
        for ordinal in deleted {
            if ordinal < max_doc {
                live.clear(ordinal);
            }
        }

        Self {
            name: self.name.clone(),
            docs: Arc::clone(&self.docs),
            live: (live.cardinality() < max_doc).then(|| Arc::new(live)),
            corrupt: self.corrupt,
        }
    }

    /// Make reads of `ordinal` fail, simulating on-disk corruption.
    pub fn with_corrupt_ordinal(mut self, ordinal: usize) -> Self {
        self.corrupt = Some(ordinal);
        self
    }
}

impl SegmentReader for MemorySegment {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_doc(&self) -> usize {
        self.docs.len()
    }

    fn live_docs(&self) -> Option<Arc<DocBitSet>> {
        self.live.clone()
    }

    fn document(&self, ordinal: usize) -> Result<RawDocument> {
        if self.corrupt == Some(ordinal) {
            return Err(Error::Segment {
                segment: self.name.clone(),
                message: format!("checksum mismatch reading ordinal {}", ordinal),
            });
        }
        self.docs.get(ordinal).cloned().ok_or_else(|| Error::Segment {
            segment: self.name.clone(),
            message: format!("ordinal {} out of range (max_doc {})", ordinal, self.docs.len()),
        })
    }
}

/// Shard made of in-memory segments.
#[derive(Clone, Default)]
pub struct MemoryShard {
    segments: Vec<Arc<dyn SegmentReader>>,
}

impl MemoryShard {
    pub fn new(segments: impl IntoIterator<Item = MemorySegment>) -> Self {
        Self {
            segments: segments
                .into_iter()
                .map(|s| Arc::new(s) as Arc<dyn SegmentReader>)
                .collect(),
        }
    }

    pub fn with_segment(mut self, segment: Arc<dyn SegmentReader>) -> Self {
        self.segments.push(segment);
        self
    }
}

impl ShardReader for MemoryShard {
    fn leaves(&self) -> Result<Vec<Arc<dyn SegmentReader>>> {
        Ok(self.segments.clone())
    }
}
