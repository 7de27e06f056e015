//! Snapshot to target migration through the bulk and metadata sinks.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use shardshift_client::proto::{decode_inline_bulk, BulkOperationSpec};
use shardshift_client::{BulkDocumentSink, BulkSinkConfig, ClientError, ClusterMetadataSink, TargetClient};
use shardshift_core::{
    DeltaConfig, DeltaEngine, DocumentMigrator, ManifestSnapshot, MetadataMigrator,
    MigrationConfig, SnapshotSource,
};

/// A toy cluster: indices map ids to documents.
#[derive(Default)]
struct Cluster {
    indices: Mutex<BTreeMap<String, BTreeMap<String, Value>>>,
    templates: Mutex<Vec<String>>,
}

impl Cluster {
    fn documents(&self, index: &str) -> Vec<String> {
        self.indices.lock()[index].keys().cloned().collect()
    }
}

#[async_trait]
impl TargetClient for Cluster {
    async fn create_index(&self, name: &str, _body: &Value) -> Result<bool, ClientError> {
        let mut indices = self.indices.lock();
        if indices.contains_key(name) {
            return Ok(false);
        }
        indices.insert(name.to_string(), BTreeMap::new());
        Ok(true)
    }

    async fn send_bulk_request(&self, index: &str, body: Bytes) -> Result<Bytes, ClientError> {
        let specs = decode_inline_bulk(&body)?;
        let mut indices = self.indices.lock();
        let docs = indices.get_mut(index).ok_or_else(|| ClientError::Rejected {
            status: 404,
            reason: format!("no such index [{}]", index),
        })?;

        let mut items = Vec::new();
        for spec in specs {
            let id = spec.meta().id.clone();
            let item = match spec {
                BulkOperationSpec::Index(op) => {
                    let source = op.document.unwrap_or_default();
                    let value: Value = serde_json::from_slice(&source)
                        .map_err(|e| ClientError::Transport(e.to_string()))?;
                    let result = if docs.insert(id.clone(), value).is_some() {
                        "updated"
                    } else {
                        "created"
                    };
                    json!({"index": {"_id": id, "result": result, "status": 201}})
                }
                BulkOperationSpec::Delete(_) => {
                    let result = if docs.remove(&id).is_some() {
                        "deleted"
                    } else {
                        "not_found"
                    };
                    json!({"delete": {"_id": id, "result": result, "status": 200}})
                }
            };
            items.push(item);
        }
        Ok(Bytes::from(json!({"errors": false, "items": items}).to_string()))
    }

    async fn put_legacy_template(&self, name: &str, _body: &Value) -> Result<bool, ClientError> {
        self.templates.lock().push(format!("legacy:{}", name));
        Ok(true)
    }

    async fn put_component_template(&self, name: &str, _body: &Value) -> Result<bool, ClientError> {
        self.templates.lock().push(format!("component:{}", name));
        Ok(true)
    }

    async fn put_index_template(&self, name: &str, _body: &Value) -> Result<bool, ClientError> {
        self.templates.lock().push(format!("template:{}", name));
        Ok(true)
    }
}

fn snapshot(name: &str, segments: Value) -> Arc<ManifestSnapshot> {
    let manifest = json!({
        "name": name,
        "global": {
            "component_templates": {"base": {}},
            "index_templates": {"logs": {"index_patterns": ["logs*"]}},
        },
        "indices": [{
            "metadata": {"name": "logs", "number_of_shards": 1, "number_of_replicas": 0},
            "shards": [{"shard": 0, "segments": segments}],
        }],
    });
    Arc::new(ManifestSnapshot::from_slice(manifest.to_string().as_bytes()).unwrap())
}

async fn migrate(
    cluster: &Arc<Cluster>,
    previous: Option<Arc<ManifestSnapshot>>,
    current: Arc<ManifestSnapshot>,
) {
    let engine = Arc::new(DeltaEngine::new(DeltaConfig::default()).unwrap());
    let mut source = SnapshotSource::new(current.clone(), engine);
    if let Some(previous) = previous {
        source = source.with_previous(previous.name().to_string(), previous);
    }
    let sink = BulkDocumentSink::new(cluster.clone(), BulkSinkConfig::default());
    let migrator = DocumentMigrator::new(
        current,
        Arc::new(source),
        Arc::new(sink),
        MigrationConfig::new().with_max_docs_per_batch(2),
    )
    .unwrap();
    migrator
        .migrate_all()
        .try_collect::<Vec<_>>()
        .await
        .unwrap();
}

#[tokio::test]
async fn test_metadata_then_full_then_incremental() {
    let cluster = Arc::new(Cluster::default());
    let first = snapshot(
        "snap-1",
        json!([{
            "name": "_0",
            "documents": [
                {"id": "a", "source": {"n": 1}},
                {"id": "b", "source": {"n": 2}},
                {"id": "c", "source": {"n": 3}},
            ],
        }]),
    );

    let report = MetadataMigrator::new(first.clone(), Arc::new(ClusterMetadataSink::new(cluster.clone())))
        .migrate()
        .await
        .unwrap();
    assert!(report.is_success());
    assert_eq!(
        *cluster.templates.lock(),
        vec!["component:base", "template:logs"]
    );

    migrate(&cluster, None, first.clone()).await;
    assert_eq!(cluster.documents("logs"), vec!["a", "b", "c"]);

    // "b" deleted, "d" added in a fresh segment.
    let second = snapshot(
        "snap-2",
        json!([
            {
                "name": "_0",
                "deleted": [1],
                "documents": [
                    {"id": "a", "source": {"n": 1}},
                    {"id": "b", "source": {"n": 2}},
                    {"id": "c", "source": {"n": 3}},
                ],
            },
            {"name": "_1", "documents": [{"id": "d", "source": {"n": 4}}]},
        ]),
    );
    migrate(&cluster, Some(first), second).await;
    assert_eq!(cluster.documents("logs"), vec!["a", "c", "d"]);
}
