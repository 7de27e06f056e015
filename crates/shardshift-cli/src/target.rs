//! Target client that writes to a directory instead of a cluster.
//!
//! Layout under the output directory:
//!
//! ```text
//! _templates/<kind>-<name>.json
//! <index>/_index.json
//! <index>/bulk-000001.ndjson
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Map, Value};
use shardshift_client::{ClientError, TargetClient};
use shardshift_proto::decode_inline_bulk;
use tokio::fs;
use tracing::debug;

/// Writes every request to a file and acknowledges it.
pub struct FileTarget {
    root: PathBuf,
    next_bulk: AtomicU64,
}

impl FileTarget {
    /// Create `root` if needed.
    pub async fn create(root: impl Into<PathBuf>) -> Result<Self, ClientError> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(io_error)?;
        let next_bulk = AtomicU64::new(count_bulk_files(&root).await? + 1);
        Ok(Self { root, next_bulk })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `body` to `path` unless it exists. Returns whether it was written.
    async fn write_once(&self, path: PathBuf, body: &Value) -> Result<bool, ClientError> {
        if fs::try_exists(&path).await.map_err(io_error)? {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        let text = serde_json::to_vec_pretty(body)
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        fs::write(&path, text).await.map_err(io_error)?;
        debug!(path = %path.display(), "written");
        Ok(true)
    }

    async fn put_template(&self, kind: &str, name: &str, body: &Value) -> Result<bool, ClientError> {
        let path = self
            .root
            .join("_templates")
            .join(format!("{}-{}.json", kind, name));
        self.write_once(path, body).await
    }
}

#[async_trait]
impl TargetClient for FileTarget {
    async fn create_index(&self, name: &str, body: &Value) -> Result<bool, ClientError> {
        self.write_once(self.root.join(name).join("_index.json"), body)
            .await
    }

    async fn send_bulk_request(&self, index: &str, body: Bytes) -> Result<Bytes, ClientError> {
        let specs = decode_inline_bulk(&body)?;
        let dir = self.root.join(index);
        if !fs::try_exists(dir.join("_index.json")).await.map_err(io_error)? {
            return Err(ClientError::Rejected {
                status: 404,
                reason: format!("no such index [{}]", index),
            });
        }

        let n = self.next_bulk.fetch_add(1, Ordering::Relaxed);
        fs::write(dir.join(format!("bulk-{:06}.ndjson", n)), &body)
            .await
            .map_err(io_error)?;

        let items: Vec<Value> = specs
            .iter()
            .map(|spec| {
                let (result, status) = match spec.action() {
                    "delete" => ("deleted", 200),
                    _ => ("created", 201),
                };
                let mut item = Map::new();
                item.insert(
                    spec.action().to_string(),
                    json!({
                        "_index": index,
                        "_id": spec.meta().id,
                        "result": result,
                        "status": status,
                    }),
                );
                Value::Object(item)
            })
            .collect();
        let response = json!({"took": 0, "errors": false, "items": items});
        Ok(Bytes::from(response.to_string()))
    }

    async fn put_legacy_template(&self, name: &str, body: &Value) -> Result<bool, ClientError> {
        self.put_template("legacy", name, body).await
    }

    async fn put_component_template(&self, name: &str, body: &Value) -> Result<bool, ClientError> {
        self.put_template("component", name, body).await
    }

    async fn put_index_template(&self, name: &str, body: &Value) -> Result<bool, ClientError> {
        self.put_template("index", name, body).await
    }
}

fn io_error(err: std::io::Error) -> ClientError {
    ClientError::Transport(err.to_string())
}

/// Bulk files already present, so reruns never overwrite earlier output.
async fn count_bulk_files(root: &Path) -> Result<u64, ClientError> {
    let mut count = 0;
    let mut indices = fs::read_dir(root).await.map_err(io_error)?;
    while let Some(index) = indices.next_entry().await.map_err(io_error)? {
        if !index.file_type().await.map_err(io_error)?.is_dir() {
            continue;
        }
        let mut files = fs::read_dir(index.path()).await.map_err(io_error)?;
        while let Some(file) = files.next_entry().await.map_err(io_error)? {
            if file.file_name().to_string_lossy().ends_with(".ndjson") {
                count += 1;
            }
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardshift_proto::{encode_bulk, BulkOperationSpec, BulkResponseParser, DocumentChange};

    #[tokio::test]
    async fn test_index_created_once() {
        let dir = tempfile::tempdir().unwrap();
        let target = FileTarget::create(dir.path()).await.unwrap();
        let body = json!({"settings": {}});

        assert!(target.create_index("logs", &body).await.unwrap());
        assert!(!target.create_index("logs", &body).await.unwrap());
        assert!(dir.path().join("logs/_index.json").exists());
    }

    #[tokio::test]
    async fn test_bulk_written_and_acknowledged() {
        let dir = tempfile::tempdir().unwrap();
        let target = FileTarget::create(dir.path()).await.unwrap();
        target.create_index("logs", &json!({})).await.unwrap();

        let specs = vec![
            BulkOperationSpec::from_change(&DocumentChange::index("a", &b"{}"[..]), "logs"),
            BulkOperationSpec::from_change(&DocumentChange::delete("b"), "logs"),
        ];
        let body = encode_bulk(&specs).unwrap();
        let response = target.send_bulk_request("logs", body.clone()).await.unwrap();

        let parsed = BulkResponseParser::default().parse(&response);
        assert!(parsed.is_complete());
        assert_eq!(parsed.find_success_docs(), vec!["a", "b"]);
        assert_eq!(
            std::fs::read(dir.path().join("logs/bulk-000001.ndjson")).unwrap(),
            body.to_vec()
        );
    }

    #[tokio::test]
    async fn test_action_shaped_document_gets_one_ack() {
        let dir = tempfile::tempdir().unwrap();
        let target = FileTarget::create(dir.path()).await.unwrap();
        target.create_index("logs", &json!({})).await.unwrap();

        let lookalike = br#"{"delete":{"_index":"logs","_id":"zz"}}"#;
        let specs = vec![
            BulkOperationSpec::from_change(&DocumentChange::index("a", &lookalike[..]), "logs"),
            BulkOperationSpec::from_change(&DocumentChange::delete("b"), "logs"),
        ];
        let response = target
            .send_bulk_request("logs", encode_bulk(&specs).unwrap())
            .await
            .unwrap();

        let parsed = BulkResponseParser::default().parse(&response);
        assert_eq!(parsed.find_success_docs(), vec!["a", "b"]);
        assert!(parsed.failed_positions_of(2).none());
    }

    #[tokio::test]
    async fn test_bulk_to_missing_index_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let target = FileTarget::create(dir.path()).await.unwrap();
        let body = encode_bulk(&[BulkOperationSpec::from_change(
            &DocumentChange::delete("x"),
            "ghost",
        )])
        .unwrap();
        let err = target.send_bulk_request("ghost", body).await.unwrap_err();
        assert!(matches!(err, ClientError::Rejected { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_rerun_continues_numbering() {
        let dir = tempfile::tempdir().unwrap();
        let body = encode_bulk(&[BulkOperationSpec::from_change(
            &DocumentChange::delete("x"),
            "logs",
        )])
        .unwrap();

        let first = FileTarget::create(dir.path()).await.unwrap();
        first.create_index("logs", &json!({})).await.unwrap();
        first.send_bulk_request("logs", body.clone()).await.unwrap();

        let second = FileTarget::create(dir.path()).await.unwrap();
        second.send_bulk_request("logs", body).await.unwrap();
        assert!(dir.path().join("logs/bulk-000002.ndjson").exists());
    }
}
