//! Target write-client contract.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use crate::error::ClientError;

/// Minimal set of calls the sinks make against a target cluster.
///
/// Only [`crate::BulkDocumentSink`] knows the bulk wire encoding; an
/// implementation just ships bodies and returns the raw acknowledgement.
/// Creation calls return `true` when something was created and `false` when
/// it already existed.
#[async_trait]
pub trait TargetClient: Send + Sync {
    async fn create_index(&self, name: &str, body: &Value) -> Result<bool, ClientError>;

    /// Send an encoded bulk body for `index` and return the response body.
    async fn send_bulk_request(&self, index: &str, body: Bytes) -> Result<Bytes, ClientError>;

    async fn put_legacy_template(&self, name: &str, body: &Value) -> Result<bool, ClientError>;

    async fn put_component_template(&self, name: &str, body: &Value)
        -> Result<bool, ClientError>;

    async fn put_index_template(&self, name: &str, body: &Value) -> Result<bool, ClientError>;
}
