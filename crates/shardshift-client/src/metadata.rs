//! Metadata sink over a target client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use shardshift_core::{CreationStatus, MetadataSink, Result};
use shardshift_proto::IndexMetadataSnapshot;
use tracing::debug;

use crate::config::DEFAULT_REQUEST_TIMEOUT;
use crate::sink::{creation_status, with_timeout};
use crate::target::TargetClient;

/// [`MetadataSink`] that creates templates and indices on the target.
pub struct ClusterMetadataSink {
    client: Arc<dyn TargetClient>,
    request_timeout: Duration,
}

impl ClusterMetadataSink {
    pub fn new(client: Arc<dyn TargetClient>) -> Self {
        Self {
            client,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[async_trait]
impl MetadataSink for ClusterMetadataSink {
    async fn create_legacy_template(&self, name: &str, body: &Value) -> Result<CreationStatus> {
        let created =
            with_timeout(self.request_timeout, self.client.put_legacy_template(name, body)).await?;
        debug!(template = %name, created, "legacy template");
        Ok(creation_status(created))
    }

    async fn create_component_template(
        &self,
        name: &str,
        body: &Value,
    ) -> Result<CreationStatus> {
        let created = with_timeout(
            self.request_timeout,
            self.client.put_component_template(name, body),
        )
        .await?;
        debug!(template = %name, created, "component template");
        Ok(creation_status(created))
    }

    async fn create_index_template(&self, name: &str, body: &Value) -> Result<CreationStatus> {
        let created =
            with_timeout(self.request_timeout, self.client.put_index_template(name, body)).await?;
        debug!(template = %name, created, "index template");
        Ok(creation_status(created))
    }

    async fn create_index(&self, metadata: &IndexMetadataSnapshot) -> Result<CreationStatus> {
        let body = metadata.creation_body();
        let created =
            with_timeout(self.request_timeout, self.client.create_index(&metadata.name, &body))
                .await?;
        Ok(creation_status(created))
    }
}
