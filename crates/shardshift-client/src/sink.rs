//! Bulk document sink.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use shardshift_core::{CreationStatus, DocumentSink, Error, Result, SharedMetricsRegistry};
use shardshift_proto::{
    encode_bulk, BulkOperationSpec, BulkResponseParser, DocBitSet, DocumentChange,
    IndexMetadataSnapshot,
};
use tracing::{debug, warn};

use crate::config::BulkSinkConfig;
use crate::error::ClientError;
use crate::target::TargetClient;

/// [`DocumentSink`] that writes batches as bulk requests.
///
/// After a partial failure only the failed positions are re-encoded and
/// resent, up to `max_resubmit_attempts` times. Whatever still fails is
/// returned as [`Error::PartialBatch`] with positions relative to the batch
/// the pipeline handed in.
pub struct BulkDocumentSink {
    client: Arc<dyn TargetClient>,
    parser: BulkResponseParser,
    config: BulkSinkConfig,
    metrics: Option<SharedMetricsRegistry>,
}

impl BulkDocumentSink {
    pub fn new(client: Arc<dyn TargetClient>, config: BulkSinkConfig) -> Self {
        Self {
            client,
            parser: BulkResponseParser::new(config.allowlisted_error_types.iter().cloned()),
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: SharedMetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &BulkSinkConfig {
        &self.config
    }

    /// Send the changes at `positions` once and return the positions that failed.
    async fn submit(
        &self,
        index: &str,
        changes: &[DocumentChange],
        positions: &[usize],
    ) -> Result<Vec<usize>> {
        let specs: Vec<BulkOperationSpec> = positions
            .iter()
            .map(|&pos| BulkOperationSpec::from_change(&changes[pos], index))
            .collect();
        let body = encode_bulk(&specs)?;

        let started = Instant::now();
        let response = with_timeout(
            self.config.request_timeout,
            self.client.send_bulk_request(index, body),
        )
        .await?;
        let parsed = self.parser.parse(&response);
        let failed = parsed.failed_positions_of(specs.len());

        if let Some(metrics) = &self.metrics {
            metrics.record_bulk_request(started.elapsed(), failed.cardinality() as u64);
        }
        if !parsed.is_complete() {
            warn!(
                index = %index,
                acknowledged = parsed.item_count(),
                submitted = specs.len(),
                "incomplete bulk response"
            );
        }

        Ok(failed.ones().map(|i| positions[i]).collect())
    }
}

#[async_trait]
impl DocumentSink for BulkDocumentSink {
    async fn create_index(&self, metadata: &IndexMetadataSnapshot) -> Result<CreationStatus> {
        let created = with_timeout(
            self.config.request_timeout,
            self.client
                .create_index(&metadata.name, &metadata.creation_body()),
        )
        .await?;
        Ok(creation_status(created))
    }

    async fn write_batch(&self, index: &str, changes: &[DocumentChange]) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut pending: Vec<usize> = (0..changes.len()).collect();
        let mut attempt = 0u32;
        loop {
            pending = self.submit(index, changes, &pending).await?;
            if pending.is_empty() {
                return Ok(());
            }
            if attempt >= self.config.max_resubmit_attempts {
                warn!(
                    index = %index,
                    failed = pending.len(),
                    submitted = changes.len(),
                    attempts = attempt + 1,
                    "bulk positions still failing"
                );
                return Err(Error::PartialBatch {
                    failed: DocBitSet::from_ordinals(changes.len(), pending),
                    submitted: changes.len(),
                });
            }

            attempt += 1;
            if let Some(metrics) = &self.metrics {
                metrics.record_resubmission();
            }
            debug!(index = %index, failed = pending.len(), attempt, "resubmitting failed positions");
            tokio::time::sleep(self.config.resubmit_backoff * attempt).await;
        }
    }
}

pub(crate) fn creation_status(created: bool) -> CreationStatus {
    if created {
        CreationStatus::Created
    } else {
        CreationStatus::AlreadyExists
    }
}

pub(crate) async fn with_timeout<T>(
    limit: Duration,
    request: impl Future<Output = std::result::Result<T, ClientError>>,
) -> std::result::Result<T, ClientError> {
    tokio::time::timeout(limit, request)
        .await
        .map_err(|_| ClientError::Timeout)?
}
