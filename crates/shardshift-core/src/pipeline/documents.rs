//! Document migration: source changes to sink batches.

use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use shardshift_proto::{ProgressCursor, ShardId};
use tracing::{debug, info};

use super::batch::{batch_changes, BatchLimits};
use super::config::{IndexFilter, MigrationConfig};
use crate::checkpoint::CursorStore;
use crate::error::{Error, PipelineError, Result};
use crate::metrics::SharedMetricsRegistry;
use crate::ports::{
    DocumentSink, DocumentSource, IdentityTransformer, MetadataTransformer, SnapshotReader,
};

/// Stream of cursors, one per acknowledged batch.
pub type CursorStream = BoxStream<'static, std::result::Result<ProgressCursor, PipelineError>>;

/// Moves document changes from a source to a sink.
///
/// All methods return cold streams: nothing is read or written until the
/// stream is polled, and dropping it stops the migration. Batches of one
/// shard are written strictly one after another; only shards of the same
/// index may run concurrently, up to `max_concurrent_shards`.
#[derive(Clone)]
pub struct DocumentMigrator {
    reader: Arc<dyn SnapshotReader>,
    source: Arc<dyn DocumentSource>,
    sink: Arc<dyn DocumentSink>,
    config: MigrationConfig,
    filter: IndexFilter,
    transformer: Arc<dyn MetadataTransformer>,
    checkpoints: Option<CursorStore>,
    metrics: Option<SharedMetricsRegistry>,
}

impl DocumentMigrator {
    /// Build a migrator. Fails if `config` has a zero limit.
    pub fn new(
        reader: Arc<dyn SnapshotReader>,
        source: Arc<dyn DocumentSource>,
        sink: Arc<dyn DocumentSink>,
        config: MigrationConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            reader,
            source,
            sink,
            config,
            filter: IndexFilter::default(),
            transformer: Arc::new(IdentityTransformer),
            checkpoints: None,
            metrics: None,
        })
    }

    /// Resume shards from, and record progress to, `store`.
    pub fn with_checkpoints(mut self, store: CursorStore) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn with_metrics(mut self, metrics: SharedMetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Transform index metadata before the target index is created.
    pub fn with_transformer(mut self, transformer: Arc<dyn MetadataTransformer>) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn with_filter(mut self, filter: IndexFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    fn limits(&self) -> BatchLimits {
        BatchLimits {
            max_docs: self.config.max_docs_per_batch,
            max_bytes: self.config.max_bytes_per_batch,
        }
    }

    /// Migrate one shard's changes from `starting_offset` into `target_index`.
    ///
    /// Each cursor's `last_doc_offset` is `starting_offset` plus every change
    /// written so far, so it can be passed back here to resume.
    pub fn migrate_shard(
        &self,
        shard: ShardId,
        target_index: String,
        starting_offset: u64,
    ) -> CursorStream {
        let batches = batch_changes(
            self.source.read_changes(&shard, starting_offset),
            self.limits(),
        );
        let sink = Arc::clone(&self.sink);
        let checkpoints = self.checkpoints.clone();
        let sequence = Arc::<str>::from(self.source.sequence());
        let metrics = self.metrics.clone();
        let target = Arc::<str>::from(target_index);
        let cursor_shard = shard.clone();

        let cursors = stream::try_unfold(
            (batches, starting_offset),
            move |(mut batches, offset)| {
                let sink = Arc::clone(&sink);
                let checkpoints = checkpoints.clone();
                let sequence = Arc::clone(&sequence);
                let metrics = metrics.clone();
                let target = Arc::clone(&target);
                let shard = cursor_shard.clone();
                async move {
                    let Some(batch) = batches.try_next().await? else {
                        return Ok(None);
                    };

                    sink.write_batch(&target, &batch.changes).await?;

                    let cursor = ProgressCursor::after_batch(
                        shard,
                        offset,
                        batch.len() as u64,
                        batch.bytes,
                    );
                    if let Some(store) = &checkpoints {
                        store.record(&sequence, &cursor)?;
                    }
                    if let Some(metrics) = &metrics {
                        metrics.record_batch(&target, cursor.docs_in_batch, cursor.bytes_in_batch);
                    }
                    debug!(
                        shard = %cursor.shard_id,
                        docs = cursor.docs_in_batch,
                        bytes = cursor.bytes_in_batch,
                        offset = cursor.last_doc_offset,
                        "batch written"
                    );

                    let next_offset = cursor.last_doc_offset;
                    Ok::<_, Error>(Some((cursor, (batches, next_offset))))
                }
            },
        );

        let metrics = self.metrics.clone();
        cursors
            .map_err(move |source| {
                if let Some(metrics) = &metrics {
                    metrics.record_shard_failure();
                }
                PipelineError::shard(shard.clone(), source)
            })
            .boxed()
    }

    /// Create `index` on the target, then migrate all of its shards.
    ///
    /// With checkpoints enabled each shard resumes from the offset stored for
    /// the source's current sequence.
    pub fn migrate_index(&self, index: String) -> CursorStream {
        let this = self.clone();
        stream::once(async move {
            let wrap = |source| PipelineError::index(index.clone(), source);

            let metadata = this.reader.read_index_metadata(&index).await.map_err(wrap)?;
            let metadata = this.transformer.transform_index(metadata).map_err(wrap)?;
            let status = this.sink.create_index(&metadata).await.map_err(wrap)?;
            info!(index = %index, target = %metadata.name, ?status, "target index ready");

            let shards = this.reader.list_shards(&index).await.map_err(wrap)?;
            let sequence = this.source.sequence();
            let mut streams = Vec::with_capacity(shards.len());
            for shard in shards {
                let offset = match &this.checkpoints {
                    Some(store) => store
                        .last_offset(&sequence, &shard)
                        .map_err(|e| PipelineError::shard(shard.clone(), e))?
                        .unwrap_or(0),
                    None => 0,
                };
                if offset > 0 {
                    info!(shard = %shard, sequence = %sequence, offset, "resuming shard");
                }
                streams.push(this.migrate_shard(shard, metadata.name.clone(), offset));
            }

            Ok::<_, PipelineError>(
                stream::iter(streams).flatten_unordered(this.config.max_concurrent_shards),
            )
        })
        .try_flatten()
        .boxed()
    }

    /// Migrate every accepted index, one index at a time.
    pub fn migrate_all(&self) -> CursorStream {
        let this = self.clone();
        stream::once(async move {
            let indices = this
                .reader
                .list_indices()
                .await
                .map_err(|source| PipelineError::Discovery { source })?;
            let selected = this.filter.apply(indices);
            info!(indices = selected.len(), "migrating documents");

            Ok::<_, PipelineError>(
                stream::iter(selected)
                    .map(move |index| this.migrate_index(index))
                    .flatten(),
            )
        })
        .try_flatten()
        .boxed()
    }
}
