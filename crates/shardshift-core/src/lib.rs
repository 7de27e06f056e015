//! shardshift core: segment delta engine and migration pipelines.
//!
//! The crate moves documents and metadata from a point-in-time snapshot of a
//! search cluster into a target cluster:
//!
//! - [`segment`] defines the minimal segment reader contract and two
//!   implementations of it.
//! - [`delta`] diffs two views of a shard into deletions and additions.
//! - [`pipeline`] batches changes into a sink and emits resumable cursors.
//! - [`checkpoint`] persists those cursors.

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod checkpoint;
pub mod delta;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod ports;
pub mod segment;
pub mod source;

pub use checkpoint::CursorStore;
pub use delta::{DeltaConfig, DeltaEngine, ShardDelta};
pub use error::{Error, PipelineError, Result};
pub use metrics::{new_shared_registry, Histogram, MetricsRegistry, SharedMetricsRegistry};
pub use pipeline::{
    run_until_shutdown, DocumentMigrator, IndexFilter, MetadataMigrator, MetadataReport,
    MigrationConfig, MigrationOutcome,
};
pub use ports::{
    CreationStatus, DocumentSink, DocumentSource, IdentityTransformer, MetadataSink,
    MetadataTransformer, ShardOpener, SnapshotReader,
};
pub use segment::{ManifestSnapshot, MemorySegment, MemoryShard, SegmentReader, ShardReader};
pub use source::SnapshotSource;

/// Re-export protocol types.
pub use shardshift_proto as proto;
