//! Interfaces between the pipelines and their collaborators.
//!
//! The pipelines never touch storage layouts or transports directly: they
//! read through [`SnapshotReader`] and [`DocumentSource`] and write through
//! [`DocumentSink`] and [`MetadataSink`].

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use shardshift_proto::{DocumentChange, GlobalMetadataSnapshot, IndexMetadataSnapshot, ShardId};

use crate::error::Result;
use crate::segment::ShardReader;

/// Outcome of a create-if-absent call on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationStatus {
    Created,
    AlreadyExists,
}

/// Catalog of a snapshot or live cluster.
#[async_trait]
pub trait SnapshotReader: Send + Sync {
    async fn list_indices(&self) -> Result<Vec<String>>;

    async fn list_shards(&self, index: &str) -> Result<Vec<ShardId>>;

    async fn read_index_metadata(&self, index: &str) -> Result<IndexMetadataSnapshot>;

    async fn read_global_metadata(&self) -> Result<GlobalMetadataSnapshot>;
}

/// Opens shard views for the delta engine. Blocking.
pub trait ShardOpener: Send + Sync {
    /// Open shard `shard` of `index`, or `None` if this snapshot lacks it.
    fn open_shard(&self, index: &str, shard: u32) -> Result<Option<Arc<dyn ShardReader>>>;
}

/// Produces a shard's change sequence.
pub trait DocumentSource: Send + Sync {
    /// Lazy change sequence for `shard`, skipping the first `starting_offset`
    /// changes. Nothing is read until the stream is polled, and the same
    /// offset always yields the same suffix.
    fn read_changes(
        &self,
        shard: &ShardId,
        starting_offset: u64,
    ) -> BoxStream<'static, Result<DocumentChange>>;

    /// Name of the change sequence that offsets count into.
    ///
    /// Two sources reporting the same name must produce the same sequence
    /// for every shard. Checkpoints are only resumed under a matching name.
    fn sequence(&self) -> String;
}

/// Writes document batches to the target.
#[async_trait]
pub trait DocumentSink: Send + Sync {
    /// Create the target index unless it already exists.
    async fn create_index(&self, metadata: &IndexMetadataSnapshot) -> Result<CreationStatus>;

    /// Apply `changes` to `index`, in order.
    async fn write_batch(&self, index: &str, changes: &[DocumentChange]) -> Result<()>;
}

/// Writes templates and index metadata to the target.
#[async_trait]
pub trait MetadataSink: Send + Sync {
    async fn create_legacy_template(&self, name: &str, body: &Value) -> Result<CreationStatus>;

    async fn create_component_template(&self, name: &str, body: &Value)
        -> Result<CreationStatus>;

    async fn create_index_template(&self, name: &str, body: &Value) -> Result<CreationStatus>;

    async fn create_index(&self, metadata: &IndexMetadataSnapshot) -> Result<CreationStatus>;
}

/// Rewrites metadata between the source and target versions.
pub trait MetadataTransformer: Send + Sync {
    fn transform_global(&self, global: GlobalMetadataSnapshot) -> Result<GlobalMetadataSnapshot>;

    fn transform_index(&self, index: IndexMetadataSnapshot) -> Result<IndexMetadataSnapshot>;
}

/// Passes metadata through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransformer;

impl MetadataTransformer for IdentityTransformer {
    fn transform_global(&self, global: GlobalMetadataSnapshot) -> Result<GlobalMetadataSnapshot> {
        Ok(global)
    }

    fn transform_index(&self, index: IndexMetadataSnapshot) -> Result<IndexMetadataSnapshot> {
        Ok(index)
    }
}
