//! Core error types.

use shardshift_proto::{DocBitSet, ShardId};
use thiserror::Error;

/// Leaf failures raised by sources, sinks, the delta engine and storage.
#[derive(Debug, Error)]
pub enum Error {
    /// A segment could not be opened or read.
    #[error("segment '{segment}': {message}")]
    Segment {
        /// Segment name.
        segment: String,
        /// What went wrong.
        message: String,
    },

    /// The snapshot or live source failed.
    #[error("source error: {0}")]
    Source(String),

    /// The target rejected a write.
    #[error("write failed: {0}")]
    Write(String),

    /// Some operations of a bulk batch failed and were not recovered.
    #[error("partial batch failure: {} of {submitted} operations failed", .failed.cardinality())]
    PartialBatch {
        /// Positions (in submission order) that failed.
        failed: DocBitSet,
        /// Number of operations submitted.
        submitted: usize,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Checkpoint storage error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] shardshift_proto::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A worker task panicked or was cancelled.
    #[error("worker task failed: {0}")]
    Task(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Deserialization(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Task(err.to_string())
    }
}

/// A leaf [`Error`] tagged with the unit of work that was in flight.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("shard {shard}: {source}")]
    Shard { shard: ShardId, source: Error },

    #[error("index '{index}': {source}")]
    Index { index: String, source: Error },

    #[error("global metadata: {source}")]
    GlobalMetadata { source: Error },

    #[error("index discovery: {source}")]
    Discovery { source: Error },
}

impl PipelineError {
    pub fn shard(shard: ShardId, source: Error) -> Self {
        PipelineError::Shard { shard, source }
    }

    pub fn index(index: impl Into<String>, source: Error) -> Self {
        PipelineError::Index {
            index: index.into(),
            source,
        }
    }

    /// The wrapped leaf error.
    pub fn inner(&self) -> &Error {
        match self {
            PipelineError::Shard { source, .. }
            | PipelineError::Index { source, .. }
            | PipelineError::GlobalMetadata { source }
            | PipelineError::Discovery { source } => source,
        }
    }

    /// Shard in flight when the error occurred, if any.
    pub fn shard_id(&self) -> Option<&ShardId> {
        match self {
            PipelineError::Shard { shard, .. } => Some(shard),
            _ => None,
        }
    }

    /// Index in flight when the error occurred, if any.
    pub fn index_name(&self) -> Option<&str> {
        match self {
            PipelineError::Shard { shard, .. } => Some(&shard.index),
            PipelineError::Index { index, .. } => Some(index),
            _ => None,
        }
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_batch_message() {
        let err = Error::PartialBatch {
            failed: DocBitSet::from_ordinals(4, [1, 3]),
            submitted: 4,
        };
        assert_eq!(err.to_string(), "partial batch failure: 2 of 4 operations failed");
    }

    #[test]
    fn test_pipeline_error_context() {
        let shard = ShardId::new("snap", "logs", 2);
        let err = PipelineError::shard(shard.clone(), Error::Write("rejected".into()));
        assert_eq!(err.shard_id(), Some(&shard));
        assert_eq!(err.index_name(), Some("logs"));
        assert!(matches!(err.inner(), Error::Write(_)));
        assert_eq!(err.to_string(), "shard snap/logs/2: write failed: rejected");
    }
}
