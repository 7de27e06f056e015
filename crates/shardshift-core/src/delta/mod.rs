//! Segment-level delta engine.
//!
//! Given two point-in-time views of the same shard, the engine works out which
//! documents became live (additions) and which stopped being live (deletions)
//! by comparing per-segment live-docs sets. Segments are immutable, so a
//! segment seen in both views can only have lost documents; only segments
//! with new deletions need a bit-level comparison.
//!
//! Document bodies are read lazily, in small chunks, through a shared
//! [`ReadPool`].

mod engine;
mod read_pool;

pub use engine::{DeltaDocument, DeltaEngine, DeltaStats, ReaderAndBase, ShardDelta};
pub use read_pool::ReadPool;

use crate::error::{Error, Result};

/// Delta engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaConfig {
    /// Maximum concurrent blocking segment reads.
    pub read_workers: usize,
    /// Documents read per blocking task.
    pub chunk_size: usize,
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            read_workers: 4,
            chunk_size: 64,
        }
    }
}

impl DeltaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_read_workers(mut self, read_workers: usize) -> Self {
        self.read_workers = read_workers;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.read_workers == 0 {
            return Err(Error::Config("read_workers must be at least 1".into()));
        }
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be at least 1".into()));
        }
        Ok(())
    }
}
