//! Segment reader contract and its implementations.
//!
//! The delta engine sees a shard only through [`ShardReader`] and
//! [`SegmentReader`]. Each supported storage layout provides its own
//! implementation; this crate ships an in-memory variant used by tests and
//! embedders, and a JSON manifest variant used by the offline CLI.

mod manifest;
mod memory;
mod reader;

pub use manifest::{ManifestDocument, ManifestSegment, ManifestShard, ManifestSnapshot};
pub use memory::{MemorySegment, MemoryShard};
pub use reader::{RawDocument, SegmentReader, ShardReader};
