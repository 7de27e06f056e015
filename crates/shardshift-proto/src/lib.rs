//! shardshift wire and data types.
//!
//! This crate holds the leaf types every other shardshift crate builds on.
//!
//! # Modules
//!
//! - [`change`] - Document change IR, shard identity and progress cursors
//! - [`metadata`] - Index and global metadata snapshots
//! - [`bitset`] - Fixed-length bit vector over document ordinals
//! - [`bulk`] - Bulk request wire codec
//! - [`bulk_response`] - Streaming bulk response parser
//! - [`error`] - Protocol error types
//!
//! # Serialization
//!
//! Cursor and shard types derive `rkyv::Archive` for checkpoint storage as
//! well as `serde` for JSON reporting:
//!
//! ```ignore
//! use shardshift_proto::{ProgressCursor, ShardId};
//!
//! let cursor = ProgressCursor::after_batch(ShardId::new("snap", "logs", 0), 0, 10, 512);
//! let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(&cursor).unwrap();
//! ```

pub mod bitset;
pub mod bulk;
pub mod bulk_response;
pub mod change;
pub mod error;
pub mod metadata;

pub use error::Error;

// Re-export commonly used types at crate root
pub use bitset::DocBitSet;
pub use bulk::{
    decode_bulk, decode_inline_bulk, encode_bulk, BulkOperationSpec, DeleteOp, IndexOp,
    OperationMeta, BULK_SCHEMA_VERSION,
};
pub use bulk_response::{BulkItem, BulkResponseParser, ParsedBulkResponse};
pub use change::{ChangeKind, DocumentChange, ProgressCursor, ShardId};
pub use metadata::{GlobalMetadataSnapshot, IndexMetadataSnapshot};
