//! shardshift client: target cluster adapters.
//!
//! The pipelines in `shardshift-core` write through the `DocumentSink` and
//! `MetadataSink` ports. This crate implements both on top of a
//! [`TargetClient`], the small set of calls a target cluster must answer.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use shardshift_client::{BulkDocumentSink, BulkSinkConfig};
//!
//! let client: Arc<dyn TargetClient> = Arc::new(MyHttpTarget::new(url));
//! let sink = BulkDocumentSink::new(
//!     client,
//!     BulkSinkConfig::new().with_allowlisted_error_types(["version_conflict_engine_exception"]),
//! );
//! ```

pub mod config;
pub mod error;
pub mod metadata;
pub mod sink;
pub mod target;

pub use config::BulkSinkConfig;
pub use error::ClientError;
pub use metadata::ClusterMetadataSink;
pub use sink::BulkDocumentSink;
pub use target::TargetClient;

/// Re-export protocol types.
pub use shardshift_proto as proto;
