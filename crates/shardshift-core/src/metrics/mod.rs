//! Metrics collection.
//!
//! # Usage
//!
//! ```ignore
//! use shardshift_core::metrics::new_shared_registry;
//!
//! let registry = new_shared_registry();
//! registry.record_batch("logs", 500, 1 << 20);
//!
//! let prometheus_text = registry.to_prometheus();
//! ```

mod histogram;
mod registry;

pub use histogram::Histogram;
pub use registry::{new_shared_registry, MetricsRegistry, SharedMetricsRegistry};
