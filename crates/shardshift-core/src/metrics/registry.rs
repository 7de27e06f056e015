//! Central metrics registry.
//!
//! Collects delta, batch and bulk-write statistics for one migration process
//! and exports them in Prometheus text format.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use super::histogram::Histogram;

/// Central registry for all migration metrics.
pub struct MetricsRegistry {
    started_at: Instant,

    // Delta engine
    segments_examined: AtomicU64,
    segments_changed: AtomicU64,
    addition_docs: AtomicU64,
    deletion_docs: AtomicU64,

    // Document pipeline
    batches_written: AtomicU64,
    docs_written: AtomicU64,
    bytes_written: AtomicU64,
    docs_by_index: RwLock<BTreeMap<String, u64>>,
    shard_failures: AtomicU64,

    // Bulk sink
    bulk_requests: AtomicU64,
    bulk_latency: Histogram,
    failed_positions: AtomicU64,
    resubmissions: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            segments_examined: AtomicU64::new(0),
            segments_changed: AtomicU64::new(0),
            addition_docs: AtomicU64::new(0),
            deletion_docs: AtomicU64::new(0),
            batches_written: AtomicU64::new(0),
            docs_written: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            docs_by_index: RwLock::new(BTreeMap::new()),
            shard_failures: AtomicU64::new(0),
            bulk_requests: AtomicU64::new(0),
            bulk_latency: Histogram::bulk_latency(),
            failed_positions: AtomicU64::new(0),
            resubmissions: AtomicU64::new(0),
        }
    }

    /// Record the outcome of one shard delta computation.
    pub fn record_delta(
        &self,
        segments_examined: u64,
        segments_changed: u64,
        addition_docs: u64,
        deletion_docs: u64,
    ) {
        self.segments_examined
            .fetch_add(segments_examined, Ordering::Relaxed);
        self.segments_changed
            .fetch_add(segments_changed, Ordering::Relaxed);
        self.addition_docs.fetch_add(addition_docs, Ordering::Relaxed);
        self.deletion_docs.fetch_add(deletion_docs, Ordering::Relaxed);
    }

    /// Record a batch acknowledged by the sink.
    pub fn record_batch(&self, index: &str, docs: u64, bytes: u64) {
        self.batches_written.fetch_add(1, Ordering::Relaxed);
        self.docs_written.fetch_add(docs, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
        *self.docs_by_index.write().entry(index.to_string()).or_insert(0) += docs;
    }

    pub fn record_shard_failure(&self) {
        self.shard_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one bulk request round trip and its true failures.
    pub fn record_bulk_request(&self, elapsed: Duration, failed_positions: u64) {
        self.bulk_requests.fetch_add(1, Ordering::Relaxed);
        self.bulk_latency.observe(elapsed);
        self.failed_positions
            .fetch_add(failed_positions, Ordering::Relaxed);
    }

    pub fn record_resubmission(&self) {
        self.resubmissions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn segments_examined(&self) -> u64 {
        self.segments_examined.load(Ordering::Relaxed)
    }

    pub fn segments_changed(&self) -> u64 {
        self.segments_changed.load(Ordering::Relaxed)
    }

    pub fn addition_docs(&self) -> u64 {
        self.addition_docs.load(Ordering::Relaxed)
    }

    pub fn deletion_docs(&self) -> u64 {
        self.deletion_docs.load(Ordering::Relaxed)
    }

    pub fn batches_written(&self) -> u64 {
        self.batches_written.load(Ordering::Relaxed)
    }

    pub fn docs_written(&self) -> u64 {
        self.docs_written.load(Ordering::Relaxed)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Documents written per target index.
    pub fn docs_by_index(&self) -> BTreeMap<String, u64> {
        self.docs_by_index.read().clone()
    }

    pub fn shard_failures(&self) -> u64 {
        self.shard_failures.load(Ordering::Relaxed)
    }

    pub fn bulk_requests(&self) -> u64 {
        self.bulk_requests.load(Ordering::Relaxed)
    }

    pub fn bulk_latency(&self) -> &Histogram {
        &self.bulk_latency
    }

    pub fn failed_positions(&self) -> u64 {
        self.failed_positions.load(Ordering::Relaxed)
    }

    pub fn resubmissions(&self) -> u64 {
        self.resubmissions.load(Ordering::Relaxed)
    }

    /// Export to Prometheus text format.
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();

        let gauges = [
            ("uptime_seconds", "Process uptime in seconds", self.uptime_secs()),
        ];
        let counters = [
            ("segments_examined_total", "Segments compared by the delta engine", self.segments_examined()),
            ("segments_changed_total", "Segments contributing changes", self.segments_changed()),
            ("addition_docs_total", "Documents found added", self.addition_docs()),
            ("deletion_docs_total", "Documents found deleted", self.deletion_docs()),
            ("batches_written_total", "Batches acknowledged by the sink", self.batches_written()),
            ("docs_written_total", "Changes acknowledged by the sink", self.docs_written()),
            ("bytes_written_total", "Change bytes acknowledged by the sink", self.bytes_written()),
            ("shard_failures_total", "Shard migrations that failed", self.shard_failures()),
            ("bulk_requests_total", "Bulk requests sent", self.bulk_requests()),
            ("failed_positions_total", "Bulk items that truly failed", self.failed_positions()),
            ("resubmissions_total", "Bulk resubmissions of failed positions", self.resubmissions()),
        ];

        for (name, help, value) in gauges {
            let _ = writeln!(out, "# HELP shardshift_{name} {help}");
            let _ = writeln!(out, "# TYPE shardshift_{name} gauge");
            let _ = writeln!(out, "shardshift_{name} {value}\n");
        }
        for (name, help, value) in counters {
            let _ = writeln!(out, "# HELP shardshift_{name} {help}");
            let _ = writeln!(out, "# TYPE shardshift_{name} counter");
            let _ = writeln!(out, "shardshift_{name} {value}\n");
        }

        out.push_str("# HELP shardshift_index_docs_written_total Changes written per index\n");
        out.push_str("# TYPE shardshift_index_docs_written_total counter\n");
        for (index, docs) in self.docs_by_index() {
            let _ = writeln!(
                out,
                "shardshift_index_docs_written_total{{index=\"{index}\"}} {docs}"
            );
        }
        out.push('\n');

        out.push_str("# HELP shardshift_bulk_latency_ms Bulk request latency in milliseconds\n");
        out.push_str("# TYPE shardshift_bulk_latency_ms histogram\n");
        for (bound, count) in self.bulk_latency.cumulative() {
            let le = bound.map_or_else(|| "+Inf".to_string(), |b| b.to_string());
            let _ = writeln!(out, "shardshift_bulk_latency_ms_bucket{{le=\"{le}\"}} {count}");
        }
        let _ = writeln!(out, "shardshift_bulk_latency_ms_sum {}", self.bulk_latency.sum_ms());
        let _ = writeln!(out, "shardshift_bulk_latency_ms_count {}", self.bulk_latency.count());

        out
    }

    /// Reset all metrics (for testing).
    pub fn reset(&self) {
        for counter in [
            &self.segments_examined,
            &self.segments_changed,
            &self.addition_docs,
            &self.deletion_docs,
            &self.batches_written,
            &self.docs_written,
            &self.bytes_written,
            &self.shard_failures,
            &self.bulk_requests,
            &self.failed_positions,
            &self.resubmissions,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.docs_by_index.write().clear();
        self.bulk_latency.reset();
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics registry handle.
pub type SharedMetricsRegistry = Arc<MetricsRegistry>;

/// Create a new shared metrics registry.
pub fn new_shared_registry() -> SharedMetricsRegistry {
    Arc::new(MetricsRegistry::new())
}
