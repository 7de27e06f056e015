//! Fixed-bucket latency histogram.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Lock-free histogram over millisecond buckets.
///
/// Each bucket counts observations `<=` its bound and `>` the previous one;
/// observations above the last bound land in the overflow slot.
pub struct Histogram {
    bounds_ms: Vec<u64>,
    counts: Vec<AtomicU64>,
    overflow: AtomicU64,
    sum_ms: AtomicU64,
    count: AtomicU64,
    max_ms: AtomicU64,
}

impl Histogram {
    /// Buckets suited to bulk write round trips: 5ms up to 60s.
    pub fn bulk_latency() -> Self {
        Self::with_bounds(vec![
            5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 30_000, 60_000,
        ])
    }

    /// Histogram with the given ascending upper bounds in milliseconds.
    pub fn with_bounds(bounds_ms: Vec<u64>) -> Self {
        let counts = bounds_ms.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            bounds_ms,
            counts,
            overflow: AtomicU64::new(0),
            sum_ms: AtomicU64::new(0),
            count: AtomicU64::new(0),
            max_ms: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, elapsed: Duration) {
        self.observe_ms(elapsed.as_millis().min(u64::MAX as u128) as u64);
    }

    pub fn observe_ms(&self, value_ms: u64) {
        self.sum_ms.fetch_add(value_ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.max_ms.fetch_max(value_ms, Ordering::Relaxed);

        match self.bounds_ms.iter().position(|bound| value_ms <= *bound) {
            Some(i) => self.counts[i].fetch_add(1, Ordering::Relaxed),
            None => self.overflow.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum_ms(&self) -> u64 {
        self.sum_ms.load(Ordering::Relaxed)
    }

    pub fn max_ms(&self) -> u64 {
        self.max_ms.load(Ordering::Relaxed)
    }

    pub fn avg_ms(&self) -> u64 {
        match self.count() {
            0 => 0,
            n => self.sum_ms() / n,
        }
    }

    /// Upper bound of the bucket holding quantile `q` (0.0..=1.0).
    ///
    /// Quantiles that fall in the overflow slot report the observed maximum.
    pub fn quantile_ms(&self, q: f64) -> u64 {
        let total = self.count();
        if total == 0 {
            return 0;
        }
        let target = ((total as f64) * q).ceil().max(1.0) as u64;
        let mut seen = 0;
        for (bound, count) in self.bounds_ms.iter().zip(&self.counts) {
            seen += count.load(Ordering::Relaxed);
            if seen >= target {
                return *bound;
            }
        }
        self.max_ms()
    }

    /// Cumulative `(upper_bound_ms, count)` pairs; the overflow slot is
    /// reported with bound `None`.
    pub fn cumulative(&self) -> Vec<(Option<u64>, u64)> {
        let mut running = 0;
        let mut out: Vec<_> = self
            .bounds_ms
            .iter()
            .zip(&self.counts)
            .map(|(bound, count)| {
                running += count.load(Ordering::Relaxed);
                (Some(*bound), running)
            })
            .collect();
        out.push((None, running + self.overflow.load(Ordering::Relaxed)));
        out
    }

    pub fn reset(&self) {
        for count in &self.counts {
            count.store(0, Ordering::Relaxed);
        }
        self.overflow.store(0, Ordering::Relaxed);
        self.sum_ms.store(0, Ordering::Relaxed);
        self.count.store(0, Ordering::Relaxed);
        self.max_ms.store(0, Ordering::Relaxed);
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::bulk_latency()
    }
}
