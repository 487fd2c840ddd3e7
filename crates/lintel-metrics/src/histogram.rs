//! Latency histogram

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Default bucket upper bounds, in milliseconds
pub const DEFAULT_LATENCY_BUCKETS_MS: [f64; 10] = [
    1.0, 5.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0, 30000.0,
];

/// Histogram for tracking latency distributions.
///
/// Values are recorded in microseconds internally so that sub-millisecond
/// commands (module registration, file events) still contribute to the sum.
pub struct Histogram {
    /// Bucket upper bounds (in milliseconds)
    bounds: Vec<f64>,
    /// Counts per bucket, plus one overflow bucket at the end
    counts: Vec<AtomicU64>,
    /// Sum of all observations in microseconds
    sum_micros: AtomicU64,
    /// Largest observation in microseconds
    max_micros: AtomicU64,
    /// Total count
    count: AtomicU64,
}

impl Histogram {
    /// Create histogram with default latency buckets
    pub fn new() -> Self {
        Self::with_bounds(DEFAULT_LATENCY_BUCKETS_MS.to_vec())
    }

    /// Create histogram with custom bucket bounds (milliseconds, ascending)
    pub fn with_bounds(bounds: Vec<f64>) -> Self {
        let counts = (0..=bounds.len()).map(|_| AtomicU64::new(0)).collect();
        Histogram {
            bounds,
            counts,
            sum_micros: AtomicU64::new(0),
            max_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Record a duration
    pub fn observe(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.sum_micros.fetch_add(micros, Ordering::Relaxed);
        self.max_micros.fetch_max(micros, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let millis = micros as f64 / 1000.0;
        let index = self
            .bounds
            .iter()
            .position(|bound| millis <= *bound)
            .unwrap_or(self.bounds.len());
        self.counts[index].fetch_add(1, Ordering::Relaxed);
    }

    /// Mean observation in milliseconds
    pub fn mean_millis(&self) -> f64 {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.sum_micros.load(Ordering::Relaxed) as f64 / count as f64 / 1000.0
    }

    /// Largest observation in milliseconds
    pub fn max_millis(&self) -> f64 {
        self.max_micros.load(Ordering::Relaxed) as f64 / 1000.0
    }

    /// Total number of observations
    pub fn total_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Per-bucket counts; the last entry counts values above every bound
    pub fn bucket_counts(&self) -> Vec<u64> {
        self.counts
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect()
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}
