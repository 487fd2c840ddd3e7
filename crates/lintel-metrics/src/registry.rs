//! Metrics registry

use crate::Histogram;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Thread-safe store of named metrics.
///
/// Counters and gauges live in concurrent maps so that producers on many
/// threads can record without contending on a single lock. Histograms are
/// created lazily on first observation.
pub struct MetricsRegistry {
    counters: DashMap<String, AtomicU64>,
    gauges: DashMap<String, AtomicI64>,
    histograms: RwLock<HashMap<String, Arc<Histogram>>>,
}

impl MetricsRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
            gauges: DashMap::new(),
            histograms: RwLock::new(HashMap::new()),
        }
    }

    /// Increment a counter
    pub fn increment(&self, name: &str, delta: u64) {
        if let Some(counter) = self.counters.get(name) {
            counter.fetch_add(delta, Ordering::Relaxed);
            return;
        }
        self.counters
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(delta, Ordering::Relaxed);
    }

    /// Set a gauge value
    pub fn set_gauge(&self, name: &str, value: i64) {
        if let Some(gauge) = self.gauges.get(name) {
            gauge.store(value, Ordering::Relaxed);
            return;
        }
        self.gauges
            .entry(name.to_string())
            .or_insert_with(|| AtomicI64::new(0))
            .store(value, Ordering::Relaxed);
    }

    /// Record a duration into a histogram
    pub fn observe_duration(&self, name: &str, elapsed: Duration) {
        let histograms = self.histograms.read();
        if let Some(h) = histograms.get(name) {
            h.observe(elapsed);
            return;
        }
        drop(histograms);

        let mut histograms = self.histograms.write();
        histograms
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Histogram::new()))
            .observe(elapsed);
    }

    /// Get counter value
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.counters
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
    }

    /// Get counter value, treating unknown counters as zero
    pub fn counter_or_zero(&self, name: &str) -> u64 {
        self.counter(name).unwrap_or(0)
    }

    /// Get gauge value
    pub fn gauge(&self, name: &str) -> Option<i64> {
        self.gauges.get(name).map(|g| g.load(Ordering::Relaxed))
    }

    /// Number of observations recorded by a histogram
    pub fn histogram_count(&self, name: &str) -> Option<u64> {
        self.histograms.read().get(name).map(|h| h.total_count())
    }

    /// Mean of a histogram in milliseconds
    pub fn histogram_mean_millis(&self, name: &str) -> Option<f64> {
        self.histograms.read().get(name).map(|h| h.mean_millis())
    }

    /// All counter names and values
    pub fn counters(&self) -> Vec<(String, u64)> {
        self.counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect()
    }

    /// All gauge names and values
    pub fn gauges(&self) -> Vec<(String, i64)> {
        self.gauges
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect()
    }

    /// All histograms, shared
    pub fn histograms(&self) -> Vec<(String, Arc<Histogram>)> {
        self.histograms
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("counters", &self.counters.len())
            .field("gauges", &self.gauges.len())
            .field("histograms", &self.histograms.read().len())
            .finish()
    }
}
