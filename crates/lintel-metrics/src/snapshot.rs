//! Point-in-time metrics export

use crate::MetricsRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Snapshot of all metrics at a point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Counter values
    pub counters: BTreeMap<String, u64>,
    /// Gauge values
    pub gauges: BTreeMap<String, i64>,
    /// Histogram summaries
    pub histograms: BTreeMap<String, HistogramSummary>,
}

/// Summary of a histogram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSummary {
    /// Mean value in milliseconds
    pub mean_ms: f64,
    /// Largest value in milliseconds
    pub max_ms: f64,
    /// Total observation count
    pub count: u64,
}

impl MetricsSnapshot {
    /// Capture the current state of a registry
    pub fn capture(registry: &MetricsRegistry) -> Self {
        let histograms = registry
            .histograms()
            .into_iter()
            .map(|(name, h)| {
                let summary = HistogramSummary {
                    mean_ms: h.mean_millis(),
                    max_ms: h.max_millis(),
                    count: h.total_count(),
                };
                (name, summary)
            })
            .collect();

        Self {
            counters: registry.counters().into_iter().collect(),
            gauges: registry.gauges().into_iter().collect(),
            histograms,
        }
    }

    /// Export snapshot as pretty JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Export snapshot as compact JSON
    pub fn to_json_compact(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Log the snapshot at debug level
    pub fn log(&self) {
        match self.to_json_compact() {
            Ok(json) => tracing::debug!(metrics = %json, "metrics snapshot"),
            Err(e) => tracing::warn!("failed to serialize metrics snapshot: {}", e),
        }
    }
}
