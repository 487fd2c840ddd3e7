//! # lintel-metrics
//!
//! Observability primitives for the lintel analysis scheduler.
//!
//! Features:
//! - Latency histograms with millisecond buckets
//! - Monotonic counters for scheduling events
//! - Gauges for current values (queue depth, in-flight work)
//! - JSON snapshot export

#![warn(missing_docs)]
#![warn(clippy::all)]

mod histogram;
mod registry;
mod snapshot;

pub use histogram::{Histogram, DEFAULT_LATENCY_BUCKETS_MS};
pub use registry::MetricsRegistry;
pub use snapshot::{HistogramSummary, MetricsSnapshot};

/// Times a block and records its duration into the named histogram.
#[macro_export]
macro_rules! timed {
    ($registry:expr, $name:expr, $block:block) => {{
        let start = std::time::Instant::now();
        let result = $block;
        $registry.observe_duration($name, start.elapsed());
        result
    }};
}
