//! Per-request handling time for the game API.
//!
//! The router's `track_latency` middleware times every request, from the
//! moment axum hands it over until the handler's response is built, and
//! `/stats/latency` reports quantiles over everything seen since startup.

use std::sync::Mutex;
use std::time::Duration;

use hdrhistogram::Histogram;
use serde::Serialize;

use crate::config::{LATENCY_MAX_US, LATENCY_MIN_US};

/// Handling-time histogram shared by all requests, in microseconds.
pub struct RequestLatency {
    histogram: Mutex<Histogram<u64>>,
}

/// Snapshot served by `/stats/latency`. Quantiles are `None` until the
/// first request has been timed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySummary {
    pub samples: u64,
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
}

impl RequestLatency {
    pub fn new() -> Self {
        // Bounds are compile-time constants with LATENCY_MIN_US >= 1.
        let histogram = Histogram::new_with_bounds(LATENCY_MIN_US, LATENCY_MAX_US, 3)
            .expect("latency bounds in config are valid");
        Self {
            histogram: Mutex::new(histogram),
        }
    }

    /// Time spent on one request. Sub-microsecond requests count as the
    /// lower bound and anything past the upper bound is clamped to it.
    pub fn record(&self, elapsed: Duration) {
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        if let Ok(mut h) = self.histogram.lock() {
            h.saturating_record(us.max(LATENCY_MIN_US));
        }
    }

    pub fn summary(&self) -> LatencySummary {
        let Ok(h) = self.histogram.lock() else {
            return LatencySummary::default();
        };
        let quantile_ms = |q: f64| (h.len() > 0).then(|| h.value_at_quantile(q) as f64 / 1_000.0);
        LatencySummary {
            samples: h.len(),
            p50_ms: quantile_ms(0.50),
            p95_ms: quantile_ms(0.95),
            p99_ms: quantile_ms(0.99),
        }
    }
}

impl Default for RequestLatency {
    fn default() -> Self {
        Self::new()
    }
}
