//! Metrics surface for the propagation path.
//!
//! Thread-safe atomic instruments with a Prometheus exposition encoder.
//! One counter per propagation result plus the latency histogram from
//! event timestamp to publish acknowledgement.

use crate::propagator::PropagationResult;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Creates a counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments by one.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::SeqCst);
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }
}

/// Bucket boundaries for the latency histogram, in milliseconds.
pub const LATENCY_BUCKETS_MS: [u64; 9] = [1, 5, 10, 25, 50, 100, 250, 500, 1000];

/// Thread-safe latency histogram over fixed millisecond buckets, with a
/// final +Inf bucket.
#[derive(Debug, Default)]
pub struct Histogram {
    buckets: [AtomicU64; LATENCY_BUCKETS_MS.len() + 1],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    /// Creates an empty histogram.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one observation in milliseconds.
    pub fn observe(&self, value_ms: u64) {
        self.sum.fetch_add(value_ms, Ordering::SeqCst);
        self.count.fetch_add(1, Ordering::SeqCst);

        let idx = LATENCY_BUCKETS_MS
            .iter()
            .position(|&bound| value_ms <= bound)
            .unwrap_or(LATENCY_BUCKETS_MS.len());
        self.buckets[idx].fetch_add(1, Ordering::SeqCst);
    }

    /// Total number of observations.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    /// Sum of all observations.
    #[must_use]
    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::SeqCst)
    }

    /// Cumulative count up to and including the bucket at `idx`.
    #[must_use]
    pub fn cumulative(&self, idx: usize) -> u64 {
        self.buckets[..=idx.min(LATENCY_BUCKETS_MS.len())]
            .iter()
            .map(|b| b.load(Ordering::SeqCst))
            .sum()
    }
}

/// Instruments for the propagation path.
#[derive(Debug, Default)]
pub struct PropagationMetrics {
    success: Counter,
    skipped: Counter,
    error: Counter,
    latency: Histogram,
}

impl PropagationMetrics {
    /// Creates zeroed instruments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one propagation outcome.
    pub fn record_result(&self, result: PropagationResult) {
        self.counter(result).inc();
    }

    /// Records the event-to-ack latency of a successful propagation.
    pub fn record_latency_ms(&self, latency_ms: u64) {
        self.latency.observe(latency_ms);
    }

    /// Current count for one outcome.
    #[must_use]
    pub fn result_count(&self, result: PropagationResult) -> u64 {
        self.counter(result).get()
    }

    /// Number of recorded latencies.
    #[must_use]
    pub fn latency_count(&self) -> u64 {
        self.latency.count()
    }

    fn counter(&self, result: PropagationResult) -> &Counter {
        match result {
            PropagationResult::Success => &self.success,
            PropagationResult::Skipped => &self.skipped,
            PropagationResult::Error => &self.error,
        }
    }

    /// Renders the Prometheus exposition format.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let mut out = String::with_capacity(1024);

        let _ = writeln!(
            out,
            "# HELP firesync_propagation_event_count Changes propagated from the source database to the topic"
        );
        let _ = writeln!(out, "# TYPE firesync_propagation_event_count counter");
        for result in [
            PropagationResult::Success,
            PropagationResult::Skipped,
            PropagationResult::Error,
        ] {
            let _ = writeln!(
                out,
                "firesync_propagation_event_count{{result=\"{result}\"}} {}",
                self.result_count(result)
            );
        }
        let _ = writeln!(out);

        let _ = writeln!(
            out,
            "# HELP firesync_propagation_latency_ms Latency from source mutation to publish acknowledgement"
        );
        let _ = writeln!(out, "# TYPE firesync_propagation_latency_ms histogram");
        for (idx, bound) in LATENCY_BUCKETS_MS.iter().enumerate() {
            let _ = writeln!(
                out,
                "firesync_propagation_latency_ms_bucket{{le=\"{bound}\"}} {}",
                self.latency.cumulative(idx)
            );
        }
        let _ = writeln!(
            out,
            "firesync_propagation_latency_ms_bucket{{le=\"+Inf\"}} {}",
            self.latency.cumulative(LATENCY_BUCKETS_MS.len())
        );
        let _ = writeln!(out, "firesync_propagation_latency_ms_sum {}", self.latency.sum());
        let _ = writeln!(out, "firesync_propagation_latency_ms_count {}", self.latency.count());

        out
    }
}
