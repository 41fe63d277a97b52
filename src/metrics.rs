//! Latency and recall sample accumulation.
//!
//! Each worker owns a private [`SampleRecorder`] and recorders are merged
//! after the workers have joined, so no lock sits in the request hot path.
//! Percentiles use the nearest-rank convention over the exact sample set:
//! the result is always a value that was observed.

use serde::Serialize;

/// Accumulates (latency, recall) samples for one worker or phase.
///
/// Not synchronized; merge worker-private recorders at aggregation time.
#[derive(Debug, Default, Clone)]
pub struct SampleRecorder {
    latencies: Vec<f64>,
    recalls: Vec<f64>,
    failed: usize,
}

impl SampleRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed request.
    pub fn record(&mut self, latency_secs: f64, recall: f64) {
        self.latencies.push(latency_secs);
        self.recalls.push(recall);
    }

    /// Record a failed or timed-out request: it counts as a sample at the
    /// configured timeout with recall 0.
    pub fn record_failure(&mut self, timeout_secs: f64) {
        self.record(timeout_secs, 0.0);
        self.failed += 1;
    }

    /// Fold another recorder into this one.
    pub fn merge(&mut self, other: SampleRecorder) {
        self.latencies.extend(other.latencies);
        self.recalls.extend(other.recalls);
        self.failed += other.failed;
    }

    /// Total requests recorded, failed ones included.
    pub fn len(&self) -> usize {
        self.latencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latencies.is_empty()
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn failure_rate(&self) -> f64 {
        if self.latencies.is_empty() {
            0.0
        } else {
            self.failed as f64 / self.latencies.len() as f64
        }
    }

    pub fn mean_recall(&self) -> f64 {
        if self.recalls.is_empty() {
            0.0
        } else {
            self.recalls.iter().sum::<f64>() / self.recalls.len() as f64
        }
    }

    /// Latency samples in arrival order, in seconds.
    pub fn latencies(&self) -> &[f64] {
        &self.latencies
    }

    pub fn latency_summary(&self) -> LatencySummary {
        LatencySummary::from_samples(&self.latencies)
    }
}

/// Percentile latencies over one phase or level, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    pub avg: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl LatencySummary {
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).expect("latency samples are finite"));
        Self {
            avg: sorted.iter().sum::<f64>() / sorted.len() as f64,
            p90: percentile(&sorted, 90.0),
            p95: percentile(&sorted, 95.0),
            p99: percentile(&sorted, 99.0),
        }
    }
}

/// Nearest-rank percentile over an ascending-sorted sample set.
///
/// `rank = ceil(p/100 * N)` clamped to `[1, N]`, so `percentile(_, 0.0)` is
/// the minimum and `percentile(_, 100.0)` the maximum.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    assert!(!sorted.is_empty(), "percentile of empty sample set");
    let n = sorted.len();
    let rank = ((p / 100.0) * n as f64).ceil() as usize;
    sorted[rank.clamp(1, n) - 1]
}

/// Fraction of the true top-k neighbors present in the returned ids.
///
/// Both sides are restricted to their first `k` entries;
/// the denominator is `min(k, |truth|)`.
pub fn recall_at_k(returned: &[u64], truth: &[u64], k: usize) -> f64 {
    let denom = k.min(truth.len());
    if denom == 0 {
        return 0.0;
    }
    let truth_top = &truth[..denom];
    let hits = returned
        .iter()
        .take(k)
        .filter(|id| truth_top.contains(id))
        .count();
    hits as f64 / denom as f64
}
