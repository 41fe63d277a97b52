//! Serial search phase: one query at a time from a single worker.

use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::client::VectorClient;
use crate::config::BenchmarkConfig;
use crate::dataset::Query;
use crate::metrics::{recall_at_k, LatencySummary, SampleRecorder};

/// Outcome of the serial phase, immutable once the phase returns.
#[derive(Debug, Clone, Serialize)]
pub struct SerialSearchResult {
    /// Per-query latency samples in issue order, seconds.
    #[serde(skip)]
    pub latencies: Vec<f64>,
    pub latency: LatencySummary,
    /// Mean of per-query recalls, in [0, 1].
    pub recall: f64,
    pub completed: usize,
    pub failed: usize,
    /// Set when the failure rate exceeded the configured threshold.
    pub error: Option<String>,
}

/// Issue each query once, sequentially, measuring per-call latency and
/// per-query recall against ground truth.
///
/// An individual failure is folded in as a sample at the configured timeout
/// with recall 0; only a failure rate above the threshold marks the phase
/// as errored.
pub fn run_serial_search(
    client: &mut dyn VectorClient,
    queries: &[Query],
    cfg: &BenchmarkConfig,
) -> SerialSearchResult {
    let timeout_secs = cfg.search_timeout.as_secs_f64();
    let mut recorder = SampleRecorder::new();

    for query in queries {
        let start = Instant::now();
        match client.search(&query.vector, cfg.k) {
            Ok(ids) => {
                let latency = start.elapsed().as_secs_f64();
                recorder.record(latency, recall_at_k(&ids, &query.ground_truth, cfg.k));
            }
            Err(e) => {
                warn!(error = %e, "serial query failed");
                recorder.record_failure(timeout_secs);
            }
        }
    }

    let failure_rate = recorder.failure_rate();
    let error = if failure_rate > cfg.failure_threshold {
        Some(format!(
            "failure rate {:.3} exceeded threshold {:.3}",
            failure_rate, cfg.failure_threshold
        ))
    } else {
        None
    };

    info!(
        queries = recorder.len(),
        failed = recorder.failed(),
        recall = recorder.mean_recall(),
        "serial search complete"
    );

    SerialSearchResult {
        latency: recorder.latency_summary(),
        recall: recorder.mean_recall(),
        completed: recorder.len() - recorder.failed(),
        failed: recorder.failed(),
        error,
        latencies: recorder.latencies().to_vec(),
    }
}
