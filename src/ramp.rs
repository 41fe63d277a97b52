//! Concurrency ramp: worker pools at increasing levels, one level at a time.
//!
//! Levels run strictly sequentially and every worker of a level is joined
//! before the next level spawns, so no straggler bleeds into the next
//! measurement window. Within a level, workers share only the read-only
//! query slice and a one-shot atomic stop flag; samples accumulate in
//! worker-private recorders merged after the join.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Barrier;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::client::{ClientFactory, VectorClient};
use crate::config::BenchmarkConfig;
use crate::dataset::Query;
use crate::error::BenchError;
use crate::metrics::{recall_at_k, LatencySummary, SampleRecorder};

/// Aggregated measurements for one concurrency level.
#[derive(Debug, Clone, Serialize)]
pub struct ConcurrencyLevelResult {
    /// Configured worker count for this level.
    pub concurrency: usize,
    /// Workers that actually ran; lower than `concurrency` when some
    /// sessions failed to initialize and the reduce policy is in effect.
    pub workers: usize,
    pub achieved_qps: f64,
    pub latency: LatencySummary,
    pub recall: f64,
    pub completed: usize,
    pub failed: usize,
}

/// Run the ramp over `cfg.concurrency_levels`, ascending.
///
/// A level where no session can be established is fatal; a level that is
/// merely short of workers follows the configured policy (measure at
/// reduced concurrency, or skip the level entirely). With
/// `plateau_epsilon` set, ramping stops early after two consecutive levels
/// that fail to improve on the best throughput seen.
pub fn run_concurrency_ramp(
    factory: &dyn ClientFactory,
    queries: &[Query],
    cfg: &BenchmarkConfig,
) -> Result<Vec<ConcurrencyLevelResult>, BenchError> {
    assert!(!queries.is_empty(), "concurrency ramp needs queries");

    let mut results = Vec::with_capacity(cfg.concurrency_levels.len());
    let mut max_qps_so_far = 0.0_f64;
    let mut stagnant_levels = 0usize;

    for &concurrency in &cfg.concurrency_levels {
        let sessions = init_sessions(factory, concurrency, cfg.worker_init_retries)?;

        if sessions.len() < concurrency {
            warn!(
                concurrency,
                workers = sessions.len(),
                "level is short of worker sessions"
            );
            if cfg.invalidate_short_levels {
                warn!(concurrency, "skipping under-initialized level");
                continue;
            }
        }

        let result = run_level(sessions, concurrency, queries, cfg);
        info!(
            concurrency,
            qps = result.achieved_qps,
            recall = result.recall,
            p99 = result.latency.p99,
            "level complete"
        );

        let qps = result.achieved_qps;
        results.push(result);

        if let Some(epsilon) = cfg.plateau_epsilon {
            if qps > max_qps_so_far * (1.0 + epsilon) {
                stagnant_levels = 0;
            } else {
                stagnant_levels += 1;
                if stagnant_levels >= 2 {
                    info!(
                        concurrency,
                        max_qps = max_qps_so_far,
                        "throughput plateaued, stopping ramp early"
                    );
                    max_qps_so_far = max_qps_so_far.max(qps);
                    break;
                }
            }
        }
        max_qps_so_far = max_qps_so_far.max(qps);
    }

    Ok(results)
}

/// Establish one session per worker, retrying each with backoff. Workers
/// whose sessions never come up are dropped from the level; a level with no
/// sessions at all is fatal.
fn init_sessions(
    factory: &dyn ClientFactory,
    concurrency: usize,
    retries: usize,
) -> Result<Vec<Box<dyn VectorClient + Send>>, BenchError> {
    let attempts = retries.max(1);
    let mut sessions = Vec::with_capacity(concurrency);
    let mut last_error = String::new();

    for worker in 0..concurrency {
        let mut session = None;
        for attempt in 0..attempts {
            match factory.create() {
                Ok(client) => {
                    session = Some(client);
                    break;
                }
                Err(e) => {
                    warn!(worker, attempt, error = %e, "session init failed");
                    last_error = e.to_string();
                    if attempt + 1 < attempts {
                        thread::sleep(Duration::from_millis(100 * (attempt as u64 + 1)));
                    }
                }
            }
        }
        if let Some(client) = session {
            sessions.push(client);
        }
    }

    if sessions.is_empty() {
        return Err(BenchError::LevelInitFailed {
            concurrency,
            reason: last_error,
        });
    }
    Ok(sessions)
}

/// Measure one level: spawn the workers, open the window once every worker
/// has reached the barrier, raise the stop flag after the configured
/// duration, then join and merge.
fn run_level(
    sessions: Vec<Box<dyn VectorClient + Send>>,
    concurrency: usize,
    queries: &[Query],
    cfg: &BenchmarkConfig,
) -> ConcurrencyLevelResult {
    let workers = sessions.len();
    let duration_secs = cfg.level_duration.as_secs_f64();
    let timeout_secs = cfg.search_timeout.as_secs_f64();
    let k = cfg.k;

    let barrier = Barrier::new(workers + 1);
    let stop = AtomicBool::new(false);

    let merged = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);
        for (worker_idx, mut session) in sessions.into_iter().enumerate() {
            let barrier = &barrier;
            let stop = &stop;
            // Stagger start offsets so workers do not hammer the same
            // query in lockstep.
            let offset = worker_idx * queries.len() / workers;
            handles.push(scope.spawn(move || {
                let mut recorder = SampleRecorder::new();
                let mut cursor = offset;

                barrier.wait();
                while !stop.load(Ordering::Acquire) {
                    let query = &queries[cursor % queries.len()];
                    cursor += 1;

                    let start = Instant::now();
                    match session.search(&query.vector, k) {
                        Ok(ids) => {
                            let latency = start.elapsed().as_secs_f64();
                            recorder.record(latency, recall_at_k(&ids, &query.ground_truth, k));
                        }
                        Err(_) => recorder.record_failure(timeout_secs),
                    }
                }
                recorder
            }));
        }

        // The window opens when the last worker reaches the barrier.
        barrier.wait();
        thread::sleep(cfg.level_duration);
        stop.store(true, Ordering::Release);

        let mut merged = SampleRecorder::new();
        for handle in handles {
            match handle.join() {
                Ok(recorder) => merged.merge(recorder),
                Err(_) => warn!("search worker panicked, dropping its samples"),
            }
        }
        merged
    });

    ConcurrencyLevelResult {
        concurrency,
        workers,
        achieved_qps: merged.len() as f64 / duration_secs,
        latency: merged.latency_summary(),
        recall: merged.mean_recall(),
        completed: merged.len() - merged.failed(),
        failed: merged.failed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    /// Sleeps a fixed time per search and returns exact ground truth.
    struct FixedLatencyClient {
        latency: Duration,
    }

    impl VectorClient for FixedLatencyClient {
        fn insert_batch(&mut self, _v: &[Vec<f32>], _i: &[u64]) -> Result<usize, ClientError> {
            Ok(0)
        }

        fn search(&mut self, _query: &[f32], k: usize) -> Result<Vec<u64>, ClientError> {
            thread::sleep(self.latency);
            Ok((0..k as u64).collect())
        }

        fn optimize(&mut self) -> Result<(), ClientError> {
            Ok(())
        }
    }

    struct FixedLatencyFactory {
        latency: Duration,
    }

    impl ClientFactory for FixedLatencyFactory {
        fn create(&self) -> Result<Box<dyn VectorClient + Send>, ClientError> {
            Ok(Box::new(FixedLatencyClient {
                latency: self.latency,
            }))
        }
    }

    /// Fails session creation for every worker index >= `allow`.
    struct FlakyFactory {
        allow: usize,
        created: Arc<AtomicUsize>,
    }

    impl ClientFactory for FlakyFactory {
        fn create(&self) -> Result<Box<dyn VectorClient + Send>, ClientError> {
            let n = self.created.fetch_add(1, Ordering::SeqCst);
            if n < self.allow {
                Ok(Box::new(FixedLatencyClient {
                    latency: Duration::from_micros(100),
                }))
            } else {
                Err(ClientError::transport("connection refused"))
            }
        }
    }

    struct DeadFactory;

    impl ClientFactory for DeadFactory {
        fn create(&self) -> Result<Box<dyn VectorClient + Send>, ClientError> {
            Err(ClientError::transport("host unreachable"))
        }
    }

    fn queries(n: usize) -> Vec<Query> {
        (0..n)
            .map(|_| Query {
                vector: vec![0.0; 4],
                ground_truth: (0..10).collect(),
            })
            .collect()
    }

    fn fast_config(levels: Vec<usize>) -> BenchmarkConfig {
        BenchmarkConfig::default()
            .with_levels(levels)
            .with_level_duration(Duration::from_millis(150))
            .with_k(10)
            .validated()
            .unwrap()
    }

    #[test]
    fn one_result_per_level_in_order() {
        let factory = FixedLatencyFactory {
            latency: Duration::from_micros(200),
        };
        let cfg = fast_config(vec![1, 2, 4]);
        let results = run_concurrency_ramp(&factory, &queries(16), &cfg).unwrap();

        assert_eq!(results.len(), 3);
        let levels: Vec<usize> = results.iter().map(|r| r.concurrency).collect();
        assert_eq!(levels, vec![1, 2, 4]);
        for r in &results {
            assert_eq!(r.recall, 1.0);
            assert!(r.achieved_qps > 0.0);
            assert_eq!(r.failed, 0);
        }
    }

    #[test]
    fn throughput_scales_with_workers() {
        // 1 ms per request bounds each worker near 1000 qps; more workers
        // must push the pooled total well past a single worker's.
        let factory = FixedLatencyFactory {
            latency: Duration::from_millis(1),
        };
        let cfg = fast_config(vec![1, 4]);
        let results = run_concurrency_ramp(&factory, &queries(16), &cfg).unwrap();

        assert_eq!(results.len(), 2);
        assert!(
            results[1].achieved_qps > results[0].achieved_qps * 1.5,
            "qps {} -> {} did not scale",
            results[0].achieved_qps,
            results[1].achieved_qps
        );
    }

    #[test]
    fn cyclic_replay_outlasts_small_query_set() {
        let factory = FixedLatencyFactory {
            latency: Duration::from_micros(50),
        };
        let cfg = fast_config(vec![2]);
        // 3 queries, far fewer than the window needs.
        let results = run_concurrency_ramp(&factory, &queries(3), &cfg).unwrap();
        assert!(results[0].completed > 3);
    }

    #[test]
    fn all_sessions_failing_is_fatal() {
        let mut cfg = fast_config(vec![2]);
        cfg.worker_init_retries = 1;
        let err = run_concurrency_ramp(&DeadFactory, &queries(4), &cfg).unwrap_err();
        assert!(matches!(err, BenchError::LevelInitFailed { .. }));
    }

    #[test]
    fn short_level_reduces_effective_concurrency() {
        let factory = FlakyFactory {
            allow: 2,
            created: Arc::new(AtomicUsize::new(0)),
        };
        let mut cfg = fast_config(vec![4]);
        cfg.worker_init_retries = 1;
        let results = run_concurrency_ramp(&factory, &queries(8), &cfg).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].concurrency, 4);
        assert_eq!(results[0].workers, 2);
    }

    #[test]
    fn short_level_skipped_when_invalidated() {
        let factory = FlakyFactory {
            allow: 1,
            created: Arc::new(AtomicUsize::new(0)),
        };
        let mut cfg = fast_config(vec![2]);
        cfg.worker_init_retries = 1;
        cfg.invalidate_short_levels = true;
        let results = run_concurrency_ramp(&factory, &queries(8), &cfg).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn plateau_stops_ramp_early() {
        let factory = FixedLatencyFactory {
            latency: Duration::from_millis(1),
        };
        let mut cfg = fast_config(vec![1, 2, 4, 8, 16]);
        // An epsilon no level can beat: level 1 sets the bar, levels 2 and
        // 3 count as stagnant, and the ramp stops after three results.
        cfg.plateau_epsilon = Some(1000.0);
        let results = run_concurrency_ramp(&factory, &queries(8), &cfg).unwrap();
        assert_eq!(results.len(), 3);
    }
}
