//! End-to-end orchestrator tests against scripted backends.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use vdb_bench::{
    run_benchmark, BenchState, BenchmarkConfig, ClientError, ClientFactory, Dataset, DatasetSource,
    UsearchBackend, UsearchParams, VectorClient,
};

/// Backend scripted for the tests: optional fixed search latency, an
/// insert quota after which inserts fail, and a cap on how many search
/// queries return ground truth.
#[derive(Clone, Default)]
struct Script {
    search_latency: Duration,
    insert_quota: Option<usize>,
    good_searches: Option<usize>,
    refuse_sessions: bool,
}

struct ScriptedBackend {
    script: Script,
    inserted: Arc<AtomicUsize>,
    searches: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    fn new(script: Script) -> Self {
        Self {
            script,
            inserted: Arc::new(AtomicUsize::new(0)),
            searches: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl ClientFactory for ScriptedBackend {
    fn create(&self) -> Result<Box<dyn VectorClient + Send>, ClientError> {
        if self.script.refuse_sessions {
            return Err(ClientError::transport("connection refused"));
        }
        Ok(Box::new(ScriptedSession {
            script: self.script.clone(),
            inserted: Arc::clone(&self.inserted),
            searches: Arc::clone(&self.searches),
        }))
    }
}

struct ScriptedSession {
    script: Script,
    inserted: Arc<AtomicUsize>,
    searches: Arc<AtomicUsize>,
}

impl VectorClient for ScriptedSession {
    fn insert_batch(&mut self, vectors: &[Vec<f32>], _ids: &[u64]) -> Result<usize, ClientError> {
        if let Some(quota) = self.script.insert_quota {
            if self.inserted.load(Ordering::SeqCst) + vectors.len() > quota {
                return Err(ClientError::backend("disk full"));
            }
        }
        self.inserted.fetch_add(vectors.len(), Ordering::SeqCst);
        Ok(vectors.len())
    }

    fn search(&mut self, _query: &[f32], k: usize) -> Result<Vec<u64>, ClientError> {
        if !self.script.search_latency.is_zero() {
            thread::sleep(self.script.search_latency);
        }
        let n = self.searches.fetch_add(1, Ordering::SeqCst);
        let good = self.script.good_searches.map_or(true, |limit| n < limit);
        if good {
            // Ground truth for every test query is 0..k.
            Ok((0..k as u64).collect())
        } else {
            Ok((10_000..10_000 + k as u64).collect())
        }
    }

    fn optimize(&mut self) -> Result<(), ClientError> {
        Ok(())
    }
}

fn test_dataset(vectors: usize, queries: usize) -> Dataset {
    Dataset::random(vectors, queries, 8, 10, 42)
}

/// Wraps a dataset but replaces every query's ground truth with 0..10,
/// matching the scripted session's good answers.
struct FixedTruth {
    inner: Dataset,
    queries: Vec<vdb_bench::Query>,
}

impl FixedTruth {
    fn new(inner: Dataset) -> Self {
        let queries = inner
            .queries()
            .iter()
            .map(|q| vdb_bench::Query {
                vector: q.vector.clone(),
                ground_truth: (0..10).collect(),
            })
            .collect();
        Self { inner, queries }
    }
}

impl DatasetSource for FixedTruth {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn vectors(&self) -> &[Vec<f32>] {
        self.inner.vectors()
    }

    fn ids(&self) -> &[u64] {
        self.inner.ids()
    }

    fn queries(&self) -> &[vdb_bench::Query] {
        &self.queries
    }
}

fn fast_config(levels: Vec<usize>) -> BenchmarkConfig {
    BenchmarkConfig::default()
        .with_levels(levels)
        .with_level_duration(Duration::from_millis(200))
        .with_k(10)
        .validated()
        .unwrap()
}

#[test]
fn full_run_against_scripted_backend() {
    let backend = ScriptedBackend::new(Script {
        search_latency: Duration::from_micros(500),
        ..Script::default()
    });
    let dataset = FixedTruth::new(test_dataset(1_000, 50));
    let cfg = fast_config(vec![1, 2, 4, 8]);

    let run = run_benchmark(&backend, &dataset, &cfg);

    assert_eq!(run.state, BenchState::Completed);

    let load = run.load.as_ref().unwrap();
    assert_eq!(load.inserted_count, 1_000);
    assert!(load.error.is_none());

    let serial = run.serial.as_ref().unwrap();
    assert_eq!(serial.recall, 1.0);
    assert_eq!(serial.completed, 50);

    // One result per configured level, ascending, recall 1.0 throughout.
    assert_eq!(run.concurrency.len(), 4);
    let levels: Vec<usize> = run.concurrency.iter().map(|r| r.concurrency).collect();
    assert_eq!(levels, vec![1, 2, 4, 8]);
    for level in &run.concurrency {
        assert_eq!(level.recall, 1.0);
        assert!(level.achieved_qps > 0.0);
    }

    // max_qps is the max over levels.
    let best = run
        .concurrency
        .iter()
        .map(|r| r.achieved_qps)
        .fold(0.0_f64, f64::max);
    assert_eq!(run.max_qps(), best);
}

#[test]
fn load_failure_aborts_before_search_phases() {
    let backend = ScriptedBackend::new(Script {
        insert_quota: Some(500),
        ..Script::default()
    });
    let dataset = test_dataset(1_000, 10);
    let mut cfg = fast_config(vec![1, 2]);
    cfg.insert_batch_size = 100;

    let run = run_benchmark(&backend, &dataset, &cfg);

    assert_eq!(run.state, BenchState::Failed);
    let load = run.load.as_ref().unwrap();
    assert_eq!(load.inserted_count, 500);
    assert!(load.error.as_deref().unwrap().contains("disk full"));

    // No later phase ran, but both are explicitly present in the record.
    assert!(run.serial.is_none());
    assert!(run.concurrency.is_empty());
    assert!(run.failure.is_some());
}

#[test]
fn serial_recall_with_partial_overlap() {
    // 7 of 10 queries answered with ground truth, 3 with garbage.
    let backend = ScriptedBackend::new(Script {
        good_searches: Some(7),
        ..Script::default()
    });
    let dataset = FixedTruth::new(test_dataset(100, 10));
    let mut cfg = fast_config(vec![1]);
    // Keep the ramp from muddying the search counter assertions.
    cfg.level_duration = Duration::from_millis(50);

    let run = run_benchmark(&backend, &dataset, &cfg);
    let serial = run.serial.as_ref().unwrap();
    assert!((serial.recall - 0.7).abs() < 1e-12);
}

#[test]
fn session_refusal_fails_the_run() {
    let backend = ScriptedBackend::new(Script {
        refuse_sessions: true,
        ..Script::default()
    });
    let dataset = test_dataset(100, 10);
    let cfg = fast_config(vec![1]);

    let run = run_benchmark(&backend, &dataset, &cfg);
    assert_eq!(run.state, BenchState::Failed);
    assert!(run.load.as_ref().unwrap().error.is_some());
}

#[test]
fn end_to_end_with_usearch_backend() {
    let dataset = test_dataset(2_000, 20);
    let params = UsearchParams {
        dimensions: dataset.dimensions(),
        ..Default::default()
    };
    let backend = UsearchBackend::new(&params, dataset.len()).unwrap();
    let cfg = fast_config(vec![1, 2]);

    let run = run_benchmark(&backend, &dataset, &cfg);

    assert_eq!(run.state, BenchState::Completed);
    assert_eq!(run.load.as_ref().unwrap().inserted_count, 2_000);
    assert_eq!(backend.len(), 2_000);

    // HNSW on a small corpus tracks exact ground truth closely.
    let serial = run.serial.as_ref().unwrap();
    assert!(serial.recall > 0.8, "serial recall {} too low", serial.recall);

    assert_eq!(run.concurrency.len(), 2);
    assert!(run.max_qps() > 0.0);
}
