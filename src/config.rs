//! Benchmark run configuration.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::error::ConfigError;

/// Default configuration for benchmark runs
pub const DEFAULT_CONCURRENCY_LEVELS: &[usize] = &[1, 2, 4, 8, 16, 32, 64, 128];
pub const DEFAULT_LEVEL_DURATION_SECS: u64 = 30;
pub const DEFAULT_K: usize = 10;
pub const DEFAULT_SEARCH_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_INSERT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_FAILURE_THRESHOLD: f64 = 0.1;
pub const DEFAULT_WORKER_INIT_RETRIES: usize = 3;

/// Configuration for one benchmark run.
///
/// Construct with `Default` plus the `with_*` builders, then call
/// [`BenchmarkConfig::validated`] before handing it to the engine.
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    /// Identifier of the dataset under test, echoed into the result record.
    pub dataset: String,
    /// Worker counts for the concurrency ramp, strictly increasing.
    pub concurrency_levels: Vec<usize>,
    /// Measurement window per concurrency level.
    pub level_duration: Duration,
    /// Neighbors requested per search.
    pub k: usize,
    /// Drop any pre-existing collection before loading.
    pub drop_existing: bool,
    /// Upper bound on a single search call; a failed or timed-out search is
    /// accounted as a sample at this latency with recall 0.
    pub search_timeout: Duration,
    /// Serial-phase failure rate above which the phase reports an error.
    pub failure_threshold: f64,
    /// Session-initialization attempts per worker before it is given up on.
    pub worker_init_retries: usize,
    /// When true, a level whose workers did not all initialize is skipped
    /// instead of measured at reduced concurrency.
    pub invalidate_short_levels: bool,
    /// When set, stop ramping after two consecutive levels that fail to
    /// beat the best QPS so far by this fraction.
    pub plateau_epsilon: Option<f64>,
    /// Vectors per insert_batch call during the load phase.
    pub insert_batch_size: usize,
    /// Opaque backend-specific parameters, passed through to adapters.
    pub client_params: HashMap<String, String>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            dataset: "random".to_string(),
            concurrency_levels: DEFAULT_CONCURRENCY_LEVELS.to_vec(),
            level_duration: Duration::from_secs(DEFAULT_LEVEL_DURATION_SECS),
            k: DEFAULT_K,
            drop_existing: false,
            search_timeout: Duration::from_secs(DEFAULT_SEARCH_TIMEOUT_SECS),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            worker_init_retries: DEFAULT_WORKER_INIT_RETRIES,
            invalidate_short_levels: false,
            plateau_epsilon: None,
            insert_batch_size: DEFAULT_INSERT_BATCH_SIZE,
            client_params: HashMap::new(),
        }
    }
}

impl BenchmarkConfig {
    pub fn with_levels(mut self, levels: Vec<usize>) -> Self {
        self.concurrency_levels = levels;
        self
    }

    pub fn with_level_duration(mut self, duration: Duration) -> Self {
        self.level_duration = duration;
        self
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_search_timeout(mut self, timeout: Duration) -> Self {
        self.search_timeout = timeout;
        self
    }

    pub fn with_plateau_epsilon(mut self, epsilon: f64) -> Self {
        self.plateau_epsilon = Some(epsilon);
        self
    }

    /// Check the structural invariants and return the config unchanged.
    pub fn validated(self) -> Result<Self, ConfigError> {
        if self.concurrency_levels.is_empty() {
            return Err(ConfigError::EmptyLevels);
        }
        if self.concurrency_levels.contains(&0) {
            return Err(ConfigError::ZeroLevel);
        }
        if !self.concurrency_levels.windows(2).all(|w| w[0] < w[1]) {
            return Err(ConfigError::UnsortedLevels(self.concurrency_levels));
        }
        if self.level_duration.is_zero() {
            return Err(ConfigError::ZeroDuration);
        }
        if self.k == 0 {
            return Err(ConfigError::ZeroK);
        }
        if self.search_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if !(0.0..=1.0).contains(&self.failure_threshold) {
            return Err(ConfigError::BadThreshold(self.failure_threshold));
        }
        Ok(self)
    }
}

/// Concurrency levels from the `VDB_BENCH_LEVELS` env var ("1,2,4,8"),
/// if set and parseable.
pub fn levels_from_env() -> Option<Vec<usize>> {
    let raw = env::var("VDB_BENCH_LEVELS").ok()?;
    raw.split(',')
        .map(|s| s.trim().parse().ok())
        .collect::<Option<Vec<usize>>>()
        .filter(|v| !v.is_empty())
}

/// Per-level duration from the `VDB_BENCH_DURATION` env var (seconds),
/// if set and parseable.
pub fn duration_from_env() -> Option<Duration> {
    env::var("VDB_BENCH_DURATION")
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .map(Duration::from_secs)
}
