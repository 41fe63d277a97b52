//! Phase sequencing for one benchmark run.
//!
//! `Init → Loading → SerialSearching → ConcurrencyRamping → Completed |
//! Failed`, strictly forward. A fatal load error skips the search phases;
//! whatever partial results exist always travel with the run.

use serde::Serialize;
use tracing::{error, info};

use crate::client::ClientFactory;
use crate::config::BenchmarkConfig;
use crate::dataset::DatasetSource;
use crate::load::{run_load, LoadResult};
use crate::ramp::{run_concurrency_ramp, ConcurrencyLevelResult};
use crate::serial::{run_serial_search, SerialSearchResult};

/// Terminal and intermediate states of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchState {
    Init,
    Loading,
    SerialSearching,
    ConcurrencyRamping,
    Completed,
    Failed,
}

/// Everything one run produced. Phases append in order; a phase that never
/// ran stays `None`/empty rather than being dropped from the record.
#[derive(Debug, Serialize)]
pub struct BenchmarkRun {
    pub state: BenchState,
    pub load: Option<LoadResult>,
    pub serial: Option<SerialSearchResult>,
    pub concurrency: Vec<ConcurrencyLevelResult>,
    /// Reason the run ended in `Failed`, if it did.
    pub failure: Option<String>,
}

impl BenchmarkRun {
    fn new() -> Self {
        Self {
            state: BenchState::Init,
            load: None,
            serial: None,
            concurrency: Vec::new(),
            failure: None,
        }
    }

    /// Best throughput over all measured levels.
    pub fn max_qps(&self) -> f64 {
        self.concurrency
            .iter()
            .map(|level| level.achieved_qps)
            .fold(0.0, f64::max)
    }

    fn fail(mut self, reason: String) -> Self {
        error!(%reason, "benchmark run failed");
        self.state = BenchState::Failed;
        self.failure = Some(reason);
        self
    }
}

/// Drive the three phases against one backend and assemble the run record.
///
/// Each phase gets its own scoped session from the factory; the session
/// drops (releasing its resources) when the phase ends, success or not.
pub fn run_benchmark(
    factory: &dyn ClientFactory,
    dataset: &dyn DatasetSource,
    cfg: &BenchmarkConfig,
) -> BenchmarkRun {
    let mut run = BenchmarkRun::new();

    // Loading
    run.state = BenchState::Loading;
    info!(dataset = dataset.name(), vectors = dataset.len(), "load phase starting");
    let load = match factory.create() {
        Ok(mut session) => run_load(session.as_mut(), dataset, cfg.insert_batch_size),
        Err(e) => {
            run.load = Some(LoadResult {
                error: Some(e.to_string()),
                ..LoadResult::default()
            });
            return run.fail(format!("load session init failed: {e}"));
        }
    };
    let load_failed = load.is_failed();
    let load_error = load.error.clone();
    run.load = Some(load);
    if load_failed {
        return run.fail(format!(
            "load phase failed: {}",
            load_error.unwrap_or_default()
        ));
    }

    if dataset.queries().is_empty() {
        return run.fail("dataset provides no evaluation queries".to_string());
    }

    // SerialSearching
    run.state = BenchState::SerialSearching;
    info!(queries = dataset.queries().len(), "serial search phase starting");
    let serial = match factory.create() {
        Ok(mut session) => run_serial_search(session.as_mut(), dataset.queries(), cfg),
        Err(e) => return run.fail(format!("serial session init failed: {e}")),
    };
    let serial_error = serial.error.clone();
    run.serial = Some(serial);
    if let Some(reason) = serial_error {
        return run.fail(format!("serial search failed: {reason}"));
    }

    // ConcurrencyRamping
    run.state = BenchState::ConcurrencyRamping;
    info!(levels = ?cfg.concurrency_levels, "concurrency ramp starting");
    match run_concurrency_ramp(factory, dataset.queries(), cfg) {
        Ok(levels) => {
            run.concurrency = levels;
            run.state = BenchState::Completed;
            info!(max_qps = run.max_qps(), "benchmark run completed");
            run
        }
        Err(e) => run.fail(e.to_string()),
    }
}
