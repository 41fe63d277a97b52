//! Structured JSON output for benchmark runs.
//!
//! The record keeps the phase schema intact even for phases that never ran:
//! a skipped phase serializes as `null`, never disappears.

use std::fs;
use std::io;
use std::path::Path;

use serde::Serialize;

use crate::config::BenchmarkConfig;
use crate::orchestrator::{BenchState, BenchmarkRun};

/// Top-level run record: `{load, serial, concurrency[], max_qps}` plus
/// enough configuration echo to reproduce the run.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub timestamp: String,
    pub backend: String,
    pub dataset: String,
    pub state: BenchState,
    pub config: ConfigEcho,
    pub load: Option<crate::load::LoadResult>,
    pub serial: Option<crate::serial::SerialSearchResult>,
    pub concurrency: Vec<crate::ramp::ConcurrencyLevelResult>,
    pub max_qps: f64,
    pub failure: Option<String>,
}

/// Configuration snapshot for reproducibility.
#[derive(Debug, Serialize)]
pub struct ConfigEcho {
    pub concurrency_levels: Vec<usize>,
    pub level_duration_secs: f64,
    pub k: usize,
    pub drop_existing: bool,
    pub search_timeout_secs: f64,
    pub insert_batch_size: usize,
    pub client_params: std::collections::HashMap<String, String>,
}

impl RunReport {
    pub fn new(backend: &str, cfg: &BenchmarkConfig, run: BenchmarkRun) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            backend: backend.to_string(),
            dataset: cfg.dataset.clone(),
            state: run.state,
            config: ConfigEcho {
                concurrency_levels: cfg.concurrency_levels.clone(),
                level_duration_secs: cfg.level_duration.as_secs_f64(),
                k: cfg.k,
                drop_existing: cfg.drop_existing,
                search_timeout_secs: cfg.search_timeout.as_secs_f64(),
                insert_batch_size: cfg.insert_batch_size,
                client_params: cfg.client_params.clone(),
            },
            max_qps: run.max_qps(),
            load: run.load,
            serial: run.serial,
            concurrency: run.concurrency,
            failure: run.failure,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write the record to `path`, or to stdout when no path is given.
    pub fn write(&self, path: Option<&Path>) -> io::Result<()> {
        let json = self.to_json().map_err(io::Error::other)?;
        match path {
            Some(path) => fs::write(path, json),
            None => {
                println!("{json}");
                Ok(())
            }
        }
    }
}
