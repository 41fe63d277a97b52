//! Benchmark harness for vector search backends.
//!
//! The engine drives three phases against any backend implementing the
//! client contract: bulk load with index optimization, single-worker serial
//! search, and a concurrency ramp that measures throughput and latency
//! percentiles at increasing worker counts.

pub mod client;
pub mod config;
pub mod dataset;
pub mod error;
pub mod load;
pub mod metrics;
pub mod orchestrator;
pub mod ramp;
pub mod report;
pub mod serial;

pub use client::{ClientFactory, UsearchBackend, UsearchParams, VectorClient};
pub use config::{duration_from_env, levels_from_env, BenchmarkConfig};
pub use dataset::{Dataset, DatasetKind, DatasetSource, Query};
pub use error::{BenchError, ClientError, ConfigError};
pub use load::{run_load, LoadResult};
pub use metrics::{percentile, recall_at_k, LatencySummary, SampleRecorder};
pub use orchestrator::{run_benchmark, BenchState, BenchmarkRun};
pub use ramp::{run_concurrency_ramp, ConcurrencyLevelResult};
pub use report::RunReport;
pub use serial::{run_serial_search, SerialSearchResult};

/// Format a duration in seconds as a human-readable string.
pub fn format_duration(secs: f64) -> String {
    if secs >= 60.0 {
        format!("{:.1} m", secs / 60.0)
    } else if secs >= 1.0 {
        format!("{:.3} s", secs)
    } else if secs >= 0.001 {
        format!("{:.3} ms", secs * 1000.0)
    } else {
        format!("{:.3} µs", secs * 1_000_000.0)
    }
}

/// Format a throughput value as ops per second.
pub fn format_throughput(per_second: f64) -> String {
    if per_second >= 1_000_000.0 {
        format!("{:.2} M/s", per_second / 1_000_000.0)
    } else if per_second >= 1_000.0 {
        format!("{:.2} K/s", per_second / 1_000.0)
    } else {
        format!("{:.2}/s", per_second)
    }
}
