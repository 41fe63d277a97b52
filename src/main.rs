use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use vdb_bench::config::{
    DEFAULT_INSERT_BATCH_SIZE, DEFAULT_K, DEFAULT_LEVEL_DURATION_SECS, DEFAULT_SEARCH_TIMEOUT_SECS,
};
use vdb_bench::{
    duration_from_env, format_duration, format_throughput, levels_from_env, run_benchmark,
    BenchState, BenchmarkConfig, Dataset, DatasetKind, DatasetSource, RunReport, UsearchBackend,
    UsearchParams,
};

#[derive(Parser, Debug)]
#[command(name = "vdb-bench")]
#[command(about = "Benchmark vector search backends: load, serial search, concurrency ramp")]
struct Args {
    /// Dataset: random or sift1m
    #[arg(long, default_value = "random")]
    dataset: DatasetKind,

    /// Directory containing dataset files (required for sift1m)
    #[arg(long)]
    dataset_dir: Option<PathBuf>,

    /// Number of vectors to insert (random dataset; caps sift1m)
    #[arg(short = 'n', long, default_value_t = 100_000)]
    num_vectors: usize,

    /// Number of evaluation queries (random dataset)
    #[arg(long, default_value_t = 1_000)]
    num_queries: usize,

    /// Vector dimensions (random dataset)
    #[arg(short = 'd', long, default_value_t = 128)]
    dimensions: usize,

    /// Comma-separated concurrency levels, strictly increasing
    #[arg(long, default_value = "1,2,4,8,16,32,64,128", value_delimiter = ',')]
    levels: Vec<usize>,

    /// Measurement window per concurrency level (seconds)
    #[arg(long, default_value_t = DEFAULT_LEVEL_DURATION_SECS)]
    duration: u64,

    /// Neighbors requested per search
    #[arg(short = 'k', long, default_value_t = DEFAULT_K)]
    k: usize,

    /// Per-search timeout (milliseconds)
    #[arg(long, default_value_t = DEFAULT_SEARCH_TIMEOUT_SECS * 1000)]
    timeout_ms: u64,

    /// Vectors per insert batch during the load phase
    #[arg(long, default_value_t = DEFAULT_INSERT_BATCH_SIZE)]
    batch_size: usize,

    /// Drop any pre-existing collection before loading
    #[arg(long)]
    drop_existing: bool,

    /// Skip levels whose workers did not all initialize instead of
    /// measuring at reduced concurrency
    #[arg(long)]
    invalidate_short_levels: bool,

    /// Stop ramping once throughput stops improving by this fraction
    #[arg(long)]
    plateau_epsilon: Option<f64>,

    /// Graph connectivity for the in-process usearch backend
    #[arg(long, default_value_t = 16)]
    connectivity: usize,

    /// Expansion factor during index construction
    #[arg(long, default_value_t = 128)]
    expansion_add: usize,

    /// Expansion factor during search
    #[arg(long, default_value_t = 64)]
    expansion_search: usize,

    /// Backend-specific parameter as key=value, repeatable
    #[arg(long = "client-param", value_parser = parse_key_value)]
    client_params: Vec<(String, String)>,

    /// Random seed for reproducibility
    #[arg(short = 's', long, default_value_t = 42)]
    seed: u64,

    /// Output file for the JSON result record (default: stdout)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let cfg = BenchmarkConfig {
        dataset: args.dataset.to_string(),
        concurrency_levels: levels_from_env().unwrap_or_else(|| args.levels.clone()),
        level_duration: duration_from_env().unwrap_or(Duration::from_secs(args.duration)),
        k: args.k,
        drop_existing: args.drop_existing,
        search_timeout: Duration::from_millis(args.timeout_ms),
        invalidate_short_levels: args.invalidate_short_levels,
        plateau_epsilon: args.plateau_epsilon,
        insert_batch_size: args.batch_size,
        client_params: args.client_params.iter().cloned().collect(),
        ..BenchmarkConfig::default()
    };
    let cfg = cfg.validated().context("invalid benchmark configuration")?;

    eprintln!("=== Vector Search Benchmark ===");
    eprintln!();
    eprintln!("Configuration:");
    eprintln!("  Dataset:        {:>12}", args.dataset);
    eprintln!("  Levels:         {:>12}", format_levels(&cfg.concurrency_levels));
    eprintln!("  Level duration: {:>12}", format_duration(cfg.level_duration.as_secs_f64()));
    eprintln!("  K:              {:>12}", cfg.k);
    eprintln!("  Batch size:     {:>12}", cfg.insert_batch_size);
    eprintln!("  Seed:           {:>12}", args.seed);
    eprintln!();

    eprint!("Preparing dataset... ");
    let dataset = match args.dataset {
        DatasetKind::Random => Dataset::random(
            args.num_vectors,
            args.num_queries,
            args.dimensions,
            args.k,
            args.seed,
        ),
        DatasetKind::Sift1M => {
            let dir = match args.dataset_dir {
                Some(ref dir) => dir,
                None => bail!("--dataset-dir is required for the sift1m dataset"),
            };
            Dataset::from_sift_dir(dir, Some(args.num_vectors))
                .context("failed to load sift1m dataset")?
        }
    };
    eprintln!(
        "done ({} vectors, {} queries, {} dims)",
        dataset.len(),
        dataset.queries().len(),
        dataset.dimensions()
    );

    let params = UsearchParams {
        dimensions: dataset.dimensions(),
        connectivity: args.connectivity,
        expansion_add: args.expansion_add,
        expansion_search: args.expansion_search,
    };
    let backend = UsearchBackend::new(&params, dataset.len())
        .context("failed to initialize usearch backend")?;

    let run = run_benchmark(&backend, &dataset, &cfg);

    eprintln!();
    if let Some(ref load) = run.load {
        eprintln!("--- Load Phase ---");
        eprintln!("  Inserted:       {:>12}", load.inserted_count);
        eprintln!("  Insert time:    {:>12}", format_duration(load.insert_duration_secs));
        eprintln!("  Optimize time:  {:>12}", format_duration(load.optimize_duration_secs));
        if load.insert_duration_secs > 0.0 {
            eprintln!(
                "  Throughput:     {:>12}",
                format_throughput(load.inserted_count as f64 / load.insert_duration_secs)
            );
        }
        eprintln!();
    }

    if let Some(ref serial) = run.serial {
        eprintln!("--- Serial Search ---");
        eprintln!("  Queries:        {:>12}", serial.completed + serial.failed);
        eprintln!("  Recall@{:<2}:      {:>12.4}", cfg.k, serial.recall);
        eprintln!("  Avg latency:    {:>12}", format_duration(serial.latency.avg));
        eprintln!("  P99 latency:    {:>12}", format_duration(serial.latency.p99));
        eprintln!();
    }

    if !run.concurrency.is_empty() {
        eprintln!("--- Concurrency Ramp ---");
        eprintln!(
            "  {:>6} {:>12} {:>10} {:>10} {:>10} {:>8}",
            "conc", "qps", "p90", "p95", "p99", "recall"
        );
        for level in &run.concurrency {
            eprintln!(
                "  {:>6} {:>12.1} {:>10} {:>10} {:>10} {:>8.4}",
                level.concurrency,
                level.achieved_qps,
                format_duration(level.latency.p90),
                format_duration(level.latency.p95),
                format_duration(level.latency.p99),
                level.recall
            );
        }
        eprintln!();
        eprintln!("  Max QPS:        {:>12.1}", run.max_qps());
        eprintln!();
    }

    let state = run.state;
    let report = RunReport::new("usearch", &cfg, run);
    report
        .write(args.output.as_deref())
        .context("failed to write result record")?;
    if let Some(ref path) = args.output {
        eprintln!("Results written to {}", path.display());
    }

    if state == BenchState::Failed {
        bail!("benchmark run failed");
    }
    Ok(())
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Err(format!("expected key=value, got '{raw}'")),
    }
}

fn format_levels(levels: &[usize]) -> String {
    levels
        .iter()
        .map(|l| l.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
