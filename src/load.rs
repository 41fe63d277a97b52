//! Load phase: bulk insertion followed by index optimization.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::client::VectorClient;
use crate::dataset::DatasetSource;

/// Outcome of the load phase. `load_duration` is insert + optimize by
/// definition, never measured independently.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadResult {
    pub insert_duration_secs: f64,
    pub optimize_duration_secs: f64,
    pub inserted_count: usize,
    pub error: Option<String>,
}

impl LoadResult {
    pub fn load_duration_secs(&self) -> f64 {
        self.insert_duration_secs + self.optimize_duration_secs
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Insert the full corpus through the client, then optimize.
///
/// Wall clock is accumulated strictly around the client calls; slicing the
/// corpus into batches costs nothing and stays outside the measurement. An
/// insertion error ends the phase with the partial count and the error
/// recorded; the caller decides whether that is fatal.
pub fn run_load(
    client: &mut dyn VectorClient,
    dataset: &dyn DatasetSource,
    batch_size: usize,
) -> LoadResult {
    let vectors = dataset.vectors();
    let ids = dataset.ids();
    let batch_size = batch_size.max(1);

    let mut result = LoadResult::default();
    let mut insert_elapsed = Duration::ZERO;

    for (vector_chunk, id_chunk) in vectors.chunks(batch_size).zip(ids.chunks(batch_size)) {
        let start = Instant::now();
        match client.insert_batch(vector_chunk, id_chunk) {
            Ok(count) => {
                insert_elapsed += start.elapsed();
                result.inserted_count += count;
            }
            Err(e) => {
                insert_elapsed += start.elapsed();
                warn!(
                    inserted = result.inserted_count,
                    error = %e,
                    "load phase aborted by insert failure"
                );
                result.insert_duration_secs = insert_elapsed.as_secs_f64();
                result.error = Some(e.to_string());
                return result;
            }
        }
    }
    result.insert_duration_secs = insert_elapsed.as_secs_f64();

    let start = Instant::now();
    match client.optimize() {
        Ok(()) => {
            result.optimize_duration_secs = start.elapsed().as_secs_f64();
        }
        Err(e) => {
            // Backends without an explicit build step may refuse; the data
            // is in, so the run continues.
            result.optimize_duration_secs = start.elapsed().as_secs_f64();
            warn!(error = %e, "optimize failed, continuing with unoptimized index");
        }
    }

    info!(
        inserted = result.inserted_count,
        insert_secs = result.insert_duration_secs,
        optimize_secs = result.optimize_duration_secs,
        "load phase complete"
    );
    result
}
