//! Dataset sources for insertion and search evaluation.
//!
//! A source provides a finite corpus of (vector, id) pairs for the load
//! phase and a finite, restartable set of queries with ground-truth
//! neighbors for the search phases. Two implementations: a deterministic
//! synthetic corpus with exact brute-force ground truth, and SIFT-style
//! benchmark files (fvecs/ivecs).

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Error, ErrorKind, Read, Result as IoResult};
use std::path::Path;
use std::str::FromStr;

use rand::Rng;
use rand_xoshiro::rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;

/// One evaluation query: the vector to search and the ids of its true
/// nearest neighbors, closest first.
#[derive(Debug, Clone)]
pub struct Query {
    pub vector: Vec<f32>,
    pub ground_truth: Vec<u64>,
}

/// Finite corpus plus evaluation queries. The query slice is read-only and
/// shared across workers; cycling it is the caller's concern.
pub trait DatasetSource: Send + Sync {
    fn name(&self) -> &str;
    fn dimensions(&self) -> usize;
    /// Corpus vectors, parallel to [`DatasetSource::ids`].
    fn vectors(&self) -> &[Vec<f32>];
    fn ids(&self) -> &[u64];
    fn queries(&self) -> &[Query];

    fn len(&self) -> usize {
        self.vectors().len()
    }

    fn is_empty(&self) -> bool {
        self.vectors().is_empty()
    }
}

/// In-memory dataset backing both implementations.
pub struct Dataset {
    name: String,
    dimensions: usize,
    vectors: Vec<Vec<f32>>,
    ids: Vec<u64>,
    queries: Vec<Query>,
}

impl DatasetSource for Dataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    fn ids(&self) -> &[u64] {
        &self.ids
    }

    fn queries(&self) -> &[Query] {
        &self.queries
    }
}

/// Dataset kind selected from the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    Random,
    Sift1M,
}

impl FromStr for DatasetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "random" => Ok(DatasetKind::Random),
            "sift1m" | "sift" => Ok(DatasetKind::Sift1M),
            _ => Err(format!(
                "Unknown dataset: {}. Valid options: random, sift1m",
                s
            )),
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetKind::Random => write!(f, "random"),
            DatasetKind::Sift1M => write!(f, "sift1m"),
        }
    }
}

/// Generate random vectors with per-partition derived seeds so generation
/// parallelizes without changing the output for a given seed.
pub fn generate_vectors(count: usize, dimensions: usize, seed: u64) -> Vec<Vec<f32>> {
    let partitions = rayon::current_num_threads().max(1);
    let per_partition = count.div_ceil(partitions);

    (0..partitions)
        .into_par_iter()
        .flat_map_iter(|part| {
            let start = part * per_partition;
            let len = per_partition.min(count.saturating_sub(start));
            let part_seed = seed.wrapping_add(part as u64 * 0x9E3779B97F4A7C15);
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(part_seed);
            (0..len)
                .map(|_| (0..dimensions).map(|_| rng.gen::<f32>()).collect())
                .collect::<Vec<Vec<f32>>>()
        })
        .collect()
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Exact k nearest neighbors of `query` in `corpus`, closest first.
pub fn brute_force_neighbors(corpus: &[Vec<f32>], ids: &[u64], query: &[f32], k: usize) -> Vec<u64> {
    let mut scored: Vec<(u64, f32)> = corpus
        .iter()
        .zip(ids.iter())
        .map(|(v, &id)| (id, l2_distance(query, v)))
        .collect();
    scored.sort_by(|a, b| a.1.partial_cmp(&b.1).expect("distances are finite"));
    scored.truncate(k);
    scored.into_iter().map(|(id, _)| id).collect()
}

impl Dataset {
    /// Deterministic synthetic dataset with exact ground truth.
    ///
    /// Ground truth is brute-forced in parallel over the full corpus, so a
    /// perfect backend scores recall 1.0 against it.
    pub fn random(
        num_vectors: usize,
        num_queries: usize,
        dimensions: usize,
        truth_k: usize,
        seed: u64,
    ) -> Self {
        let vectors = generate_vectors(num_vectors, dimensions, seed);
        let ids: Vec<u64> = (0..num_vectors as u64).collect();
        let query_vectors = generate_vectors(num_queries, dimensions, seed.wrapping_add(1000));

        let queries: Vec<Query> = query_vectors
            .into_par_iter()
            .map(|vector| {
                let ground_truth = brute_force_neighbors(&vectors, &ids, &vector, truth_k);
                Query {
                    vector,
                    ground_truth,
                }
            })
            .collect();

        Self {
            name: "random".to_string(),
            dimensions,
            vectors,
            ids,
            queries,
        }
    }

    /// Load a SIFT-style dataset directory: base and query vectors in fvecs,
    /// ground-truth neighbor indices in ivecs.
    pub fn from_sift_dir<P: AsRef<Path>>(dir: P, max_vectors: Option<usize>) -> IoResult<Self> {
        let dir = dir.as_ref();
        let vectors = match max_vectors {
            Some(n) => read_fvecs_limited(dir.join("sift_base.fvecs"), n)?,
            None => read_fvecs(dir.join("sift_base.fvecs"))?,
        };
        let query_vectors = read_fvecs(dir.join("sift_query.fvecs"))?;
        let ground_truth = read_ivecs(dir.join("sift_groundtruth.ivecs"))?;

        if query_vectors.len() != ground_truth.len() {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!(
                    "query/ground-truth count mismatch: {} vs {}",
                    query_vectors.len(),
                    ground_truth.len()
                ),
            ));
        }

        let dimensions = vectors.first().map(|v| v.len()).ok_or_else(|| {
            Error::new(ErrorKind::InvalidData, "dataset contains no base vectors")
        })?;
        let ids: Vec<u64> = (0..vectors.len() as u64).collect();

        // Ground-truth files index the full base set; truncated loads keep
        // only neighbors that were actually inserted.
        let limit = vectors.len() as u64;
        let queries = query_vectors
            .into_iter()
            .zip(ground_truth)
            .map(|(vector, truth)| Query {
                vector,
                ground_truth: truth
                    .into_iter()
                    .map(u64::from)
                    .filter(|&id| id < limit)
                    .collect(),
            })
            .collect();

        Ok(Self {
            name: "sift1m".to_string(),
            dimensions,
            vectors,
            ids,
            queries,
        })
    }
}

/// Read vectors from an fvecs file (float32 vectors).
/// Format: for each vector, 4 bytes dimension (int32), then dim*4 bytes of float32 values.
pub fn read_fvecs<P: AsRef<Path>>(path: P) -> IoResult<Vec<Vec<f32>>> {
    read_fvecs_limited(path, usize::MAX)
}

/// Read at most `max_vectors` vectors from an fvecs file.
pub fn read_fvecs_limited<P: AsRef<Path>>(path: P, max_vectors: usize) -> IoResult<Vec<Vec<f32>>> {
    let file = File::open(path.as_ref())?;
    let mut reader = BufReader::new(file);

    let mut vectors = Vec::new();
    let mut buf4 = [0u8; 4];

    while vectors.len() < max_vectors {
        if reader.read_exact(&mut buf4).is_err() {
            break;
        }
        let dim = i32::from_le_bytes(buf4) as usize;
        if dim == 0 || dim > 10000 {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("Invalid dimension {} in fvecs file", dim),
            ));
        }

        let mut vector = Vec::with_capacity(dim);
        for _ in 0..dim {
            reader.read_exact(&mut buf4)?;
            vector.push(f32::from_le_bytes(buf4));
        }
        vectors.push(vector);
    }

    Ok(vectors)
}

/// Read vectors from an ivecs file (int32 vectors, used for ground truth).
pub fn read_ivecs<P: AsRef<Path>>(path: P) -> IoResult<Vec<Vec<u32>>> {
    let file = File::open(path.as_ref())?;
    let mut reader = BufReader::new(file);

    let mut vectors = Vec::new();
    let mut buf4 = [0u8; 4];

    loop {
        if reader.read_exact(&mut buf4).is_err() {
            break;
        }
        let dim = i32::from_le_bytes(buf4) as usize;
        if dim == 0 || dim > 10000 {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("Invalid dimension {} in ivecs file", dim),
            ));
        }

        let mut vector = Vec::with_capacity(dim);
        for _ in 0..dim {
            reader.read_exact(&mut buf4)?;
            vector.push(u32::from_le_bytes(buf4));
        }
        vectors.push(vector);
    }

    Ok(vectors)
}
