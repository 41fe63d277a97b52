//! Backend client abstraction and the in-process usearch adapter.
//!
//! The engine depends only on [`VectorClient`] and [`ClientFactory`]; every
//! backend hangs behind those two traits. A session is an owned, scoped
//! resource: whatever connection or handle it wraps is released when the
//! boxed client drops.

use std::sync::Arc;

use usearch::{new_index, Index, IndexOptions, MetricKind, ScalarKind};

use crate::error::ClientError;

/// One backend session. Not shared between workers; each worker holds its
/// own session obtained from a [`ClientFactory`].
pub trait VectorClient: Send {
    /// Insert a batch of vectors with their ids, returning how many landed.
    fn insert_batch(&mut self, vectors: &[Vec<f32>], ids: &[u64]) -> Result<usize, ClientError>;

    /// Return the ids of the `k` nearest neighbors, closest first.
    fn search(&mut self, query: &[f32], k: usize) -> Result<Vec<u64>, ClientError>;

    /// Trigger an index build or compaction. No-op for backends without an
    /// explicit build step.
    fn optimize(&mut self) -> Result<(), ClientError>;
}

/// Produces independent sessions, one per worker. A factory rather than a
/// shared client: most database drivers are not safe for concurrent use,
/// and per-worker connections emulate real multi-client load.
pub trait ClientFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn VectorClient + Send>, ClientError>;
}

/// HNSW parameters for the in-process usearch backend.
#[derive(Debug, Clone)]
pub struct UsearchParams {
    pub dimensions: usize,
    pub connectivity: usize,
    pub expansion_add: usize,
    pub expansion_search: usize,
}

impl Default for UsearchParams {
    fn default() -> Self {
        Self {
            dimensions: 128,
            connectivity: 16,
            expansion_add: 128,
            expansion_search: 64,
        }
    }
}

impl UsearchParams {
    fn index_options(&self) -> IndexOptions {
        IndexOptions {
            dimensions: self.dimensions,
            metric: MetricKind::L2sq,
            quantization: ScalarKind::F32,
            connectivity: self.connectivity,
            expansion_add: self.expansion_add,
            expansion_search: self.expansion_search,
            multi: false,
        }
    }
}

/// In-process usearch index exposed through the client contract.
///
/// The index itself is safe for concurrent use, so sessions share it behind
/// an `Arc`; each session still goes through the factory like any remote
/// backend would.
pub struct UsearchBackend {
    index: Arc<Index>,
    dimensions: usize,
}

impl UsearchBackend {
    pub fn new(params: &UsearchParams, capacity: usize) -> Result<Self, ClientError> {
        let index = new_index(&params.index_options())
            .map_err(|e| ClientError::backend(e.what()))?;
        index
            .reserve(capacity.max(1))
            .map_err(|e| ClientError::backend(e.what()))?;
        Ok(Self {
            index: Arc::new(index),
            dimensions: params.dimensions,
        })
    }

    pub fn len(&self) -> usize {
        self.index.size()
    }

    pub fn is_empty(&self) -> bool {
        self.index.size() == 0
    }
}

impl ClientFactory for UsearchBackend {
    fn create(&self) -> Result<Box<dyn VectorClient + Send>, ClientError> {
        Ok(Box::new(UsearchSession {
            index: Arc::clone(&self.index),
            dimensions: self.dimensions,
        }))
    }
}

struct UsearchSession {
    index: Arc<Index>,
    dimensions: usize,
}

impl UsearchSession {
    fn check_dimensions(&self, vector: &[f32]) -> Result<(), ClientError> {
        if vector.len() != self.dimensions {
            return Err(ClientError::backend(format!(
                "dimension mismatch: expected {}, got {}",
                self.dimensions,
                vector.len()
            )));
        }
        Ok(())
    }
}

impl VectorClient for UsearchSession {
    fn insert_batch(&mut self, vectors: &[Vec<f32>], ids: &[u64]) -> Result<usize, ClientError> {
        if vectors.len() != ids.len() {
            return Err(ClientError::backend(format!(
                "batch mismatch: {} vectors, {} ids",
                vectors.len(),
                ids.len()
            )));
        }

        if self.index.size() + vectors.len() > self.index.capacity() {
            self.index
                .reserve(self.index.size() + vectors.len())
                .map_err(|e| ClientError::backend(e.what()))?;
        }

        for (vector, &id) in vectors.iter().zip(ids.iter()) {
            self.check_dimensions(vector)?;
            self.index
                .add(id, vector)
                .map_err(|e| ClientError::backend(e.what()))?;
        }
        Ok(vectors.len())
    }

    fn search(&mut self, query: &[f32], k: usize) -> Result<Vec<u64>, ClientError> {
        self.check_dimensions(query)?;
        let matches = self
            .index
            .search(query, k)
            .map_err(|e| ClientError::backend(e.what()))?;
        Ok(matches.keys)
    }

    fn optimize(&mut self) -> Result<(), ClientError> {
        // usearch builds its graph incrementally on add; nothing to do here.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{brute_force_neighbors, generate_vectors};

    fn small_backend(dim: usize, capacity: usize) -> UsearchBackend {
        let params = UsearchParams {
            dimensions: dim,
            ..Default::default()
        };
        UsearchBackend::new(&params, capacity).unwrap()
    }

    #[test]
    fn insert_then_search_round_trip() {
        let backend = small_backend(8, 64);
        let mut session = backend.create().unwrap();

        let vectors = generate_vectors(64, 8, 3);
        let ids: Vec<u64> = (0..64).collect();
        let inserted = session.insert_batch(&vectors, &ids).unwrap();
        assert_eq!(inserted, 64);
        assert_eq!(backend.len(), 64);

        // Exact-vector query finds itself first.
        let hits = session.search(&vectors[10], 1).unwrap();
        assert_eq!(hits[0], 10);
    }

    #[test]
    fn search_matches_brute_force_on_small_corpus() {
        let backend = small_backend(8, 128);
        let mut session = backend.create().unwrap();

        let vectors = generate_vectors(100, 8, 11);
        let ids: Vec<u64> = (0..100).collect();
        session.insert_batch(&vectors, &ids).unwrap();
        session.optimize().unwrap();

        let query = generate_vectors(1, 8, 99).remove(0);
        let hits = session.search(&query, 10).unwrap();
        let truth = brute_force_neighbors(&vectors, &ids, &query, 10);
        let recall = crate::metrics::recall_at_k(&hits, &truth, 10);
        // HNSW over a 100-vector corpus visits essentially everything.
        assert!(recall >= 0.9, "recall {recall} too low for tiny corpus");
    }

    #[test]
    fn rejects_dimension_mismatch() {
        let backend = small_backend(8, 16);
        let mut session = backend.create().unwrap();
        assert!(session.search(&[0.0; 4], 1).is_err());
        assert!(session
            .insert_batch(&[vec![0.0; 4]], &[0])
            .is_err());
    }

    #[test]
    fn rejects_mismatched_batch() {
        let backend = small_backend(8, 16);
        let mut session = backend.create().unwrap();
        let err = session.insert_batch(&[vec![0.0; 8]], &[0, 1]).unwrap_err();
        assert!(err.to_string().contains("batch mismatch"));
    }

    #[test]
    fn sessions_share_one_index() {
        let backend = small_backend(8, 32);
        let mut writer = backend.create().unwrap();
        let mut reader = backend.create().unwrap();

        let vectors = generate_vectors(16, 8, 5);
        let ids: Vec<u64> = (0..16).collect();
        writer.insert_batch(&vectors, &ids).unwrap();

        let hits = reader.search(&vectors[3], 1).unwrap();
        assert_eq!(hits[0], 3);
    }
}
