//! Embedder: store-backed brute-force cosine search
//!
//! ```text
//!   add(id, v) ──► store.save_vector
//!
//!   search(q, k) ──► store.get_all_vectors ──► score each (skip dim/zero/NaN)
//!                                          ──► bounded min-heap (k) ──► sort desc
//! ```

use thiserror::Error;

use crate::config::KernelConfig;
use crate::search::{Scorer, SearchResult, TopK};
use crate::simd::{self, Kernel};
use crate::store::{StoreError, VectorStore};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Cannot add empty vector {id}")]
    EmptyVector { id: String },

    #[error("Query vector is empty")]
    EmptyQuery,

    #[error("Store holds no vectors")]
    EmptyStore,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Similarity engine over any [`VectorStore`]
pub struct Embedder<S> {
    store: S,
    kernel: Kernel,
}

impl<S: VectorStore> Embedder<S> {
    /// Engine using the process-wide kernel
    pub fn new(store: S) -> Self {
        Self {
            store,
            kernel: *simd::kernel(),
        }
    }

    /// Engine bound to a kernel built from `config`
    pub fn with_config(store: S, config: &KernelConfig) -> Self {
        Self {
            store,
            kernel: Kernel::from_config(config),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn add(&self, id: &str, vector: &[f32]) -> Result<(), EngineError> {
        if vector.is_empty() {
            return Err(EngineError::EmptyVector { id: id.to_string() });
        }
        self.store.save_vector(id, vector)?;
        Ok(())
    }

    /// Best `k` stored vectors by cosine similarity to `query`
    ///
    /// Vectors of another dimension are ignored. `k == 0` returns every
    /// match. Equal scores come back in no particular order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, EngineError> {
        if query.is_empty() {
            return Err(EngineError::EmptyQuery);
        }

        let vectors = self.store.get_all_vectors()?;
        if vectors.is_empty() {
            return Err(EngineError::EmptyStore);
        }

        let scorer = Scorer::new(query, self.kernel);
        let total = vectors.len();
        let mut matched = 0usize;
        let mut top = TopK::new(k);
        for (id, vector) in vectors {
            let Some(score) = scorer.score(&vector) else {
                continue;
            };
            matched += 1;
            if top.accepts(score) {
                top.push(SearchResult::new(id, score).with_vector(vector));
            }
        }

        tracing::debug!(
            dim = query.len(),
            k,
            scanned = total,
            matched,
            "brute-force search"
        );
        Ok(top.into_sorted_vec())
    }

    pub fn close(&self) -> Result<(), EngineError> {
        self.store.close()?;
        Ok(())
    }

    pub fn into_inner(self) -> S {
        self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::collections::HashMap;

    fn ids(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.id.as_str()).collect()
    }

    fn sample_engine() -> Embedder<MemoryStore> {
        let engine = Embedder::new(MemoryStore::new());
        engine.add("a", &[1.0, 0.0]).unwrap();
        engine.add("b", &[0.0, 1.0]).unwrap();
        engine.add("c", &[1.0, 1.0]).unwrap();
        engine
    }

    #[test]
    fn test_top_k_example() {
        let engine = Embedder::new(MemoryStore::new());
        engine.add("a", &[1.0, 0.0, 0.0]).unwrap();
        engine.add("b", &[0.0, 1.0, 0.0]).unwrap();
        engine.add("c", &[0.5, 0.5, 0.0]).unwrap();

        let results = engine.search(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(ids(&results), vec!["a", "c"]);
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert!((results[1].score - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-5);
        assert_eq!(results[1].vector.as_deref(), Some(&[0.5, 0.5, 0.0][..]));
        assert!(results[0].metadata.is_none());
    }

    #[test]
    fn test_bounded_search_matches_full_ranking() {
        let engine = Embedder::new(MemoryStore::new());
        for i in 0..64 {
            let angle = i as f32 * 0.1;
            engine.add(&format!("v{i}"), &[angle.cos(), angle.sin()]).unwrap();
        }
        let all = engine.search(&[0.6, 0.8], 0).unwrap();
        for k in [1, 5, 63, 64] {
            let top = engine.search(&[0.6, 0.8], k).unwrap();
            assert_eq!(top.len(), k);
            for (a, b) in top.iter().zip(&all) {
                assert!((a.score - b.score).abs() < 1e-6, "k = {k}");
            }
        }
    }

    #[test]
    fn test_k_bounds() {
        let engine = sample_engine();
        assert_eq!(engine.search(&[1.0, 0.0], 0).unwrap().len(), 3);
        assert_eq!(engine.search(&[1.0, 0.0], 3).unwrap().len(), 3);
        assert_eq!(engine.search(&[1.0, 0.0], 10).unwrap().len(), 3);
        assert_eq!(engine.search(&[1.0, 0.0], 1).unwrap().len(), 1);
    }

    #[test]
    fn test_results_are_descending() {
        let engine = sample_engine();
        engine.add("d", &[-1.0, 0.2]).unwrap();
        let results = engine.search(&[0.3, 0.9], 0).unwrap();
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_dimension_tolerance() {
        let engine = sample_engine();
        engine.add("wide", &[1.0, 0.0, 0.0]).unwrap();

        let results = engine.search(&[1.0, 0.0], 0).unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.id != "wide"));

        let results = engine.search(&[1.0, 0.0, 0.0], 0).unwrap();
        assert_eq!(ids(&results), vec!["wide"]);
    }

    #[test]
    fn test_no_matching_dimension_is_empty() {
        let engine = sample_engine();
        assert!(engine.search(&[1.0, 0.0, 0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_zero_vectors_are_skipped() {
        let engine = sample_engine();
        engine.add("zero", &[0.0, 0.0]).unwrap();
        let results = engine.search(&[1.0, 0.0], 0).unwrap();
        assert!(results.iter().all(|r| r.id != "zero"));
        assert!(results.iter().all(|r| !r.score.is_nan()));

        assert!(engine.search(&[0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_errors() {
        let engine = Embedder::new(MemoryStore::new());
        assert!(matches!(engine.add("a", &[]), Err(EngineError::EmptyVector { .. })));
        assert!(matches!(engine.search(&[1.0], 1), Err(EngineError::EmptyStore)));

        engine.add("a", &[1.0]).unwrap();
        assert!(matches!(engine.search(&[], 1), Err(EngineError::EmptyQuery)));
    }

    #[test]
    fn test_store_errors_propagate() {
        let engine = Embedder::new(MemoryStore::with_dim(2));
        assert!(matches!(
            engine.add("a", &[1.0, 2.0, 3.0]),
            Err(EngineError::Store(StoreError::DimensionMismatch { .. }))
        ));
        assert!(matches!(
            engine.add("", &[1.0, 2.0]),
            Err(EngineError::Store(StoreError::EmptyId))
        ));
    }

    #[test]
    fn test_with_config_matches_default() {
        let config = KernelConfig::default().with_block_size(16);
        let configured = Embedder::with_config(MemoryStore::new(), &config);
        assert_eq!(configured.kernel().block_size(), 16);

        let default = sample_engine();
        let vectors: HashMap<String, Vec<f32>> = default.store().export_vectors().unwrap();
        configured.store().import_vectors(&vectors).unwrap();

        let mut a = configured.search(&[0.6, 0.8], 0).unwrap();
        let mut b = default.search(&[0.6, 0.8], 0).unwrap();
        a.sort_by(|x, y| x.id.cmp(&y.id));
        b.sort_by(|x, y| x.id.cmp(&y.id));
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.id, y.id);
            assert!((x.score - y.score).abs() < 1e-6);
        }
    }

    #[test]
    fn test_into_inner_and_close() {
        let engine = sample_engine();
        engine.close().unwrap();
        let store = engine.into_inner();
        assert_eq!(store.len(), 3);
    }
}
