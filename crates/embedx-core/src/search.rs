//! Cosine scoring and top-k selection
//!
//! Shared by the engine and by stores that search locally, so both apply the
//! same rules:
//!
//! - items whose dimension differs from the query are skipped
//! - items with a zero norm (or a zero query) are skipped
//! - NaN scores are skipped
//! - results are ordered by descending score; ties have no defined order
//! - `k == 0` or `k >= n` returns everything

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::format::Metadata;
use crate::simd::{self, Kernel};

/// One search hit
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub id: String,
    /// Cosine similarity in [-1, 1]
    pub score: f32,
    pub vector: Option<Vec<f32>>,
    pub metadata: Option<Metadata>,
}

impl SearchResult {
    pub fn new(id: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
            vector: None,
            metadata: None,
        }
    }

    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }

    pub fn with_metadata(mut self, metadata: Option<Metadata>) -> Self {
        self.metadata = metadata;
        self
    }
}

// ============================================================================
// Scoring
// ============================================================================

/// Scores candidates against one query
#[derive(Debug, Clone, Copy)]
pub struct Scorer<'q> {
    query: &'q [f32],
    query_norm: f32,
    kernel: Kernel,
}

impl<'q> Scorer<'q> {
    pub fn new(query: &'q [f32], kernel: Kernel) -> Self {
        let query_norm = simd::norm(query);
        Self {
            query,
            query_norm,
            kernel,
        }
    }

    pub fn dim(&self) -> usize {
        self.query.len()
    }

    /// Cosine against a candidate whose norm is already known
    ///
    /// `None` when the candidate must be skipped.
    pub fn score_with_norm(&self, vector: &[f32], norm: f32) -> Option<f32> {
        if vector.len() != self.query.len() {
            return None;
        }
        let denom = self.query_norm * norm;
        if denom == 0.0 {
            return None;
        }
        let score = self.kernel.dot_unchecked(self.query, vector) / denom;
        (!score.is_nan()).then_some(score)
    }

    /// Cosine against a raw candidate
    pub fn score(&self, vector: &[f32]) -> Option<f32> {
        if vector.len() != self.query.len() {
            return None;
        }
        let norm = simd::norm(vector);
        self.score_with_norm(vector, norm)
    }
}

// ============================================================================
// Top-K
// ============================================================================

/// Heap entry ordered so that `BinaryHeap` pops the lowest score first
struct MinScored(SearchResult);

impl PartialEq for MinScored {
    fn eq(&self, other: &Self) -> bool {
        self.0.score == other.0.score
    }
}

impl Eq for MinScored {}

impl Ord for MinScored {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse for min-heap (lowest score = highest priority)
        other
            .0
            .score
            .partial_cmp(&self.0.score)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for MinScored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

enum Collector {
    All(Vec<SearchResult>),
    Bounded(BinaryHeap<MinScored>),
}

/// Streaming top-k collector
///
/// With `k > 0` at most `k` results are held: once full, a new result
/// replaces the current minimum only if it scores strictly higher.
pub struct TopK {
    k: usize,
    collector: Collector,
}

impl TopK {
    /// `k == 0` keeps every result
    pub fn new(k: usize) -> Self {
        let collector = if k == 0 {
            Collector::All(Vec::new())
        } else {
            Collector::Bounded(BinaryHeap::with_capacity(k.min(1024) + 1))
        };
        Self { k, collector }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        match &self.collector {
            Collector::All(items) => items.len(),
            Collector::Bounded(heap) => heap.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a result with `score` would be kept by [`push`](Self::push)
    ///
    /// Lets callers skip building a result that would be dropped anyway.
    pub fn accepts(&self, score: f32) -> bool {
        if score.is_nan() {
            return false;
        }
        match &self.collector {
            Collector::All(_) => true,
            Collector::Bounded(heap) => {
                heap.len() < self.k || heap.peek().map_or(true, |worst| score > worst.0.score)
            }
        }
    }

    pub fn push(&mut self, result: SearchResult) {
        if !self.accepts(result.score) {
            return;
        }
        match &mut self.collector {
            Collector::All(items) => items.push(result),
            Collector::Bounded(heap) => {
                if heap.len() >= self.k {
                    heap.pop();
                }
                heap.push(MinScored(result));
            }
        }
    }

    /// Results by descending score
    pub fn into_sorted_vec(self) -> Vec<SearchResult> {
        let mut results = match self.collector {
            Collector::All(items) => items,
            Collector::Bounded(heap) => heap.into_iter().map(|entry| entry.0).collect(),
        };
        sort_descending(&mut results);
        results
    }
}

impl Extend<SearchResult> for TopK {
    fn extend<I: IntoIterator<Item = SearchResult>>(&mut self, iter: I) {
        for result in iter {
            self.push(result);
        }
    }
}

pub fn sort_descending(results: &mut [SearchResult]) {
    results.sort_unstable_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

/// Full sort then truncate; `k == 0` or `k >= len` keeps everything
pub fn top_k(mut results: Vec<SearchResult>, k: usize) -> Vec<SearchResult> {
    sort_descending(&mut results);
    if k > 0 && k < results.len() {
        results.truncate(k);
    }
    results
}
