//! Pairwise similarity search over a batch of embeddings.

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use super::embedding::Embedding;

/// Two embeddings (by index) whose similarity reached the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarPair {
    pub left: usize,
    pub right: usize,
    pub similarity: f64,
}

/// Finds all pairs of embeddings at or above a similarity threshold.
///
/// This is an exhaustive O(n²) scan. Rows are dealt round-robin to scoped
/// worker threads; each thread only reads the shared embedding slice, and the
/// merged output is sorted by `(left, right)` so callers see the same pair
/// order regardless of thread count.
#[derive(Debug, Clone)]
pub struct SimilarityEngine {
    workers: usize,
}

impl Default for SimilarityEngine {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        Self::new(workers)
    }
}

impl SimilarityEngine {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Returns every pair `i < j` with `cosine(i, j) >= threshold`.
    pub fn similar_pairs(&self, embeddings: &[Embedding], threshold: f64) -> Vec<SimilarPair> {
        let n = embeddings.len();
        if n < 2 {
            return Vec::new();
        }

        let workers = self.workers.min(n - 1);
        let mut pairs = if workers == 1 {
            scan_rows(embeddings, threshold, 0, 1)
        } else {
            std::thread::scope(|scope| {
                let handles: Vec<_> = (0..workers)
                    .map(|w| scope.spawn(move || scan_rows(embeddings, threshold, w, workers)))
                    .collect();
                handles
                    .into_iter()
                    .flat_map(|h| match h.join() {
                        Ok(found) => found,
                        Err(panic) => std::panic::resume_unwind(panic),
                    })
                    .collect::<Vec<_>>()
            })
        };

        pairs.sort_by(|a, b| (a.left, a.right).cmp(&(b.left, b.right)));
        pairs
    }

    /// Similarity between two embeddings.
    pub fn similarity(&self, a: &Embedding, b: &Embedding) -> f64 {
        a.cosine(b)
    }
}

/// Scans rows `start, start + step, ...` against every later row.
fn scan_rows(embeddings: &[Embedding], threshold: f64, start: usize, step: usize) -> Vec<SimilarPair> {
    let mut found = Vec::new();
    for i in (start..embeddings.len()).step_by(step) {
        let row = &embeddings[i];
        if row.is_zero() {
            continue;
        }
        for (j, other) in embeddings.iter().enumerate().skip(i + 1) {
            if other.is_zero() {
                continue;
            }
            let similarity = row.cosine(other);
            if similarity >= threshold {
                found.push(SimilarPair {
                    left: i,
                    right: j,
                    similarity,
                });
            }
        }
    }
    found
}
