//! Embedding generation for items.
//!
//! This module uses hash-based embeddings as a heuristic approach. A learned
//! model can be plugged in by implementing [`Embedder`].

use ndarray::Array1;
use sha2::{Digest, Sha256};

use crate::dataset::Item;

/// Default embedding dimension for item vectors.
pub const DEFAULT_DIMENSION: usize = 128;

/// Only this many leading bytes of binary content contribute n-gram features.
const BINARY_SAMPLE_BYTES: usize = 64 * 1024;

/// A unit-length (or all-zero) embedding vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding(Array1<f64>);

impl Embedding {
    /// Builds an embedding, normalising it to unit length.
    ///
    /// Vectors with (near) zero norm are kept as zeros and are similar to
    /// nothing.
    pub fn new(mut values: Array1<f64>) -> Self {
        normalize(&mut values);
        Self(values)
    }

    pub fn from_vec(values: Vec<f64>) -> Self {
        Self::new(Array1::from_vec(values))
    }

    pub fn zeros(dimension: usize) -> Self {
        Self(Array1::zeros(dimension))
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|x| *x == 0.0)
    }

    pub fn as_array(&self) -> &Array1<f64> {
        &self.0
    }

    /// Cosine similarity with another embedding, in [-1, 1].
    ///
    /// Both vectors are unit length, so this is their dot product. Vectors of
    /// different dimension are never similar.
    pub fn cosine(&self, other: &Embedding) -> f64 {
        if self.0.len() != other.0.len() {
            return 0.0;
        }
        self.0.dot(&other.0).clamp(-1.0, 1.0)
    }
}

/// Computes cosine similarity between two embeddings.
pub fn cosine_similarity(a: &Embedding, b: &Embedding) -> f64 {
    a.cosine(b)
}

/// Converts an item into a fixed-dimensional vector for near-duplicate search.
///
/// Implementations must be deterministic and safe to call from worker threads.
pub trait Embedder: Send + Sync {
    fn embed(&self, item: &Item) -> Embedding;

    fn dimension(&self) -> usize;
}

/// Generator for item embeddings.
///
/// Text is represented by hashed word frequencies, character trigrams and a
/// few length statistics. Binary content is represented by a coarse byte
/// histogram plus hashed byte 4-grams.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl HashingEmbedder {
    /// Creates a new embedder. Dimensions below 8 are raised to 8.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(8),
        }
    }

    /// Generates an embedding for text content.
    pub fn embed_text(&self, text: &str) -> Embedding {
        let mut embedding = Array1::zeros(self.dimension);

        if text.trim().is_empty() {
            return Embedding(embedding);
        }

        let text_lower = text.to_lowercase();

        // Word-level features
        let words: Vec<&str> = text_lower.split_whitespace().collect();
        let word_dim = self.dimension / 2;
        for word in &words {
            let pos = hash_to_index(word.as_bytes(), word_dim);
            embedding[pos] += 1.0 / words.len() as f64;
        }

        // Character trigram features
        let offset = word_dim;
        let trigram_dim = self.dimension / 4;
        let chars: Vec<char> = text_lower.chars().collect();
        let trigram_count = chars.len().saturating_sub(2).max(1) as f64;
        for window in chars.windows(3) {
            let trigram: String = window.iter().collect();
            let pos = offset + hash_to_index(trigram.as_bytes(), trigram_dim);
            embedding[pos] += 1.0 / trigram_count;
        }

        // Text statistics
        let stats_offset = offset + trigram_dim;
        let remaining = self.dimension - stats_offset;
        if remaining > 0 {
            embedding[stats_offset] = (text.len() as f64 / 1000.0).min(1.0) * 0.1;
        }
        if remaining > 1 {
            embedding[stats_offset + 1] = (words.len() as f64 / 200.0).min(1.0) * 0.1;
        }
        if remaining > 2 {
            let avg_word_len =
                words.iter().map(|w| w.len()).sum::<usize>() as f64 / words.len().max(1) as f64;
            embedding[stats_offset + 2] = (avg_word_len / 10.0).min(1.0) * 0.1;
        }

        Embedding::new(embedding)
    }

    /// Generates an embedding for binary content.
    pub fn embed_binary(&self, bytes: &[u8]) -> Embedding {
        let mut embedding = Array1::zeros(self.dimension);

        if bytes.is_empty() {
            return Embedding(embedding);
        }

        // Byte histogram folded into the first quarter.
        let histogram_dim = self.dimension / 4;
        for byte in bytes {
            embedding[*byte as usize % histogram_dim] += 1.0 / bytes.len() as f64;
        }

        // Hashed 4-grams over the leading sample.
        let offset = histogram_dim;
        let gram_dim = self.dimension - offset;
        let sample = &bytes[..bytes.len().min(BINARY_SAMPLE_BYTES)];
        let gram_count = sample.len().saturating_sub(3).max(1) as f64;
        for window in sample.windows(4) {
            let pos = offset + fnv1a(window) as usize % gram_dim;
            embedding[pos] += 1.0 / gram_count;
        }

        Embedding::new(embedding)
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, item: &Item) -> Embedding {
        match item.text_content() {
            Some(text) => self.embed_text(&text),
            None => self.embed_binary(item.content()),
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Hashes a token to an index in [0, max_index).
fn hash_to_index(input: &[u8], max_index: usize) -> usize {
    if max_index == 0 {
        return 0;
    }
    let mut hasher = Sha256::new();
    hasher.update(input);
    let hash_bytes = hasher.finalize();
    let hash_val = u32::from_be_bytes([hash_bytes[0], hash_bytes[1], hash_bytes[2], hash_bytes[3]]);
    hash_val as usize % max_index
}

/// FNV-1a, used for the per-window binary features.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

/// Normalizes a vector to unit length (L2 norm).
fn normalize(v: &mut Array1<f64>) {
    let norm: f64 = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 1e-10 {
        v.mapv_inplace(|x| x / norm);
    } else {
        v.fill(0.0);
    }
}
