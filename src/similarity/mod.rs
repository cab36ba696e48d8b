//! Near-duplicate similarity between items.
//!
//! Items are mapped to unit vectors by an [`Embedder`]; two items are
//! near-duplicates when the cosine similarity of their embeddings reaches the
//! configured threshold. [`SimilarityEngine`] generates candidate pairs for
//! the deduplicator's union pass.

pub mod embedding;
pub mod engine;

pub use embedding::{cosine_similarity, Embedder, Embedding, HashingEmbedder, DEFAULT_DIMENSION};
pub use engine::{SimilarPair, SimilarityEngine};
