//! Duplicate and near-duplicate detection.
//!
//! - **Hash**: items sharing a content fingerprint form an exact group.
//! - **Semantic**: items are connected when their embedding similarity
//!   reaches the threshold; groups are the connected components, so
//!   similarity is applied transitively.
//! - **Hybrid**: hash grouping first, then a semantic pass over the hash
//!   group survivors and the ungrouped items. A survivor that joins a
//!   semantic component brings its whole hash group with it.

pub mod deduplicator;
pub mod union_find;

pub use deduplicator::{
    DedupCandidate, DedupMethod, DedupOutcome, Deduplicator, DeduplicatorBuilder, DuplicateGroup,
    DEFAULT_SIMILARITY_THRESHOLD,
};
pub use union_find::{DisjointSet, Evidence};
