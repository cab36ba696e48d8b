//! Multi-dimensional quality scoring for items and datasets.
//!
//! Each item is scored on five independent dimensions (completeness,
//! clarity, relevance, format validity, metadata quality), each in [0, 1].
//! The item aggregate is the weighted sum under [`QualityWeights::STANDARD`];
//! the dataset aggregate is the mean of item aggregates.

mod clarity;
mod completeness;
mod format;
mod metadata;
mod relevance;
mod report;
mod scorer;

pub use clarity::{byte_entropy, ClarityAnalyzer};
pub use completeness::CompletenessChecker;
pub use format::FormatValidator;
pub use metadata::{MetadataChecker, RECOMMENDED_KEYS};
pub use relevance::RelevanceChecker;
pub use report::{
    DatasetQuality, DimensionScores, QualityDimension, QualityIssue, QualityIssueType,
    QualityReport, QualityWeights, Severity,
};
pub use scorer::{ItemScorer, QualityScorer};
