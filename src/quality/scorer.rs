//! Combines the five dimension checkers into item and dataset scores.

use crate::classify::{tokenize, Domain};
use crate::dataset::Item;
use crate::error::ItemError;

use super::clarity::ClarityAnalyzer;
use super::completeness::CompletenessChecker;
use super::format::FormatValidator;
use super::metadata::MetadataChecker;
use super::relevance::RelevanceChecker;
use super::report::{DatasetQuality, DimensionScores, QualityReport};

/// Scores a single item. The seam the orchestrator calls through.
pub trait ItemScorer: Send + Sync {
    /// Computes the five-dimension report for `item`.
    ///
    /// # Errors
    /// Returns an [`ItemError`] if the item's content is corrupt.
    fn score_item(&self, item: &Item) -> Result<QualityReport, ItemError>;
}

/// Heuristic multi-dimensional quality scorer.
#[derive(Debug, Clone, Default)]
pub struct QualityScorer {
    completeness: CompletenessChecker,
    clarity: ClarityAnalyzer,
    relevance: RelevanceChecker,
    format: FormatValidator,
    metadata: MetadataChecker,
}

impl QualityScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts full relevance credit to items in these domains.
    pub fn with_target_domains(mut self, domains: Vec<Domain>) -> Self {
        self.relevance = RelevanceChecker::new(domains);
        self
    }

    pub fn target_domains(&self) -> &[Domain] {
        self.relevance.target_domains()
    }

    /// Scores every item; unscorable items get a zero report.
    ///
    /// The returned failures are in item order.
    pub fn score_dataset(&self, items: &[Item]) -> (DatasetQuality, Vec<(usize, ItemError)>) {
        let mut reports = Vec::with_capacity(items.len());
        let mut failures = Vec::new();
        for (idx, item) in items.iter().enumerate() {
            match self.score_item(item) {
                Ok(report) => reports.push(report),
                Err(err) => {
                    tracing::warn!(item = %item.id(), error = %err, "Item scoring failed");
                    reports.push(QualityReport::zero(item.id().clone()));
                    failures.push((idx, err));
                }
            }
        }
        (DatasetQuality::from_reports(reports), failures)
    }
}

impl ItemScorer for QualityScorer {
    fn score_item(&self, item: &Item) -> Result<QualityReport, ItemError> {
        let declared = item.descriptor().size_bytes;
        let actual = item.content().len() as u64;
        if actual < declared {
            return Err(ItemError::Truncated {
                expected: declared,
                actual,
            });
        }

        let text = item.text_content();
        let text = text.as_deref();
        let domain = match text {
            Some(text) => Domain::detect(&tokenize(text)),
            None => item
                .descriptor()
                .metadata
                .get("domain")
                .and_then(|d| d.parse().ok()),
        };

        let (completeness, mut issues) = self.completeness.check(item, text);
        let (clarity, more) = self.clarity.check(item.content(), text);
        issues.extend(more);
        let (relevance, more) = self.relevance.check(item.content(), text, domain);
        issues.extend(more);
        let (format_validity, more) = self.format.check(item);
        issues.extend(more);
        let (metadata_quality, more) = self.metadata.check(item.descriptor());
        issues.extend(more);

        let scores = DimensionScores::new(
            completeness,
            clarity,
            relevance,
            format_validity,
            metadata_quality,
        );
        Ok(QualityReport::new(item.id().clone(), scores, issues))
    }
}
