//! Quality report types: dimensions, weights, per-item and dataset reports.

use serde::{Deserialize, Serialize};

use crate::dataset::ItemId;

/// The five quality dimensions, in weight-vector order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityDimension {
    Completeness,
    Clarity,
    Relevance,
    FormatValidity,
    MetadataQuality,
}

impl QualityDimension {
    pub fn all() -> [QualityDimension; 5] {
        [
            QualityDimension::Completeness,
            QualityDimension::Clarity,
            QualityDimension::Relevance,
            QualityDimension::FormatValidity,
            QualityDimension::MetadataQuality,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityDimension::Completeness => "completeness",
            QualityDimension::Clarity => "clarity",
            QualityDimension::Relevance => "relevance",
            QualityDimension::FormatValidity => "format_validity",
            QualityDimension::MetadataQuality => "metadata_quality",
        }
    }
}

impl std::fmt::Display for QualityDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed weight vector. Weights sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityWeights {
    pub completeness: f64,
    pub clarity: f64,
    pub relevance: f64,
    pub format_validity: f64,
    pub metadata_quality: f64,
}

impl QualityWeights {
    pub const STANDARD: QualityWeights = QualityWeights {
        completeness: 0.20,
        clarity: 0.25,
        relevance: 0.25,
        format_validity: 0.20,
        metadata_quality: 0.10,
    };

    pub fn weight(&self, dimension: QualityDimension) -> f64 {
        match dimension {
            QualityDimension::Completeness => self.completeness,
            QualityDimension::Clarity => self.clarity,
            QualityDimension::Relevance => self.relevance,
            QualityDimension::FormatValidity => self.format_validity,
            QualityDimension::MetadataQuality => self.metadata_quality,
        }
    }

    pub fn total(&self) -> f64 {
        QualityDimension::all().iter().map(|d| self.weight(*d)).sum()
    }
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Per-dimension scores, each clamped to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DimensionScores {
    pub completeness: f64,
    pub clarity: f64,
    pub relevance: f64,
    pub format_validity: f64,
    pub metadata_quality: f64,
}

impl DimensionScores {
    pub fn new(
        completeness: f64,
        clarity: f64,
        relevance: f64,
        format_validity: f64,
        metadata_quality: f64,
    ) -> Self {
        Self {
            completeness: unit(completeness),
            clarity: unit(clarity),
            relevance: unit(relevance),
            format_validity: unit(format_validity),
            metadata_quality: unit(metadata_quality),
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn get(&self, dimension: QualityDimension) -> f64 {
        match dimension {
            QualityDimension::Completeness => self.completeness,
            QualityDimension::Clarity => self.clarity,
            QualityDimension::Relevance => self.relevance,
            QualityDimension::FormatValidity => self.format_validity,
            QualityDimension::MetadataQuality => self.metadata_quality,
        }
    }

    /// Weighted sum of the five dimensions.
    pub fn weighted(&self, weights: &QualityWeights) -> f64 {
        QualityDimension::all()
            .iter()
            .map(|d| self.get(*d) * weights.weight(*d))
            .sum()
    }

    /// Per-dimension mean; zero for an empty input.
    pub fn mean<'a>(scores: impl IntoIterator<Item = &'a DimensionScores>) -> DimensionScores {
        let mut sum = DimensionScores::zero();
        let mut count = 0usize;
        for s in scores {
            sum.completeness += s.completeness;
            sum.clarity += s.clarity;
            sum.relevance += s.relevance;
            sum.format_validity += s.format_validity;
            sum.metadata_quality += s.metadata_quality;
            count += 1;
        }
        if count == 0 {
            return sum;
        }
        let n = count as f64;
        DimensionScores::new(
            sum.completeness / n,
            sum.clarity / n,
            sum.relevance / n,
            sum.format_validity / n,
            sum.metadata_quality / n,
        )
    }
}

/// Clamp to [0, 1], mapping NaN to 0.
fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Quality issue severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The dimension is scored zero.
    Critical,
    /// Significantly reduces the dimension.
    Major,
    /// Slightly reduces the dimension.
    Minor,
    /// Logged but does not affect the score.
    Warning,
}

/// Types of quality issues that can be detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityIssueType {
    EmptyContent,
    BlankContent,
    InconsistentRows,
    MissingValues,
    NoiseCharacters,
    RepeatedCharacters,
    LowEntropy,
    TooShort,
    LowDiversity,
    OffTargetDomain,
    FormatMismatch,
    InvalidContent,
    MissingMetadata,
}

impl std::fmt::Display for QualityIssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            QualityIssueType::EmptyContent => "EmptyContent",
            QualityIssueType::BlankContent => "BlankContent",
            QualityIssueType::InconsistentRows => "InconsistentRows",
            QualityIssueType::MissingValues => "MissingValues",
            QualityIssueType::NoiseCharacters => "NoiseCharacters",
            QualityIssueType::RepeatedCharacters => "RepeatedCharacters",
            QualityIssueType::LowEntropy => "LowEntropy",
            QualityIssueType::TooShort => "TooShort",
            QualityIssueType::LowDiversity => "LowDiversity",
            QualityIssueType::OffTargetDomain => "OffTargetDomain",
            QualityIssueType::FormatMismatch => "FormatMismatch",
            QualityIssueType::InvalidContent => "InvalidContent",
            QualityIssueType::MissingMetadata => "MissingMetadata",
        };
        write!(f, "{}", name)
    }
}

/// A quality issue detected in an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub dimension: QualityDimension,
    pub issue_type: QualityIssueType,
    pub severity: Severity,
    pub description: String,
}

impl QualityIssue {
    pub fn new(
        dimension: QualityDimension,
        issue_type: QualityIssueType,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            dimension,
            issue_type,
            severity,
            description: description.into(),
        }
    }
}

/// Quality breakdown for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub item_id: ItemId,
    pub scores: DimensionScores,
    /// Weighted sum of `scores` under the standard weights.
    pub aggregate: f64,
    #[serde(default)]
    pub issues: Vec<QualityIssue>,
}

impl QualityReport {
    pub fn new(item_id: ItemId, scores: DimensionScores, issues: Vec<QualityIssue>) -> Self {
        Self {
            item_id,
            aggregate: scores.weighted(&QualityWeights::STANDARD),
            scores,
            issues,
        }
    }

    /// Report for an item that could not be scored.
    pub fn zero(item_id: ItemId) -> Self {
        Self::new(item_id, DimensionScores::zero(), Vec::new())
    }
}

/// Quality of a whole item set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetQuality {
    pub reports: Vec<QualityReport>,
    /// Mean of item aggregates.
    pub aggregate: f64,
    /// Per-dimension means across items.
    pub dimensions: DimensionScores,
}

impl DatasetQuality {
    pub fn from_reports(reports: Vec<QualityReport>) -> Self {
        let aggregate = if reports.is_empty() {
            0.0
        } else {
            reports.iter().map(|r| r.aggregate).sum::<f64>() / reports.len() as f64
        };
        let dimensions = DimensionScores::mean(reports.iter().map(|r| &r.scores));
        Self {
            reports,
            aggregate,
            dimensions,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}
