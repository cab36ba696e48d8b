//! The immutable snapshot of one refinement run.
//!
//! A [`RefinementRecord`] is built once by the orchestrator, committed to the
//! store and never changed afterwards. Its fields are only readable outside the
//! crate.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classify::{Classification, ClassificationAggregate};
use crate::dataset::{DatasetId, ItemId, PipelineStage};
use crate::dedup::{DedupMethod, DedupOutcome, DuplicateGroup};
use crate::hashing::Fingerprint;
use crate::quality::DimensionScores;

/// Why an item was rejected. An item may carry both reasons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectionReason {
    /// Aggregate quality below the run's threshold.
    LowQuality { score: f64, threshold: f64 },
    /// Non-survivor member of a duplicate group.
    Duplicate { survivor: ItemId, method: DedupMethod },
}

/// Per-item result of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub item_id: ItemId,
    pub ordinal: u64,
    pub quality: f64,
    pub passed: bool,
    pub rejection_reasons: Vec<RejectionReason>,
    /// Absent when the content could not be read.
    pub fingerprint: Option<Fingerprint>,
    pub media_type: String,
    pub size_bytes: u64,
    pub classification: Classification,
}

/// The step at which an item failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Read,
    Analyze,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::Read => "read",
            FailureStage::Analyze => "analyze",
        }
    }
}

/// One entry of the record's error log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub item_id: ItemId,
    pub ordinal: u64,
    pub stage: FailureStage,
    pub message: String,
}

/// Immutable result of one refinement run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementRecord {
    pub(crate) id: Uuid,
    pub(crate) dataset_id: DatasetId,
    pub(crate) quality_threshold: f64,
    pub(crate) dedup_method: DedupMethod,
    pub(crate) similarity_threshold: f64,
    pub(crate) dimension_scores: DimensionScores,
    pub(crate) aggregate_quality: f64,
    pub(crate) items_processed: u64,
    pub(crate) items_passed: u64,
    pub(crate) items_rejected: u64,
    pub(crate) duplicates_found: u64,
    pub(crate) duplicate_groups: Vec<DuplicateGroup>,
    pub(crate) classification: ClassificationAggregate,
    pub(crate) items: Vec<ItemOutcome>,
    pub(crate) error_log: Vec<ItemFailure>,
    pub(crate) duration_seconds: f64,
    pub(crate) created_at: DateTime<Utc>,
}

impl RefinementRecord {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn dataset_id(&self) -> DatasetId {
        self.dataset_id
    }

    pub fn quality_threshold(&self) -> f64 {
        self.quality_threshold
    }

    pub fn dedup_method(&self) -> DedupMethod {
        self.dedup_method
    }

    pub fn similarity_threshold(&self) -> f64 {
        self.similarity_threshold
    }

    /// Per-dimension means over all processed items.
    pub fn dimension_scores(&self) -> &DimensionScores {
        &self.dimension_scores
    }

    /// Mean of item aggregates.
    pub fn aggregate_quality(&self) -> f64 {
        self.aggregate_quality
    }

    pub fn items_processed(&self) -> u64 {
        self.items_processed
    }

    pub fn items_passed(&self) -> u64 {
        self.items_passed
    }

    pub fn items_rejected(&self) -> u64 {
        self.items_rejected
    }

    /// Number of non-survivor duplicate group members.
    pub fn duplicates_found(&self) -> u64 {
        self.duplicates_found
    }

    pub fn duplicate_groups(&self) -> &[DuplicateGroup] {
        &self.duplicate_groups
    }

    pub fn classification(&self) -> &ClassificationAggregate {
        &self.classification
    }

    /// Item outcomes in ingestion order.
    pub fn items(&self) -> &[ItemOutcome] {
        &self.items
    }

    pub fn passed_items(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.items.iter().filter(|outcome| outcome.passed)
    }

    /// Per-item failures in ingestion order.
    pub fn error_log(&self) -> &[ItemFailure] {
        &self.error_log
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Fraction of processed items that passed; 0 for an empty run.
    pub fn pass_rate(&self) -> f64 {
        if self.items_processed == 0 {
            0.0
        } else {
            self.items_passed as f64 / self.items_processed as f64
        }
    }
}

/// Assembles a [`RefinementRecord`] from the outputs of one run.
#[derive(Debug)]
pub(crate) struct RecordDraft {
    pub dataset_id: DatasetId,
    pub quality_threshold: f64,
    pub similarity_threshold: f64,
    pub dimension_scores: DimensionScores,
    pub aggregate_quality: f64,
    pub dedup: DedupOutcome,
    pub classification: ClassificationAggregate,
    pub items: Vec<ItemOutcome>,
    pub error_log: Vec<ItemFailure>,
    pub duration_seconds: f64,
}

impl RecordDraft {
    /// Applies the filter rule and freezes the result.
    ///
    /// `created_at` must come from the caller so it can be kept strictly after
    /// the dataset's previous record.
    pub fn finish(mut self, created_at: DateTime<Utc>) -> RefinementRecord {
        // Non-survivor member -> its group.
        let duplicate_of: HashMap<&ItemId, &DuplicateGroup> = self
            .dedup
            .groups
            .iter()
            .flat_map(|g| g.rejected().map(move |id| (id, g)))
            .collect();
        for outcome in &mut self.items {
            outcome.rejection_reasons.clear();
            if outcome.quality < self.quality_threshold {
                outcome.rejection_reasons.push(RejectionReason::LowQuality {
                    score: outcome.quality,
                    threshold: self.quality_threshold,
                });
            }
            if let Some(group) = duplicate_of.get(&outcome.item_id) {
                outcome.rejection_reasons.push(RejectionReason::Duplicate {
                    survivor: group.survivor.clone(),
                    method: group.method,
                });
            }
            outcome.passed = outcome.rejection_reasons.is_empty();
        }

        let items_processed = self.items.len() as u64;
        let items_passed = self.items.iter().filter(|o| o.passed).count() as u64;

        RefinementRecord {
            id: Uuid::new_v4(),
            dataset_id: self.dataset_id,
            quality_threshold: self.quality_threshold,
            dedup_method: self.dedup.method,
            similarity_threshold: self.similarity_threshold,
            dimension_scores: self.dimension_scores,
            aggregate_quality: self.aggregate_quality,
            items_processed,
            items_passed,
            items_rejected: items_processed - items_passed,
            duplicates_found: self.dedup.duplicates_found() as u64,
            duplicate_groups: self.dedup.groups,
            classification: self.classification,
            items: self.items,
            error_log: self.error_log,
            duration_seconds: self.duration_seconds,
            created_at,
        }
    }
}

/// Current refinement state of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementStatus {
    pub dataset_id: DatasetId,
    pub stage: PipelineStage,
    pub quality_score: f64,
    pub runs: usize,
    pub latest_record_id: Option<Uuid>,
    pub last_refined_at: Option<DateTime<Utc>>,
    pub items_processed: u64,
    pub items_passed: u64,
    pub items_rejected: u64,
    pub duplicates_found: u64,
}

/// Per-run summary used for metrics export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub record_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub aggregate_quality: f64,
    pub pass_rate: f64,
    pub duplicates_found: u64,
    pub item_failures: usize,
    pub duration_seconds: f64,
}

impl From<&RefinementRecord> for RunSummary {
    fn from(record: &RefinementRecord) -> Self {
        Self {
            record_id: record.id,
            created_at: record.created_at,
            aggregate_quality: record.aggregate_quality,
            pass_rate: record.pass_rate(),
            duplicates_found: record.duplicates_found,
            item_failures: record.error_log.len(),
            duration_seconds: record.duration_seconds,
        }
    }
}

/// Refinement metrics of a dataset across its history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementMetrics {
    pub dataset_id: DatasetId,
    pub total_runs: usize,
    pub latest: Option<RunSummary>,
    /// Oldest first.
    pub history: Vec<RunSummary>,
    pub average_pass_rate: f64,
    pub average_duration_seconds: f64,
}

impl RefinementMetrics {
    pub fn from_history(dataset_id: DatasetId, records: &[RefinementRecord]) -> Self {
        let history: Vec<RunSummary> = records.iter().map(RunSummary::from).collect();
        let n = history.len();
        let (average_pass_rate, average_duration_seconds) = if n == 0 {
            (0.0, 0.0)
        } else {
            (
                history.iter().map(|s| s.pass_rate).sum::<f64>() / n as f64,
                history.iter().map(|s| s.duration_seconds).sum::<f64>() / n as f64,
            )
        };
        Self {
            dataset_id,
            total_runs: n,
            latest: history.last().cloned(),
            history,
            average_pass_rate,
            average_duration_seconds,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::classify::Modality;

    pub(crate) fn outcome(id: &str, ordinal: u64, quality: f64) -> ItemOutcome {
        ItemOutcome {
            item_id: ItemId::from(id),
            ordinal,
            quality,
            passed: false,
            rejection_reasons: Vec::new(),
            fingerprint: None,
            media_type: "text/plain".to_string(),
            size_bytes: 10,
            classification: Classification {
                modality: Modality::Text,
                ..Classification::unknown(ItemId::from(id))
            },
        }
    }

    /// A finished record for `dataset_id` with no duplicates.
    pub(crate) fn record_for(
        dataset_id: DatasetId,
        items: Vec<ItemOutcome>,
        created_at: DateTime<Utc>,
    ) -> RefinementRecord {
        let dedup = DedupOutcome {
            method: DedupMethod::Hybrid,
            groups: Vec::new(),
            candidates: items.len(),
        };
        let mut draft = draft(items, dedup);
        draft.dataset_id = dataset_id;
        draft.aggregate_quality = 0.7;
        draft.finish(created_at)
    }

    fn draft(items: Vec<ItemOutcome>, dedup: DedupOutcome) -> RecordDraft {
        RecordDraft {
            dataset_id: DatasetId::new(),
            quality_threshold: 0.5,
            similarity_threshold: 0.95,
            dimension_scores: DimensionScores::zero(),
            aggregate_quality: 0.0,
            dedup,
            classification: ClassificationAggregate::default(),
            items,
            error_log: Vec::new(),
            duration_seconds: 0.1,
        }
    }

    #[test]
    fn test_filter_combines_quality_and_duplicates() {
        let dedup = DedupOutcome {
            method: DedupMethod::Hash,
            groups: vec![DuplicateGroup {
                method: DedupMethod::Hash,
                members: vec![ItemId::from("a"), ItemId::from("b")],
                survivor: ItemId::from("a"),
                similarity: None,
            }],
            candidates: 3,
        };
        let items = vec![outcome("a", 0, 0.9), outcome("b", 1, 0.9), outcome("c", 2, 0.2)];
        let record = draft(items, dedup).finish(Utc::now());

        assert_eq!(record.items_processed(), 3);
        assert_eq!(record.items_passed(), 1);
        assert_eq!(record.items_rejected(), 2);
        assert_eq!(record.duplicates_found(), 1);
        assert!(record.items()[0].passed);
        assert_eq!(
            record.items()[1].rejection_reasons,
            vec![RejectionReason::Duplicate {
                survivor: ItemId::from("a"),
                method: DedupMethod::Hash
            }]
        );
        assert!(matches!(
            record.items()[2].rejection_reasons[0],
            RejectionReason::LowQuality { .. }
        ));
    }

    #[test]
    fn test_duplicates_name_their_own_group_survivor() {
        let group = |method, members: &[&str], similarity| DuplicateGroup {
            method,
            members: members.iter().map(|m| ItemId::from(*m)).collect(),
            survivor: ItemId::from(members[0]),
            similarity,
        };
        let dedup = DedupOutcome {
            method: DedupMethod::Hybrid,
            groups: vec![
                group(DedupMethod::Hash, &["a", "c"], None),
                group(DedupMethod::Semantic, &["b", "d", "e"], Some(0.97)),
            ],
            candidates: 5,
        };
        let items = vec![
            outcome("a", 0, 0.9),
            outcome("b", 1, 0.9),
            outcome("c", 2, 0.9),
            outcome("d", 3, 0.9),
            outcome("e", 4, 0.1),
        ];
        let record = draft(items, dedup).finish(Utc::now());

        let survivor_of = |i: usize| match &record.items()[i].rejection_reasons[..] {
            [RejectionReason::Duplicate { survivor, .. }, ..] => survivor.as_str().to_string(),
            other => panic!("unexpected reasons {:?}", other),
        };
        assert_eq!(survivor_of(2), "a");
        assert_eq!(survivor_of(3), "b");
        assert_eq!(record.items()[4].rejection_reasons.len(), 2);
        assert!(record.items()[1].passed);
        assert_eq!(record.items_passed(), 2);
        assert_eq!(record.duplicates_found(), 3);
    }

    #[test]
    fn test_counts_add_up_for_empty_run() {
        let dedup = DedupOutcome {
            method: DedupMethod::Hybrid,
            groups: Vec::new(),
            candidates: 0,
        };
        let record = draft(Vec::new(), dedup).finish(Utc::now());
        assert_eq!(record.items_passed() + record.items_rejected(), record.items_processed());
        assert_eq!(record.pass_rate(), 0.0);
    }

    #[test]
    fn test_metrics_from_history() {
        let dedup = || DedupOutcome {
            method: DedupMethod::Hybrid,
            groups: Vec::new(),
            candidates: 2,
        };
        let first = draft(vec![outcome("a", 0, 0.9), outcome("b", 1, 0.1)], dedup()).finish(Utc::now());
        let second = draft(vec![outcome("a", 0, 0.9), outcome("b", 1, 0.9)], dedup()).finish(Utc::now());
        let metrics = RefinementMetrics::from_history(first.dataset_id(), &[first, second.clone()]);
        assert_eq!(metrics.total_runs, 2);
        assert!((metrics.average_pass_rate - 0.75).abs() < 1e-9);
        assert_eq!(metrics.latest.map(|s| s.record_id), Some(second.id()));
    }
}
