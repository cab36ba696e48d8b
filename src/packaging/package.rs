//! Data package types: manifest, provenance log and the package itself.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classify::{ClassificationAggregate, Modality};
use crate::dataset::{Dataset, DatasetId, ItemId};
use crate::hashing::Fingerprint;
use crate::pipeline::{ItemOutcome, RefinementRecord};
use crate::quality::DimensionScores;

/// One item shipped in a package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub item_id: ItemId,
    pub ordinal: u64,
    /// SHA-256 of the item content; absent if it was never read.
    pub checksum: Option<Fingerprint>,
    pub size_bytes: u64,
    pub media_type: String,
    pub modality: Modality,
    pub quality: f64,
}

impl From<&ItemOutcome> for ManifestEntry {
    fn from(outcome: &ItemOutcome) -> Self {
        Self {
            item_id: outcome.item_id.clone(),
            ordinal: outcome.ordinal,
            checksum: outcome.fingerprint.clone(),
            size_bytes: outcome.size_bytes,
            media_type: outcome.media_type.clone(),
            modality: outcome.classification.modality,
            quality: outcome.quality,
        }
    }
}

/// Listing of the items a package contains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub total_items: u64,
    pub total_size_bytes: u64,
    /// Item count per modality name.
    pub modality_breakdown: BTreeMap<String, u64>,
    pub entries: Vec<ManifestEntry>,
    pub classification: ClassificationAggregate,
    pub dimension_scores: DimensionScores,
}

impl Manifest {
    /// Builds the manifest from the passed items of `record`, in ordinal order.
    pub fn from_record(record: &RefinementRecord) -> Self {
        let mut entries: Vec<ManifestEntry> =
            record.passed_items().map(ManifestEntry::from).collect();
        entries.sort_by_key(|entry| entry.ordinal);

        let mut modality_breakdown = BTreeMap::new();
        for entry in &entries {
            *modality_breakdown
                .entry(entry.modality.as_str().to_string())
                .or_insert(0) += 1;
        }

        Self {
            total_items: entries.len() as u64,
            total_size_bytes: entries.iter().map(|e| e.size_bytes).sum(),
            modality_breakdown,
            entries,
            classification: record.classification().clone(),
            dimension_scores: *record.dimension_scores(),
        }
    }
}

/// Kind of processing step in a provenance log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceStep {
    Ingestion,
    Refinement,
    Packaging,
}

/// One processing step applied to a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    pub step: ProvenanceStep,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refinement_record_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items_passed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items_rejected: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_count: Option<u64>,
}

impl ProvenanceEntry {
    pub fn ingestion(dataset: &Dataset) -> Self {
        Self {
            step: ProvenanceStep::Ingestion,
            timestamp: dataset.created_at,
            description: format!("Data ingested from {}", dataset.source_type),
            refinement_record_id: None,
            items_passed: None,
            items_rejected: None,
            file_count: Some(dataset.file_count),
        }
    }

    pub fn refinement(record: &RefinementRecord) -> Self {
        Self {
            step: ProvenanceStep::Refinement,
            timestamp: record.created_at(),
            description: format!(
                "Refined with {} deduplication at quality threshold {:.2}",
                record.dedup_method(),
                record.quality_threshold()
            ),
            refinement_record_id: Some(record.id()),
            items_passed: Some(record.items_passed()),
            items_rejected: Some(record.items_rejected()),
            file_count: None,
        }
    }

    pub fn packaging(at: DateTime<Utc>) -> Self {
        Self {
            step: ProvenanceStep::Packaging,
            timestamp: at,
            description: "Data packaged for delivery".to_string(),
            refinement_record_id: None,
            items_passed: None,
            items_rejected: None,
            file_count: None,
        }
    }
}

/// A curated, versioned bundle of refined data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPackage {
    pub id: Uuid,
    pub dataset_id: DatasetId,
    /// The refinement record the package was built from.
    pub refinement_record_id: Uuid,
    pub name: String,
    pub description: String,
    pub version: String,
    pub license_type: String,
    pub source_type: String,
    pub items_count: u64,
    pub size_bytes: u64,
    pub quality_score: f64,
    pub manifest: Manifest,
    pub provenance: Vec<ProvenanceEntry>,
    pub created_at: DateTime<Utc>,
}

impl DataPackage {
    /// Pretty-printed JSON of the whole package.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
