//! Metadata quality: how well an item describes itself.

use crate::dataset::ItemDescriptor;

use super::report::{QualityDimension, QualityIssue, QualityIssueType, Severity};

/// Supplier metadata keys buyers expect to find.
pub const RECOMMENDED_KEYS: [&str; 4] = ["source", "license", "description", "created_at"];

const EXTENSION_WEIGHT: f64 = 0.2;
const MEDIA_TYPE_WEIGHT: f64 = 0.2;
const SIZE_WEIGHT: f64 = 0.2;
const RECOMMENDED_KEYS_WEIGHT: f64 = 0.4;

/// Scores descriptor completeness: extension, specific media type, declared
/// size and the share of recommended keys present.
#[derive(Debug, Clone, Default)]
pub struct MetadataChecker;

impl MetadataChecker {
    pub fn new() -> Self {
        Self
    }

    pub fn check(&self, descriptor: &ItemDescriptor) -> (f64, Vec<QualityIssue>) {
        let mut score = 0.0;
        let mut missing = Vec::new();

        if descriptor.extension().is_some() {
            score += EXTENSION_WEIGHT;
        } else {
            missing.push("file extension".to_string());
        }

        let media_type = descriptor.media_type.trim();
        if !media_type.is_empty() && media_type != "application/octet-stream" {
            score += MEDIA_TYPE_WEIGHT;
        } else {
            missing.push("media type".to_string());
        }

        if descriptor.size_bytes > 0 {
            score += SIZE_WEIGHT;
        } else {
            missing.push("size".to_string());
        }

        let present = RECOMMENDED_KEYS
            .iter()
            .filter(|key| {
                descriptor
                    .metadata
                    .get(**key)
                    .is_some_and(|v| !v.trim().is_empty())
            })
            .count();
        score += RECOMMENDED_KEYS_WEIGHT * present as f64 / RECOMMENDED_KEYS.len() as f64;
        missing.extend(
            RECOMMENDED_KEYS
                .iter()
                .filter(|key| !descriptor.metadata.contains_key(**key))
                .map(|key| key.to_string()),
        );

        let issues = if missing.is_empty() {
            Vec::new()
        } else {
            vec![QualityIssue::new(
                QualityDimension::MetadataQuality,
                QualityIssueType::MissingMetadata,
                Severity::Minor,
                format!("Missing metadata: {}", missing.join(", ")),
            )]
        };
        (score, issues)
    }
}
