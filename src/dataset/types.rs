//! Core dataset and item types.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::media::MediaFormat;

/// Unique identifier of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(Uuid);

impl DatasetId {
    /// Generates a new random dataset id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for DatasetId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DatasetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Stable identifier of an item within its dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Kind of supplier a dataset came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceType {
    /// Individual crowd contributors.
    Crowd,
    /// Universities and research institutions.
    University,
    /// Enterprise data lakes.
    Enterprise,
    /// Previously sold marketplace datasets.
    Marketplace,
}

impl DataSourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSourceType::Crowd => "crowd",
            DataSourceType::University => "university",
            DataSourceType::Enterprise => "enterprise",
            DataSourceType::Marketplace => "marketplace",
        }
    }
}

impl std::fmt::Display for DataSourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataSourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "crowd" => Ok(DataSourceType::Crowd),
            "university" => Ok(DataSourceType::University),
            "enterprise" => Ok(DataSourceType::Enterprise),
            "marketplace" => Ok(DataSourceType::Marketplace),
            other => Err(format!("unknown source type '{}'", other)),
        }
    }
}

/// Position of a dataset in the ingest → refine → package → sell lifecycle.
///
/// Variants are declared in lifecycle order, so `Ord` follows the pipeline.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Ingested,
    Stored,
    Refining,
    Refined,
    Packaged,
    Listed,
    Sold,
}

impl PipelineStage {
    /// Returns all stages in lifecycle order.
    pub fn all() -> [PipelineStage; 7] {
        [
            PipelineStage::Ingested,
            PipelineStage::Stored,
            PipelineStage::Refining,
            PipelineStage::Refined,
            PipelineStage::Packaged,
            PipelineStage::Listed,
            PipelineStage::Sold,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Ingested => "ingested",
            PipelineStage::Stored => "stored",
            PipelineStage::Refining => "refining",
            PipelineStage::Refined => "refined",
            PipelineStage::Packaged => "packaged",
            PipelineStage::Listed => "listed",
            PipelineStage::Sold => "sold",
        }
    }

    /// Returns the stage that directly follows this one, if any.
    pub fn next(&self) -> Option<PipelineStage> {
        let all = Self::all();
        let idx = all.iter().position(|s| s == self)?;
        all.get(idx + 1).copied()
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|stage| stage.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| format!("unknown pipeline stage '{}'", s))
    }
}

/// Listing entry for one item, as supplied by the storage collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDescriptor {
    /// Stable identifier (the stored file name for filesystem-backed datasets).
    pub id: ItemId,
    /// Zero-based ingestion order. Used for deterministic tie-breaks.
    pub ordinal: u64,
    /// Original file name.
    pub name: String,
    /// Declared media type (e.g. `text/plain`, `image/png`).
    pub media_type: String,
    /// Declared size in bytes.
    pub size_bytes: u64,
    /// Free-form supplier metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ItemDescriptor {
    /// Creates a descriptor, inferring the media type from the file name.
    pub fn new(id: impl Into<String>, ordinal: u64, size_bytes: u64) -> Self {
        let id = id.into();
        let media_type = MediaFormat::from_file_name(&id).media_type().to_string();
        Self {
            name: id.clone(),
            id: ItemId::new(id),
            ordinal,
            media_type,
            size_bytes,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = media_type.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Lowercased file extension of the item name, if any.
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_lowercase())
    }
}

/// An item with its content loaded.
///
/// Items are immutable once ingested; corrections replace them.
#[derive(Debug, Clone)]
pub struct Item {
    descriptor: ItemDescriptor,
    content: Vec<u8>,
}

impl Item {
    pub fn new(descriptor: ItemDescriptor, content: Vec<u8>) -> Self {
        Self {
            descriptor,
            content,
        }
    }

    /// Builds an item whose declared size matches its content.
    pub fn from_bytes(id: impl Into<String>, ordinal: u64, content: impl Into<Vec<u8>>) -> Self {
        let content = content.into();
        let descriptor = ItemDescriptor::new(id, ordinal, content.len() as u64);
        Self::new(descriptor, content)
    }

    pub fn id(&self) -> &ItemId {
        &self.descriptor.id
    }

    pub fn ordinal(&self) -> u64 {
        self.descriptor.ordinal
    }

    pub fn descriptor(&self) -> &ItemDescriptor {
        &self.descriptor
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Returns the content as text when it is valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }

    /// Text view of the item, if it should be analysed as text.
    ///
    /// Items declared as a textual format are decoded lossily, so invalid
    /// sequences surface as U+FFFD. Undeclared items are text only when they
    /// are valid UTF-8 without a binary signature.
    pub fn text_content(&self) -> Option<Cow<'_, str>> {
        let declared = self.declared_format();
        if declared.is_textual() {
            return Some(String::from_utf8_lossy(&self.content));
        }
        if declared == MediaFormat::Unknown && self.detected_format() == MediaFormat::Unknown {
            return self.as_text().map(Cow::Borrowed);
        }
        None
    }

    /// Format declared by the media type, falling back to the file extension.
    pub fn declared_format(&self) -> MediaFormat {
        match MediaFormat::from_media_type(&self.descriptor.media_type) {
            MediaFormat::Unknown => MediaFormat::from_file_name(&self.descriptor.name),
            format => format,
        }
    }

    /// Format detected from the content bytes.
    pub fn detected_format(&self) -> MediaFormat {
        MediaFormat::sniff(&self.content)
    }
}

/// A dataset and its pipeline state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: DatasetId,
    pub name: String,
    pub description: String,
    pub source_type: DataSourceType,
    pub owner_id: String,
    /// Local or cloud location of the stored items.
    pub storage_path: String,
    pub file_count: u64,
    pub total_size_bytes: u64,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub license_type: Option<String>,
    pub(crate) stage: PipelineStage,
    pub(crate) quality_score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Dataset {
    /// Creates a freshly ingested dataset.
    pub fn new(name: impl Into<String>, source_type: DataSourceType, owner_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: DatasetId::new(),
            name: name.into(),
            description: String::new(),
            source_type,
            owner_id: owner_id.into(),
            storage_path: String::new(),
            file_count: 0,
            total_size_bytes: 0,
            metadata: BTreeMap::new(),
            license_type: None,
            stage: PipelineStage::Ingested,
            quality_score: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_storage_path(mut self, path: impl Into<String>) -> Self {
        self.storage_path = path.into();
        self
    }

    pub fn with_stage(mut self, stage: PipelineStage) -> Self {
        self.stage = stage;
        self
    }

    /// Current pipeline stage. Only the orchestrator and stage machine move it.
    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    /// Aggregate quality of the latest refinement, 0 before the first one.
    pub fn quality_score(&self) -> f64 {
        self.quality_score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_follows_lifecycle() {
        assert!(PipelineStage::Ingested < PipelineStage::Stored);
        assert!(PipelineStage::Refining < PipelineStage::Refined);
        assert!(PipelineStage::Listed < PipelineStage::Sold);
        assert_eq!(PipelineStage::Refined.next(), Some(PipelineStage::Packaged));
        assert_eq!(PipelineStage::Sold.next(), None);
    }

    #[test]
    fn test_stage_round_trip_str() {
        for stage in PipelineStage::all() {
            let parsed: PipelineStage = stage.as_str().parse().expect("parse stage");
            assert_eq!(parsed, stage);
        }
        assert!("archived".parse::<PipelineStage>().is_err());
    }

    #[test]
    fn test_dataset_id_parse() {
        let id = DatasetId::new();
        let parsed: DatasetId = id.to_string().parse().expect("parse id");
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<DatasetId>().is_err());
    }

    #[test]
    fn test_descriptor_infers_media_type() {
        let desc = ItemDescriptor::new("notes.txt", 0, 12);
        assert_eq!(desc.media_type, "text/plain");
        assert_eq!(desc.extension().as_deref(), Some("txt"));

        let desc = ItemDescriptor::new("README", 1, 3);
        assert_eq!(desc.extension(), None);
        assert_eq!(desc.media_type, "application/octet-stream");
    }

    #[test]
    fn test_item_text_access() {
        let item = Item::from_bytes("a.txt", 0, "hello world");
        assert_eq!(item.as_text(), Some("hello world"));
        assert_eq!(item.descriptor().size_bytes, 11);

        let binary = Item::from_bytes("b.bin", 1, vec![0xff, 0xfe, 0x00]);
        assert!(binary.as_text().is_none());
        assert!(binary.text_content().is_none());
    }

    #[test]
    fn test_text_content_rules() {
        let declared = Item::from_bytes("a.txt", 0, vec![b'o', b'k', 0xff]);
        assert_eq!(declared.text_content().as_deref(), Some("ok\u{fffd}"));

        let undeclared = Item::from_bytes("README", 1, "plain words");
        assert_eq!(undeclared.text_content().as_deref(), Some("plain words"));

        let image = Item::from_bytes("logo.png", 2, b"%PDF-1.4".to_vec());
        assert!(image.text_content().is_none());
    }

    #[test]
    fn test_new_dataset_defaults() {
        let dataset = Dataset::new("speech corpus", DataSourceType::University, "owner-1");
        assert_eq!(dataset.stage(), PipelineStage::Ingested);
        assert_eq!(dataset.quality_score(), 0.0);
        assert_eq!(dataset.file_count, 0);
    }
}
