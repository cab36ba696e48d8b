//! Directory-backed item source.
//!
//! A dataset's items live in `<root>/<dataset_id>/` (or the dataset's own
//! `storage_path` when set). Each regular file is one item; an optional
//! `<file>.meta.json` sidecar holds its metadata as a flat JSON object.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::dataset::{Dataset, ItemDescriptor};

use super::source::{ItemSource, SourceError};

/// Suffix of per-item metadata sidecar files.
pub const METADATA_SUFFIX: &str = ".meta.json";

/// Reads items from the local filesystem.
#[derive(Debug, Clone)]
pub struct DirectoryItemSource {
    root: PathBuf,
}

impl DirectoryItemSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the items of `dataset`.
    pub fn dataset_dir(&self, dataset: &Dataset) -> PathBuf {
        if dataset.storage_path.is_empty() {
            self.root.join(dataset.id.to_string())
        } else {
            PathBuf::from(&dataset.storage_path)
        }
    }

    async fn read_sidecar(&self, path: &Path, item: &str) -> Result<BTreeMap<String, String>, SourceError> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(SourceError::InvalidMetadata {
                    item: item.to_string(),
                    reason: e.to_string(),
                })
            }
        };
        let value: serde_json::Value =
            serde_json::from_slice(&raw).map_err(|e| SourceError::InvalidMetadata {
                item: item.to_string(),
                reason: e.to_string(),
            })?;
        let object = value.as_object().ok_or_else(|| SourceError::InvalidMetadata {
            item: item.to_string(),
            reason: "expected a JSON object".to_string(),
        })?;
        Ok(object
            .iter()
            .map(|(k, v)| {
                let v = match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), v)
            })
            .collect())
    }
}

#[async_trait]
impl ItemSource for DirectoryItemSource {
    async fn list_items(&self, dataset: &Dataset) -> Result<Vec<ItemDescriptor>, SourceError> {
        let dir = self.dataset_dir(dataset);
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| SourceError::Unavailable(format!("{}: {}", dir.display(), e)))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SourceError::Unavailable(format!("{}: {}", dir.display(), e)))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(METADATA_SUFFIX) || name.starts_with('.') {
                continue;
            }
            let meta = entry
                .metadata()
                .await
                .map_err(|e| SourceError::Unavailable(format!("{}: {}", name, e)))?;
            if meta.is_file() {
                files.push((name, meta.len()));
            }
        }
        files.sort();

        let mut descriptors = Vec::with_capacity(files.len());
        for (ordinal, (name, size)) in files.into_iter().enumerate() {
            let sidecar = dir.join(format!("{}{}", name, METADATA_SUFFIX));
            let mut metadata = self.read_sidecar(&sidecar, &name).await?;
            let mut descriptor = ItemDescriptor::new(name.clone(), ordinal as u64, size);
            if let Some(media_type) = metadata.remove("media_type") {
                descriptor = descriptor.with_media_type(media_type);
            }
            if let Some(display) = metadata.remove("name") {
                descriptor = descriptor.with_name(display);
            }
            descriptor.metadata = metadata;
            descriptors.push(descriptor);
        }

        debug!(dataset_id = %dataset.id, items = descriptors.len(), "Listed dataset directory");
        Ok(descriptors)
    }

    async fn read_item(
        &self,
        dataset: &Dataset,
        descriptor: &ItemDescriptor,
    ) -> Result<Vec<u8>, SourceError> {
        let path = self.dataset_dir(dataset).join(descriptor.id.as_str());
        tokio::fs::read(&path)
            .await
            .map_err(|e| SourceError::ItemUnreadable {
                item: descriptor.id.to_string(),
                reason: e.to_string(),
            })
    }
}
