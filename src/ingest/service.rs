//! Dataset creation and directory ingestion.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::dataset::{DataSourceType, Dataset, DatasetId, PipelineStage, StageMachine};
use crate::error::RefineError;
use crate::storage::{RefinementStore, METADATA_SUFFIX};

use super::validation::{sanitize_filename, validate_file};

/// Details of a dataset to create.
#[derive(Debug, Clone)]
pub struct NewDataset {
    pub name: String,
    pub description: String,
    pub source_type: DataSourceType,
    pub owner_id: String,
    pub license_type: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl NewDataset {
    pub fn new(name: impl Into<String>, source_type: DataSourceType, owner_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            source_type,
            owner_id: owner_id.into(),
            license_type: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_license(mut self, license_type: impl Into<String>) -> Self {
        self.license_type = Some(license_type.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A file that was not stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestIssue {
    pub file: String,
    pub error: String,
}

/// Outcome of one ingestion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionReport {
    pub dataset_id: DatasetId,
    pub files_validated: u64,
    pub files_passed: u64,
    pub files_failed: u64,
    pub bytes_stored: u64,
    pub stored_location: String,
    pub errors: Vec<IngestIssue>,
}

struct Candidate {
    path: PathBuf,
    display: String,
    size: u64,
}

/// Validates supplier files and places them in cold storage.
pub struct IngestService {
    store: Arc<dyn RefinementStore>,
    storage_root: PathBuf,
    stages: StageMachine,
}

impl IngestService {
    pub fn new(store: Arc<dyn RefinementStore>, storage_root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            storage_root: storage_root.into(),
            stages: StageMachine::new(),
        }
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Registers a new dataset in stage `Ingested`.
    pub async fn create_dataset(&self, request: NewDataset) -> Result<Dataset, RefineError> {
        if request.name.trim().is_empty() {
            return Err(RefineError::Validation("dataset name must not be empty".to_string()));
        }

        let mut dataset = Dataset::new(request.name, request.source_type, request.owner_id)
            .with_description(request.description);
        dataset.license_type = request.license_type;
        dataset.metadata = request.metadata;

        self.store
            .save_dataset(&dataset)
            .await
            .map_err(RefineError::from_store)?;

        info!(dataset_id = %dataset.id, name = %dataset.name, "Created dataset");
        Ok(dataset)
    }

    /// Copies every acceptable file under `source_dir` into the dataset's
    /// storage directory and moves the dataset to `Stored`.
    ///
    /// Files are flattened by sanitized name. A `<file>.meta.json` sidecar is
    /// copied alongside its file. Rejected files are listed in the report.
    pub async fn ingest_directory(
        &self,
        dataset_id: DatasetId,
        source_dir: &Path,
    ) -> Result<IngestionReport, RefineError> {
        let mut dataset = self
            .store
            .get_dataset(dataset_id)
            .await
            .map_err(RefineError::from_store)?
            .ok_or_else(|| RefineError::NotFound(dataset_id.to_string()))?;

        let stage = dataset.stage();
        if !matches!(stage, PipelineStage::Ingested | PipelineStage::Stored) {
            return Err(RefineError::Validation(format!(
                "dataset in stage {} cannot accept files",
                stage
            )));
        }

        if !source_dir.is_dir() {
            return Err(RefineError::Validation(format!(
                "source directory {} does not exist",
                source_dir.display()
            )));
        }

        let candidates = scan(source_dir.to_path_buf()).await?;

        let target_dir = self.storage_root.join(dataset_id.to_string());
        tokio::fs::create_dir_all(&target_dir)
            .await
            .map_err(|e| RefineError::StorageUnavailable(format!("{}: {}", target_dir.display(), e)))?;

        let mut taken: HashSet<String> = existing_names(&target_dir).await?;
        let mut errors = Vec::new();
        let mut passed = 0u64;
        let mut bytes = 0u64;

        for candidate in &candidates {
            let name = sanitize_filename(&candidate.display);
            if let Err(rejection) = validate_file(&name, candidate.size) {
                errors.push(IngestIssue {
                    file: candidate.display.clone(),
                    error: rejection.to_string(),
                });
                continue;
            }
            if !taken.insert(name.clone()) {
                errors.push(IngestIssue {
                    file: candidate.display.clone(),
                    error: format!("a file named '{}' is already stored", name),
                });
                continue;
            }

            match copy_with_sidecar(&candidate.path, &target_dir, &name).await {
                Ok(size) => {
                    passed += 1;
                    bytes += size;
                    debug!(dataset_id = %dataset_id, file = %name, size, "Stored file");
                }
                Err(e) => {
                    taken.remove(&name);
                    errors.push(IngestIssue {
                        file: candidate.display.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        for issue in &errors {
            warn!(dataset_id = %dataset_id, file = %issue.file, error = %issue.error, "File rejected");
        }

        dataset.storage_path = target_dir.display().to_string();
        dataset.file_count += passed;
        dataset.total_size_bytes += bytes;
        if stage == PipelineStage::Ingested {
            self.stages.transition(&mut dataset, PipelineStage::Stored)?;
        }
        self.store
            .save_dataset(&dataset)
            .await
            .map_err(RefineError::from_store)?;

        let failed = errors.len() as u64;
        info!(
            dataset_id = %dataset_id,
            passed,
            failed,
            bytes,
            "Ingestion finished"
        );

        Ok(IngestionReport {
            dataset_id,
            files_validated: passed + failed,
            files_passed: passed,
            files_failed: failed,
            bytes_stored: bytes,
            stored_location: dataset.storage_path.clone(),
            errors,
        })
    }
}

/// Regular, non-hidden, non-sidecar files under `root`, sorted by path.
async fn scan(root: PathBuf) -> Result<Vec<Candidate>, RefineError> {
    tokio::task::spawn_blocking(move || {
        let mut found = Vec::new();
        let walker = WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));
        for entry in walker {
            let entry = entry.map_err(|e| RefineError::StorageUnavailable(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(METADATA_SUFFIX) {
                continue;
            }
            let size = entry
                .metadata()
                .map_err(|e| RefineError::StorageUnavailable(e.to_string()))?
                .len();
            let display = entry
                .path()
                .strip_prefix(&root)
                .unwrap_or(entry.path())
                .display()
                .to_string();
            found.push(Candidate {
                path: entry.into_path(),
                display,
                size,
            });
        }
        Ok::<_, RefineError>(found)
    })
    .await
    .map_err(|e| RefineError::Internal(format!("directory scan failed: {}", e)))?
}

async fn existing_names(dir: &Path) -> Result<HashSet<String>, RefineError> {
    let mut names = HashSet::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| RefineError::StorageUnavailable(e.to_string()))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| RefineError::StorageUnavailable(e.to_string()))?
    {
        names.insert(entry.file_name().to_string_lossy().to_string());
    }
    Ok(names)
}

async fn copy_with_sidecar(source: &Path, target_dir: &Path, name: &str) -> std::io::Result<u64> {
    let size = tokio::fs::copy(source, target_dir.join(name)).await?;

    let mut sidecar = source.as_os_str().to_owned();
    sidecar.push(METADATA_SUFFIX);
    let sidecar = PathBuf::from(sidecar);
    if tokio::fs::try_exists(&sidecar).await? {
        tokio::fs::copy(&sidecar, target_dir.join(format!("{}{}", name, METADATA_SUFFIX))).await?;
    }

    Ok(size)
}
