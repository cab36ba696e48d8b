//! Builds data packages from refined datasets.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::dataset::{Dataset, DatasetId, PipelineStage, StageMachine};
use crate::error::RefineError;
use crate::storage::RefinementStore;

use super::package::{DataPackage, Manifest, ProvenanceEntry};

/// Caller-supplied package details.
#[derive(Debug, Clone)]
pub struct PackageRequest {
    pub name: String,
    pub description: String,
    pub version: String,
    pub license_type: String,
}

impl PackageRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            version: "1.0".to_string(),
            license_type: "proprietary".to_string(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_license(mut self, license_type: impl Into<String>) -> Self {
        self.license_type = license_type.into();
        self
    }
}

/// Packages refined datasets using their latest refinement record.
pub struct PackageService {
    store: Arc<dyn RefinementStore>,
    stages: StageMachine,
}

impl PackageService {
    pub fn new(store: Arc<dyn RefinementStore>) -> Self {
        Self {
            store,
            stages: StageMachine::new(),
        }
    }

    /// Creates a package from the latest refinement of `dataset_id` and moves
    /// the dataset to `Packaged`.
    ///
    /// # Errors
    /// - `NotFound` if the dataset does not exist
    /// - `Validation` if the request has an empty name or version
    /// - `NotPackageable` unless the dataset is `Refined` with at least one record
    pub async fn create_package(
        &self,
        dataset_id: DatasetId,
        request: PackageRequest,
    ) -> Result<DataPackage, RefineError> {
        let mut dataset = self.require_dataset(dataset_id).await?;

        if request.name.trim().is_empty() {
            return Err(RefineError::Validation("package name must not be empty".to_string()));
        }
        if request.version.trim().is_empty() {
            return Err(RefineError::Validation("package version must not be empty".to_string()));
        }

        if dataset.stage() != PipelineStage::Refined {
            return Err(RefineError::NotPackageable {
                dataset_id,
                reason: format!("dataset must be refined, current stage is {}", dataset.stage()),
            });
        }

        let records = self
            .store
            .list_records(dataset_id)
            .await
            .map_err(RefineError::from_store)?;
        let Some(latest) = records.last() else {
            return Err(RefineError::NotPackageable {
                dataset_id,
                reason: "no refinement record".to_string(),
            });
        };

        let now = Utc::now();
        let manifest = Manifest::from_record(latest);

        let mut provenance = Vec::with_capacity(records.len() + 2);
        provenance.push(ProvenanceEntry::ingestion(&dataset));
        provenance.extend(records.iter().map(ProvenanceEntry::refinement));
        provenance.push(ProvenanceEntry::packaging(now));

        let package = DataPackage {
            id: Uuid::new_v4(),
            dataset_id,
            refinement_record_id: latest.id(),
            name: request.name,
            description: request.description,
            version: request.version,
            license_type: request.license_type,
            source_type: dataset.source_type.to_string(),
            items_count: manifest.total_items,
            size_bytes: manifest.total_size_bytes,
            quality_score: latest.aggregate_quality(),
            manifest,
            provenance,
            created_at: now,
        };

        self.stages.transition(&mut dataset, PipelineStage::Packaged)?;
        self.store
            .save_package(&package, PipelineStage::Packaged)
            .await
            .map_err(RefineError::from_store)?;

        info!(
            dataset_id = %dataset_id,
            package_id = %package.id,
            items = package.items_count,
            "Created data package"
        );

        Ok(package)
    }

    /// Packages of a dataset, oldest first.
    pub async fn list_packages(&self, dataset_id: DatasetId) -> Result<Vec<DataPackage>, RefineError> {
        self.require_dataset(dataset_id).await?;
        self.store
            .list_packages(dataset_id)
            .await
            .map_err(RefineError::from_store)
    }

    /// Exports one package of a dataset as pretty-printed JSON.
    pub async fn export_package_json(
        &self,
        dataset_id: DatasetId,
        package_id: Uuid,
    ) -> Result<String, RefineError> {
        let package = self
            .list_packages(dataset_id)
            .await?
            .into_iter()
            .find(|p| p.id == package_id)
            .ok_or_else(|| RefineError::NotFound(format!("package {}", package_id)))?;

        package
            .to_json()
            .map_err(|e| RefineError::Internal(format!("package serialization failed: {}", e)))
    }

    async fn require_dataset(&self, dataset_id: DatasetId) -> Result<Dataset, RefineError> {
        self.store
            .get_dataset(dataset_id)
            .await
            .map_err(RefineError::from_store)?
            .ok_or_else(|| RefineError::NotFound(dataset_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DataSourceType;
    use crate::error::ErrorKind;
    use crate::packaging::ProvenanceStep;
    use crate::pipeline::record::tests::{outcome, record_for};
    use crate::storage::MemoryStore;

    async fn refined_dataset(store: &MemoryStore, runs: usize) -> Dataset {
        let dataset = Dataset::new("reviews", DataSourceType::Crowd, "supplier-1")
            .with_stage(PipelineStage::Refining);
        store.save_dataset(&dataset).await.expect("save dataset");
        let base = Utc::now();
        for run in 0..runs {
            let record = record_for(
                dataset.id,
                vec![outcome("a", 0, 0.9), outcome("b", 1, 0.2)],
                base + chrono::Duration::seconds(run as i64),
            );
            store
                .commit_refinement(&record, PipelineStage::Refined)
                .await
                .expect("commit");
        }
        dataset
    }

    #[tokio::test]
    async fn test_create_package_from_latest_record() {
        let store = Arc::new(MemoryStore::new());
        let dataset = refined_dataset(&store, 2).await;
        let service = PackageService::new(store.clone());

        let package = service
            .create_package(dataset.id, PackageRequest::new("Reviews v1").with_license("CC-BY"))
            .await
            .expect("package");

        let latest = store.latest_record(dataset.id).await.expect("query").expect("record");
        assert_eq!(package.refinement_record_id, latest.id());
        assert_eq!(package.items_count, 1);
        assert_eq!(package.license_type, "CC-BY");

        let steps: Vec<ProvenanceStep> = package.provenance.iter().map(|p| p.step).collect();
        assert_eq!(
            steps,
            vec![
                ProvenanceStep::Ingestion,
                ProvenanceStep::Refinement,
                ProvenanceStep::Refinement,
                ProvenanceStep::Packaging
            ]
        );

        let stored = store.get_dataset(dataset.id).await.expect("query").expect("dataset");
        assert_eq!(stored.stage(), PipelineStage::Packaged);
        assert_eq!(service.list_packages(dataset.id).await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn test_not_refined_is_not_packageable() {
        let store = Arc::new(MemoryStore::new());
        let dataset = Dataset::new("raw", DataSourceType::University, "lab")
            .with_stage(PipelineStage::Stored);
        store.save_dataset(&dataset).await.expect("save");
        let service = PackageService::new(store.clone());

        let err = service
            .create_package(dataset.id, PackageRequest::new("raw"))
            .await
            .expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::NotPackageable);
        assert!(store.list_packages(dataset.id).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn test_refined_without_record_is_not_packageable() {
        let store = Arc::new(MemoryStore::new());
        let dataset = Dataset::new("odd", DataSourceType::Crowd, "x").with_stage(PipelineStage::Refined);
        store.save_dataset(&dataset).await.expect("save");
        let service = PackageService::new(store);

        let err = service
            .create_package(dataset.id, PackageRequest::new("odd"))
            .await
            .expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::NotPackageable);
    }

    #[tokio::test]
    async fn test_missing_dataset_and_empty_name() {
        let store = Arc::new(MemoryStore::new());
        let service = PackageService::new(store.clone());
        let err = service
            .create_package(DatasetId::new(), PackageRequest::new("x"))
            .await
            .expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let dataset = refined_dataset(&store, 1).await;
        let err = service
            .create_package(dataset.id, PackageRequest::new("  "))
            .await
            .expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_export_package_json() {
        let store = Arc::new(MemoryStore::new());
        let dataset = refined_dataset(&store, 1).await;
        let service = PackageService::new(store);
        let package = service
            .create_package(dataset.id, PackageRequest::new("export me"))
            .await
            .expect("package");

        let json = service
            .export_package_json(dataset.id, package.id)
            .await
            .expect("export");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert_eq!(value["name"], "export me");
        assert_eq!(value["manifest"]["total_items"], 1);

        let err = service
            .export_package_json(dataset.id, Uuid::new_v4())
            .await
            .expect_err("unknown package");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
