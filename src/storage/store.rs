//! Persistence collaborator for datasets, refinement history and packages.

use async_trait::async_trait;
use thiserror::Error;

use crate::dataset::{Dataset, DatasetId, PipelineStage};
use crate::packaging::DataPackage;
use crate::pipeline::RefinementRecord;

use super::migrations::MigrationError;

/// Errors raised by a [`RefinementStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend cannot be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// Record not found.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value could not be decoded.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
}

/// Durable store for datasets, refinement records and packages.
///
/// Records are append-only. [`RefinementStore::commit_refinement`] is the
/// only way a record is written and it must be atomic with the stage change.
#[async_trait]
pub trait RefinementStore: Send + Sync {
    async fn get_dataset(&self, id: DatasetId) -> Result<Option<Dataset>, StoreError>;

    /// Inserts or replaces a dataset.
    async fn save_dataset(&self, dataset: &Dataset) -> Result<(), StoreError>;

    /// Sets the stage of an existing dataset.
    async fn set_stage(&self, id: DatasetId, stage: PipelineStage) -> Result<(), StoreError>;

    /// Moves the dataset to `Refining` only if its stored stage is still
    /// `expected`. A single atomic step shared by every process on the
    /// store; returns `false` when another run got there first.
    async fn begin_refinement(
        &self,
        id: DatasetId,
        expected: PipelineStage,
    ) -> Result<bool, StoreError>;

    /// Appends `record`, moves the dataset to `stage` and sets its quality
    /// score to the record's aggregate. All or nothing.
    async fn commit_refinement(
        &self,
        record: &RefinementRecord,
        stage: PipelineStage,
    ) -> Result<(), StoreError>;

    async fn latest_record(&self, id: DatasetId) -> Result<Option<RefinementRecord>, StoreError>;

    /// Full history, oldest first.
    async fn list_records(&self, id: DatasetId) -> Result<Vec<RefinementRecord>, StoreError>;

    /// Stores `package` and moves its dataset to `stage`. All or nothing.
    async fn save_package(
        &self,
        package: &DataPackage,
        stage: PipelineStage,
    ) -> Result<(), StoreError>;

    /// Packages of a dataset, oldest first.
    async fn list_packages(&self, id: DatasetId) -> Result<Vec<DataPackage>, StoreError>;
}
