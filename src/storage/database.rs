//! SQLite-backed [`RefinementStore`].
//!
//! Datasets are stored column by column; refinement records and packages are
//! stored as JSON bodies next to the columns needed for lookup and ordering.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::dataset::{Dataset, DatasetId, PipelineStage};
use crate::packaging::DataPackage;
use crate::pipeline::RefinementRecord;

use super::migrations::MigrationRunner;
use super::store::{RefinementStore, StoreError};

/// SQLite store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connects to the database at `database_url`, creating the file if
    /// missing, and runs pending migrations.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Wraps an existing pool. Migrations are not run.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        MigrationRunner::new(self.pool.clone()).run_migrations().await?;
        Ok(())
    }
}

fn dataset_from_row(row: &SqliteRow) -> Result<Dataset, StoreError> {
    let id: String = row.try_get("id")?;
    let source_type: String = row.try_get("source_type")?;
    let stage: String = row.try_get("stage")?;
    let metadata: String = row.try_get("metadata")?;
    let file_count: i64 = row.try_get("file_count")?;
    let total_size_bytes: i64 = row.try_get("total_size_bytes")?;

    Ok(Dataset {
        id: DatasetId::from_str(&id).map_err(|e| StoreError::Corrupt(format!("dataset id: {}", e)))?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        source_type: source_type.parse().map_err(StoreError::Corrupt)?,
        owner_id: row.try_get("owner_id")?,
        storage_path: row.try_get("storage_path")?,
        file_count: file_count.max(0) as u64,
        total_size_bytes: total_size_bytes.max(0) as u64,
        metadata: serde_json::from_str(&metadata)?,
        license_type: row.try_get("license_type")?,
        stage: stage.parse().map_err(StoreError::Corrupt)?,
        quality_score: row.try_get("quality_score")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

/// Updates a dataset's stage inside `executor`, failing if it does not exist.
async fn update_stage<'e, E>(
    executor: E,
    id: DatasetId,
    stage: PipelineStage,
    quality_score: Option<f64>,
) -> Result<(), StoreError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE datasets
        SET stage = ?1, quality_score = COALESCE(?2, quality_score), updated_at = ?3
        WHERE id = ?4
        "#,
    )
    .bind(stage.as_str())
    .bind(quality_score)
    .bind(Utc::now())
    .bind(id.to_string())
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(id.to_string()));
    }
    Ok(())
}

#[async_trait]
impl RefinementStore for SqliteStore {
    async fn get_dataset(&self, id: DatasetId) -> Result<Option<Dataset>, StoreError> {
        let row = sqlx::query("SELECT * FROM datasets WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(dataset_from_row).transpose()
    }

    async fn save_dataset(&self, dataset: &Dataset) -> Result<(), StoreError> {
        let metadata = serde_json::to_string(&dataset.metadata)?;
        sqlx::query(
            r#"
            INSERT INTO datasets (
                id, name, description, source_type, owner_id, storage_path,
                file_count, total_size_bytes, metadata, license_type, stage,
                quality_score, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                source_type = excluded.source_type,
                owner_id = excluded.owner_id,
                storage_path = excluded.storage_path,
                file_count = excluded.file_count,
                total_size_bytes = excluded.total_size_bytes,
                metadata = excluded.metadata,
                license_type = excluded.license_type,
                stage = excluded.stage,
                quality_score = excluded.quality_score,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(dataset.id.to_string())
        .bind(&dataset.name)
        .bind(&dataset.description)
        .bind(dataset.source_type.as_str())
        .bind(&dataset.owner_id)
        .bind(&dataset.storage_path)
        .bind(dataset.file_count as i64)
        .bind(dataset.total_size_bytes as i64)
        .bind(metadata)
        .bind(&dataset.license_type)
        .bind(dataset.stage.as_str())
        .bind(dataset.quality_score)
        .bind(dataset.created_at)
        .bind(dataset.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_stage(&self, id: DatasetId, stage: PipelineStage) -> Result<(), StoreError> {
        update_stage(&self.pool, id, stage, None).await
    }

    async fn begin_refinement(
        &self,
        id: DatasetId,
        expected: PipelineStage,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE datasets
            SET stage = ?1, updated_at = ?2
            WHERE id = ?3 AND stage = ?4 AND stage != ?1
            "#,
        )
        .bind(PipelineStage::Refining.as_str())
        .bind(Utc::now())
        .bind(id.to_string())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn commit_refinement(
        &self,
        record: &RefinementRecord,
        stage: PipelineStage,
    ) -> Result<(), StoreError> {
        let body = serde_json::to_string(record)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO refinement_records (
                id, dataset_id, aggregate_quality, items_processed, items_passed,
                items_rejected, duplicates_found, dedup_method, body, created_at_us
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(record.id().to_string())
        .bind(record.dataset_id().to_string())
        .bind(record.aggregate_quality())
        .bind(record.items_processed() as i64)
        .bind(record.items_passed() as i64)
        .bind(record.items_rejected() as i64)
        .bind(record.duplicates_found() as i64)
        .bind(record.dedup_method().as_str())
        .bind(body)
        .bind(record.created_at().timestamp_micros())
        .execute(&mut *tx)
        .await?;

        update_stage(
            &mut *tx,
            record.dataset_id(),
            stage,
            Some(record.aggregate_quality()),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn latest_record(&self, id: DatasetId) -> Result<Option<RefinementRecord>, StoreError> {
        let body: Option<String> = sqlx::query_scalar(
            r#"
            SELECT body FROM refinement_records
            WHERE dataset_id = ?1
            ORDER BY created_at_us DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        body.map(|b| serde_json::from_str(&b).map_err(StoreError::from))
            .transpose()
    }

    async fn list_records(&self, id: DatasetId) -> Result<Vec<RefinementRecord>, StoreError> {
        let bodies: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT body FROM refinement_records
            WHERE dataset_id = ?1
            ORDER BY created_at_us ASC, rowid ASC
            "#,
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;
        bodies
            .iter()
            .map(|b| serde_json::from_str(b).map_err(StoreError::from))
            .collect()
    }

    async fn save_package(
        &self,
        package: &DataPackage,
        stage: PipelineStage,
    ) -> Result<(), StoreError> {
        let body = serde_json::to_string(package)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO packages (id, dataset_id, record_id, body, created_at_us)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(package.id.to_string())
        .bind(package.dataset_id.to_string())
        .bind(package.refinement_record_id.to_string())
        .bind(body)
        .bind(package.created_at.timestamp_micros())
        .execute(&mut *tx)
        .await?;

        update_stage(&mut *tx, package.dataset_id, stage, None).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_packages(&self, id: DatasetId) -> Result<Vec<DataPackage>, StoreError> {
        let bodies: Vec<String> = sqlx::query_scalar(
            "SELECT body FROM packages WHERE dataset_id = ?1 ORDER BY created_at_us ASC, rowid ASC",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;
        bodies
            .iter()
            .map(|b| serde_json::from_str(b).map_err(StoreError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DataSourceType;
    use tempfile::TempDir;

    async fn store_in(dir: &TempDir) -> SqliteStore {
        let url = format!("sqlite://{}", dir.path().join("refine.db").display());
        SqliteStore::connect(&url).await.expect("connect")
    }

    #[tokio::test]
    async fn test_dataset_round_trip() {
        let dir = TempDir::new().expect("tempdir");
        let store = store_in(&dir).await;

        let mut ds = Dataset::new("speech", DataSourceType::Enterprise, "acme")
            .with_description("call center audio");
        ds.metadata.insert("region".to_string(), "eu".to_string());
        ds.license_type = Some("commercial".to_string());
        store.save_dataset(&ds).await.expect("save");

        let loaded = store.get_dataset(ds.id).await.expect("get").expect("present");
        assert_eq!(loaded.name, "speech");
        assert_eq!(loaded.stage(), PipelineStage::Ingested);
        assert_eq!(loaded.metadata.get("region").map(String::as_str), Some("eu"));
        assert_eq!(loaded.license_type.as_deref(), Some("commercial"));

        store
            .set_stage(ds.id, PipelineStage::Stored)
            .await
            .expect("stage");
        let loaded = store.get_dataset(ds.id).await.expect("get").expect("present");
        assert_eq!(loaded.stage(), PipelineStage::Stored);
    }

    #[tokio::test]
    async fn test_unknown_dataset() {
        let dir = TempDir::new().expect("tempdir");
        let store = store_in(&dir).await;
        assert!(store.get_dataset(DatasetId::new()).await.expect("get").is_none());
        let err = store
            .set_stage(DatasetId::new(), PipelineStage::Refining)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(store.list_records(DatasetId::new()).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn test_reopen_keeps_data() {
        let dir = TempDir::new().expect("tempdir");
        let ds = Dataset::new("persisted", DataSourceType::Crowd, "u1");
        {
            let store = store_in(&dir).await;
            store.save_dataset(&ds).await.expect("save");
        }
        let store = store_in(&dir).await;
        assert!(store.get_dataset(ds.id).await.expect("get").is_some());
    }

    #[tokio::test]
    async fn test_begin_refinement_across_pools() {
        let dir = TempDir::new().expect("tempdir");
        let first = store_in(&dir).await;
        let second = store_in(&dir).await;
        let ds = Dataset::new("shared", DataSourceType::Crowd, "u1").with_stage(PipelineStage::Stored);
        first.save_dataset(&ds).await.expect("save");

        assert!(first
            .begin_refinement(ds.id, PipelineStage::Stored)
            .await
            .expect("claim"));
        assert!(!second
            .begin_refinement(ds.id, PipelineStage::Stored)
            .await
            .expect("second claim"));
        let loaded = second.get_dataset(ds.id).await.expect("get").expect("present");
        assert_eq!(loaded.stage(), PipelineStage::Refining);

        second
            .set_stage(ds.id, PipelineStage::Stored)
            .await
            .expect("restore");
        assert!(second
            .begin_refinement(ds.id, PipelineStage::Stored)
            .await
            .expect("claim after restore"));
    }
}
