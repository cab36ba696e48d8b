//! In-memory collaborators, used by tests and single-process tooling.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::dataset::{Dataset, DatasetId, ItemDescriptor, ItemId, PipelineStage};
use crate::packaging::DataPackage;
use crate::pipeline::RefinementRecord;

use super::source::{ItemSource, SourceError};
use super::store::{RefinementStore, StoreError};

/// Item source holding content in memory, with optional failure injection.
#[derive(Default)]
pub struct MemoryItemSource {
    items: RwLock<HashMap<DatasetId, Vec<(ItemDescriptor, Vec<u8>)>>>,
    unreadable: RwLock<HashSet<ItemId>>,
    unavailable: AtomicBool,
}

impl MemoryItemSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an item; its ordinal is its position in the dataset.
    pub async fn add_item(
        &self,
        dataset_id: DatasetId,
        id: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> ItemDescriptor {
        let content = content.into();
        let mut items = self.items.write().await;
        let entries = items.entry(dataset_id).or_default();
        let descriptor = ItemDescriptor::new(id, entries.len() as u64, content.len() as u64);
        entries.push((descriptor.clone(), content));
        descriptor
    }

    /// Appends an item with a caller-built descriptor. The ordinal is kept.
    pub async fn add_descriptor(
        &self,
        dataset_id: DatasetId,
        descriptor: ItemDescriptor,
        content: impl Into<Vec<u8>>,
    ) {
        let mut items = self.items.write().await;
        items
            .entry(dataset_id)
            .or_default()
            .push((descriptor, content.into()));
    }

    /// Makes reads of `item` fail with [`SourceError::ItemUnreadable`].
    pub async fn mark_unreadable(&self, item: impl Into<String>) {
        self.unreadable.write().await.insert(ItemId::new(item));
    }

    /// Makes every call fail with [`SourceError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), SourceError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(SourceError::Unavailable("memory source offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ItemSource for MemoryItemSource {
    async fn list_items(&self, dataset: &Dataset) -> Result<Vec<ItemDescriptor>, SourceError> {
        self.check_available()?;
        let items = self.items.read().await;
        let mut descriptors: Vec<ItemDescriptor> = items
            .get(&dataset.id)
            .map(|entries| entries.iter().map(|(d, _)| d.clone()).collect())
            .unwrap_or_default();
        descriptors.sort_by_key(|d| d.ordinal);
        Ok(descriptors)
    }

    async fn read_item(
        &self,
        dataset: &Dataset,
        descriptor: &ItemDescriptor,
    ) -> Result<Vec<u8>, SourceError> {
        self.check_available()?;
        if self.unreadable.read().await.contains(&descriptor.id) {
            return Err(SourceError::ItemUnreadable {
                item: descriptor.id.to_string(),
                reason: "marked unreadable".to_string(),
            });
        }
        let items = self.items.read().await;
        items
            .get(&dataset.id)
            .and_then(|entries| entries.iter().find(|(d, _)| d.id == descriptor.id))
            .map(|(_, content)| content.clone())
            .ok_or_else(|| SourceError::ItemUnreadable {
                item: descriptor.id.to_string(),
                reason: "no such item".to_string(),
            })
    }
}

#[derive(Default)]
struct MemoryState {
    datasets: HashMap<DatasetId, Dataset>,
    records: HashMap<DatasetId, Vec<RefinementRecord>>,
    packages: HashMap<DatasetId, Vec<DataPackage>>,
}

/// Store keeping everything in memory behind one lock.
///
/// Every write takes the single write lock, so multi-part writes are atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    fail_next_commit: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next [`RefinementStore::commit_refinement`] fail without
    /// writing anything.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RefinementStore for MemoryStore {
    async fn get_dataset(&self, id: DatasetId) -> Result<Option<Dataset>, StoreError> {
        Ok(self.state.read().await.datasets.get(&id).cloned())
    }

    async fn save_dataset(&self, dataset: &Dataset) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .datasets
            .insert(dataset.id, dataset.clone());
        Ok(())
    }

    async fn set_stage(&self, id: DatasetId, stage: PipelineStage) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let dataset = state
            .datasets
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        dataset.stage = stage;
        dataset.updated_at = Utc::now();
        Ok(())
    }

    async fn begin_refinement(
        &self,
        id: DatasetId,
        expected: PipelineStage,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let dataset = state
            .datasets
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if dataset.stage != expected || dataset.stage == PipelineStage::Refining {
            return Ok(false);
        }
        dataset.stage = PipelineStage::Refining;
        dataset.updated_at = Utc::now();
        Ok(true)
    }

    async fn commit_refinement(
        &self,
        record: &RefinementRecord,
        stage: PipelineStage,
    ) -> Result<(), StoreError> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected commit failure".to_string()));
        }
        let mut state = self.state.write().await;
        let dataset = state
            .datasets
            .get_mut(&record.dataset_id())
            .ok_or_else(|| StoreError::NotFound(record.dataset_id().to_string()))?;
        dataset.stage = stage;
        dataset.quality_score = record.aggregate_quality();
        dataset.updated_at = Utc::now();
        state
            .records
            .entry(record.dataset_id())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn latest_record(&self, id: DatasetId) -> Result<Option<RefinementRecord>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .records
            .get(&id)
            .and_then(|records| records.iter().max_by_key(|r| r.created_at()))
            .cloned())
    }

    async fn list_records(&self, id: DatasetId) -> Result<Vec<RefinementRecord>, StoreError> {
        let state = self.state.read().await;
        let mut records = state.records.get(&id).cloned().unwrap_or_default();
        records.sort_by_key(|r| r.created_at());
        Ok(records)
    }

    async fn save_package(
        &self,
        package: &DataPackage,
        stage: PipelineStage,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let dataset = state
            .datasets
            .get_mut(&package.dataset_id)
            .ok_or_else(|| StoreError::NotFound(package.dataset_id.to_string()))?;
        dataset.stage = stage;
        dataset.updated_at = Utc::now();
        state
            .packages
            .entry(package.dataset_id)
            .or_default()
            .push(package.clone());
        Ok(())
    }

    async fn list_packages(&self, id: DatasetId) -> Result<Vec<DataPackage>, StoreError> {
        let state = self.state.read().await;
        let mut packages = state.packages.get(&id).cloned().unwrap_or_default();
        packages.sort_by_key(|p| p.created_at);
        Ok(packages)
    }
}
