//! Refinement orchestrator.
//!
//! The only entry point of the pipeline. A run moves the dataset to
//! `Refining`, then for each batch of items:
//! - reads content from the item source with bounded concurrency
//! - scores, fingerprints, embeds and classifies the items on the worker pool
//!
//! and finally deduplicates, filters and commits one immutable
//! [`RefinementRecord`] together with the move to `Refined`. Any failure after
//! entering `Refining` restores the prior stage and commits nothing.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::classify::{Classification, Classifier};
use crate::dataset::{Dataset, DatasetId, Item, ItemDescriptor, PipelineStage, StageMachine};
use crate::dedup::{DedupCandidate, DedupMethod, Deduplicator};
use crate::error::{ItemError, RefineError};
use crate::hashing::{ContentHasher, Fingerprint};
use crate::metrics::{MetricsCollector, RunOutcome};
use crate::quality::{DatasetQuality, ItemScorer, QualityReport, QualityScorer};
use crate::scheduler::{BatchWorkerPool, TaskOutcome, WorkerPoolConfig};
use crate::similarity::{Embedder, Embedding, HashingEmbedder};
use crate::storage::{ItemSource, RefinementStore, SourceError};

use super::config::RefineConfig;
use super::record::{
    FailureStage, ItemFailure, ItemOutcome, RecordDraft, RefinementMetrics, RefinementRecord,
    RefinementStatus,
};

/// The analysis components a run calls, constructed once and injected.
#[derive(Clone)]
pub struct RefinementComponents {
    pub scorer: Arc<dyn ItemScorer>,
    pub embedder: Arc<dyn Embedder>,
    pub classifier: Arc<Classifier>,
    pub deduplicator: Deduplicator,
}

impl RefinementComponents {
    /// Builds the heuristic components described by `config`.
    pub fn from_config(config: &RefineConfig) -> Self {
        Self {
            scorer: Arc::new(
                QualityScorer::new().with_target_domains(config.target_domains.clone()),
            ),
            embedder: Arc::new(HashingEmbedder::new(config.embedding_dimension)),
            classifier: Arc::new(Classifier::new()),
            deduplicator: Deduplicator::builder()
                .similarity_threshold(config.similarity_threshold)
                .workers(config.worker_count)
                .build(),
        }
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn ItemScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn with_deduplicator(mut self, deduplicator: Deduplicator) -> Self {
        self.deduplicator = deduplicator;
        self
    }
}

/// Per-run options.
#[derive(Debug, Clone)]
pub struct RefineOptions {
    pub quality_threshold: f64,
    /// `None` uses the configured method.
    pub method: Option<DedupMethod>,
    /// Checked before every batch and before commit.
    pub cancel: CancellationToken,
}

impl RefineOptions {
    pub fn new(quality_threshold: f64) -> Self {
        Self {
            quality_threshold,
            method: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_method(mut self, method: DedupMethod) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }
}

/// Output of analysing one readable item on a worker.
struct ItemAnalysis {
    report: QualityReport,
    error: Option<ItemError>,
    fingerprint: Fingerprint,
    embedding: Option<Embedding>,
    classification: Classification,
}

/// Everything known about one item after its batch.
struct ItemResult {
    descriptor: ItemDescriptor,
    analysis: Option<ItemAnalysis>,
    failure: Option<(FailureStage, ItemError)>,
}

fn analyze_item(
    item: Item,
    scorer: &dyn ItemScorer,
    embedder: &dyn Embedder,
    classifier: &Classifier,
    embed: bool,
) -> ItemAnalysis {
    let fingerprint = ContentHasher::hash_bytes(item.content());
    let classification = classifier.classify_item(&item);
    let embedding = embed.then(|| embedder.embed(&item));
    let (report, error) = match scorer.score_item(&item) {
        Ok(report) => (report, None),
        Err(err) => (QualityReport::zero(item.id().clone()), Some(err)),
    };
    ItemAnalysis {
        report,
        error,
        fingerprint,
        embedding,
        classification,
    }
}

/// Removes a dataset from the in-flight set when dropped.
struct RunGuard<'a> {
    in_flight: &'a Mutex<HashSet<DatasetId>>,
    id: DatasetId,
}

impl<'a> RunGuard<'a> {
    fn acquire(in_flight: &'a Mutex<HashSet<DatasetId>>, id: DatasetId) -> Option<Self> {
        let inserted = in_flight
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(id);
        inserted.then(|| Self { in_flight, id })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut set = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        set.remove(&self.id);
    }
}

fn source_error(err: SourceError) -> RefineError {
    RefineError::StorageUnavailable(err.to_string())
}

/// Sequences scoring, deduplication, classification and filtering.
pub struct RefinementOrchestrator {
    config: RefineConfig,
    components: RefinementComponents,
    source: Arc<dyn ItemSource>,
    store: Arc<dyn RefinementStore>,
    stages: StageMachine,
    pool: BatchWorkerPool,
    in_flight: Mutex<HashSet<DatasetId>>,
    metrics: MetricsCollector,
}

impl RefinementOrchestrator {
    pub fn new(
        config: RefineConfig,
        components: RefinementComponents,
        source: Arc<dyn ItemSource>,
        store: Arc<dyn RefinementStore>,
    ) -> Self {
        let pool = BatchWorkerPool::new(
            WorkerPoolConfig::new(config.worker_count).with_task_timeout(config.item_timeout),
        );
        Self {
            config,
            components,
            source,
            store,
            stages: StageMachine::new(),
            pool,
            in_flight: Mutex::new(HashSet::new()),
            metrics: MetricsCollector::new(),
        }
    }

    /// Builds an orchestrator with the heuristic components from `config`.
    pub fn from_config(
        config: RefineConfig,
        source: Arc<dyn ItemSource>,
        store: Arc<dyn RefinementStore>,
    ) -> Self {
        let components = RefinementComponents::from_config(&config);
        Self::new(config, components, source, store)
    }

    pub fn config(&self) -> &RefineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RefinementStore> {
        &self.store
    }

    /// Refines a dataset with the configured dedup method.
    pub async fn refine_dataset(
        &self,
        dataset_id: DatasetId,
        quality_threshold: f64,
    ) -> Result<RefinementRecord, RefineError> {
        self.refine_dataset_with(dataset_id, RefineOptions::new(quality_threshold))
            .await
    }

    /// Refines a dataset.
    ///
    /// # Errors
    ///
    /// Checked in this order, before any side effect:
    /// - [`RefineError::NotFound`] for an unknown dataset
    /// - [`RefineError::Validation`] for a threshold outside [0, 1]
    /// - [`RefineError::Conflict`] when a run is already in flight
    ///
    /// After the dataset entered `Refining`, [`RefineError::StorageUnavailable`],
    /// [`RefineError::Cancelled`] and store failures restore the prior stage.
    pub async fn refine_dataset_with(
        &self,
        dataset_id: DatasetId,
        options: RefineOptions,
    ) -> Result<RefinementRecord, RefineError> {
        let mut dataset = self
            .store
            .get_dataset(dataset_id)
            .await
            .map_err(RefineError::from_store)?
            .ok_or_else(|| RefineError::NotFound(dataset_id.to_string()))?;

        if !(0.0..=1.0).contains(&options.quality_threshold) {
            return Err(RefineError::Validation(format!(
                "quality_threshold must be between 0.0 and 1.0, got {}",
                options.quality_threshold
            )));
        }

        let _guard = RunGuard::acquire(&self.in_flight, dataset_id)
            .ok_or(RefineError::Conflict(dataset_id))?;
        if !self.stages.can_refine(dataset.stage()) {
            return Err(RefineError::Conflict(dataset_id));
        }

        let prior = dataset.stage();
        self.stages.transition(&mut dataset, PipelineStage::Refining)?;
        // Other processes sharing the store are only excluded here.
        let claimed = self
            .store
            .begin_refinement(dataset_id, prior)
            .await
            .map_err(RefineError::from_store)?;
        if !claimed {
            warn!(dataset_id = %dataset_id, "Refinement already claimed by another run");
            return Err(RefineError::Conflict(dataset_id));
        }

        let method = options.method.unwrap_or(self.config.dedup_method);
        let started = Instant::now();
        self.metrics.run_started();
        info!(
            dataset_id = %dataset_id,
            threshold = options.quality_threshold,
            method = %method,
            "Starting refinement"
        );

        let result = match self.run(&dataset, &options, method, started).await {
            Ok(record) => self
                .store
                .commit_refinement(&record, PipelineStage::Refined)
                .await
                .map(|()| record)
                .map_err(|e| {
                    error!(dataset_id = %dataset_id, error = %e, "Commit failed");
                    RefineError::from_store(e)
                }),
            Err(e) => Err(e),
        };

        let elapsed = started.elapsed().as_secs_f64();
        match result {
            Ok(record) => {
                self.metrics.record_run(RunOutcome::Committed, elapsed);
                self.metrics
                    .record_items(record.items_passed(), record.items_rejected(), record.aggregate_quality());
                self.metrics
                    .record_duplicates(record.dedup_method().as_str(), record.duplicates_found());
                info!(
                    dataset_id = %dataset_id,
                    record_id = %record.id(),
                    items = record.items_processed(),
                    passed = record.items_passed(),
                    rejected = record.items_rejected(),
                    duplicates = record.duplicates_found(),
                    quality = record.aggregate_quality(),
                    "Refinement committed"
                );
                Ok(record)
            }
            Err(err) => {
                let outcome = match &err {
                    RefineError::Cancelled(_) => RunOutcome::Cancelled,
                    _ => RunOutcome::Failed,
                };
                self.metrics.record_run(outcome, elapsed);
                self.rollback(&mut dataset, prior, &err).await;
                Err(err)
            }
        }
    }

    /// Restores the pre-run stage. A failure here is logged, the original
    /// error is what the caller sees.
    async fn rollback(&self, dataset: &mut Dataset, prior: PipelineStage, cause: &RefineError) {
        warn!(
            dataset_id = %dataset.id,
            stage = %prior,
            error = %cause,
            "Refinement aborted, restoring stage"
        );
        if let Err(e) = self.stages.restore(dataset, prior) {
            error!(dataset_id = %dataset.id, error = %e, "Stage restore rejected");
            return;
        }
        if let Err(e) = self.store.set_stage(dataset.id, prior).await {
            error!(dataset_id = %dataset.id, error = %e, "Failed to persist stage restore");
        }
    }

    async fn run(
        &self,
        dataset: &Dataset,
        options: &RefineOptions,
        method: DedupMethod,
        started: Instant,
    ) -> Result<RefinementRecord, RefineError> {
        let previous = self
            .store
            .latest_record(dataset.id)
            .await
            .map_err(RefineError::from_store)?;
        let descriptors = self
            .source
            .list_items(dataset)
            .await
            .map_err(source_error)?;

        let embed = method != DedupMethod::Hash;
        let mut results: Vec<ItemResult> = Vec::with_capacity(descriptors.len());
        let batch_size = self.config.batch_size.max(1);
        let batches = descriptors.len().div_ceil(batch_size);

        for (index, batch) in descriptors.chunks(batch_size).enumerate() {
            if options.cancel.is_cancelled() {
                return Err(RefineError::Cancelled(dataset.id));
            }
            let batch_results = self.process_batch(dataset, batch, embed).await?;
            results.extend(batch_results);
            debug!(
                dataset_id = %dataset.id,
                batch = index + 1,
                batches = batches,
                items = results.len(),
                "Batch processed"
            );
        }

        let record = self.assemble(dataset.id, results, options.quality_threshold, method, previous, started).await?;

        if options.cancel.is_cancelled() {
            return Err(RefineError::Cancelled(dataset.id));
        }
        Ok(record)
    }

    async fn process_batch(
        &self,
        dataset: &Dataset,
        batch: &[ItemDescriptor],
        embed: bool,
    ) -> Result<Vec<ItemResult>, RefineError> {
        let source = &self.source;
        let reads: Vec<(ItemDescriptor, Result<Vec<u8>, SourceError>)> = stream::iter(batch.iter().cloned())
            .map(|descriptor| async move {
                let content = source.read_item(dataset, &descriptor).await;
                (descriptor, content)
            })
            .buffered(self.config.read_concurrency.max(1))
            .collect()
            .await;

        let mut results = Vec::with_capacity(reads.len());
        let mut readable = Vec::new();
        for (descriptor, content) in reads {
            match content {
                Ok(bytes) => {
                    readable.push((results.len(), Item::new(descriptor.clone(), bytes)));
                    results.push(ItemResult {
                        descriptor,
                        analysis: None,
                        failure: None,
                    });
                }
                Err(err) if err.is_fatal() => return Err(source_error(err)),
                Err(err) => {
                    warn!(dataset_id = %dataset.id, item = %descriptor.id, error = %err, "Item unreadable");
                    results.push(ItemResult {
                        descriptor,
                        analysis: None,
                        failure: Some((FailureStage::Read, ItemError::Unreadable(err.to_string()))),
                    });
                }
            }
        }

        let (slots, items): (Vec<usize>, Vec<Item>) = readable.into_iter().unzip();
        let scorer = Arc::clone(&self.components.scorer);
        let embedder = Arc::clone(&self.components.embedder);
        let classifier = Arc::clone(&self.components.classifier);
        let outcomes = self
            .pool
            .run_ordered(items, move |item| {
                analyze_item(item, scorer.as_ref(), embedder.as_ref(), &classifier, embed)
            })
            .await;

        for (slot, outcome) in slots.into_iter().zip(outcomes) {
            let result = &mut results[slot];
            match outcome {
                TaskOutcome::Completed(mut analysis) => {
                    if let Some(err) = analysis.error.take() {
                        warn!(dataset_id = %dataset.id, item = %result.descriptor.id, error = %err, "Item analysis failed");
                        result.failure = Some((FailureStage::Analyze, err));
                    }
                    result.analysis = Some(analysis);
                }
                TaskOutcome::TimedOut(limit) => {
                    warn!(dataset_id = %dataset.id, item = %result.descriptor.id, "Item analysis timed out");
                    result.failure = Some((FailureStage::Analyze, ItemError::TimedOut(limit)));
                }
                TaskOutcome::Panicked(msg) => {
                    result.failure = Some((FailureStage::Analyze, ItemError::WorkerPanicked(msg)));
                }
            }
        }

        Ok(results)
    }

    async fn assemble(
        &self,
        dataset_id: DatasetId,
        results: Vec<ItemResult>,
        quality_threshold: f64,
        method: DedupMethod,
        previous: Option<RefinementRecord>,
        started: Instant,
    ) -> Result<RefinementRecord, RefineError> {
        let mut reports = Vec::with_capacity(results.len());
        let mut candidates = Vec::new();
        let mut classifications = Vec::with_capacity(results.len());
        let mut outcomes = Vec::with_capacity(results.len());
        let mut error_log = Vec::new();

        for result in results {
            let ItemResult {
                descriptor,
                analysis,
                failure,
            } = result;

            if let Some((stage, err)) = failure {
                self.metrics.record_item_failure(stage.as_str());
                error_log.push(ItemFailure {
                    item_id: descriptor.id.clone(),
                    ordinal: descriptor.ordinal,
                    stage,
                    message: err.to_string(),
                });
            }

            let (report, fingerprint, classification) = match analysis {
                Some(analysis) => {
                    let mut candidate = DedupCandidate::new(
                        descriptor.id.clone(),
                        descriptor.ordinal,
                        analysis.report.aggregate,
                    )
                    .with_fingerprint(analysis.fingerprint.clone());
                    if let Some(embedding) = analysis.embedding {
                        candidate = candidate.with_embedding(embedding);
                    }
                    candidates.push(candidate);
                    (analysis.report, Some(analysis.fingerprint), analysis.classification)
                }
                None => (
                    QualityReport::zero(descriptor.id.clone()),
                    None,
                    Classification::unknown(descriptor.id.clone()),
                ),
            };

            outcomes.push(ItemOutcome {
                item_id: descriptor.id.clone(),
                ordinal: descriptor.ordinal,
                quality: report.aggregate,
                passed: false,
                rejection_reasons: Vec::new(),
                fingerprint,
                media_type: descriptor.media_type.clone(),
                size_bytes: descriptor.size_bytes,
                classification: classification.clone(),
            });
            classifications.push(classification);
            reports.push(report);
        }

        let deduplicator = self.components.deduplicator.clone();
        let dedup = tokio::task::spawn_blocking(move || deduplicator.find_duplicates(&candidates, method))
            .await
            .map_err(|e| RefineError::Internal(format!("deduplication worker failed: {}", e)))?;

        let quality = DatasetQuality::from_reports(reports);
        let classification = self.components.classifier.aggregate(classifications.iter());

        let draft = RecordDraft {
            dataset_id,
            quality_threshold,
            similarity_threshold: self.components.deduplicator.similarity_threshold(),
            dimension_scores: quality.dimensions,
            aggregate_quality: quality.aggregate,
            dedup,
            classification,
            items: outcomes,
            error_log,
            duration_seconds: started.elapsed().as_secs_f64(),
        };
        Ok(draft.finish(next_timestamp(previous.as_ref())))
    }

    /// Current stage, quality and latest-run counts of a dataset.
    pub async fn refinement_status(&self, dataset_id: DatasetId) -> Result<RefinementStatus, RefineError> {
        let dataset = self.require_dataset(dataset_id).await?;
        let records = self.store.list_records(dataset_id).await.map_err(RefineError::from_store)?;
        let latest = records.last();
        Ok(RefinementStatus {
            dataset_id,
            stage: dataset.stage(),
            quality_score: dataset.quality_score(),
            runs: records.len(),
            latest_record_id: latest.map(RefinementRecord::id),
            last_refined_at: latest.map(RefinementRecord::created_at),
            items_processed: latest.map_or(0, RefinementRecord::items_processed),
            items_passed: latest.map_or(0, RefinementRecord::items_passed),
            items_rejected: latest.map_or(0, RefinementRecord::items_rejected),
            duplicates_found: latest.map_or(0, RefinementRecord::duplicates_found),
        })
    }

    /// Full refinement history, oldest first.
    pub async fn history(&self, dataset_id: DatasetId) -> Result<Vec<RefinementRecord>, RefineError> {
        self.require_dataset(dataset_id).await?;
        self.store.list_records(dataset_id).await.map_err(RefineError::from_store)
    }

    /// Pass-rate and duration summary over the dataset's history.
    pub async fn export_metrics(&self, dataset_id: DatasetId) -> Result<RefinementMetrics, RefineError> {
        let records = self.history(dataset_id).await?;
        Ok(RefinementMetrics::from_history(dataset_id, &records))
    }

    async fn require_dataset(&self, dataset_id: DatasetId) -> Result<Dataset, RefineError> {
        self.store
            .get_dataset(dataset_id)
            .await
            .map_err(RefineError::from_store)?
            .ok_or_else(|| RefineError::NotFound(dataset_id.to_string()))
    }
}

/// Now, or one microsecond after the previous record if the clock has not
/// moved past it.
fn next_timestamp(previous: Option<&RefinementRecord>) -> DateTime<Utc> {
    let now = Utc::now();
    match previous {
        Some(prev) if now <= prev.created_at() => prev.created_at() + chrono::Duration::microseconds(1),
        _ => now,
    }
}
