//! End-to-end tests for the refinement pipeline.
//!
//! Most tests run against the in-memory collaborators. Two use SQLite on
//! disk: one shares a database file between orchestrators, the last goes
//! through ingestion, refinement and packaging.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use datarefinery::dataset::{DataSourceType, Dataset, DatasetId, Item, ItemDescriptor, ItemId, PipelineStage};
use datarefinery::dedup::DedupMethod;
use datarefinery::error::{ErrorKind, ItemError, RefineError};
use datarefinery::ingest::{IngestService, NewDataset};
use datarefinery::packaging::{PackageRequest, PackageService, ProvenanceStep};
use datarefinery::pipeline::{
    FailureStage, RefineConfig, RefineOptions, RefinementComponents, RefinementOrchestrator,
};
use datarefinery::quality::{DimensionScores, ItemScorer, QualityReport};
use datarefinery::similarity::{Embedder, Embedding};
use datarefinery::storage::{
    DirectoryItemSource, ItemSource, MemoryItemSource, MemoryStore, RefinementStore, SourceError,
    SqliteStore,
};

const COPY: &[u8] = b"Quarterly revenue grew across every region after the product launch.";

/// Scores every item with a fixed aggregate keyed by item id.
struct FixedScorer(HashMap<String, f64>);

impl ItemScorer for FixedScorer {
    fn score_item(&self, item: &Item) -> Result<QualityReport, ItemError> {
        let v = self.0.get(item.id().as_str()).copied().unwrap_or(0.9);
        Ok(QualityReport::new(
            item.id().clone(),
            DimensionScores::new(v, v, v, v, v),
            Vec::new(),
        ))
    }
}

/// Returns fixed 2-D embeddings keyed by item id.
struct FixedEmbedder(HashMap<String, (f64, f64)>);

impl Embedder for FixedEmbedder {
    fn embed(&self, item: &Item) -> Embedding {
        let (x, y) = self.0.get(item.id().as_str()).copied().unwrap_or((0.0, 1.0));
        Embedding::from_vec(vec![x, y])
    }

    fn dimension(&self) -> usize {
        2
    }
}

fn scenario_components(config: &RefineConfig) -> RefinementComponents {
    let scores = HashMap::from([
        ("a".to_string(), 0.9),
        ("b".to_string(), 0.9),
        ("c".to_string(), 0.8),
        ("d".to_string(), 0.3),
    ]);
    let embeddings = HashMap::from([
        ("a".to_string(), (1.0, 0.0)),
        ("b".to_string(), (1.0, 0.0)),
        ("c".to_string(), (0.96, 0.28)),
        ("d".to_string(), (0.0, 1.0)),
    ]);
    RefinementComponents::from_config(config)
        .with_scorer(Arc::new(FixedScorer(scores)))
        .with_embedder(Arc::new(FixedEmbedder(embeddings)))
}

struct Harness {
    orchestrator: RefinementOrchestrator,
    source: Arc<MemoryItemSource>,
    store: Arc<MemoryStore>,
    dataset: Dataset,
}

async fn scenario_harness() -> Harness {
    let config = RefineConfig::default().with_worker_count(2);
    let source = Arc::new(MemoryItemSource::new());
    let store = Arc::new(MemoryStore::new());

    let dataset = Dataset::new("scenario", DataSourceType::Crowd, "supplier-1").with_stage(PipelineStage::Stored);
    store.save_dataset(&dataset).await.expect("save dataset");

    source.add_item(dataset.id, "a", COPY).await;
    source.add_item(dataset.id, "b", COPY).await;
    source
        .add_item(dataset.id, "c", b"Revenue grew in every region following the launch.".to_vec())
        .await;
    source
        .add_item(dataset.id, "d", b"lorem ipsum placeholder".to_vec())
        .await;

    let components = scenario_components(&config);
    let orchestrator = RefinementOrchestrator::new(config, components, source.clone(), store.clone());
    Harness {
        orchestrator,
        source,
        store,
        dataset,
    }
}

async fn stage_of(store: &MemoryStore, id: DatasetId) -> PipelineStage {
    store
        .get_dataset(id)
        .await
        .expect("query")
        .expect("dataset")
        .stage()
}

#[tokio::test]
async fn test_four_item_scenario() {
    let h = scenario_harness().await;

    let record = h
        .orchestrator
        .refine_dataset(h.dataset.id, 0.5)
        .await
        .expect("refinement");

    assert_eq!(record.items_processed(), 4);
    assert_eq!(record.items_passed(), 1);
    assert_eq!(record.items_rejected(), 3);
    assert_eq!(record.duplicates_found(), 2);

    assert_eq!(record.duplicate_groups().len(), 1);
    let group = &record.duplicate_groups()[0];
    assert_eq!(
        group.members,
        vec![ItemId::from("a"), ItemId::from("b"), ItemId::from("c")]
    );
    assert_eq!(group.survivor, ItemId::from("a"));
    assert_eq!(group.method, DedupMethod::Hybrid);
    let similarity = group.similarity.expect("semantic edge");
    assert!((similarity - 0.96).abs() < 1e-9);

    let passed: Vec<&ItemId> = record.passed_items().map(|o| &o.item_id).collect();
    assert_eq!(passed, vec![&ItemId::from("a")]);
    let d = record
        .items()
        .iter()
        .find(|o| o.item_id == ItemId::from("d"))
        .expect("d outcome");
    assert!(!d.passed);
    assert_eq!(d.rejection_reasons.len(), 1);

    assert_eq!(stage_of(&h.store, h.dataset.id).await, PipelineStage::Refined);
    let stored = h.store.get_dataset(h.dataset.id).await.expect("query").expect("dataset");
    assert!((stored.quality_score() - record.aggregate_quality()).abs() < 1e-12);
}

#[tokio::test]
async fn test_hash_method_groups_only_identical_items() {
    let h = scenario_harness().await;

    let record = h
        .orchestrator
        .refine_dataset_with(h.dataset.id, RefineOptions::new(0.5).with_method(DedupMethod::Hash))
        .await
        .expect("refinement");

    assert_eq!(record.duplicate_groups().len(), 1);
    assert_eq!(
        record.duplicate_groups()[0].members,
        vec![ItemId::from("a"), ItemId::from("b")]
    );
    assert_eq!(record.items_passed(), 2);
    assert_eq!(record.items_passed() + record.items_rejected(), record.items_processed());
}

#[tokio::test]
async fn test_rerun_appends_later_record() {
    let h = scenario_harness().await;

    let first = h.orchestrator.refine_dataset(h.dataset.id, 0.5).await.expect("first run");
    let second = h.orchestrator.refine_dataset(h.dataset.id, 0.5).await.expect("second run");

    assert_ne!(first.id(), second.id());
    assert!(second.created_at() > first.created_at());

    let history = h.orchestrator.history(h.dataset.id).await.expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id(), first.id());
    assert_eq!(history[1].id(), second.id());

    let status = h.orchestrator.refinement_status(h.dataset.id).await.expect("status");
    assert_eq!(status.runs, 2);
    assert_eq!(status.latest_record_id, Some(second.id()));
}

#[tokio::test]
async fn test_missing_dataset_and_bad_threshold() {
    let h = scenario_harness().await;

    let err = h
        .orchestrator
        .refine_dataset(DatasetId::new(), 0.5)
        .await
        .expect_err("unknown dataset");
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = h
        .orchestrator
        .refine_dataset(h.dataset.id, 1.5)
        .await
        .expect_err("threshold out of range");
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(stage_of(&h.store, h.dataset.id).await, PipelineStage::Stored);
    assert!(h.orchestrator.history(h.dataset.id).await.expect("history").is_empty());
}

#[tokio::test]
async fn test_persisted_refining_stage_conflicts() {
    let h = scenario_harness().await;
    let busy = h.dataset.clone().with_stage(PipelineStage::Refining);
    h.store.save_dataset(&busy).await.expect("save");

    let err = h
        .orchestrator
        .refine_dataset(h.dataset.id, 0.5)
        .await
        .expect_err("already refining");
    assert!(matches!(err, RefineError::Conflict(id) if id == h.dataset.id));
}

/// Delays listing so a second run can start while the first is in flight.
struct SlowSource {
    inner: Arc<MemoryItemSource>,
    delay: Duration,
}

#[async_trait]
impl ItemSource for SlowSource {
    async fn list_items(&self, dataset: &Dataset) -> Result<Vec<ItemDescriptor>, SourceError> {
        tokio::time::sleep(self.delay).await;
        self.inner.list_items(dataset).await
    }

    async fn read_item(&self, dataset: &Dataset, descriptor: &ItemDescriptor) -> Result<Vec<u8>, SourceError> {
        self.inner.read_item(dataset, descriptor).await
    }
}

#[tokio::test]
async fn test_concurrent_run_conflicts() {
    let h = scenario_harness().await;
    let config = RefineConfig::default().with_worker_count(2);
    let components = scenario_components(&config);
    let slow = Arc::new(SlowSource {
        inner: h.source.clone(),
        delay: Duration::from_millis(200),
    });
    let orchestrator = RefinementOrchestrator::new(config, components, slow, h.store.clone());

    let (first, second) = tokio::join!(
        orchestrator.refine_dataset(h.dataset.id, 0.5),
        orchestrator.refine_dataset(h.dataset.id, 0.5)
    );

    assert!(first.is_ok());
    let err = second.expect_err("second run must conflict");
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(orchestrator.history(h.dataset.id).await.expect("history").len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_orchestrators_sharing_sqlite_file_conflict() {
    let tmp = TempDir::new().expect("tempdir");
    let url = format!("sqlite://{}/shared.db", tmp.path().display());
    let first_store = Arc::new(SqliteStore::connect(&url).await.expect("connect first"));
    let second_store = Arc::new(SqliteStore::connect(&url).await.expect("connect second"));

    let dataset = Dataset::new("shared", DataSourceType::Crowd, "supplier-1").with_stage(PipelineStage::Stored);
    first_store.save_dataset(&dataset).await.expect("save dataset");

    let items = Arc::new(MemoryItemSource::new());
    items.add_item(dataset.id, "a", COPY).await;
    items.add_item(dataset.id, "d", b"lorem ipsum placeholder".to_vec()).await;

    let build = |store: Arc<SqliteStore>| {
        let config = RefineConfig::default().with_worker_count(2);
        let components = scenario_components(&config);
        let slow = Arc::new(SlowSource {
            inner: items.clone(),
            delay: Duration::from_millis(200),
        });
        RefinementOrchestrator::new(config, components, slow, store)
    };
    let first = build(first_store.clone());
    let second = build(second_store.clone());

    let (a, b) = tokio::join!(
        first.refine_dataset(dataset.id, 0.5),
        second.refine_dataset(dataset.id, 0.5)
    );

    let conflicts = [&a, &b]
        .iter()
        .filter(|r| matches!(r, Err(RefineError::Conflict(_))))
        .count();
    assert_eq!(conflicts, 1, "exactly one run must lose: {:?} / {:?}", a.is_ok(), b.is_ok());
    assert!(a.is_ok() || b.is_ok());
    assert_eq!(first_store.list_records(dataset.id).await.expect("records").len(), 1);

    let stored = second_store.get_dataset(dataset.id).await.expect("query").expect("dataset");
    assert_eq!(stored.stage(), PipelineStage::Refined);
}

/// Analyses some items slowly and panics on others.
struct FaultyScorer {
    slow: String,
    panics: String,
    delay: Duration,
}

impl ItemScorer for FaultyScorer {
    fn score_item(&self, item: &Item) -> Result<QualityReport, ItemError> {
        if item.id().as_str() == self.slow {
            std::thread::sleep(self.delay);
        }
        if item.id().as_str() == self.panics {
            panic!("scorer crashed on {}", item.id());
        }
        Ok(QualityReport::new(
            item.id().clone(),
            DimensionScores::new(0.9, 0.9, 0.9, 0.9, 0.9),
            Vec::new(),
        ))
    }
}

#[tokio::test]
async fn test_timed_out_and_panicked_items_are_local() {
    let h = scenario_harness().await;
    let config = RefineConfig::default()
        .with_worker_count(2)
        .with_item_timeout(Duration::from_millis(100));
    let components = scenario_components(&config).with_scorer(Arc::new(FaultyScorer {
        slow: "b".to_string(),
        panics: "d".to_string(),
        delay: Duration::from_millis(600),
    }));
    let orchestrator = RefinementOrchestrator::new(config, components, h.source.clone(), h.store.clone());

    let record = orchestrator
        .refine_dataset_with(h.dataset.id, RefineOptions::new(0.5).with_method(DedupMethod::Semantic))
        .await
        .expect("refinement");

    assert_eq!(record.items_processed(), 4);
    assert_eq!(record.items_passed() + record.items_rejected(), 4);

    let failed: Vec<&ItemId> = record.error_log().iter().map(|f| &f.item_id).collect();
    assert_eq!(failed, vec![&ItemId::from("b"), &ItemId::from("d")]);
    assert!(record
        .error_log()
        .iter()
        .all(|f| f.stage == FailureStage::Analyze));

    for id in ["b", "d"] {
        let outcome = record
            .items()
            .iter()
            .find(|o| o.item_id == ItemId::from(id))
            .expect("outcome");
        assert_eq!(outcome.quality, 0.0);
        assert!(!outcome.passed);
    }

    // a and c still group semantically; b is no candidate despite sharing a's embedding.
    assert_eq!(record.duplicate_groups().len(), 1);
    assert_eq!(
        record.duplicate_groups()[0].members,
        vec![ItemId::from("a"), ItemId::from("c")]
    );
    let passed: Vec<&ItemId> = record.passed_items().map(|o| &o.item_id).collect();
    assert_eq!(passed, vec![&ItemId::from("a")]);
}

/// Cancels the run once the first item has been read.
struct CancellingSource {
    inner: Arc<MemoryItemSource>,
    token: CancellationToken,
}

#[async_trait]
impl ItemSource for CancellingSource {
    async fn list_items(&self, dataset: &Dataset) -> Result<Vec<ItemDescriptor>, SourceError> {
        self.inner.list_items(dataset).await
    }

    async fn read_item(&self, dataset: &Dataset, descriptor: &ItemDescriptor) -> Result<Vec<u8>, SourceError> {
        let bytes = self.inner.read_item(dataset, descriptor).await;
        self.token.cancel();
        bytes
    }
}

#[tokio::test]
async fn test_cancellation_mid_run_restores_stage() {
    let h = scenario_harness().await;
    let config = RefineConfig::default().with_worker_count(2).with_batch_size(1);
    let components = scenario_components(&config);
    let token = CancellationToken::new();
    let source = Arc::new(CancellingSource {
        inner: h.source.clone(),
        token: token.clone(),
    });
    let orchestrator = RefinementOrchestrator::new(config, components, source, h.store.clone());

    let err = orchestrator
        .refine_dataset_with(h.dataset.id, RefineOptions::new(0.5).with_cancellation(token))
        .await
        .expect_err("cancelled");
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(stage_of(&h.store, h.dataset.id).await, PipelineStage::Stored);
    assert!(h.store.list_records(h.dataset.id).await.expect("records").is_empty());
}

#[tokio::test]
async fn test_unavailable_source_restores_stage() {
    let h = scenario_harness().await;
    h.source.set_unavailable(true);

    let err = h
        .orchestrator
        .refine_dataset(h.dataset.id, 0.5)
        .await
        .expect_err("source offline");
    assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
    assert!(err.is_retryable());
    assert_eq!(stage_of(&h.store, h.dataset.id).await, PipelineStage::Stored);

    h.source.set_unavailable(false);
    h.orchestrator
        .refine_dataset(h.dataset.id, 0.5)
        .await
        .expect("retry succeeds");
}

#[tokio::test]
async fn test_commit_failure_writes_nothing() {
    let h = scenario_harness().await;
    h.store.fail_next_commit();

    let err = h
        .orchestrator
        .refine_dataset(h.dataset.id, 0.5)
        .await
        .expect_err("commit fails");
    assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
    assert_eq!(stage_of(&h.store, h.dataset.id).await, PipelineStage::Stored);
    assert!(h.store.list_records(h.dataset.id).await.expect("records").is_empty());
}

#[tokio::test]
async fn test_unreadable_item_is_logged_not_fatal() {
    let h = scenario_harness().await;
    h.source.mark_unreadable("d").await;

    let record = h
        .orchestrator
        .refine_dataset(h.dataset.id, 0.5)
        .await
        .expect("refinement");
    assert_eq!(record.items_processed(), 4);
    assert_eq!(record.error_log().len(), 1);
    assert_eq!(record.error_log()[0].item_id, ItemId::from("d"));
    assert_eq!(record.items_passed() + record.items_rejected(), 4);
}

#[tokio::test]
async fn test_ingest_refine_package_on_disk() {
    let tmp = TempDir::new().expect("tempdir");
    let upload = tmp.path().join("upload");
    let storage_root = tmp.path().join("cold_storage");
    std::fs::create_dir_all(&upload).expect("mkdir");

    let prose = "The research team collected interviews with farmers about irrigation, \
                 soil quality, seasonal rainfall and crop rotation across three provinces.";
    std::fs::write(upload.join("interview_1.txt"), prose).expect("write");
    std::fs::write(upload.join("interview_2.txt"), prose).expect("write");
    std::fs::write(
        upload.join("yields.csv"),
        "region,crop,tonnes\nnorth,wheat,120\nsouth,maize,95\neast,rice,140\n",
    )
    .expect("write");
    std::fs::write(
        upload.join("interview_1.txt.meta.json"),
        r#"{"source":"field survey","license":"CC-BY","description":"interview","created_at":"2024-03-01"}"#,
    )
    .expect("write");
    std::fs::write(upload.join("installer.exe"), b"MZ\x90\x00").expect("write");

    let url = format!("sqlite://{}/refine.db", tmp.path().display());
    let store = Arc::new(SqliteStore::connect(&url).await.expect("connect"));

    let ingest = IngestService::new(store.clone(), &storage_root);
    let dataset = ingest
        .create_dataset(NewDataset::new("farm interviews", DataSourceType::University, "agri-lab"))
        .await
        .expect("create");
    let report = ingest
        .ingest_directory(dataset.id, &upload)
        .await
        .expect("ingest");
    assert_eq!(report.files_passed, 3);
    assert_eq!(report.files_failed, 1);

    let config = RefineConfig::default()
        .with_worker_count(2)
        .with_storage_root(&storage_root)
        .with_database_url(url.clone());
    let source = Arc::new(DirectoryItemSource::new(&storage_root));
    let orchestrator = RefinementOrchestrator::from_config(config, source, store.clone());

    let record = orchestrator
        .refine_dataset(dataset.id, 0.0)
        .await
        .expect("refinement");
    assert_eq!(record.items_processed(), 3);
    assert!(record.duplicates_found() >= 1);
    assert_eq!(record.items_passed() + record.items_rejected(), record.items_processed());
    assert!(record.error_log().is_empty());

    let packages = PackageService::new(store.clone());
    let package = packages
        .create_package(dataset.id, PackageRequest::new("Farm Interviews").with_license("CC-BY"))
        .await
        .expect("package");
    assert_eq!(package.refinement_record_id, record.id());
    assert_eq!(package.items_count, record.items_passed());
    assert!(package.manifest.entries.iter().all(|e| e.checksum.is_some()));
    assert_eq!(package.provenance.first().map(|p| p.step), Some(ProvenanceStep::Ingestion));
    assert_eq!(package.provenance.last().map(|p| p.step), Some(ProvenanceStep::Packaging));

    let stored = store.get_dataset(dataset.id).await.expect("query").expect("dataset");
    assert_eq!(stored.stage(), PipelineStage::Packaged);

    // Re-refining a packaged dataset is allowed and appends history.
    orchestrator
        .refine_dataset(dataset.id, 0.0)
        .await
        .expect("re-refinement");
    assert_eq!(orchestrator.history(dataset.id).await.expect("history").len(), 2);
}
