//! CLI command definitions for datarefinery.
//!
//! Every command opens the configured SQLite store. Item content is read
//! from the storage root the datasets were ingested into.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::dataset::{DataSourceType, DatasetId};
use crate::dedup::DedupMethod;
use crate::ingest::{IngestService, NewDataset};
use crate::metrics::{export_metrics, init_metrics};
use crate::packaging::{PackageRequest, PackageService};
use crate::pipeline::{RefineConfig, RefineOptions, RefinementOrchestrator, RefinementRecord};
use crate::storage::{DirectoryItemSource, SqliteStore};

/// Refines supplier datasets into curated data packages.
#[derive(Parser)]
#[command(name = "datarefinery")]
#[command(about = "Ingest, refine and package datasets")]
#[command(version)]
#[command(
    long_about = "datarefinery scores, deduplicates and classifies supplier datasets, then packages the items that pass.\n\nExample usage:\n  datarefinery ingest ./upload --name reviews --source-type crowd --owner supplier-1\n  datarefinery refine <dataset-id> --threshold 0.6\n  datarefinery package <dataset-id> --name \"Reviews v1\""
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// YAML configuration file. Environment variables override its values.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database URL.
    #[arg(long, global = true, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Root directory of stored dataset items.
    #[arg(long, global = true, env = "REFINE_STORAGE_ROOT")]
    pub storage_root: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Validate and store a directory of supplier files.
    Ingest(IngestArgs),

    /// Run the refinement pipeline on a dataset.
    Refine(RefineArgs),

    /// Show the pipeline stage and latest refinement of a dataset.
    Status(DatasetArgs),

    /// List every refinement record of a dataset, oldest first.
    History(DatasetArgs),

    /// Package a refined dataset.
    Package(PackageArgs),

    /// Print refinement metrics for a dataset or the process registry.
    Metrics(MetricsArgs),
}

/// Arguments for `datarefinery ingest`.
#[derive(Parser, Debug)]
pub struct IngestArgs {
    /// Directory of files to ingest.
    pub source: PathBuf,

    /// Add files to an existing dataset instead of creating one.
    #[arg(short, long, conflicts_with_all = ["name", "owner"])]
    pub dataset: Option<String>,

    /// Name of the new dataset.
    #[arg(long, required_unless_present = "dataset")]
    pub name: Option<String>,

    /// Supplier type (crowd, university, enterprise, marketplace).
    #[arg(long, default_value = "crowd")]
    pub source_type: String,

    /// Supplier identifier.
    #[arg(long, required_unless_present = "dataset")]
    pub owner: Option<String>,

    /// Dataset description.
    #[arg(long, default_value = "")]
    pub description: String,

    /// License of the supplied data.
    #[arg(long)]
    pub license: Option<String>,

    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `datarefinery refine`.
#[derive(Parser, Debug)]
pub struct RefineArgs {
    /// Dataset id.
    pub dataset: String,

    /// Minimum aggregate quality (0..=1). Defaults to the configured threshold.
    #[arg(short, long)]
    pub threshold: Option<f64>,

    /// Deduplication method (hash, semantic, hybrid).
    #[arg(short, long)]
    pub method: Option<String>,

    /// Output the full refinement record as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for commands that take only a dataset.
#[derive(Parser, Debug)]
pub struct DatasetArgs {
    /// Dataset id.
    pub dataset: String,

    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `datarefinery package`.
#[derive(Parser, Debug)]
pub struct PackageArgs {
    /// Dataset id.
    pub dataset: String,

    /// Package name.
    #[arg(short, long)]
    pub name: String,

    /// Package description.
    #[arg(long, default_value = "")]
    pub description: String,

    /// Package version.
    #[arg(long = "pkg-version", default_value = "1.0")]
    pub version: String,

    /// License type of the package.
    #[arg(long, default_value = "proprietary")]
    pub license: String,

    /// Write the package JSON to this file.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `datarefinery metrics`.
#[derive(Parser, Debug)]
pub struct MetricsArgs {
    /// Dataset id. Without it, the Prometheus registry is printed.
    pub dataset: Option<String>,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse CLI arguments and execute the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    init_metrics().map_err(|e| anyhow::anyhow!("Failed to initialize metrics: {}", e))?;

    match cli.command {
        Commands::Ingest(args) => run_ingest_command(config, args).await,
        Commands::Refine(args) => run_refine_command(config, args).await,
        Commands::Status(args) => run_status_command(config, args).await,
        Commands::History(args) => run_history_command(config, args).await,
        Commands::Package(args) => run_package_command(config, args).await,
        Commands::Metrics(args) => run_metrics_command(config, args).await,
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<RefineConfig> {
    let mut config = match &cli.config {
        Some(path) => RefineConfig::from_yaml_file(path)?,
        None => RefineConfig::from_env()?,
    };
    if let Some(url) = &cli.database_url {
        config = config.with_database_url(url.clone());
    }
    if let Some(root) = &cli.storage_root {
        config = config.with_storage_root(root.clone());
    }
    Ok(config)
}

fn parse_dataset_id(raw: &str) -> anyhow::Result<DatasetId> {
    DatasetId::from_str(raw).map_err(|e| anyhow::anyhow!("Invalid dataset id '{}': {}", raw, e))
}

async fn open_store(config: &RefineConfig) -> anyhow::Result<Arc<SqliteStore>> {
    let store = SqliteStore::connect(&config.database_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", config.database_url, e))?;
    Ok(Arc::new(store))
}

fn orchestrator(config: RefineConfig, store: Arc<SqliteStore>) -> RefinementOrchestrator {
    let source = Arc::new(DirectoryItemSource::new(config.storage_root.clone()));
    RefinementOrchestrator::from_config(config, source, store)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
    println!("{}", json);
    Ok(())
}

// ============================================================================
// Command implementations
// ============================================================================

async fn run_ingest_command(config: RefineConfig, args: IngestArgs) -> anyhow::Result<()> {
    if !args.source.is_dir() {
        return Err(anyhow::anyhow!(
            "Source directory does not exist: {}",
            args.source.display()
        ));
    }

    let store = open_store(&config).await?;
    let service = IngestService::new(store, config.storage_root.clone());

    let dataset_id = match &args.dataset {
        Some(raw) => parse_dataset_id(raw)?,
        None => {
            let source_type = DataSourceType::from_str(&args.source_type)
                .map_err(|e| anyhow::anyhow!("{}", e))?;
            let mut request = NewDataset::new(
                args.name.clone().unwrap_or_default(),
                source_type,
                args.owner.clone().unwrap_or_default(),
            )
            .with_description(args.description.clone());
            if let Some(license) = &args.license {
                request = request.with_license(license.clone());
            }
            service.create_dataset(request).await?.id
        }
    };

    let report = service.ingest_directory(dataset_id, &args.source).await?;

    if args.json {
        return print_json(&report);
    }

    println!("Dataset:  {}", report.dataset_id);
    println!("Stored:   {} files ({} bytes)", report.files_passed, report.bytes_stored);
    println!("Rejected: {}", report.files_failed);
    for issue in &report.errors {
        println!("  {}: {}", issue.file, issue.error);
    }
    println!("Location: {}", report.stored_location);
    Ok(())
}

async fn run_refine_command(config: RefineConfig, args: RefineArgs) -> anyhow::Result<()> {
    let dataset_id = parse_dataset_id(&args.dataset)?;
    let threshold = args.threshold.unwrap_or(config.quality_threshold);

    let mut options = RefineOptions::new(threshold);
    if let Some(raw) = &args.method {
        options = options.with_method(DedupMethod::from_str(raw)?);
    }

    let cancel = CancellationToken::new();
    options = options.with_cancellation(cancel.clone());
    let signal_token = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling refinement");
            signal_token.cancel();
        }
    });

    let store = open_store(&config).await?;
    let orchestrator = orchestrator(config, store);
    let result = orchestrator.refine_dataset_with(dataset_id, options).await;
    signal_task.abort();

    let record = result?;
    if args.json {
        return print_json(&record);
    }

    print_record_summary(&record);
    Ok(())
}

fn print_record_summary(record: &RefinementRecord) {
    println!("Record:     {}", record.id());
    println!("Dataset:    {}", record.dataset_id());
    println!(
        "Items:      {} processed, {} passed, {} rejected",
        record.items_processed(),
        record.items_passed(),
        record.items_rejected()
    );
    println!(
        "Duplicates: {} in {} groups ({})",
        record.duplicates_found(),
        record.duplicate_groups().len(),
        record.dedup_method()
    );
    println!("Quality:    {:.3}", record.aggregate_quality());
    if !record.error_log().is_empty() {
        println!("Failures:   {}", record.error_log().len());
    }
    println!("Duration:   {:.2}s", record.duration_seconds());
}

async fn run_status_command(config: RefineConfig, args: DatasetArgs) -> anyhow::Result<()> {
    let dataset_id = parse_dataset_id(&args.dataset)?;
    let store = open_store(&config).await?;
    let status = orchestrator(config, store).refinement_status(dataset_id).await?;

    if args.json {
        return print_json(&status);
    }

    println!("Dataset: {}", status.dataset_id);
    println!("Stage:   {}", status.stage);
    println!("Quality: {:.3}", status.quality_score);
    println!("Runs:    {}", status.runs);
    if let Some(at) = status.last_refined_at {
        println!(
            "Latest:  {} passed / {} processed at {}",
            status.items_passed,
            status.items_processed,
            at.to_rfc3339()
        );
    }
    Ok(())
}

async fn run_history_command(config: RefineConfig, args: DatasetArgs) -> anyhow::Result<()> {
    let dataset_id = parse_dataset_id(&args.dataset)?;
    let store = open_store(&config).await?;
    let records = orchestrator(config, store).history(dataset_id).await?;

    if args.json {
        return print_json(&records);
    }

    if records.is_empty() {
        println!("No refinement runs for {}", dataset_id);
        return Ok(());
    }
    for record in &records {
        println!(
            "{}  {}  quality {:.3}  passed {}/{}  duplicates {}",
            record.created_at().to_rfc3339(),
            record.id(),
            record.aggregate_quality(),
            record.items_passed(),
            record.items_processed(),
            record.duplicates_found()
        );
    }
    Ok(())
}

async fn run_package_command(config: RefineConfig, args: PackageArgs) -> anyhow::Result<()> {
    let dataset_id = parse_dataset_id(&args.dataset)?;
    let store = open_store(&config).await?;
    let service = PackageService::new(store);

    let request = PackageRequest::new(args.name.clone())
        .with_description(args.description.clone())
        .with_version(args.version.clone())
        .with_license(args.license.clone());
    let package = service.create_package(dataset_id, request).await?;

    if let Some(path) = &args.output {
        let json = service.export_package_json(dataset_id, package.id).await?;
        tokio::fs::write(path, json).await?;
        info!(path = %path.display(), "Wrote package JSON");
    }

    if args.json {
        return print_json(&package);
    }

    println!("Package:  {} ({})", package.name, package.id);
    println!("Version:  {}", package.version);
    println!("Items:    {} ({} bytes)", package.items_count, package.size_bytes);
    println!("Quality:  {:.3}", package.quality_score);
    for (modality, count) in &package.manifest.modality_breakdown {
        println!("  {}: {}", modality, count);
    }
    Ok(())
}

async fn run_metrics_command(config: RefineConfig, args: MetricsArgs) -> anyhow::Result<()> {
    let Some(raw) = &args.dataset else {
        print!("{}", export_metrics());
        return Ok(());
    };

    let dataset_id = parse_dataset_id(raw)?;
    let store = open_store(&config).await?;
    let metrics = orchestrator(config, store).export_metrics(dataset_id).await?;
    print_json(&metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_refine_command_options() {
        let cli = Cli::try_parse_from([
            "datarefinery",
            "refine",
            "2b1e7a8e-6f3a-4c1e-9a55-0d7c1f0b9a11",
            "-t",
            "0.7",
            "--method",
            "hash",
            "--json",
        ])
        .expect("should parse");

        match cli.command {
            Commands::Refine(args) => {
                assert_eq!(args.threshold, Some(0.7));
                assert_eq!(args.method.as_deref(), Some("hash"));
                assert!(args.json);
            }
            _ => panic!("Expected Refine command"),
        }
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_ingest_requires_name_without_dataset() {
        let result = Cli::try_parse_from(["datarefinery", "ingest", "./upload", "--owner", "acme"]);
        assert!(result.is_err());

        let cli = Cli::try_parse_from([
            "datarefinery",
            "ingest",
            "./upload",
            "--dataset",
            "2b1e7a8e-6f3a-4c1e-9a55-0d7c1f0b9a11",
        ])
        .expect("should parse");
        match cli.command {
            Commands::Ingest(args) => {
                assert!(args.dataset.is_some());
                assert_eq!(args.source_type, "crowd");
            }
            _ => panic!("Expected Ingest command"),
        }
    }

    #[test]
    fn test_package_defaults() {
        let cli = Cli::try_parse_from([
            "datarefinery",
            "--log-level",
            "debug",
            "package",
            "2b1e7a8e-6f3a-4c1e-9a55-0d7c1f0b9a11",
            "--name",
            "Reviews",
        ])
        .expect("should parse");
        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Commands::Package(args) => {
                assert_eq!(args.version, "1.0");
                assert_eq!(args.license, "proprietary");
                assert!(args.output.is_none());
            }
            _ => panic!("Expected Package command"),
        }
    }

    #[test]
    fn test_parse_ids() {
        assert!(parse_dataset_id("not-a-uuid").is_err());
        assert!(parse_dataset_id("2b1e7a8e-6f3a-4c1e-9a55-0d7c1f0b9a11").is_ok());
    }
}
