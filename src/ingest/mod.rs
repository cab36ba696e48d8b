//! Supplier data ingestion.
//!
//! Datasets start in `Ingested`. [`IngestService::ingest_directory`] validates
//! files against the allow-list and per-modality size limits, copies them
//! into `<storage_root>/<dataset_id>/` and moves the dataset to `Stored`.

pub mod service;
pub mod validation;

pub use service::{IngestIssue, IngestService, IngestionReport, NewDataset};
pub use validation::{max_file_size, sanitize_filename, validate_file, FileRejection, ALLOWED_EXTENSIONS};
