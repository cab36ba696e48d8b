//! Storage and persistence collaborators.
//!
//! # Overview
//!
//! - **ItemSource**: yields a dataset's items in ingestion order, with
//!   per-item read errors kept separate from whole-source outages
//!   ([`DirectoryItemSource`], [`MemoryItemSource`])
//! - **RefinementStore**: durable datasets, append-only refinement history
//!   and packages ([`SqliteStore`], [`MemoryStore`])
//! - **Migrations**: schema management for the SQLite backend
//!
//! # Usage
//!
//! ```rust,ignore
//! use datarefinery::storage::{DirectoryItemSource, RefinementStore, SqliteStore};
//!
//! let store = SqliteStore::connect("sqlite://data_broker.db").await?;
//! let source = DirectoryItemSource::new("./cold_storage");
//!
//! let history = store.list_records(dataset_id).await?;
//! ```

pub mod database;
pub mod filesystem;
pub mod memory;
pub mod migrations;
pub mod schema;
pub mod source;
pub mod store;

pub use database::SqliteStore;
pub use filesystem::{DirectoryItemSource, METADATA_SUFFIX};
pub use memory::{MemoryItemSource, MemoryStore};
pub use migrations::{AppliedMigration, MigrationError, MigrationRunner};
pub use source::{ItemSource, SourceError};
pub use store::{RefinementStore, StoreError};
