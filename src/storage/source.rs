//! Item source: the storage collaborator that yields a dataset's items.

use async_trait::async_trait;
use thiserror::Error;

use crate::dataset::{Dataset, ItemDescriptor};

/// Errors raised by an [`ItemSource`].
#[derive(Debug, Error)]
pub enum SourceError {
    /// The backend cannot supply items at all. Fatal to the current run.
    #[error("Item storage unavailable: {0}")]
    Unavailable(String),

    /// A single item could not be read. Recoverable.
    #[error("Item '{item}' unreadable: {reason}")]
    ItemUnreadable { item: String, reason: String },

    /// Sidecar metadata could not be parsed.
    #[error("Invalid metadata for '{item}': {reason}")]
    InvalidMetadata { item: String, reason: String },
}

impl SourceError {
    /// Whether the error aborts the run rather than a single item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SourceError::Unavailable(_))
    }
}

/// Supplies the ordered items of a dataset.
///
/// Listing is cheap and restartable; content is read one item at a time so
/// callers can stream large datasets in batches.
#[async_trait]
pub trait ItemSource: Send + Sync {
    /// Lists item descriptors in ingestion order (ascending `ordinal`).
    async fn list_items(&self, dataset: &Dataset) -> Result<Vec<ItemDescriptor>, SourceError>;

    /// Reads the full content of one item.
    async fn read_item(
        &self,
        dataset: &Dataset,
        descriptor: &ItemDescriptor,
    ) -> Result<Vec<u8>, SourceError>;
}
