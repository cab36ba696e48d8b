//! Error types for refinement operations.
//!
//! Two layers of errors exist:
//! - [`RefineError`]: pipeline-level failures surfaced to the caller. A run that
//!   fails with one of these commits nothing.
//! - [`ItemError`]: recoverable per-item failures. They are recorded in the
//!   refinement record's error log and never escape the batch boundary.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::{DatasetId, PipelineStage};
use crate::storage::StoreError;

/// Errors that abort a pipeline operation.
#[derive(Debug, Error)]
pub enum RefineError {
    #[error("Dataset '{0}' not found")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Refinement already in progress for dataset '{0}'")]
    Conflict(DatasetId),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Dataset '{dataset_id}' cannot be packaged: {reason}")]
    NotPackageable { dataset_id: DatasetId, reason: String },

    #[error("Refinement of dataset '{0}' was cancelled")]
    Cancelled(DatasetId),

    #[error("Invalid stage transition from '{from}' to '{to}'")]
    InvalidTransition {
        from: PipelineStage,
        to: PipelineStage,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Machine-readable category of a [`RefineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Validation,
    Conflict,
    StorageUnavailable,
    NotPackageable,
    Cancelled,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::StorageUnavailable => "storage_unavailable",
            ErrorKind::NotPackageable => "not_packageable",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{}", name)
    }
}

impl RefineError {
    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RefineError::NotFound(_) => ErrorKind::NotFound,
            RefineError::Validation(_) => ErrorKind::Validation,
            RefineError::Conflict(_) => ErrorKind::Conflict,
            RefineError::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
            RefineError::NotPackageable { .. } => ErrorKind::NotPackageable,
            RefineError::Cancelled(_) => ErrorKind::Cancelled,
            RefineError::InvalidTransition { .. }
            | RefineError::Store(_)
            | RefineError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RefineError::Conflict(_) | RefineError::StorageUnavailable(_)
        )
    }

    /// Maps a persistence failure, keeping outages distinguishable.
    pub(crate) fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => RefineError::StorageUnavailable(msg),
            other => RefineError::Store(other),
        }
    }

    /// Converts the error into its caller-visible structured form.
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Structured error returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub message: String,
}

/// A recoverable failure confined to a single item.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ItemError {
    #[error("Item could not be read: {0}")]
    Unreadable(String),

    #[error("Item content truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: u64, actual: u64 },

    #[error("Item processing timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Item worker panicked: {0}")]
    WorkerPanicked(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let id = DatasetId::new();
        assert_eq!(
            RefineError::NotFound("x".to_string()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            RefineError::Validation("bad".to_string()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(RefineError::Conflict(id).kind(), ErrorKind::Conflict);
        assert_eq!(RefineError::Cancelled(id).kind(), ErrorKind::Cancelled);
        assert_eq!(
            RefineError::InvalidTransition {
                from: PipelineStage::Sold,
                to: PipelineStage::Stored,
            }
            .kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_retryable() {
        let id = DatasetId::new();
        assert!(RefineError::Conflict(id).is_retryable());
        assert!(RefineError::StorageUnavailable("down".to_string()).is_retryable());
        assert!(!RefineError::Validation("threshold".to_string()).is_retryable());
    }

    #[test]
    fn test_error_response_shape() {
        let err = RefineError::Validation("quality_threshold must be in [0, 1]".to_string());
        let response = err.to_response();
        assert_eq!(response.kind, ErrorKind::Validation);
        assert!(response.message.contains("quality_threshold"));

        let json = serde_json::to_value(&response).expect("serialize");
        assert_eq!(json["kind"], "validation");
    }

    #[test]
    fn test_item_error_display() {
        let err = ItemError::Truncated {
            expected: 100,
            actual: 10,
        };
        assert!(err.to_string().contains("expected 100"));
    }
}
