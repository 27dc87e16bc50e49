//! Service Error Types

use data_validator::ValidationError;
use storage::StorageError;
use thiserror::Error;

/// Errors reported by the pipeline and relay services
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed, missing or out-of-range input. Nothing was written.
    #[error("{0}")]
    InvalidInput(#[from] ValidationError),

    /// Store unreachable or write failure
    #[error("Persistence error: {0}")]
    Persistence(StorageError),
}

impl ServiceError {
    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::InvalidInput(_) => "invalid_input",
            ServiceError::Persistence(_) => "persistence",
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Validation(e) => ServiceError::InvalidInput(e),
            other => ServiceError::Persistence(other),
        }
    }
}
