//! Storage Layer
//!
//! Temperature sample log and relay state table, with in-memory and SQLite
//! backends behind the same pair of store interfaces.

mod memory;
mod model;
mod repository;
mod sqlite;

pub use memory::MemoryRepository;
pub use model::{RelayMode, RelayRecord, RelayState, SampleId, TemperatureSample};
pub use repository::{ReadingStore, RelayStore};
pub use sqlite::SqliteRepository;

use data_validator::ValidationError;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::DatabaseError(err.to_string())
    }
}
