//! Storage module for persisting crawl results
//!
//! This module holds the storage collaborator of the crawler:
//! - `SqliteStorage`: one row per URL in a SQLite database
//! - `JsonLinesStorage`: append-only JSON lines file
//! - `MemoryStorage`: in-process buffer for embedding and tests

mod jsonl;
mod memory;
mod schema;
mod sqlite;
mod traits;

pub use jsonl::JsonLinesStorage;
pub use memory::MemoryStorage;
pub use sqlite::{init_database, SqliteStorage};
pub use traits::{Storage, StorageError, StorageResult};

use crate::config::{OutputConfig, StorageBackend};
use std::path::Path;

/// Opens the storage backend selected by the output configuration
///
/// # Arguments
///
/// * `output` - Backend kind and path
///
/// # Returns
///
/// * `Ok(Box<dyn Storage>)` - Ready to accept results
/// * `Err(StorageError)` - The database or file could not be opened
pub fn open_storage(output: &OutputConfig) -> StorageResult<Box<dyn Storage>> {
    let path = Path::new(&output.path);
    let storage: Box<dyn Storage> = match output.backend {
        StorageBackend::Sqlite => Box::new(SqliteStorage::new(path)?),
        StorageBackend::Jsonl => Box::new(JsonLinesStorage::new(path)?),
    };

    tracing::debug!(backend = storage.backend_name(), path = %output.path, "Opened storage");
    Ok(storage)
}
