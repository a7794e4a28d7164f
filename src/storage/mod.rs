//! Storage module for persisting job status and results
//!
//! The job store keeps, per job:
//! - The status row (timestamps, error, config hash)
//! - The last reported progress of each domain
//! - The accepted product URLs

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteJobStore;
pub use traits::{JobStore, StorageError, StorageResult};

use std::path::Path;

/// Opens the configured job store, or `None` when no database path is set
pub fn open_store(database_path: &str) -> StorageResult<Option<SqliteJobStore>> {
    if database_path.trim().is_empty() {
        return Ok(None);
    }
    SqliteJobStore::new(Path::new(database_path)).map(Some)
}
