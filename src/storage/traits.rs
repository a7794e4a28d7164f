//! Storage traits and error types
//!
//! The crawl core only hands finished snapshots and result sets to a
//! `JobStore`; it never reads them back while a job runs.

use crate::state::{JobId, JobResults, JobSnapshot, JobStatus};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence of job status and results
pub trait JobStore: Send {
    /// Inserts or replaces a job's status row and its domain progress
    fn save_snapshot(&mut self, snapshot: &JobSnapshot) -> StorageResult<()>;

    /// Replaces the product URLs stored for a job
    ///
    /// The job's snapshot must have been saved first.
    fn save_results(&mut self, job: JobId, results: &JobResults) -> StorageResult<()>;

    /// Loads a job's last saved snapshot
    fn load_snapshot(&self, job: JobId) -> StorageResult<Option<JobSnapshot>>;

    /// Loads a job's product URLs; empty if none were saved
    fn load_results(&self, job: JobId) -> StorageResult<JobResults>;

    /// Lists stored jobs, newest first
    fn list_jobs(&self) -> StorageResult<Vec<(JobId, JobStatus)>>;
}
