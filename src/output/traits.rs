//! Result writer trait and error types

use crate::state::{JobId, JobResults, JobSnapshot};
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Receives the accepted product URLs of finished jobs
///
/// Writers only define where the data goes; the shape is fixed: a job's
/// snapshot plus, per domain, a set of normalized product URLs.
pub trait ResultWriter: Send + Sync {
    /// Writes the product set of one drained domain
    fn write_domain(&self, job: JobId, domain: &str, urls: &BTreeSet<String>) -> OutputResult<()>;

    /// Writes everything a finished job produced
    ///
    /// The default hands every domain to `write_domain`.
    fn write_job(&self, snapshot: &JobSnapshot, results: &JobResults) -> OutputResult<()> {
        for (domain, urls) in results {
            self.write_domain(snapshot.id, domain, urls)?;
        }
        Ok(())
    }
}
