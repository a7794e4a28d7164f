//! Output module for job results and console reporting
//!
//! This module handles:
//! - Writing accepted product URLs as CSV or JSON files
//! - Progress lines and the final job summary

pub mod stats;
mod traits;
mod writers;

pub use stats::{format_progress, print_summary, JobStatistics};
pub use traits::{OutputError, OutputResult, ResultWriter};
pub use writers::{domain_file_stem, CsvResultWriter, JsonResultWriter};

use crate::config::{OutputConfig, OutputFormat};
use std::sync::Arc;

/// Builds the result writer selected by the output configuration
pub fn build_writer(config: &OutputConfig) -> Arc<dyn ResultWriter> {
    match config.format {
        OutputFormat::Csv => Arc::new(CsvResultWriter::new(&config.directory)),
        OutputFormat::Json => Arc::new(JsonResultWriter::new(&config.directory)),
    }
}
