//! Shelf-Scout: product page discovery for e-commerce sites
//!
//! This crate crawls a set of shop domains from their root URLs and reports,
//! per domain, the set of URLs that look like product detail pages. It keeps
//! a bounded, polite, deduplicated frontier per domain and scores every
//! visited page with a data-driven classifier.

pub mod classifier;
pub mod config;
pub mod crawler;
pub mod output;
pub mod robots;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Shelf-Scout operations
#[derive(Debug, Error)]
pub enum ScoutError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
///
/// Any of these raised while starting a job is fatal for that job.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Failure of a single page fetch
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP status {status}")]
    HttpStatus { status: u16 },

    #[error("render failed: {0}")]
    Render(String),

    #[error("more than {hops} redirects")]
    RedirectLimit { hops: u32 },

    #[error("redirect loop at {0}")]
    RedirectLoop(String),

    #[error("expected HTML, got {0}")]
    ContentMismatch(String),
}

impl FetchError {
    /// Returns true if the failure may go away on a retry
    ///
    /// Timeouts, network errors, 5xx and 429 responses are transient. Client
    /// errors, render failures and redirect problems are terminal.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Network(_) => true,
            Self::HttpStatus { status } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Raised when page HTML cannot yield structural signals
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unreadable page content: {0}")]
pub struct ClassificationError(pub String);

/// Result type alias for Shelf-Scout operations
pub type Result<T> = std::result::Result<T, ScoutError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use classifier::{ClassificationResult, ProductClassifier};
pub use config::Config;
pub use crawler::{CrawlService, JobRequest};
pub use state::{DomainStatus, JobId, JobSnapshot, JobStatus};
pub use crate::url::normalize;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_fetch_errors() {
        assert!(FetchError::Timeout.is_transient());
        assert!(FetchError::Network("reset".to_string()).is_transient());
        assert!(FetchError::HttpStatus { status: 500 }.is_transient());
        assert!(FetchError::HttpStatus { status: 503 }.is_transient());
        assert!(FetchError::HttpStatus { status: 429 }.is_transient());
    }

    #[test]
    fn test_terminal_fetch_errors() {
        assert!(!FetchError::HttpStatus { status: 404 }.is_transient());
        assert!(!FetchError::HttpStatus { status: 403 }.is_transient());
        assert!(!FetchError::Render("boom".to_string()).is_transient());
        assert!(!FetchError::RedirectLimit { hops: 10 }.is_transient());
        assert!(!FetchError::ContentMismatch("image/png".to_string()).is_transient());
    }
}
