//! Configuration module for Shelf-Scout
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section has defaults, so a partial file (or none at all) is usable.
//!
//! # Example
//!
//! ```no_run
//! use shelf_scout::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Workers: {}", config.crawler.worker_count);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ClassifierConfig, Config, CrawlerConfig, DomainEntry, FetchConfig, NormalizeConfig,
    OutputConfig, OutputFormat, RuleEntry, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};

pub use validation::{validate, validate_domain_roots};
