//! Crawler module: from job submission to accepted product URLs
//!
//! This module contains the core crawling logic, including:
//! - The per-domain frontier
//! - Static and rendered fetching with retry logic
//! - HTML parsing and link extraction
//! - Round-robin scheduling with per-host politeness
//! - Job coordination and the job service

mod coordinator;
mod fetcher;
pub(crate) mod frontier;
mod parser;
mod scheduler;
mod service;

pub use coordinator::{Coordinator, JobRecord, SharedStore};
pub use fetcher::{
    build_http_client, FetchedDocument, FetchedPage, Fetcher, HttpSource, PageSource,
    RenderSource,
};
pub use frontier::{EnqueueOutcome, Frontier, FrontierEntry};
pub use parser::{extract_links, ExtractedLink, LinkExtractor, LinkKind, ParsedPage};
pub use scheduler::{Dispatch, DispatchPoll, Scheduler, SharedDomain};
pub use service::{CrawlService, JobRequest};
