//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlJob`, `JobStatus`, `JobSnapshot`: job lifecycle and status views
//! - `DomainState`: frontier, counters and accepted product set per domain
//! - `PageState`: outcome of one dispatched page

mod domain_state;
mod job_state;
mod page_state;

pub use domain_state::{DomainPoll, DomainState, OfferOutcome};
pub use job_state::{
    CrawlJob, DomainProgress, DomainStatus, JobId, JobResults, JobSnapshot, JobStatus,
};
pub use page_state::PageState;
