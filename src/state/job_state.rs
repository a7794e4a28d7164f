//! Job lifecycle definitions
//!
//! A job moves `pending → running → {completed, failed}`; each of its domains
//! moves `queued → crawling → drained`. Both state machines only move forward.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use url::Url;
use uuid::Uuid;

/// Accepted product URLs of a job, keyed by domain
pub type JobResults = BTreeMap<String, BTreeSet<String>>;

/// Identity of a crawl job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generates a fresh random job id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Status of a crawl job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Returns true once the job can no longer change
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses the string form stored by job stores
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one domain within a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainStatus {
    /// Waiting for its first dispatch
    Queued,
    /// At least one page has been dispatched
    Crawling,
    /// Frontier empty or page cap hit, with nothing in flight
    Drained,
}

impl DomainStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Crawling => "crawling",
            Self::Drained => "drained",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "crawling" => Some(Self::Crawling),
            "drained" => Some(Self::Drained),
            _ => None,
        }
    }
}

impl fmt::Display for DomainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A submitted crawl job
///
/// Owned by the coordinator running it. Transition methods return `false`
/// and leave the job untouched when the move is not allowed from the
/// current status.
#[derive(Debug, Clone)]
pub struct CrawlJob {
    pub id: JobId,
    pub domains: Vec<Url>,
    pub max_pages_per_domain: u32,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub config_hash: Option<String>,
}

impl CrawlJob {
    pub fn new(id: JobId, domains: Vec<Url>, max_pages_per_domain: u32) -> Self {
        Self {
            id,
            domains,
            max_pages_per_domain,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
            config_hash: None,
        }
    }

    /// `pending → running`
    pub fn start(&mut self) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
        true
    }

    /// `running → completed`
    pub fn complete(&mut self) -> bool {
        if self.status != JobStatus::Running {
            return false;
        }
        self.status = JobStatus::Completed;
        self.finished_at = Some(Utc::now());
        true
    }

    /// `pending | running → failed`
    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = JobStatus::Failed;
        self.error = Some(reason.into());
        self.finished_at = Some(Utc::now());
        true
    }
}

/// Progress of one domain, as reported by status queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainProgress {
    pub domain: String,
    pub root: String,
    pub status: DomainStatus,
    pub pages_fetched: u32,
    pub queued: usize,
    pub in_flight: u32,
    pub products_found: usize,
    pub failed_pages: u32,
    pub rendered_pages: u32,
    pub robots_skipped: u32,
}

/// Point-in-time view of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub config_hash: Option<String>,
    pub domains: Vec<DomainProgress>,
}

impl JobSnapshot {
    pub fn from_job(job: &CrawlJob, domains: Vec<DomainProgress>) -> Self {
        Self {
            id: job.id,
            status: job.status,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            error: job.error.clone(),
            config_hash: job.config_hash.clone(),
            domains,
        }
    }

    /// Total accepted product URLs across all domains
    pub fn products_found(&self) -> usize {
        self.domains.iter().map(|d| d.products_found).sum()
    }

    /// Total pages fetched across all domains
    pub fn pages_fetched(&self) -> u32 {
        self.domains.iter().map(|d| d.pages_fetched).sum()
    }
}
