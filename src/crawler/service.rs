//! Job registry: the programmatic surface of the crawler
//!
//! `CrawlService` accepts jobs, runs each on its own tokio task and answers
//! status and result queries without ever blocking on a crawl.

use crate::config::{validate, validate_domain_roots, Config};
use crate::crawler::coordinator::{Coordinator, JobRecord, SharedStore};
use crate::crawler::fetcher::build_http_client;
use crate::output::{build_writer, ResultWriter};
use crate::state::{CrawlJob, JobId, JobResults, JobSnapshot};
use crate::storage::{open_store, JobStore};
use crate::ScoutError;
use parking_lot::{Mutex, RwLock};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// A job submission
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobRequest {
    /// Root URLs, one per shop domain
    pub domains: Vec<String>,
    /// Page cap per domain; the configured default when absent
    pub max_pages_per_domain: Option<u32>,
}

impl JobRequest {
    pub fn new<S: Into<String>>(domains: impl IntoIterator<Item = S>) -> Self {
        Self {
            domains: domains.into_iter().map(Into::into).collect(),
            max_pages_per_domain: None,
        }
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages_per_domain = Some(max_pages);
        self
    }
}

/// Registry of crawl jobs sharing one configuration
pub struct CrawlService {
    config: Arc<Config>,
    config_hash: Option<String>,
    coordinator: Arc<Coordinator>,
    store: Option<SharedStore>,
    jobs: RwLock<HashMap<JobId, Arc<JobRecord>>>,
}

impl CrawlService {
    /// Validates the configuration and builds the HTTP client, the result
    /// writer and, when a database path is set, the job store
    pub fn new(config: Config) -> Result<Self, ScoutError> {
        validate(&config)?;

        let client = build_http_client(&config.user_agent, &config.fetch)?;
        let writer = build_writer(&config.output);
        let store = open_store(&config.output.database_path)?
            .map(|s| Arc::new(Mutex::new(Box::new(s) as Box<dyn JobStore>)));

        Ok(Self::with_parts(config, client, Some(writer), store))
    }

    /// Builds a service from already constructed collaborators
    pub fn with_parts(
        config: Config,
        client: Client,
        writer: Option<Arc<dyn ResultWriter>>,
        store: Option<SharedStore>,
    ) -> Self {
        let config = Arc::new(config);
        let coordinator = Arc::new(Coordinator::new(
            config.clone(),
            client,
            writer,
            store.clone(),
        ));

        Self {
            config,
            config_hash: None,
            coordinator,
            store,
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Records the configuration file digest on every job submitted afterwards
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Accepts a job and starts it on a tokio task
    ///
    /// The job starts `pending`. Invalid roots or page caps do not fail the
    /// call: the job is created and moves straight to `failed`, with the
    /// reason in its status. Must be called from within a tokio runtime.
    pub fn submit(&self, request: JobRequest) -> JobId {
        let id = JobId::new();
        let max_pages = request
            .max_pages_per_domain
            .unwrap_or(self.config.crawler.max_pages_per_domain);

        let roots = validate_domain_roots(&request.domains);
        let mut job = CrawlJob::new(id, roots.as_ref().cloned().unwrap_or_default(), max_pages);
        job.config_hash = self.config_hash.clone();

        let record = Arc::new(JobRecord::new(job));
        self.jobs.write().insert(id, record.clone());

        match roots {
            Ok(_) => {
                tracing::info!(
                    job = %id,
                    domains = request.domains.len(),
                    max_pages_per_domain = max_pages,
                    "job submitted"
                );
                let coordinator = self.coordinator.clone();
                tokio::spawn(async move { coordinator.run(record).await });
            }
            Err(e) => self.coordinator.reject(&record, &e),
        }

        id
    }

    fn record(&self, id: JobId) -> Option<Arc<JobRecord>> {
        self.jobs.read().get(&id).cloned()
    }

    /// Status and per-domain progress of a job
    ///
    /// Jobs no longer held in memory are looked up in the job store.
    pub fn status(&self, id: JobId) -> Option<JobSnapshot> {
        if let Some(record) = self.record(id) {
            return Some(record.snapshot());
        }

        let store = self.store.as_ref()?;
        match store.lock().load_snapshot(id) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(job = %id, error = %e, "job store lookup failed");
                None
            }
        }
    }

    /// Accepted product URLs per domain; partial for unfinished jobs
    pub fn results(&self, id: JobId) -> Option<JobResults> {
        if let Some(record) = self.record(id) {
            return Some(record.results());
        }

        let store = self.store.as_ref()?;
        let store = store.lock();
        match store.load_snapshot(id) {
            Ok(Some(_)) => store.load_results(id).ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(job = %id, error = %e, "job store lookup failed");
                None
            }
        }
    }

    /// Trips the job's cancellation token
    ///
    /// In-flight fetches finish; the job then moves to `failed` and keeps
    /// its partial results. Returns false for unknown or finished jobs.
    pub fn cancel(&self, id: JobId) -> bool {
        match self.record(id) {
            Some(record) => {
                let cancelled = record.cancel();
                if cancelled {
                    tracing::info!(job = %id, "cancellation requested");
                }
                cancelled
            }
            None => false,
        }
    }

    /// Waits until the job reaches `completed` or `failed`
    pub async fn wait(&self, id: JobId) -> Option<JobSnapshot> {
        let record = self.record(id)?;
        Some(record.wait().await)
    }

    /// Ids of the jobs held in memory
    pub fn jobs(&self) -> Vec<JobId> {
        self.jobs.read().keys().copied().collect()
    }

    /// Drops a finished job from memory; the job store keeps its copy
    pub fn purge(&self, id: JobId) -> bool {
        let mut jobs = self.jobs.write();
        match jobs.get(&id) {
            Some(record) if record.status().is_terminal() => {
                jobs.remove(&id);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::JobStatus;

    fn service() -> CrawlService {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.output.directory = dir.path().to_string_lossy().to_string();
        CrawlService::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_roots_fail_job() {
        let service = service();
        let id = service.submit(JobRequest::new(["ftp://shop.example/"]));

        let snapshot = service.wait(id).await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Failed);
        assert!(snapshot.error.is_some());
        assert!(snapshot.started_at.is_none());
    }

    #[tokio::test]
    async fn test_empty_request_fails_job() {
        let service = service();
        let id = service.submit(JobRequest::default());

        let snapshot = service.wait(id).await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Failed);
        assert_eq!(service.results(id).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_zero_page_cap_fails_job() {
        let service = service();
        let id = service.submit(JobRequest::new(["https://shop.example/"]).with_max_pages(0));

        let snapshot = service.wait(id).await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Failed);
        assert_eq!(snapshot.pages_fetched(), 0);
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let service = service();
        let id = JobId::new();
        assert!(service.status(id).is_none());
        assert!(service.results(id).is_none());
        assert!(!service.cancel(id));
        assert!(service.wait(id).await.is_none());
    }

    #[tokio::test]
    async fn test_purge_only_finished_jobs() {
        let service = service();
        let id = service.submit(JobRequest::new(["not a url at all"]));
        service.wait(id).await.unwrap();

        assert!(service.purge(id));
        assert!(service.jobs().is_empty());
        assert!(service.status(id).is_none());
    }
}
