//! Crawl coordinator: runs one job from `pending` to a terminal state
//!
//! The coordinator owns the job lifecycle:
//! - Building every domain's state from validated roots
//! - Fetching robots.txt before the first dispatch
//! - Running the worker pool over the shared scheduler
//! - Handing results to the writer and the job store

use crate::classifier::ProductClassifier;
use crate::config::Config;
use crate::crawler::fetcher::{FetchedDocument, Fetcher};
use crate::crawler::parser::{LinkExtractor, LinkKind};
use crate::crawler::scheduler::{Dispatch, Scheduler, SharedDomain};
use crate::output::ResultWriter;
use crate::robots::fetch_robots;
use crate::state::{
    CrawlJob, DomainProgress, DomainState, DomainStatus, JobId, JobResults, JobSnapshot, JobStatus,
    PageState,
};
use crate::storage::JobStore;
use crate::url::{authority, DomainScope, Normalizer};
use crate::{ConfigError, FetchError};
use parking_lot::Mutex;
use reqwest::Client;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Job store shared by all jobs of a service
pub type SharedStore = Arc<Mutex<Box<dyn JobStore>>>;

/// Live record of one job, shared between its coordinator and status queries
pub struct JobRecord {
    job: Mutex<CrawlJob>,
    domains: Mutex<Vec<SharedDomain>>,
    cancel: CancellationToken,
    status: watch::Sender<JobStatus>,
}

impl JobRecord {
    pub fn new(job: CrawlJob) -> Self {
        let (status, _) = watch::channel(job.status);
        Self {
            job: Mutex::new(job),
            domains: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
            status,
        }
    }

    pub fn id(&self) -> JobId {
        self.job.lock().id
    }

    pub fn status(&self) -> JobStatus {
        self.job.lock().status
    }

    /// Current status and per-domain progress
    ///
    /// Before the job starts, every requested root is reported as `queued`.
    pub fn snapshot(&self) -> JobSnapshot {
        let job = self.job.lock().clone();
        let domains = self.domains.lock().clone();

        let progress = if domains.is_empty() {
            job.domains
                .iter()
                .map(|root| DomainProgress {
                    domain: authority(root).unwrap_or_default(),
                    root: root.to_string(),
                    status: DomainStatus::Queued,
                    pages_fetched: 0,
                    queued: 0,
                    in_flight: 0,
                    products_found: 0,
                    failed_pages: 0,
                    rendered_pages: 0,
                    robots_skipped: 0,
                })
                .collect()
        } else {
            domains.iter().map(|d| d.lock().progress()).collect()
        };

        JobSnapshot::from_job(&job, progress)
    }

    /// Product URLs accepted so far; partial while the job runs
    pub fn results(&self) -> JobResults {
        let domains = self.domains.lock().clone();
        if domains.is_empty() {
            return self
                .job
                .lock()
                .domains
                .iter()
                .filter_map(authority)
                .map(|d| (d, BTreeSet::new()))
                .collect();
        }

        domains
            .iter()
            .map(|d| {
                let state = d.lock();
                (state.domain().to_string(), state.accepted().clone())
            })
            .collect()
    }

    /// Requests cancellation; false if the job already finished
    pub fn cancel(&self) -> bool {
        if self.status().is_terminal() {
            return false;
        }
        self.cancel.cancel();
        true
    }

    /// Waits until the job reaches a terminal status
    pub async fn wait(&self) -> JobSnapshot {
        let mut rx = self.status.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|s| s.is_terminal()).await;
        self.snapshot()
    }

    /// Applies a state change and wakes waiters
    fn transition(&self, apply: impl FnOnce(&mut CrawlJob) -> bool) -> bool {
        let changed = self.update(apply);
        if changed {
            self.publish();
        }
        changed
    }

    /// Applies a state change without waking waiters
    fn update(&self, apply: impl FnOnce(&mut CrawlJob) -> bool) -> bool {
        apply(&mut self.job.lock())
    }

    fn publish(&self) {
        let status = self.status();
        self.status.send_replace(status);
    }
}

/// Page-processing components built from the configuration
struct Pipeline {
    fetcher: Fetcher,
    extractor: LinkExtractor,
    classifier: ProductClassifier,
    normalizer: Normalizer,
}

/// Everything a worker needs to process a page
struct WorkerContext {
    job: JobId,
    scheduler: Scheduler,
    pipeline: Pipeline,
    follow_pagination: bool,
}

/// Runs jobs against one configuration
pub struct Coordinator {
    config: Arc<Config>,
    client: Client,
    writer: Option<Arc<dyn ResultWriter>>,
    store: Option<SharedStore>,
}

impl Coordinator {
    pub fn new(
        config: Arc<Config>,
        client: Client,
        writer: Option<Arc<dyn ResultWriter>>,
        store: Option<SharedStore>,
    ) -> Self {
        Self {
            config,
            client,
            writer,
            store,
        }
    }

    /// Runs a job to completion
    ///
    /// # Job Flow
    ///
    /// 1. Build domain states and crawl components; any `ConfigError` fails
    ///    the job before the first fetch
    /// 2. `pending → running`, fetch robots.txt for every domain
    /// 3. Run `worker_count` workers until every domain drains or the job is
    ///    cancelled
    /// 4. `completed` if every domain drained, `failed` otherwise
    /// 5. Persist the snapshot and results
    pub async fn run(&self, record: Arc<JobRecord>) {
        let job_id = record.id();

        let (domains, pipeline) = match self.prepare(&record) {
            Ok(prepared) => prepared,
            Err(e) => {
                self.reject(&record, &e);
                return;
            }
        };

        *record.domains.lock() = domains.clone();
        record.transition(CrawlJob::start);
        tracing::info!(job = %job_id, domains = domains.len(), "job running");

        if self.config.crawler.respect_robots_txt {
            self.load_robots(&domains).await;
        }

        let context = Arc::new(WorkerContext {
            job: job_id,
            scheduler: Scheduler::new(domains, record.cancel.clone()),
            pipeline,
            follow_pagination: self.config.crawler.follow_pagination,
        });

        let mut workers = JoinSet::new();
        for worker in 0..self.config.crawler.worker_count.max(1) {
            workers.spawn(worker_loop(context.clone(), worker));
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(job = %job_id, error = %e, "worker task failed");
            }
        }

        // Waiters wake only after the results are written
        if record.cancel.is_cancelled() {
            tracing::warn!(job = %job_id, "job cancelled, keeping partial results");
            record.update(|job| job.fail("cancelled"));
        } else if context.scheduler.all_drained() {
            record.update(CrawlJob::complete);
        } else {
            record.update(|job| job.fail("workers stopped before every domain drained"));
        }

        let snapshot = record.snapshot();
        tracing::info!(
            job = %job_id,
            status = %snapshot.status,
            pages_fetched = snapshot.pages_fetched(),
            products_found = snapshot.products_found(),
            "job finished"
        );

        self.persist(&record);
        record.publish();
    }

    /// Fails a job that cannot start and records it
    pub fn reject(&self, record: &JobRecord, error: &ConfigError) {
        tracing::error!(job = %record.id(), error = %error, "job configuration rejected");
        if record.update(|job| job.fail(error.to_string())) {
            self.persist(record);
            record.publish();
        }
    }

    fn prepare(&self, record: &JobRecord) -> Result<(Vec<SharedDomain>, Pipeline), ConfigError> {
        let job = record.job.lock().clone();
        let crawler = &self.config.crawler;

        if job.max_pages_per_domain == 0 {
            return Err(ConfigError::Validation(
                "max pages per domain must be greater than 0".to_string(),
            ));
        }
        if job.domains.is_empty() {
            return Err(ConfigError::Validation(
                "a job needs at least one domain".to_string(),
            ));
        }

        let normalizer = Normalizer::new(&self.config.normalize.tracking_params);
        let classifier =
            ProductClassifier::from_config(&self.config.classifier, &crawler.pagination_params)?;
        let extractor = LinkExtractor::new(&crawler.pagination_params);
        let fetcher = Fetcher::from_config(self.client.clone(), &self.config.fetch)?;

        let mut domains = Vec::with_capacity(job.domains.len());
        for root in &job.domains {
            let root = normalizer
                .normalize(root.as_str(), None)
                .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", root, e)))?;
            let scope = DomainScope::new(&root, &crawler.allowed_subdomains)
                .ok_or_else(|| ConfigError::InvalidUrl(format!("{} has no host", root)))?;

            domains.push(Arc::new(Mutex::new(DomainState::new(
                root,
                scope,
                crawler.max_depth,
                job.max_pages_per_domain,
                crawler.politeness_interval(),
            ))));
        }

        Ok((
            domains,
            Pipeline {
                fetcher,
                extractor,
                classifier,
                normalizer,
            },
        ))
    }

    async fn load_robots(&self, domains: &[SharedDomain]) {
        let agent = self.config.user_agent.crawler_name.clone();
        let mut tasks = JoinSet::new();

        for (index, domain) in domains.iter().enumerate() {
            let root = domain.lock().root().clone();
            let client = self.client.clone();
            let agent = agent.clone();
            tasks.spawn(async move { (index, fetch_robots(&client, &root, &agent).await) });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, policy)) => domains[index].lock().set_robots(policy),
                Err(e) => tracing::warn!(error = %e, "robots.txt task failed"),
            }
        }
    }

    /// Hands the job's final state to the writer and the store
    ///
    /// Failures are logged; they never change the job's status.
    fn persist(&self, record: &JobRecord) {
        let snapshot = record.snapshot();
        let results = record.results();

        if let Some(writer) = &self.writer {
            if let Err(e) = writer.write_job(&snapshot, &results) {
                tracing::error!(job = %snapshot.id, error = %e, "failed to write results");
            }
        }

        if let Some(store) = &self.store {
            let mut store = store.lock();
            let saved = store
                .save_snapshot(&snapshot)
                .and_then(|_| store.save_results(snapshot.id, &results));
            if let Err(e) = saved {
                tracing::error!(job = %snapshot.id, error = %e, "failed to store job");
            }
        }
    }
}

async fn worker_loop(context: Arc<WorkerContext>, worker: u32) {
    tracing::debug!(job = %context.job, worker, "worker started");

    while let Some(dispatch) = context.scheduler.next().await {
        process_page(&context, dispatch).await;
    }

    tracing::debug!(job = %context.job, worker, "worker finished");
}

/// Fetches, extracts, classifies and records one dispatched page
async fn process_page(context: &WorkerContext, dispatch: Dispatch) {
    let lease = context.scheduler.lease(&dispatch);
    let shared = context.scheduler.domain(dispatch.domain).clone();
    let (domain, pace) = {
        let state = shared.lock();
        (state.domain().to_string(), state.politeness())
    };
    let entry = dispatch.entry;

    let pipeline = &context.pipeline;
    let fetched = pipeline
        .fetcher
        .fetch(&entry.url, &pipeline.extractor, &pipeline.classifier, pace)
        .await;

    let outcome = match fetched {
        Ok(document) => record_document(
            context,
            &shared,
            &entry.url,
            entry.depth,
            &entry.anchor_text,
            document,
        ),
        Err(FetchError::ContentMismatch(content_type)) => {
            tracing::debug!(
                job = %context.job,
                domain = %domain,
                url = %entry.url,
                content_type = %content_type,
                "skipping non-HTML page"
            );
            PageState::ContentMismatch
        }
        Err(e) => {
            tracing::warn!(
                job = %context.job,
                domain = %domain,
                url = %entry.url,
                referrer = ?entry.referrer.as_ref().map(|r| r.as_str()),
                error = %e,
                "fetch failed"
            );
            PageState::Failed
        }
    };

    lease.complete(outcome);
}

fn record_document(
    context: &WorkerContext,
    shared: &SharedDomain,
    requested: &url::Url,
    depth: u32,
    anchor_text: &str,
    document: FetchedDocument,
) -> PageState {
    let FetchedDocument { page, parsed } = document;
    let pipeline = &context.pipeline;

    let final_url = match pipeline.normalizer.normalize(page.final_url.as_str(), None) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(job = %context.job, url = %page.final_url, error = %e, "unusable final URL");
            return PageState::Failed;
        }
    };

    let first_visit = if &final_url == requested {
        true
    } else {
        let mut state = shared.lock();
        if !state.scope().contains(&final_url) {
            tracing::debug!(
                job = %context.job,
                from = %requested,
                to = %final_url,
                "redirected out of scope"
            );
            return PageState::RedirectOutOfScope;
        }
        state.claim_redirect_target(&final_url)
    };

    let verdict = first_visit.then(|| {
        pipeline
            .classifier
            .classify(&final_url, anchor_text, Some(&page.html))
    });

    let mut links = Vec::with_capacity(parsed.links.len());
    for link in parsed.links {
        let link_depth = match link.kind {
            LinkKind::Pagination if !context.follow_pagination => continue,
            LinkKind::Pagination => depth,
            LinkKind::Anchor | LinkKind::Embedded => depth + 1,
        };
        match pipeline.normalizer.normalize(link.url.as_str(), None) {
            Ok(url) => links.push((url, link_depth, link.anchor_text)),
            Err(e) => tracing::trace!(url = %link.url, error = %e, "dropping link"),
        }
    }

    let mut state = shared.lock();
    if page.rendered {
        state.record_rendered();
    }
    for (url, link_depth, text) in links {
        state.offer(url, link_depth, Some(&final_url), &text);
    }

    match verdict {
        None => PageState::Duplicate,
        Some(result) if result.is_product => {
            tracing::debug!(
                job = %context.job,
                domain = state.domain(),
                url = %final_url,
                score = result.score,
                rules = ?result.matched_rules,
                "product page"
            );
            state.accept(&final_url);
            PageState::Product
        }
        Some(result) => {
            tracing::trace!(
                job = %context.job,
                url = %final_url,
                score = result.score,
                "not a product page"
            );
            PageState::NotProduct
        }
    }
}
