use crate::crawler::frontier::{EnqueueOutcome, Frontier, FrontierEntry};
use crate::robots::RobotsPolicy;
use crate::state::job_state::{DomainProgress, DomainStatus};
use crate::state::page_state::PageState;
use crate::url::{authority, DomainScope};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::{Duration, Instant};
use url::Url;

/// What a domain can hand out right now
#[derive(Debug, Clone, PartialEq)]
pub enum DomainPoll {
    /// An entry was dequeued and counted as fetched
    Ready(FrontierEntry),
    /// The head entry's host is not polite yet
    Wait(Duration),
    /// Nothing dispatchable until an in-flight fetch finishes
    Busy,
    /// The domain moved to `drained` during this poll
    JustDrained,
    /// The domain was already drained
    Drained,
}

/// Result of offering a discovered link to a domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferOutcome {
    Queued(EnqueueOutcome),
    OutOfScope,
    RobotsBlocked,
}

/// Crawl state of one (job, domain) pair
///
/// Holds the frontier, the accepted product set, the counters and the
/// per-host politeness clock. Workers only reach it through the scheduler's
/// lock.
#[derive(Debug)]
pub struct DomainState {
    root: Url,
    scope: DomainScope,
    frontier: Frontier,
    robots: Option<RobotsPolicy>,
    status: DomainStatus,
    max_pages: u32,
    pages_fetched: u32,
    in_flight: u32,
    politeness: Duration,
    /// Hosts with a request in flight
    busy_hosts: HashSet<String>,
    /// When each host's last request finished
    last_fetch: HashMap<String, Instant>,
    accepted: BTreeSet<String>,
    failed_pages: u32,
    rendered_pages: u32,
    robots_skipped: u32,
}

impl DomainState {
    /// Creates the state and seeds the frontier with `root` at depth 0
    pub fn new(
        root: Url,
        scope: DomainScope,
        max_depth: u32,
        max_pages: u32,
        politeness: Duration,
    ) -> Self {
        let mut frontier = Frontier::new(max_depth, max_pages);
        frontier.enqueue(root.clone(), 0, None, "", 0);

        Self {
            root,
            scope,
            frontier,
            robots: None,
            status: DomainStatus::Queued,
            max_pages,
            pages_fetched: 0,
            in_flight: 0,
            politeness,
            busy_hosts: HashSet::new(),
            last_fetch: HashMap::new(),
            accepted: BTreeSet::new(),
            failed_pages: 0,
            rendered_pages: 0,
            robots_skipped: 0,
        }
    }

    /// Domain key (host plus non-default port)
    pub fn domain(&self) -> &str {
        self.scope.authority()
    }

    pub fn root(&self) -> &Url {
        &self.root
    }

    pub fn scope(&self) -> &DomainScope {
        &self.scope
    }

    pub fn status(&self) -> DomainStatus {
        self.status
    }

    pub fn is_drained(&self) -> bool {
        self.status == DomainStatus::Drained
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    pub fn in_flight(&self) -> u32 {
        self.in_flight
    }

    pub fn politeness(&self) -> Duration {
        self.politeness
    }

    /// Installs robots.txt rules
    ///
    /// A Crawl-delay longer than the configured interval replaces it. A root
    /// the rules disallow is dropped from the frontier.
    pub fn set_robots(&mut self, robots: RobotsPolicy) {
        if let Some(delay) = robots.crawl_delay() {
            if delay > self.politeness {
                self.politeness = delay;
            }
        }

        if !robots.allows(&self.root) {
            self.robots_skipped += self.frontier.clear() as u32;
        }

        self.robots = Some(robots);
    }

    /// Offers a normalized link discovered on one of this domain's pages
    pub fn offer(
        &mut self,
        url: Url,
        depth: u32,
        referrer: Option<&Url>,
        anchor_text: &str,
    ) -> OfferOutcome {
        if self.is_drained() {
            return OfferOutcome::Queued(EnqueueOutcome::CapReached);
        }

        if !self.scope.contains(&url) {
            return OfferOutcome::OutOfScope;
        }

        if self.frontier.contains(&url) {
            return OfferOutcome::Queued(EnqueueOutcome::AlreadySeen);
        }

        if let Some(robots) = &self.robots {
            if !robots.allows(&url) {
                self.robots_skipped += 1;
                return OfferOutcome::RobotsBlocked;
            }
        }

        OfferOutcome::Queued(self.frontier.enqueue(
            url,
            depth,
            referrer,
            anchor_text,
            self.pages_fetched,
        ))
    }

    /// Hands out the next entry if the domain and its host allow it
    ///
    /// A dispatched entry counts toward `pages_fetched` immediately, so
    /// in-flight fetches are covered by the page cap. A host serves one
    /// request at a time and the politeness interval runs from the moment
    /// its previous request finished.
    pub fn poll(&mut self, now: Instant) -> DomainPoll {
        if self.is_drained() {
            return DomainPoll::Drained;
        }

        if self.pages_fetched >= self.max_pages || self.frontier.is_empty() {
            if self.in_flight == 0 {
                self.frontier.clear();
                self.status = DomainStatus::Drained;
                return DomainPoll::JustDrained;
            }
            return DomainPoll::Busy;
        }

        let host = match self.frontier.peek() {
            Some(entry) => self.host_of(&entry.url),
            None => return DomainPoll::Busy,
        };

        if self.busy_hosts.contains(&host) {
            return DomainPoll::Busy;
        }

        if let Some(last) = self.last_fetch.get(&host) {
            let elapsed = now.saturating_duration_since(*last);
            if elapsed < self.politeness {
                return DomainPoll::Wait(self.politeness - elapsed);
            }
        }

        let Some(entry) = self.frontier.dequeue() else {
            return DomainPoll::Busy;
        };

        self.pages_fetched += 1;
        self.in_flight += 1;
        self.busy_hosts.insert(host);
        self.status = DomainStatus::Crawling;

        DomainPoll::Ready(entry)
    }

    /// Claims a redirect's final URL for the response that reached it
    ///
    /// An unseen URL is marked seen. A URL still waiting in the queue is
    /// pulled out so it is not fetched a second time. Returns false only if
    /// the URL was already dispatched or finished.
    pub fn claim_redirect_target(&mut self, url: &Url) -> bool {
        self.frontier.mark_seen(url) || self.frontier.remove_queued(url)
    }

    /// Adds a product URL; a drained domain's set is frozen
    pub fn accept(&mut self, url: &Url) -> bool {
        if self.is_drained() {
            return false;
        }
        self.accepted.insert(url.as_str().to_string())
    }

    pub fn record_rendered(&mut self) {
        self.rendered_pages += 1;
    }

    /// Closes out one dispatched page and frees its host
    pub fn finish(&mut self, url: &Url, outcome: PageState, now: Instant) {
        let host = self.host_of(url);
        self.busy_hosts.remove(&host);
        self.last_fetch.insert(host, now);
        self.in_flight = self.in_flight.saturating_sub(1);
        if outcome.is_failure() {
            self.failed_pages += 1;
        }
    }

    fn host_of(&self, url: &Url) -> String {
        authority(url).unwrap_or_else(|| self.domain().to_string())
    }

    pub fn accepted(&self) -> &BTreeSet<String> {
        &self.accepted
    }

    pub fn progress(&self) -> DomainProgress {
        DomainProgress {
            domain: self.domain().to_string(),
            root: self.root.to_string(),
            status: self.status,
            pages_fetched: self.pages_fetched,
            queued: self.frontier.len(),
            in_flight: self.in_flight,
            products_found: self.accepted.len(),
            failed_pages: self.failed_pages,
            rendered_pages: self.rendered_pages,
            robots_skipped: self.robots_skipped,
        }
    }
}
