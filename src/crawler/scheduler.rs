//! Shared multi-domain ready queue
//!
//! One scheduler serves every worker of a job:
//! - Round-robin dispatch across domains, so no domain starves
//! - Per-host politeness (delegated to each `DomainState`)
//! - Drain detection and job termination
//! - Cancellation between fetches

use crate::crawler::frontier::FrontierEntry;
use crate::state::{DomainPoll, DomainState, PageState};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Domain state shared between the scheduler and the workers
pub type SharedDomain = Arc<Mutex<DomainState>>;

/// Upper bound on how long an idle worker sleeps before polling again
const IDLE_WAIT: Duration = Duration::from_millis(250);

/// A frontier entry handed to a worker
#[derive(Debug, Clone)]
pub struct Dispatch {
    /// Index of the domain in the scheduler
    pub domain: usize,
    pub entry: FrontierEntry,
}

/// Holds one dispatched page open until it is completed or dropped
///
/// Dropping the lease closes the page out on its domain and wakes idle
/// workers. A lease dropped without `complete`, for instance while unwinding
/// from a panic or when its future is cancelled, counts as a failed page.
pub struct PageLease<'a> {
    scheduler: &'a Scheduler,
    domain: usize,
    url: Url,
    outcome: PageState,
}

impl PageLease<'_> {
    pub fn complete(mut self, outcome: PageState) {
        self.outcome = outcome;
    }
}

impl Drop for PageLease<'_> {
    fn drop(&mut self) {
        self.scheduler.domains[self.domain]
            .lock()
            .finish(&self.url, self.outcome, Instant::now());
        self.scheduler.notify();
    }
}

/// Result of one pass over all domains
#[derive(Debug, Clone)]
pub enum DispatchPoll {
    Ready(Dispatch),
    /// Nothing dispatchable yet; the shortest politeness wait, if any
    Wait(Option<Duration>),
    /// Every domain is drained
    Finished,
}

/// Scheduler over the domains of one job
pub struct Scheduler {
    domains: Vec<SharedDomain>,
    cursor: AtomicUsize,
    notify: Notify,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(domains: Vec<SharedDomain>, cancel: CancellationToken) -> Self {
        Self {
            domains,
            cursor: AtomicUsize::new(0),
            notify: Notify::new(),
            cancel,
        }
    }

    pub fn domains(&self) -> &[SharedDomain] {
        &self.domains
    }

    pub fn domain(&self, index: usize) -> &SharedDomain {
        &self.domains[index]
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wakes idle workers; called whenever a page finishes
    pub fn notify(&self) {
        self.notify.notify_waiters();
    }

    /// Opens the lease that closes out `dispatch` on its domain
    pub fn lease(&self, dispatch: &Dispatch) -> PageLease<'_> {
        PageLease {
            scheduler: self,
            domain: dispatch.domain,
            url: dispatch.entry.url.clone(),
            outcome: PageState::Failed,
        }
    }

    pub fn all_drained(&self) -> bool {
        self.domains.iter().all(|d| d.lock().is_drained())
    }

    /// Makes one pass over all domains, starting after the domain served last
    pub fn try_dispatch(&self, now: Instant) -> DispatchPoll {
        let count = self.domains.len();
        if count == 0 {
            return DispatchPoll::Finished;
        }

        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % count;
        let mut drained = 0;
        let mut shortest: Option<Duration> = None;

        for offset in 0..count {
            let index = (start + offset) % count;
            let mut state = self.domains[index].lock();

            match state.poll(now) {
                DomainPoll::Ready(entry) => {
                    tracing::trace!(
                        domain = state.domain(),
                        url = %entry.url,
                        depth = entry.depth,
                        "dispatching"
                    );
                    return DispatchPoll::Ready(Dispatch {
                        domain: index,
                        entry,
                    });
                }
                DomainPoll::Wait(wait) => {
                    shortest = Some(shortest.map_or(wait, |s| s.min(wait)));
                }
                DomainPoll::Busy => {}
                DomainPoll::JustDrained => {
                    let progress = state.progress();
                    tracing::info!(
                        domain = %progress.domain,
                        pages_fetched = progress.pages_fetched,
                        products_found = progress.products_found,
                        failed_pages = progress.failed_pages,
                        "domain drained"
                    );
                    drained += 1;
                }
                DomainPoll::Drained => drained += 1,
            }
        }

        if drained == count {
            DispatchPoll::Finished
        } else {
            DispatchPoll::Wait(shortest)
        }
    }

    /// Waits for the next dispatchable entry
    ///
    /// Returns `None` once every domain is drained or the job is cancelled.
    pub async fn next(&self) -> Option<Dispatch> {
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }

            // Registered before polling so a wakeup between the poll and the
            // wait is not lost.
            let notified = self.notify.notified();

            let wait = match self.try_dispatch(Instant::now()) {
                DispatchPoll::Ready(dispatch) => return Some(dispatch),
                DispatchPoll::Finished => {
                    self.notify();
                    return None;
                }
                DispatchPoll::Wait(wait) => wait.map_or(IDLE_WAIT, |w| w.min(IDLE_WAIT)),
            };

            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(wait) => {}
                _ = self.cancel.cancelled() => return None,
            }
        }
    }
}
