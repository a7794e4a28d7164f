//! Per-domain frontier: FIFO queue of URLs to visit plus their seen-set
//!
//! The seen-set holds every URL ever queued or visited, keyed by its
//! normalized form, so memory grows with unique URLs rather than with the
//! raw number of outbound links.

use std::collections::{HashSet, VecDeque};
use url::Url;

/// A URL waiting to be fetched
#[derive(Debug, Clone, PartialEq)]
pub struct FrontierEntry {
    /// Normalized URL
    pub url: Url,
    /// Link distance from the domain root (root is 0)
    pub depth: u32,
    /// Page the URL was discovered on
    pub referrer: Option<Url>,
    /// Text of the link that led here
    pub anchor_text: String,
}

/// Result of offering a URL to the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Added,
    AlreadySeen,
    TooDeep,
    CapReached,
}

#[derive(Debug)]
pub struct Frontier {
    queue: VecDeque<FrontierEntry>,
    seen: HashSet<String>,
    max_depth: u32,
    max_pages: u32,
}

impl Frontier {
    pub fn new(max_depth: u32, max_pages: u32) -> Self {
        Self {
            queue: VecDeque::new(),
            seen: HashSet::new(),
            max_depth,
            max_pages,
        }
    }

    /// Offers a normalized URL
    ///
    /// No-op when the URL was seen before, when `depth` exceeds the depth
    /// limit, or when `pages_fetched` plus the queue length already meets the
    /// page cap. Otherwise the URL joins both the queue and the seen-set.
    pub fn enqueue(
        &mut self,
        url: Url,
        depth: u32,
        referrer: Option<&Url>,
        anchor_text: &str,
        pages_fetched: u32,
    ) -> EnqueueOutcome {
        if self.seen.contains(url.as_str()) {
            return EnqueueOutcome::AlreadySeen;
        }

        if depth > self.max_depth {
            return EnqueueOutcome::TooDeep;
        }

        if pages_fetched as usize + self.queue.len() >= self.max_pages as usize {
            return EnqueueOutcome::CapReached;
        }

        self.seen.insert(url.as_str().to_string());
        self.queue.push_back(FrontierEntry {
            url,
            depth,
            referrer: referrer.cloned(),
            anchor_text: anchor_text.trim().to_string(),
        });

        EnqueueOutcome::Added
    }

    pub fn dequeue(&mut self) -> Option<FrontierEntry> {
        self.queue.pop_front()
    }

    pub fn peek(&self) -> Option<&FrontierEntry> {
        self.queue.front()
    }

    /// Records a URL as visited without queueing it
    ///
    /// Used for the final URL of a redirect. Returns false if it was already
    /// seen.
    pub fn mark_seen(&mut self, url: &Url) -> bool {
        self.seen.insert(url.as_str().to_string())
    }

    /// Drops a queued, not yet dispatched entry; false if none was queued
    pub fn remove_queued(&mut self, url: &Url) -> bool {
        match self.queue.iter().position(|e| e.url == *url) {
            Some(index) => self.queue.remove(index).is_some(),
            None => false,
        }
    }

    pub fn contains(&self, url: &Url) -> bool {
        self.seen.contains(url.as_str())
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Drops everything still queued; the seen-set is kept
    pub fn clear(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }
}
