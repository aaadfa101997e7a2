//! Live stream built on top of a "newest items" listing.
//!
//! Upstream APIs usually expose a listing sorted newest-first and capped at a
//! page size. [`PagedFeedStream`] polls that listing, yields the items it has
//! not seen yet in oldest-first order, and waits with a growing delay whenever
//! a poll brings nothing new.

use super::backoff::PollBackoff;
use super::stream::{FeedFuture, FeedStream};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tokio::time::sleep;

const SEEN_WINDOW_PAGES: usize = 4;
const MAX_IDLE_MULTIPLIER: u32 = 4;

pub trait PageSource: Send + Sync + 'static {
    type Item: Send + 'static;

    /// Fetches at most `limit` of the most recent items, newest first.
    fn fetch_newest(&self, limit: usize) -> FeedFuture<'_, Vec<Self::Item>>;

    fn item_id<'a>(&self, item: &'a Self::Item) -> &'a str;
}

/// Bounded memory of recently yielded ids.
#[derive(Debug)]
struct SeenWindow {
    order: VecDeque<String>,
    ids: HashSet<String>,
    capacity: usize,
}

impl SeenWindow {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn insert(&mut self, id: &str) {
        if !self.ids.insert(id.to_owned()) {
            return;
        }
        self.order.push_back(id.to_owned());
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.ids.remove(&evicted);
            }
        }
    }
}

pub struct PagedFeedStream<S: PageSource> {
    source: S,
    limit: usize,
    backoff: PollBackoff,
    pending: VecDeque<S::Item>,
    seen: SeenWindow,
}

impl<S: PageSource> PagedFeedStream<S> {
    /// `limit` is the page size requested per poll; `poll_interval` is the
    /// initial wait after a poll returned nothing new.
    pub fn new(source: S, limit: usize, poll_interval: Duration) -> Self {
        let limit = limit.max(1);
        Self {
            source,
            limit,
            backoff: PollBackoff::new(
                poll_interval,
                poll_interval.saturating_mul(MAX_IDLE_MULTIPLIER),
            ),
            pending: VecDeque::new(),
            seen: SeenWindow::new(limit.saturating_mul(SEEN_WINDOW_PAGES)),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Queues the unseen part of a newest-first page in chronological order.
    fn absorb(&mut self, page: Vec<S::Item>) -> usize {
        let mut fresh = 0usize;
        for item in page.into_iter().rev() {
            let id = self.source.item_id(&item);
            if self.seen.contains(id) {
                continue;
            }
            self.seen.insert(id);
            self.pending.push_back(item);
            fresh += 1;
        }
        fresh
    }
}

impl<S: PageSource> FeedStream for PagedFeedStream<S> {
    type Item = S::Item;

    fn next(&mut self) -> FeedFuture<'_, Self::Item> {
        Box::pin(async move {
            loop {
                if let Some(item) = self.pending.pop_front() {
                    return Ok(item);
                }

                let page = self.source.fetch_newest(self.limit).await?;
                let fresh = self.absorb(page);
                if fresh > 0 {
                    tracing::trace!(fresh, "page brought new items");
                    self.backoff.reset();
                    continue;
                }

                let delay = self.backoff.next_delay();
                tracing::trace!(?delay, "no new items; waiting");
                sleep(delay).await;
            }
        })
    }
}
