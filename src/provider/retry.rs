use super::backoff::next_backoff;
use super::stream::{FeedFuture, FeedStream};
use std::time::Duration;
use tokio::time::sleep;

const DEFAULT_INITIAL_DELAY_MS: u64 = 250;
const DEFAULT_MAX_DELAY_MS: u64 = 5_000;
const DEFAULT_MAX_ATTEMPTS: usize = 5;

/// Wraps a stream so transient upstream failures are retried with exponential
/// backoff before they reach the reader, where every error is fatal.
///
/// Only wrap streams whose `next` leaves their position untouched when it
/// fails; [`super::paged::PagedFeedStream`] satisfies this.
pub struct RetryFeedStream<S: FeedStream> {
    inner: S,
    initial_delay: Duration,
    max_delay: Duration,
    max_attempts: usize,
}

impl<S: FeedStream> RetryFeedStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_backoff(mut self, initial_delay: Duration, max_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self.max_delay = max_delay.max(initial_delay);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: FeedStream> FeedStream for RetryFeedStream<S> {
    type Item = S::Item;

    fn next(&mut self) -> FeedFuture<'_, Self::Item> {
        Box::pin(async move {
            let mut attempt = 0usize;
            let mut backoff = self.initial_delay;

            loop {
                attempt += 1;
                match self.inner.next().await {
                    Ok(item) => return Ok(item),
                    Err(err) if attempt < self.max_attempts => {
                        tracing::warn!(
                            attempt,
                            max_attempts = self.max_attempts,
                            backoff = ?backoff,
                            error = %err,
                            "feed fetch failed; retrying"
                        );
                        sleep(backoff).await;
                        backoff = next_backoff(backoff, self.max_delay);
                    }
                    Err(err) => {
                        return Err(err.context(format!(
                            "feed fetch failed after {attempt} attempts"
                        )));
                    }
                }
            }
        })
    }
}
