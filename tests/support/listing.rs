use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;
use feedsource::{
    BoxFeedStream, ChannelSet, Comment, FeedFuture, FeedKind, FeedOptions, FeedProvider,
    PageSource, PagedFeedStream, Post, RetryFeedStream,
};

/// Newest-first post listing shared between a test and the provider reading it.
#[derive(Clone, Default)]
pub struct PostListing {
    posts: Arc<Mutex<Vec<Post>>>,
    failures: Arc<AtomicUsize>,
    fetches: Arc<AtomicUsize>,
    last_limit: Arc<AtomicUsize>,
}

impl PostListing {
    pub fn publish(&self, post: Post) {
        self.posts.lock().unwrap().push(post);
    }

    /// Makes the next `count` listing requests fail.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Page size requested by the most recent listing fetch.
    pub fn last_limit(&self) -> usize {
        self.last_limit.load(Ordering::SeqCst)
    }
}

struct ListingSource {
    listing: PostListing,
    channels: ChannelSet,
}

impl PageSource for ListingSource {
    type Item = Post;

    fn fetch_newest(&self, limit: usize) -> FeedFuture<'_, Vec<Post>> {
        Box::pin(async move {
            self.listing.fetches.fetch_add(1, Ordering::SeqCst);
            self.listing.last_limit.store(limit, Ordering::SeqCst);
            if self
                .listing
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                bail!("listing returned HTTP 503");
            }

            let mut page: Vec<Post> = self
                .listing
                .posts
                .lock()
                .unwrap()
                .iter()
                .filter(|post| self.channels.contains(&post.channel))
                .cloned()
                .collect();
            page.sort_by(|a, b| b.created.cmp(&a.created));
            page.truncate(limit);
            Ok(page)
        })
    }

    fn item_id<'a>(&self, item: &'a Post) -> &'a str {
        &item.id
    }
}

/// Provider serving posts from a [`PostListing`] through the paging and retry
/// adapters. It has no comment feed.
pub struct ListingProvider {
    listing: PostListing,
}

impl ListingProvider {
    pub fn new(listing: PostListing) -> Self {
        Self { listing }
    }
}

impl FeedProvider for ListingProvider {
    fn posts<'a>(
        &'a self,
        channels: &'a ChannelSet,
        options: &'a FeedOptions,
    ) -> FeedFuture<'a, Option<BoxFeedStream<Post>>> {
        Box::pin(async move {
            if channels.is_empty() {
                return Ok(None);
            }
            let source = ListingSource {
                listing: self.listing.clone(),
                channels: channels.clone(),
            };
            let paged = PagedFeedStream::new(source, options.limit, options.poll_interval);
            let stream = RetryFeedStream::new(paged)
                .with_backoff(Duration::from_millis(5), Duration::from_millis(20))
                .with_max_attempts(3);
            Ok(Some(Box::new(stream) as BoxFeedStream<Post>))
        })
    }

    fn comments<'a>(
        &'a self,
        _channels: &'a ChannelSet,
        _options: &'a FeedOptions,
    ) -> FeedFuture<'a, Option<BoxFeedStream<Comment>>> {
        Box::pin(async { Ok(None) })
    }

    fn can_access_channel<'a>(&'a self, kind: FeedKind, _channel: &'a str) -> FeedFuture<'a, bool> {
        Box::pin(async move { Ok(kind == FeedKind::Posts) })
    }
}
