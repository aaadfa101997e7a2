use crate::model::item::{Comment, Post};
use crate::model::partition::{ChannelSet, FeedKind};
use anyhow::Result;
use core::future::Future;
use core::pin::Pin;
use std::time::Duration;

pub type FeedFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Endless, chronologically increasing sequence of raw items.
///
/// `next` may stay pending for as long as the provider needs to pace itself
/// against its upstream. Readers interrupt an in-flight call by dropping the
/// returned future, so implementations must not lose or duplicate items when
/// that happens.
pub trait FeedStream: Send {
    type Item: Send + 'static;

    fn next(&mut self) -> FeedFuture<'_, Self::Item>;
}

pub type BoxFeedStream<T> = Box<dyn FeedStream<Item = T>>;

impl<S: FeedStream + ?Sized> FeedStream for Box<S> {
    type Item = S::Item;

    fn next(&mut self) -> FeedFuture<'_, Self::Item> {
        (**self).next()
    }
}

/// Fetch settings applied to every stream a provider opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedOptions {
    /// Maximum number of items requested from the upstream per fetch.
    pub limit: usize,
    /// Initial wait after a fetch brought nothing new.
    pub poll_interval: Duration,
}

/// Client for the live upstream (authentication, pagination and rate limiting
/// live behind this trait).
pub trait FeedProvider: Send + Sync + 'static {
    /// Opens one merged stream of new posts across `channels`. Returns `None`
    /// when `channels` is empty.
    fn posts<'a>(
        &'a self,
        channels: &'a ChannelSet,
        options: &'a FeedOptions,
    ) -> FeedFuture<'a, Option<BoxFeedStream<Post>>>;

    /// Opens one merged stream of new comments across `channels`. Returns
    /// `None` when `channels` is empty.
    fn comments<'a>(
        &'a self,
        channels: &'a ChannelSet,
        options: &'a FeedOptions,
    ) -> FeedFuture<'a, Option<BoxFeedStream<Comment>>>;

    /// Whether `channel` exists and can be read. Providers that cannot tell
    /// report every channel as accessible.
    fn can_access_channel<'a>(&'a self, _kind: FeedKind, _channel: &'a str) -> FeedFuture<'a, bool> {
        Box::pin(async { Ok(true) })
    }
}
