//! Channel-backed feeds for embedding the engine without a network client.

use super::stream::{BoxFeedStream, FeedFuture, FeedOptions, FeedProvider, FeedStream};
use crate::model::item::{Comment, Post};
use crate::model::partition::{ChannelSet, FeedKind};
use anyhow::{anyhow, bail, Error, Result};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// Creates a connected sender/stream pair.
pub fn memory_feed<T: Send + 'static>() -> (MemoryFeedSender<T>, MemoryFeedStream<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MemoryFeedSender { tx }, MemoryFeedStream { rx })
}

pub struct MemoryFeedSender<T> {
    tx: mpsc::UnboundedSender<Result<T>>,
}

impl<T> Clone for MemoryFeedSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> MemoryFeedSender<T> {
    pub fn send(&self, item: T) -> Result<()> {
        self.tx
            .send(Ok(item))
            .map_err(|_| anyhow!("memory feed stream was dropped"))
    }

    /// Makes the next pull on the stream fail with `error`.
    pub fn fail(&self, error: Error) -> Result<()> {
        self.tx
            .send(Err(error))
            .map_err(|_| anyhow!("memory feed stream was dropped"))
    }
}

pub struct MemoryFeedStream<T> {
    rx: mpsc::UnboundedReceiver<Result<T>>,
}

impl<T: Send + 'static> FeedStream for MemoryFeedStream<T> {
    type Item = T;

    fn next(&mut self) -> FeedFuture<'_, T> {
        Box::pin(async move {
            match self.rx.recv().await {
                Some(item) => item,
                None => Err(anyhow!("memory feed closed by its sender")),
            }
        })
    }
}

/// Provider serving pre-wired memory streams. Each stream can be opened once.
#[derive(Default)]
pub struct MemoryFeedProvider {
    posts: Mutex<Option<MemoryFeedStream<Post>>>,
    comments: Mutex<Option<MemoryFeedStream<Comment>>>,
    inaccessible: Mutex<HashSet<String>>,
}

impl MemoryFeedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_posts(self, stream: MemoryFeedStream<Post>) -> Self {
        *lock(&self.posts) = Some(stream);
        self
    }

    pub fn with_comments(self, stream: MemoryFeedStream<Comment>) -> Self {
        *lock(&self.comments) = Some(stream);
        self
    }

    /// Marks `channel` as unreadable for [`FeedProvider::can_access_channel`].
    pub fn deny_channel(self, channel: impl Into<String>) -> Self {
        lock(&self.inaccessible).insert(channel.into());
        self
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn take_stream<T: Send + 'static>(
    slot: &Mutex<Option<MemoryFeedStream<T>>>,
    kind: FeedKind,
    channels: &ChannelSet,
) -> Result<Option<BoxFeedStream<T>>> {
    if channels.is_empty() {
        return Ok(None);
    }
    match lock(slot).take() {
        Some(stream) => Ok(Some(Box::new(stream))),
        None => bail!("no {kind} stream available for channels {channels}"),
    }
}

impl FeedProvider for MemoryFeedProvider {
    fn posts<'a>(
        &'a self,
        channels: &'a ChannelSet,
        _options: &'a FeedOptions,
    ) -> FeedFuture<'a, Option<BoxFeedStream<Post>>> {
        Box::pin(async move { take_stream(&self.posts, FeedKind::Posts, channels) })
    }

    fn comments<'a>(
        &'a self,
        channels: &'a ChannelSet,
        _options: &'a FeedOptions,
    ) -> FeedFuture<'a, Option<BoxFeedStream<Comment>>> {
        Box::pin(async move { take_stream(&self.comments, FeedKind::Comments, channels) })
    }

    fn can_access_channel<'a>(&'a self, _kind: FeedKind, channel: &'a str) -> FeedFuture<'a, bool> {
        Box::pin(async move { Ok(!lock(&self.inaccessible).contains(channel)) })
    }
}
