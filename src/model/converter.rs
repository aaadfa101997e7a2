//! Per-kind capability sets used by the generic stream reader.
//!
//! A [`RecordConverter`] tells the reader how to attribute a raw item to its
//! channel, how to extract its creation time, and how to turn it into the
//! JSON payload of a [`SourceRecord`].

use super::item::{Comment, Post};
use super::partition::{FeedKind, Offset, Partition};
use super::record::SourceRecord;
use serde_json::{json, Value};
use std::fmt;

/// Raised when a raw item cannot be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertError {
    kind: FeedKind,
    reason: String,
}

impl ConvertError {
    pub fn new(kind: FeedKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> FeedKind {
        self.kind
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed {} item: {}", self.kind, self.reason)
    }
}

impl std::error::Error for ConvertError {}

pub trait RecordConverter: Send + Sync + 'static {
    type Item: Send + 'static;

    fn kind(&self) -> FeedKind;

    /// Stable identifier of the item, used as the record key.
    fn item_id<'a>(&self, item: &'a Self::Item) -> &'a str;

    /// Channel the item was published in. Multi-channel feeds are demultiplexed
    /// with this value rather than with the configured channel list.
    fn channel<'a>(&self, item: &'a Self::Item) -> &'a str;

    fn created(&self, item: &Self::Item) -> Offset;

    fn payload(&self, item: &Self::Item) -> Value;

    fn source_partition(&self, channel: &str) -> Partition {
        Partition::new(self.kind(), channel)
    }

    fn source_offset(&self, record: &SourceRecord) -> Offset {
        record.offset()
    }

    fn convert(&self, item: &Self::Item, topic: &str) -> Result<SourceRecord, ConvertError> {
        let id = self.item_id(item);
        if id.trim().is_empty() {
            return Err(ConvertError::new(self.kind(), "item has no id"));
        }

        let channel = self.channel(item);
        if channel.trim().is_empty() {
            return Err(ConvertError::new(
                self.kind(),
                format!("item {id} has no channel"),
            ));
        }

        Ok(SourceRecord::new(
            self.source_partition(channel),
            self.created(item),
            topic,
            id,
            self.payload(item),
        ))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostConverter;

impl RecordConverter for PostConverter {
    type Item = Post;

    fn kind(&self) -> FeedKind {
        FeedKind::Posts
    }

    fn item_id<'a>(&self, item: &'a Post) -> &'a str {
        &item.id
    }

    fn channel<'a>(&self, item: &'a Post) -> &'a str {
        &item.channel
    }

    fn created(&self, item: &Post) -> Offset {
        Offset::from_datetime(&item.created)
    }

    fn payload(&self, item: &Post) -> Value {
        json!({
            "id": item.id,
            "channel": item.channel,
            "author": item.author,
            "title": item.title,
            "body": item.body,
            "url": item.url,
            "permalink": item.permalink,
            "score": item.score,
            "created": item.created.to_rfc3339(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CommentConverter;

impl RecordConverter for CommentConverter {
    type Item = Comment;

    fn kind(&self) -> FeedKind {
        FeedKind::Comments
    }

    fn item_id<'a>(&self, item: &'a Comment) -> &'a str {
        &item.id
    }

    fn channel<'a>(&self, item: &'a Comment) -> &'a str {
        &item.channel
    }

    fn created(&self, item: &Comment) -> Offset {
        Offset::from_datetime(&item.created)
    }

    fn payload(&self, item: &Comment) -> Value {
        json!({
            "id": item.id,
            "channel": item.channel,
            "author": item.author,
            "body": item.body,
            "post_id": item.post_id,
            "parent_id": item.parent_id,
            "score": item.score,
            "created": item.created.to_rfc3339(),
        })
    }
}
