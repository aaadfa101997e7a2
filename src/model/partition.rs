use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Logical feed families a task can ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    Posts,
    Comments,
}

impl FeedKind {
    pub const ALL: [FeedKind; 2] = [FeedKind::Posts, FeedKind::Comments];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedKind::Posts => "posts",
            FeedKind::Comments => "comments",
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resumption key of one logical sub-stream: a feed kind paired with the channel
/// an item was actually published in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Partition {
    kind: FeedKind,
    channel: String,
}

impl Partition {
    pub fn new(kind: FeedKind, channel: impl Into<String>) -> Self {
        Self {
            kind,
            channel: channel.into(),
        }
    }

    pub fn kind(&self) -> FeedKind {
        self.kind
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.channel)
    }
}

/// Creation time (milliseconds since the Unix epoch) of the last item delivered
/// for a partition.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Offset(i64);

impl Offset {
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn from_datetime(created: &DateTime<Utc>) -> Self {
        Self(created.timestamp_millis())
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.0)
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Last known offset per partition. A partition without an entry has no
/// delivery history, so nothing is filtered for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetMap {
    offsets: HashMap<Partition, Offset>,
}

impl OffsetMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, partition: &Partition) -> Option<Offset> {
        self.offsets.get(partition).copied()
    }

    /// Returns `true` when an item created at `created` was already delivered
    /// for `partition`. Equal timestamps count as delivered.
    pub fn is_delivered(&self, partition: &Partition, created: Offset) -> bool {
        self.get(partition)
            .map(|stored| created <= stored)
            .unwrap_or(false)
    }

    /// Records `offset` as the latest delivered position for `partition`.
    pub fn advance(&mut self, partition: Partition, offset: Offset) {
        self.offsets.insert(partition, offset);
    }

    /// Keeps the greater of the stored and the supplied offset.
    pub fn merge_max(&mut self, partition: Partition, offset: Offset) {
        self.offsets
            .entry(partition)
            .and_modify(|stored| {
                if offset > *stored {
                    *stored = offset;
                }
            })
            .or_insert(offset);
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Partition, &Offset)> {
        self.offsets.iter()
    }
}

impl FromIterator<(Partition, Offset)> for OffsetMap {
    fn from_iter<I: IntoIterator<Item = (Partition, Offset)>>(iter: I) -> Self {
        let mut map = OffsetMap::new();
        for (partition, offset) in iter {
            map.advance(partition, offset);
        }
        map
    }
}

impl IntoIterator for OffsetMap {
    type Item = (Partition, Offset);
    type IntoIter = std::collections::hash_map::IntoIter<Partition, Offset>;

    fn into_iter(self) -> Self::IntoIter {
        self.offsets.into_iter()
    }
}

/// Ordered, duplicate-free channel identifiers configured for one feed kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelSet {
    channels: Vec<String>,
}

impl ChannelSet {
    /// Builds a set from raw identifiers: values are trimmed, blanks dropped and
    /// duplicates removed while keeping the first occurrence.
    pub fn new<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<String> = Vec::new();
        for channel in channels {
            let channel = channel.as_ref().trim();
            if channel.is_empty() || unique.iter().any(|existing| existing == channel) {
                continue;
            }
            unique.push(channel.to_owned());
        }
        Self { channels: unique }
    }

    /// Parses a comma separated list such as `"rust, programming"`.
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(','))
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(String::as_str)
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.channels.iter().any(|existing| existing == channel)
    }

    /// Partition keys for every configured channel of `kind`.
    pub fn partitions(&self, kind: FeedKind) -> Vec<Partition> {
        self.iter()
            .map(|channel| Partition::new(kind, channel))
            .collect()
    }
}

impl fmt::Display for ChannelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.channels.join(","))
    }
}
