use crate::model::partition::{ChannelSet, FeedKind};
use crate::provider::stream::FeedOptions;
use crate::runtime::telemetry;
use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_FETCH_LIMIT: usize = 100;
const MAX_FETCH_LIMIT: usize = 1_000;
const DEFAULT_BUFFER_CAPACITY: usize = 1_024;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_DRAIN_INTERVAL_MS: u64 = 200;

pub const POSTS_CHANNELS_KEY: &str = "posts.channels";
pub const COMMENTS_CHANNELS_KEY: &str = "comments.channels";
pub const POSTS_TOPIC_KEY: &str = "posts.topic";
pub const COMMENTS_TOPIC_KEY: &str = "comments.topic";
pub const FETCH_LIMIT_KEY: &str = "fetch.limit";
pub const BUFFER_CAPACITY_KEY: &str = "buffer.capacity";
pub const POLL_INTERVAL_KEY: &str = "poll.interval.ms";
pub const DRAIN_INTERVAL_KEY: &str = "drain.interval.ms";
pub const METRICS_INTERVAL_KEY: &str = "metrics.interval.ms";
pub const VALIDATE_CHANNELS_KEY: &str = "channels.validate";

/// Runtime configuration for a source task.
///
/// All instances must be constructed via [`SourceConfig::builder`],
/// [`SourceConfig::new`] or [`SourceConfig::from_props`] so invariants are
/// validated before any consumer observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    posts_channels: ChannelSet,
    comments_channels: ChannelSet,
    posts_topic: String,
    comments_topic: String,
    fetch_limit: usize,
    buffer_capacity: usize,
    poll_interval: Duration,
    drain_interval: Duration,
    metrics_interval: Duration,
    validate_channels: bool,
}

pub struct SourceConfigParams {
    pub posts_channels: ChannelSet,
    pub comments_channels: ChannelSet,
    pub posts_topic: String,
    pub comments_topic: String,
    pub fetch_limit: usize,
    pub buffer_capacity: usize,
    pub poll_interval: Duration,
    pub drain_interval: Duration,
    pub metrics_interval: Duration,
    pub validate_channels: bool,
}

impl SourceConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> SourceConfigBuilder {
        SourceConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    pub fn new(params: SourceConfigParams) -> Result<Self> {
        let SourceConfigParams {
            posts_channels,
            comments_channels,
            posts_topic,
            comments_topic,
            fetch_limit,
            buffer_capacity,
            poll_interval,
            drain_interval,
            metrics_interval,
            validate_channels,
        } = params;

        let config = Self {
            posts_channels,
            comments_channels,
            posts_topic: posts_topic.trim().to_owned(),
            comments_topic: comments_topic.trim().to_owned(),
            fetch_limit,
            buffer_capacity,
            poll_interval,
            drain_interval,
            metrics_interval,
            validate_channels,
        };

        config.validate()?;
        Ok(config)
    }

    /// Parses a flat property map such as the one handed over by a connector
    /// runtime. Unknown keys are ignored.
    pub fn from_props(props: &HashMap<String, String>) -> Result<Self> {
        let mut builder = Self::builder();

        if let Some(channels) = props.get(POSTS_CHANNELS_KEY) {
            builder = builder.posts_channels(ChannelSet::parse(channels));
        }
        if let Some(channels) = props.get(COMMENTS_CHANNELS_KEY) {
            builder = builder.comments_channels(ChannelSet::parse(channels));
        }
        if let Some(topic) = props.get(POSTS_TOPIC_KEY) {
            builder = builder.posts_topic(topic.as_str());
        }
        if let Some(topic) = props.get(COMMENTS_TOPIC_KEY) {
            builder = builder.comments_topic(topic.as_str());
        }
        if let Some(limit) = parse_prop::<usize>(props, FETCH_LIMIT_KEY)? {
            builder = builder.fetch_limit(limit);
        }
        if let Some(capacity) = parse_prop::<usize>(props, BUFFER_CAPACITY_KEY)? {
            builder = builder.buffer_capacity(capacity);
        }
        if let Some(millis) = parse_prop::<u64>(props, POLL_INTERVAL_KEY)? {
            builder = builder.poll_interval(Duration::from_millis(millis));
        }
        if let Some(millis) = parse_prop::<u64>(props, DRAIN_INTERVAL_KEY)? {
            builder = builder.drain_interval(Duration::from_millis(millis));
        }
        if let Some(millis) = parse_prop::<u64>(props, METRICS_INTERVAL_KEY)? {
            builder = builder.metrics_interval(Duration::from_millis(millis));
        }
        if let Some(validate) = parse_prop::<bool>(props, VALIDATE_CHANNELS_KEY)? {
            builder = builder.validate_channels(validate);
        }

        builder.build()
    }

    pub fn posts_channels(&self) -> &ChannelSet {
        &self.posts_channels
    }

    pub fn comments_channels(&self) -> &ChannelSet {
        &self.comments_channels
    }

    pub fn channels(&self, kind: FeedKind) -> &ChannelSet {
        match kind {
            FeedKind::Posts => &self.posts_channels,
            FeedKind::Comments => &self.comments_channels,
        }
    }

    /// Destination topic for records of `kind`.
    pub fn topic(&self, kind: FeedKind) -> &str {
        match kind {
            FeedKind::Posts => &self.posts_topic,
            FeedKind::Comments => &self.comments_topic,
        }
    }

    /// Page size requested from the upstream per poll.
    pub fn fetch_limit(&self) -> usize {
        self.fetch_limit
    }

    /// Records each reader may buffer before its fetch loop pauses.
    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    /// Initial wait of paged streams after a poll brought nothing new.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Fetch settings handed to the provider for every stream it opens.
    pub fn feed_options(&self) -> FeedOptions {
        FeedOptions {
            limit: self.fetch_limit,
            poll_interval: self.poll_interval,
        }
    }

    /// Interval between task polls made by the [`super::runner::Runner`].
    pub fn drain_interval(&self) -> Duration {
        self.drain_interval
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// Whether every configured channel is checked with the provider at start.
    pub fn validate_channels(&self) -> bool {
        self.validate_channels
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        for kind in FeedKind::ALL {
            if !self.channels(kind).is_empty() && self.topic(kind).is_empty() {
                bail!("{kind}.topic is required when {kind}.channels is set");
            }
        }

        if self.fetch_limit == 0 || self.fetch_limit > MAX_FETCH_LIMIT {
            bail!("fetch_limit must be between 1 and {MAX_FETCH_LIMIT}");
        }

        if self.buffer_capacity == 0 {
            bail!("buffer_capacity must be greater than 0");
        }

        if self.poll_interval.is_zero() {
            bail!("poll_interval must be greater than 0");
        }

        if self.drain_interval.is_zero() {
            bail!("drain_interval must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct SourceConfigBuilder {
    posts_channels: Option<ChannelSet>,
    comments_channels: Option<ChannelSet>,
    posts_topic: Option<String>,
    comments_topic: Option<String>,
    fetch_limit: Option<usize>,
    buffer_capacity: Option<usize>,
    poll_interval: Option<Duration>,
    drain_interval: Option<Duration>,
    metrics_interval: Option<Duration>,
    validate_channels: Option<bool>,
}

impl SourceConfigBuilder {
    pub fn posts_channels(mut self, channels: ChannelSet) -> Self {
        self.posts_channels = Some(channels);
        self
    }

    pub fn comments_channels(mut self, channels: ChannelSet) -> Self {
        self.comments_channels = Some(channels);
        self
    }

    pub fn posts_topic(mut self, topic: impl Into<String>) -> Self {
        self.posts_topic = Some(topic.into());
        self
    }

    pub fn comments_topic(mut self, topic: impl Into<String>) -> Self {
        self.comments_topic = Some(topic.into());
        self
    }

    pub fn fetch_limit(mut self, limit: usize) -> Self {
        self.fetch_limit = Some(limit);
        self
    }

    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = Some(capacity);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn drain_interval(mut self, interval: Duration) -> Self {
        self.drain_interval = Some(interval);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn validate_channels(mut self, validate: bool) -> Self {
        self.validate_channels = Some(validate);
        self
    }

    pub fn build(self) -> Result<SourceConfig> {
        let params = SourceConfigParams {
            posts_channels: self.posts_channels.unwrap_or_default(),
            comments_channels: self.comments_channels.unwrap_or_default(),
            posts_topic: self.posts_topic.unwrap_or_default(),
            comments_topic: self.comments_topic.unwrap_or_default(),
            fetch_limit: self.fetch_limit.unwrap_or(DEFAULT_FETCH_LIMIT),
            buffer_capacity: self.buffer_capacity.unwrap_or(DEFAULT_BUFFER_CAPACITY),
            poll_interval: self
                .poll_interval
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS)),
            drain_interval: self
                .drain_interval
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_DRAIN_INTERVAL_MS)),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
            validate_channels: self.validate_channels.unwrap_or(false),
        };

        SourceConfig::new(params)
    }
}

fn parse_prop<T>(props: &HashMap<String, String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match props.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("invalid value {raw:?} for {key}")),
    }
}
