//! Task-level orchestration of the per-kind stream readers.

use crate::model::converter::{CommentConverter, PostConverter, RecordConverter};
use crate::model::partition::{FeedKind, OffsetMap};
use crate::model::record::SourceRecord;
use crate::offsets::OffsetStore;
use crate::provider::stream::{BoxFeedStream, FeedProvider};
use crate::runtime::config::SourceConfig;
use crate::runtime::fatal::FirstErrorLatch;
use crate::runtime::telemetry::{self, Telemetry};
use crate::stream::reader::{FeedReader, StreamReader, StreamReaderParams};
use crate::stream::state::ReaderState;
use anyhow::{bail, Context, Result};
use futures::future::join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const POLL_ERROR_CONTEXT: &str = "error occurred while reading from feed";

/// Readers and background handles belonging to one `start`/`stop` cycle.
struct Session {
    run_token: CancellationToken,
    readers: Vec<Box<dyn FeedReader>>,
    latch: FirstErrorLatch,
    metrics_handle: Option<JoinHandle<()>>,
}

impl Session {
    async fn shutdown(mut self) {
        self.run_token.cancel();
        join_all(self.readers.iter_mut().map(|reader| reader.close())).await;

        if let Some(handle) = self.metrics_handle.take() {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "metrics reporter task panicked");
            }
        }
    }
}

/// Fans ingestion out over one [`StreamReader`] per configured feed kind and
/// merges their buffered output and failures into a single poll surface.
pub struct SourceTask {
    provider: Arc<dyn FeedProvider>,
    store: Arc<dyn OffsetStore>,
    telemetry: Arc<Telemetry>,
    shutdown_root: CancellationToken,
    session: Option<Session>,
}

impl SourceTask {
    pub fn new(provider: Arc<dyn FeedProvider>, store: Arc<dyn OffsetStore>) -> Self {
        Self::with_cancellation_token(provider, store, CancellationToken::new())
    }

    /// Builds a task whose readers stop as soon as `shutdown_root` is cancelled.
    pub fn with_cancellation_token(
        provider: Arc<dyn FeedProvider>,
        store: Arc<dyn OffsetStore>,
        shutdown_root: CancellationToken,
    ) -> Self {
        Self {
            provider,
            store,
            telemetry: Arc::new(Telemetry::default()),
            shutdown_root,
            session: None,
        }
    }

    pub fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown_root.clone()
    }

    /// Replaces the root token used by subsequent `start` calls.
    pub fn replace_shutdown_root(&mut self, token: CancellationToken) {
        self.shutdown_root = token;
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    /// State of every registered reader, in start order.
    pub fn reader_states(&self) -> Vec<(FeedKind, ReaderState)> {
        self.session
            .as_ref()
            .map(|session| {
                session
                    .readers
                    .iter()
                    .map(|reader| (reader.kind(), reader.state()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Opens one reader per feed kind with configured channels and launches
    /// them. Kinds without channels are skipped. Any failure closes the readers
    /// started so far and leaves the task stopped.
    pub async fn start(&mut self, config: &SourceConfig) -> Result<()> {
        if self.session.is_some() {
            bail!("source task already running");
        }
        config.validate()?;

        if config.validate_channels() {
            check_channel_access(self.provider.as_ref(), config).await?;
        }

        let run_token = self.shutdown_root.child_token();
        let latch = FirstErrorLatch::new();
        let opener = ReaderOpener {
            provider: self.provider.as_ref(),
            store: self.store.as_ref(),
            telemetry: &self.telemetry,
            config,
            latch: &latch,
            run_token: &run_token,
        };
        let mut readers: Vec<Box<dyn FeedReader>> = Vec::new();

        for kind in FeedKind::ALL {
            if config.channels(kind).is_empty() {
                tracing::debug!(%kind, "no channels configured; reader not started");
                continue;
            }

            match opener.open(kind).await {
                Ok(reader) => readers.push(reader),
                Err(err) => {
                    run_token.cancel();
                    join_all(readers.iter_mut().map(|reader| reader.close())).await;
                    return Err(err);
                }
            }
        }

        let buffers = readers
            .iter()
            .map(|reader| (reader.kind(), reader.buffer()))
            .collect();
        let metrics_handle = telemetry::spawn_metrics_reporter(
            self.telemetry.clone(),
            buffers,
            run_token.clone(),
            config.metrics_interval(),
        );

        tracing::info!(
            version = Self::version(),
            readers = readers.len(),
            posts_channels = %config.posts_channels(),
            comments_channels = %config.comments_channels(),
            "source task started"
        );

        self.session = Some(Session {
            run_token,
            readers,
            latch,
            metrics_handle: Some(metrics_handle),
        });
        Ok(())
    }

    /// Returns everything the readers buffered since the previous call, or the
    /// first reader failure. Never waits for new data.
    pub fn poll(&self) -> Result<Vec<SourceRecord>> {
        let Some(session) = self.session.as_ref() else {
            tracing::warn!("poll called on a stopped source task; returning no records");
            return Ok(Vec::new());
        };

        if let Some(err) = session.latch.error() {
            return Err(err).context(POLL_ERROR_CONTEXT);
        }

        let records: Vec<SourceRecord> = session
            .readers
            .iter()
            .flat_map(|reader| reader.poll_records())
            .collect();

        if !records.is_empty() {
            self.telemetry.record_polled(records.len() as u64);
            tracing::trace!(count = records.len(), "polled records");
        }
        Ok(records)
    }

    /// Closes every reader and waits for their loops to exit. Stopping a
    /// stopped task does nothing.
    pub async fn stop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        tracing::info!(readers = session.readers.len(), "stopping source task");
        session.shutdown().await;
        tracing::info!("source task stopped");
    }
}

async fn check_channel_access(provider: &dyn FeedProvider, config: &SourceConfig) -> Result<()> {
    for kind in FeedKind::ALL {
        for channel in config.channels(kind).iter() {
            let accessible = provider
                .can_access_channel(kind, channel)
                .await
                .with_context(|| format!("failed to check access to {kind} channel {channel}"))?;
            if !accessible {
                bail!("{kind} channel {channel} does not exist or is not accessible");
            }
        }
    }
    Ok(())
}

/// Everything needed to open and launch the reader of one feed kind.
struct ReaderOpener<'a> {
    provider: &'a dyn FeedProvider,
    store: &'a dyn OffsetStore,
    telemetry: &'a Arc<Telemetry>,
    config: &'a SourceConfig,
    latch: &'a FirstErrorLatch,
    run_token: &'a CancellationToken,
}

impl ReaderOpener<'_> {
    async fn open(&self, kind: FeedKind) -> Result<Box<dyn FeedReader>> {
        let channels = self.config.channels(kind);
        let options = self.config.feed_options();
        let partitions = channels.partitions(kind);
        let offsets = self
            .store
            .load_offsets(&partitions)
            .await
            .with_context(|| format!("failed to load {kind} offsets"))?;

        tracing::debug!(
            %kind,
            %channels,
            partitions = partitions.len(),
            stored_offsets = offsets.len(),
            limit = options.limit,
            "loaded offsets"
        );

        match kind {
            FeedKind::Posts => {
                let stream = self
                    .provider
                    .posts(channels, &options)
                    .await
                    .context("failed to open posts stream")?;
                self.launch(PostConverter, stream, offsets)
            }
            FeedKind::Comments => {
                let stream = self
                    .provider
                    .comments(channels, &options)
                    .await
                    .context("failed to open comments stream")?;
                self.launch(CommentConverter, stream, offsets)
            }
        }
    }

    fn launch<C: RecordConverter>(
        &self,
        converter: C,
        stream: Option<BoxFeedStream<C::Item>>,
        offsets: OffsetMap,
    ) -> Result<Box<dyn FeedReader>> {
        let kind = converter.kind();
        let Some(stream) = stream else {
            bail!(
                "provider returned no {kind} stream for channels {}",
                self.config.channels(kind)
            );
        };

        let mut reader = StreamReader::new(StreamReaderParams {
            converter,
            stream,
            offsets,
            topic: self.config.topic(kind).to_owned(),
            buffer_capacity: self.config.buffer_capacity(),
            latch: self.latch.clone(),
            telemetry: self.telemetry.clone(),
            shutdown: self.run_token.child_token(),
        });
        reader.start()?;
        Ok(Box::new(reader))
    }
}
