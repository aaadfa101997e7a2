//! Generic background reader for one feed kind.
//!
//! A [`StreamReader`] owns a single fetch loop running on its own tokio task:
//! pull the next raw item, attribute it to a partition through the item's own
//! channel, drop it when its creation time is at or below the stored offset,
//! convert it, advance the in-memory offset, and append the record to a
//! bounded buffer. The loop races every pull and every append against the
//! reader's cancellation token so `close` never waits on the upstream or on
//! the consumer.

use super::buffer::RecordBuffer;
use super::error::{ReaderError, ReaderStage};
use super::state::{ReaderState, StateCell};
use crate::model::converter::RecordConverter;
use crate::model::partition::{FeedKind, OffsetMap};
use crate::model::record::SourceRecord;
use crate::provider::stream::BoxFeedStream;
use crate::runtime::fatal::FirstErrorLatch;
use crate::runtime::telemetry::Telemetry;
use anyhow::{anyhow, bail, Result};
use core::future::Future;
use core::pin::Pin;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub type CloseFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

pub struct StreamReaderParams<C: RecordConverter> {
    pub converter: C,
    pub stream: BoxFeedStream<C::Item>,
    /// Offsets loaded from the store for the configured partitions.
    pub offsets: OffsetMap,
    pub topic: String,
    pub buffer_capacity: usize,
    pub latch: FirstErrorLatch,
    pub telemetry: Arc<Telemetry>,
    pub shutdown: CancellationToken,
}

struct FetchLoop<C: RecordConverter> {
    converter: C,
    stream: BoxFeedStream<C::Item>,
    offsets: OffsetMap,
    topic: String,
    buffer: Arc<RecordBuffer>,
    state: Arc<StateCell>,
    latch: FirstErrorLatch,
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
}

pub struct StreamReader<C: RecordConverter> {
    kind: FeedKind,
    pending: Option<FetchLoop<C>>,
    buffer: Arc<RecordBuffer>,
    state: Arc<StateCell>,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl<C: RecordConverter> StreamReader<C> {
    pub fn new(params: StreamReaderParams<C>) -> Self {
        let StreamReaderParams {
            converter,
            stream,
            offsets,
            topic,
            buffer_capacity,
            latch,
            telemetry,
            shutdown,
        } = params;

        let kind = converter.kind();
        let buffer = Arc::new(RecordBuffer::with_capacity(buffer_capacity.max(1)));
        let state = Arc::new(StateCell::new(ReaderState::NotStarted));
        let pending = FetchLoop {
            converter,
            stream,
            offsets,
            topic,
            buffer: buffer.clone(),
            state: state.clone(),
            latch,
            telemetry,
            shutdown: shutdown.clone(),
        };

        Self {
            kind,
            pending: Some(pending),
            buffer,
            state,
            shutdown,
            handle: None,
        }
    }

    pub fn kind(&self) -> FeedKind {
        self.kind
    }

    pub fn state(&self) -> ReaderState {
        self.state.load()
    }

    pub fn buffer(&self) -> Arc<RecordBuffer> {
        self.buffer.clone()
    }

    /// Number of records waiting to be polled.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Launches the fetch loop. Fails if the reader was started or closed before.
    pub fn start(&mut self) -> Result<()> {
        let Some(fetch_loop) = self.pending.take() else {
            bail!("{} reader cannot start from state {}", self.kind, self.state());
        };
        let started = self
            .state
            .transition(ReaderState::NotStarted, ReaderState::Running);
        debug_assert!(started, "a pending fetch loop belongs to a reader that never ran");

        tracing::info!(kind = %self.kind, topic = %fetch_loop.topic, "starting stream reader");
        let kind = self.kind;
        let state = self.state.clone();
        let latch = fetch_loop.latch.clone();
        let telemetry = fetch_loop.telemetry.clone();

        self.handle = Some(tokio::spawn(async move {
            if let Err(payload) = AssertUnwindSafe(fetch_loop.run()).catch_unwind().await {
                let panic_msg = panic_message(payload.as_ref());
                tracing::error!(%kind, panic = %panic_msg, "stream reader task panicked");
                state.store(ReaderState::Failed);
                telemetry.record_reader_failure();
                let context = format!("{kind} reader panicked");
                latch.trigger_external(
                    context.as_str(),
                    anyhow!("{kind} reader panicked: {panic_msg}"),
                );
            }
        }));
        Ok(())
    }

    /// Takes every record buffered so far without waiting for new ones.
    pub fn poll_records(&self) -> Vec<SourceRecord> {
        self.buffer.drain()
    }

    /// Stops the fetch loop, waits for it to exit and releases the stream.
    /// Calling it again is a no-op.
    pub async fn close(&mut self) {
        if self
            .state
            .transition(ReaderState::NotStarted, ReaderState::Stopped)
        {
            self.pending = None;
            return;
        }

        let stopping = self
            .state
            .transition(ReaderState::Running, ReaderState::Stopping);
        self.shutdown.cancel();

        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                tracing::warn!(kind = %self.kind, error = %err, "stream reader task panicked");
            }
        }

        let dropped = self.buffer.len();
        self.buffer.clear();
        if stopping {
            self.state
                .transition(ReaderState::Stopping, ReaderState::Stopped);
        }

        tracing::debug!(
            kind = %self.kind,
            state = %self.state(),
            dropped_records = dropped,
            "stream reader closed"
        );
    }
}

impl<C: RecordConverter> FetchLoop<C> {
    async fn run(mut self) {
        let kind = self.converter.kind();
        tracing::debug!(%kind, known_partitions = self.offsets.len(), "fetch loop running");

        loop {
            let fetched = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                fetched = self.stream.next() => fetched,
            };

            let item = match fetched {
                Ok(item) => item,
                Err(err) => return self.fail(ReaderError::new(kind, ReaderStage::Fetch, err)),
            };
            self.telemetry.record_fetched(1);

            let partition = self
                .converter
                .source_partition(self.converter.channel(&item));
            let created = self.converter.created(&item);
            if self.offsets.is_delivered(&partition, created) {
                tracing::trace!(
                    %partition,
                    offset = %created,
                    stored = ?self.offsets.get(&partition),
                    "skipping item delivered before restart"
                );
                self.telemetry.record_suppressed(1);
                continue;
            }

            let record = match self.converter.convert(&item, &self.topic) {
                Ok(record) => record,
                Err(err) => {
                    return self.fail(ReaderError::new(kind, ReaderStage::Convert, err.into()))
                }
            };
            self.offsets.advance(partition, created);

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = self.buffer.push(record) => {}
            }
            self.telemetry.record_buffered(1);
        }

        // A parent token can end the loop before `close` runs.
        if self
            .state
            .transition(ReaderState::Running, ReaderState::Stopping)
        {
            self.state
                .transition(ReaderState::Stopping, ReaderState::Stopped);
        }
        tracing::info!(%kind, state = %self.state.load(), "stream reader stopped");
    }

    fn fail(&self, error: ReaderError) {
        self.state.store(ReaderState::Failed);
        self.telemetry.record_reader_failure();
        self.latch.trigger(error);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Object-safe view of a started reader, letting the task hold readers of
/// different feed kinds side by side.
pub trait FeedReader: Send {
    fn kind(&self) -> FeedKind;

    fn state(&self) -> ReaderState;

    fn buffer(&self) -> Arc<RecordBuffer>;

    fn poll_records(&self) -> Vec<SourceRecord>;

    fn close(&mut self) -> CloseFuture<'_>;
}

impl<C: RecordConverter> FeedReader for StreamReader<C> {
    fn kind(&self) -> FeedKind {
        StreamReader::kind(self)
    }

    fn state(&self) -> ReaderState {
        StreamReader::state(self)
    }

    fn buffer(&self) -> Arc<RecordBuffer> {
        StreamReader::buffer(self)
    }

    fn poll_records(&self) -> Vec<SourceRecord> {
        StreamReader::poll_records(self)
    }

    fn close(&mut self) -> CloseFuture<'_> {
        Box::pin(StreamReader::close(self))
    }
}
