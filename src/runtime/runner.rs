use crate::model::record::SourceRecord;
use crate::offsets::{offsets_for, OffsetStore};
use crate::provider::stream::{FeedFuture, FeedProvider};
use crate::runtime::config::SourceConfig;
use crate::runtime::task::SourceTask;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Downstream destination of polled batches.
pub trait RecordSink: Send {
    /// Delivers one non-empty batch. Offsets of the batch are committed only
    /// after this resolves successfully.
    fn deliver<'a>(&'a mut self, records: &'a [SourceRecord]) -> FeedFuture<'a, ()>;
}

/// Hosts a [`SourceTask`]: polls it on a fixed cadence, hands batches to a
/// [`RecordSink`] and commits the delivered offsets, until shutdown.
pub struct Runner<K: RecordSink> {
    task: SourceTask,
    config: SourceConfig,
    sink: K,
    store: Arc<dyn OffsetStore>,
    shutdown: CancellationToken,
    started: bool,
}

impl<K: RecordSink> Runner<K> {
    /// Creates a new runner and wires a root [`CancellationToken`] that
    /// propagates to every reader of the hosted task.
    pub fn new(
        config: SourceConfig,
        provider: Arc<dyn FeedProvider>,
        store: Arc<dyn OffsetStore>,
        sink: K,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let task = SourceTask::with_cancellation_token(provider, store.clone(), shutdown.clone());
        Self {
            task,
            config,
            sink,
            store,
            shutdown,
            started: false,
        }
    }

    /// Returns a clone of the root shutdown token so external callers can
    /// integrate with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn task(&self) -> &SourceTask {
        &self.task
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub async fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }

        self.task.start(&self.config).await?;
        self.started = true;
        Ok(())
    }

    /// Stops the hosted task and prepares a fresh token for a later restart.
    pub async fn stop(&mut self) {
        if !self.started {
            return;
        }

        self.shutdown.cancel();
        self.task.stop().await;
        self.started = false;
        self.reinitialize_shutdown_token();
    }

    /// Runs until a Ctrl-C (SIGINT) is received, the shutdown token is
    /// cancelled elsewhere, or the task reports a fatal error.
    pub async fn run_until_ctrl_c(&mut self) -> Result<()> {
        self.start().await?;
        tracing::info!("runner started; waiting for Ctrl-C (SIGINT) to initiate shutdown");

        let result = tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Ctrl-C received; shutting down runner");
                Ok(())
            }
            result = self.drain_loop() => result,
        };

        self.stop().await;
        result
    }

    /// Runs until the shutdown token is cancelled or the task reports a fatal
    /// error.
    pub async fn run_until_cancelled(&mut self) -> Result<()> {
        self.start().await?;
        let result = self.drain_loop().await;
        self.stop().await;
        result
    }

    async fn drain_loop(&mut self) -> Result<()> {
        let shutdown = self.shutdown.clone();
        let mut ticker = time::interval(self.config.drain_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!("runner shutdown token cancelled");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            let records = match self.task.poll() {
                Ok(records) => records,
                Err(err) => {
                    tracing::error!(error = %format!("{err:#}"), "source task failed");
                    return Err(err);
                }
            };
            if records.is_empty() {
                continue;
            }

            self.sink
                .deliver(&records)
                .await
                .context("sink failed to deliver batch")?;

            let offsets = offsets_for(&records);
            self.store
                .commit(&offsets)
                .await
                .context("failed to commit delivered offsets")?;

            tracing::debug!(
                records = records.len(),
                partitions = offsets.len(),
                "delivered batch"
            );
        }
    }

    fn reinitialize_shutdown_token(&mut self) {
        self.shutdown = CancellationToken::new();
        self.task.replace_shutdown_root(self.shutdown.clone());
    }
}
