use crate::model::partition::FeedKind;
use crate::stream::buffer::RecordBuffer;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(30);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Counters shared by the task and its readers.
#[derive(Default, Debug)]
pub struct Telemetry {
    fetched_items: AtomicU64,
    suppressed_items: AtomicU64,
    buffered_records: AtomicU64,
    polled_records: AtomicU64,
    reader_failures: AtomicU64,
}

impl Telemetry {
    pub fn record_fetched(&self, count: u64) {
        self.fetched_items.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_suppressed(&self, count: u64) {
        self.suppressed_items.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_buffered(&self, count: u64) {
        self.buffered_records.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_polled(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.polled_records.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_reader_failure(&self) {
        self.reader_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            fetched_items: self.fetched_items.load(Ordering::Relaxed),
            suppressed_items: self.suppressed_items.load(Ordering::Relaxed),
            buffered_records: self.buffered_records.load(Ordering::Relaxed),
            polled_records: self.polled_records.load(Ordering::Relaxed),
            reader_failures: self.reader_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub fetched_items: u64,
    pub suppressed_items: u64,
    pub buffered_records: u64,
    pub polled_records: u64,
    pub reader_failures: u64,
}

/// Spawns a background task that periodically logs throughput and buffer fill.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    buffers: Vec<(FeedKind, Arc<RecordBuffer>)>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "feedsource::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current_snapshot = telemetry.snapshot();
                    let polled_delta = current_snapshot
                        .polled_records
                        .saturating_sub(last_snapshot.polled_records);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        polled_delta as f64 / elapsed
                    };
                    let buffered: usize = buffers.iter().map(|(_, buffer)| buffer.len()).sum();
                    let buffer_fill = buffers
                        .iter()
                        .map(|(kind, buffer)| format!("{kind}={}/{}", buffer.len(), buffer.capacity()))
                        .collect::<Vec<_>>()
                        .join(",");

                    tracing::info!(
                        target: "feedsource::metrics",
                        throughput = format!("{throughput:.2}"),
                        fetched = current_snapshot.fetched_items,
                        suppressed = current_snapshot.suppressed_items,
                        polled = current_snapshot.polled_records,
                        buffered,
                        buffer_fill,
                        reader_failures = current_snapshot.reader_failures,
                        "runtime metrics snapshot"
                    );

                    last_snapshot = current_snapshot;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
