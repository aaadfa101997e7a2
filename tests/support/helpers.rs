use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use chrono::DateTime;
use feedsource::{Comment, FeedFuture, Post, RecordSink, SourceRecord, SourceTask};
use once_cell::sync::Lazy;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

pub fn post(channel: &str, millis: i64) -> Post {
    Post {
        id: format!("t3_{channel}_{millis}"),
        channel: channel.to_owned(),
        author: "ferris".to_owned(),
        title: format!("{channel} post at {millis}"),
        body: Some("body".to_owned()),
        url: None,
        permalink: format!("/r/{channel}/comments/{millis}"),
        score: 1,
        created: DateTime::from_timestamp_millis(millis).expect("valid timestamp"),
    }
}

pub fn comment(channel: &str, millis: i64) -> Comment {
    Comment {
        id: format!("t1_{channel}_{millis}"),
        channel: channel.to_owned(),
        author: "crab".to_owned(),
        body: format!("comment at {millis}"),
        post_id: format!("t3_{channel}_0"),
        parent_id: None,
        score: 0,
        created: DateTime::from_timestamp_millis(millis).expect("valid timestamp"),
    }
}

/// Polls `task` until at least `target` records arrived in total.
pub async fn poll_until(
    task: &SourceTask,
    target: usize,
    timeout: Duration,
) -> Result<Vec<SourceRecord>> {
    let start = Instant::now();
    let mut collected = Vec::new();
    loop {
        collected.extend(task.poll()?);
        if collected.len() >= target {
            return Ok(collected);
        }
        if start.elapsed() > timeout {
            bail!(
                "task produced {} of {target} records within {:?}",
                collected.len(),
                timeout
            );
        }
        sleep(Duration::from_millis(20)).await;
    }
}

/// Polls `task` until it reports a failure.
pub async fn poll_until_error(task: &SourceTask, timeout: Duration) -> Result<anyhow::Error> {
    let start = Instant::now();
    loop {
        if let Err(err) = task.poll() {
            return Ok(err);
        }
        if start.elapsed() > timeout {
            bail!("task did not fail within {:?}", timeout);
        }
        sleep(Duration::from_millis(20)).await;
    }
}

/// Offsets of `records` belonging to `channel`, in delivery order.
pub fn offsets_of(records: &[SourceRecord], channel: &str) -> Vec<i64> {
    records
        .iter()
        .filter(|record| record.partition().channel() == channel)
        .map(|record| record.offset().as_millis())
        .collect()
}

#[derive(Clone, Default)]
pub struct CollectingSink {
    records: Arc<Mutex<Vec<SourceRecord>>>,
    batches: Arc<Mutex<usize>>,
}

impl CollectingSink {
    pub async fn records(&self) -> Vec<SourceRecord> {
        self.records.lock().await.clone()
    }

    pub async fn batches(&self) -> usize {
        *self.batches.lock().await
    }

    pub async fn wait_for_len(&self, target: usize, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        loop {
            {
                let guard = self.records.lock().await;
                if guard.len() >= target {
                    return Ok(());
                }
            }

            if start.elapsed() > timeout {
                bail!("sink did not receive {target} records within {:?}", timeout);
            }

            sleep(Duration::from_millis(20)).await;
        }
    }
}

impl RecordSink for CollectingSink {
    fn deliver<'a>(&'a mut self, records: &'a [SourceRecord]) -> FeedFuture<'a, ()> {
        Box::pin(async move {
            self.records.lock().await.extend_from_slice(records);
            *self.batches.lock().await += 1;
            Ok(())
        })
    }
}
