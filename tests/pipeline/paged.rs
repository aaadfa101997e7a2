use std::sync::Arc;
use std::time::Duration;

use crate::support::{
    helpers::{init_tracing, offsets_of, poll_until, poll_until_error, post},
    listing::{ListingProvider, PostListing},
};
use anyhow::Result;
use feedsource::{ChannelSet, MemoryOffsetStore, SourceConfig, SourceTask};
use tokio::time::sleep;

fn config(validate_channels: bool) -> Result<SourceConfig> {
    SourceConfig::builder()
        .posts_channels(ChannelSet::parse("rust"))
        .posts_topic("reddit.posts")
        .fetch_limit(3)
        .poll_interval(Duration::from_millis(10))
        .validate_channels(validate_channels)
        .build()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn paged_listing_is_streamed_oldest_first_without_repeats() -> Result<()> {
    init_tracing();
    let listing = PostListing::default();
    listing.publish(post("rust", 20));
    listing.publish(post("rust", 10));
    listing.publish(post("golang", 15));

    let provider = ListingProvider::new(listing.clone());
    let mut task = SourceTask::new(Arc::new(provider), Arc::new(MemoryOffsetStore::new()));
    task.start(&config(true)?).await?;

    let mut records = poll_until(&task, 2, Duration::from_secs(2)).await?;
    listing.publish(post("rust", 30));
    records.extend(poll_until(&task, 1, Duration::from_secs(2)).await?);

    sleep(Duration::from_millis(50)).await;
    records.extend(task.poll()?);

    assert_eq!(offsets_of(&records, "rust"), vec![10, 20, 30]);
    assert!(offsets_of(&records, "golang").is_empty());
    assert!(listing.fetches() > 2, "listing should be polled repeatedly");
    assert_eq!(listing.last_limit(), 3, "configured fetch limit reaches the listing");

    task.stop().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn transient_listing_failures_are_retried() -> Result<()> {
    init_tracing();
    let listing = PostListing::default();
    listing.publish(post("rust", 10));
    listing.fail_next(2);

    let provider = ListingProvider::new(listing.clone());
    let mut task = SourceTask::new(Arc::new(provider), Arc::new(MemoryOffsetStore::new()));
    task.start(&config(false)?).await?;

    let records = poll_until(&task, 1, Duration::from_secs(2)).await?;
    assert_eq!(offsets_of(&records, "rust"), vec![10]);
    assert_eq!(task.telemetry().snapshot().reader_failures, 0);

    task.stop().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn persistent_listing_failures_fail_the_task() -> Result<()> {
    init_tracing();
    let listing = PostListing::default();
    listing.fail_next(usize::MAX);

    let provider = ListingProvider::new(listing.clone());
    let mut task = SourceTask::new(Arc::new(provider), Arc::new(MemoryOffsetStore::new()));
    task.start(&config(false)?).await?;

    let err = poll_until_error(&task, Duration::from_secs(2)).await?;
    let message = format!("{err:#}");
    assert!(message.contains("failed after 3 attempts"), "got {message}");
    assert!(message.contains("HTTP 503"), "got {message}");

    task.stop().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fetch_limit_caps_each_listing_page() -> Result<()> {
    init_tracing();
    let listing = PostListing::default();
    for millis in [10, 20, 30, 40, 50] {
        listing.publish(post("rust", millis));
    }

    let provider = ListingProvider::new(listing.clone());
    let mut task = SourceTask::new(Arc::new(provider), Arc::new(MemoryOffsetStore::new()));
    task.start(&config(false)?).await?;

    let mut records = poll_until(&task, 3, Duration::from_secs(2)).await?;
    sleep(Duration::from_millis(50)).await;
    records.extend(task.poll()?);

    assert_eq!(offsets_of(&records, "rust"), vec![30, 40, 50]);
    assert_eq!(listing.last_limit(), 3);

    task.stop().await;
    Ok(())
}
