use std::sync::Arc;
use std::time::Duration;

use crate::support::helpers::{
    comment, init_tracing, offsets_of, poll_until, poll_until_error, post,
};
use anyhow::{anyhow, Result};
use feedsource::{
    memory_feed, ChannelSet, Comment, FeedKind, MemoryFeedProvider, MemoryOffsetStore, Offset,
    Partition, Post, ReaderState, SourceConfig, SourceTask,
};
use tokio::time::{sleep, timeout};

fn config(posts: &str, comments: &str) -> Result<SourceConfig> {
    SourceConfig::builder()
        .posts_channels(ChannelSet::parse(posts))
        .comments_channels(ChannelSet::parse(comments))
        .posts_topic("reddit.posts")
        .comments_topic("reddit.comments")
        .metrics_interval(Duration::from_millis(50))
        .build()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn task_merges_records_from_both_readers() -> Result<()> {
    init_tracing();
    let (posts_tx, posts) = memory_feed::<Post>();
    let (comments_tx, comments) = memory_feed::<Comment>();
    let provider = MemoryFeedProvider::new()
        .with_posts(posts)
        .with_comments(comments);
    let mut task = SourceTask::new(Arc::new(provider), Arc::new(MemoryOffsetStore::new()));
    task.start(&config("rust,golang", "rust")?).await?;

    posts_tx.send(post("rust", 10))?;
    posts_tx.send(post("golang", 20))?;
    comments_tx.send(comment("rust", 15))?;
    posts_tx.send(post("rust", 30))?;
    comments_tx.send(comment("rust", 40))?;

    let records = poll_until(&task, 5, Duration::from_secs(2)).await?;
    assert_eq!(records.len(), 5);

    let posts: Vec<_> = records
        .iter()
        .filter(|record| record.topic() == "reddit.posts")
        .collect();
    assert_eq!(posts.len(), 3);
    assert!(posts
        .iter()
        .all(|record| record.partition().kind() == FeedKind::Posts));

    let comment_offsets: Vec<_> = records
        .iter()
        .filter(|record| record.topic() == "reddit.comments")
        .map(|record| record.offset().as_millis())
        .collect();
    assert_eq!(comment_offsets, vec![15, 40]);
    assert_eq!(offsets_of(&records, "golang"), vec![20]);

    let snapshot = task.telemetry().snapshot();
    assert_eq!(snapshot.polled_records, 5);
    assert_eq!(snapshot.fetched_items, 5);

    task.stop().await;
    Ok(())
}

#[tokio::test]
async fn kind_without_channels_is_not_started() -> Result<()> {
    init_tracing();
    let (_tx, posts) = memory_feed::<Post>();
    let provider = MemoryFeedProvider::new().with_posts(posts);
    let mut task = SourceTask::new(Arc::new(provider), Arc::new(MemoryOffsetStore::new()));

    task.start(&config("rust", "")?).await?;
    assert_eq!(
        task.reader_states(),
        vec![(FeedKind::Posts, ReaderState::Running)]
    );
    assert!(task.poll()?.is_empty());

    task.stop().await;
    assert!(task.reader_states().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_reader_failures_surface_exactly_one_error() -> Result<()> {
    init_tracing();
    let (posts_tx, posts) = memory_feed::<Post>();
    let (comments_tx, comments) = memory_feed::<Comment>();
    let provider = MemoryFeedProvider::new()
        .with_posts(posts)
        .with_comments(comments);
    let mut task = SourceTask::new(Arc::new(provider), Arc::new(MemoryOffsetStore::new()));
    task.start(&config("rust", "rust")?).await?;

    posts_tx.fail(anyhow!("posts upstream outage"))?;
    comments_tx.fail(anyhow!("comments upstream outage"))?;

    let err = poll_until_error(&task, Duration::from_secs(2)).await?;
    let message = format!("{err:#}");
    assert!(
        message.starts_with("error occurred while reading from feed"),
        "unexpected message {message}"
    );
    let posts_failed = message.contains("posts upstream outage");
    let comments_failed = message.contains("comments upstream outage");
    assert!(
        posts_failed ^ comments_failed,
        "exactly one cause expected, got {message}"
    );

    let expected_reader = if posts_failed {
        "posts reader fetch failed"
    } else {
        "comments reader fetch failed"
    };
    assert!(
        message.contains(expected_reader),
        "failing reader should be named, got {message}"
    );

    sleep(Duration::from_millis(50)).await;
    assert!(task.poll().is_err(), "a latched failure keeps surfacing");
    assert_eq!(task.telemetry().snapshot().reader_failures, 2);
    assert!(task
        .reader_states()
        .iter()
        .all(|(_, state)| *state == ReaderState::Failed));

    task.stop().await;
    assert!(task.poll()?.is_empty());
    Ok(())
}

#[tokio::test]
async fn inaccessible_channel_aborts_start() -> Result<()> {
    init_tracing();
    let (posts_tx, posts) = memory_feed::<Post>();
    let provider = MemoryFeedProvider::new()
        .with_posts(posts)
        .deny_channel("private");
    let mut task = SourceTask::new(Arc::new(provider), Arc::new(MemoryOffsetStore::new()));

    let config = SourceConfig::builder()
        .posts_channels(ChannelSet::parse("rust,private"))
        .posts_topic("reddit.posts")
        .validate_channels(true)
        .build()?;

    let err = task
        .start(&config)
        .await
        .expect_err("inaccessible channel must fail start");
    assert!(format!("{err:#}").contains("private"));
    assert!(!task.is_running());
    assert!(task.poll()?.is_empty());
    posts_tx.send(post("rust", 1))?;
    Ok(())
}

#[tokio::test]
async fn failed_start_closes_readers_opened_earlier() -> Result<()> {
    init_tracing();
    let (posts_tx, posts) = memory_feed::<Post>();
    let provider = MemoryFeedProvider::new().with_posts(posts);
    let mut task = SourceTask::new(Arc::new(provider), Arc::new(MemoryOffsetStore::new()));

    let err = task
        .start(&config("rust", "rust")?)
        .await
        .expect_err("comments stream is missing");
    assert!(format!("{err:#}").contains("comments"));
    assert!(!task.is_running());
    assert!(
        posts_tx.send(post("rust", 1)).is_err(),
        "posts reader should have released its stream"
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restart_suppresses_items_at_or_below_stored_offsets() -> Result<()> {
    init_tracing();
    let store = MemoryOffsetStore::with_offsets([
        (
            Partition::new(FeedKind::Posts, "rust"),
            Offset::from_millis(100),
        ),
        (
            Partition::new(FeedKind::Posts, "golang"),
            Offset::from_millis(60),
        ),
    ]);
    let (tx, posts) = memory_feed::<Post>();
    let provider = MemoryFeedProvider::new().with_posts(posts);
    let mut task = SourceTask::new(Arc::new(provider), Arc::new(store));
    task.start(&config("rust,golang", "")?).await?;

    for (channel, millis) in [
        ("rust", 90),
        ("golang", 60),
        ("rust", 100),
        ("golang", 61),
        ("rust", 150),
        ("golang", 50),
    ] {
        tx.send(post(channel, millis))?;
    }

    let records = poll_until(&task, 2, Duration::from_secs(2)).await?;
    sleep(Duration::from_millis(50)).await;
    let mut all = records;
    all.extend(task.poll()?);

    assert_eq!(offsets_of(&all, "rust"), vec![150]);
    assert_eq!(offsets_of(&all, "golang"), vec![61]);
    assert_eq!(task.telemetry().snapshot().suppressed_items, 4);

    task.stop().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_does_not_wait_for_a_consumer() -> Result<()> {
    init_tracing();
    let (tx, posts) = memory_feed::<Post>();
    let provider = MemoryFeedProvider::new().with_posts(posts);
    let mut task = SourceTask::new(Arc::new(provider), Arc::new(MemoryOffsetStore::new()));
    let config = SourceConfig::builder()
        .posts_channels(ChannelSet::parse("rust"))
        .posts_topic("reddit.posts")
        .buffer_capacity(2)
        .build()?;
    task.start(&config).await?;

    for millis in 1..=10 {
        tx.send(post("rust", millis))?;
    }
    sleep(Duration::from_millis(100)).await;
    assert_eq!(task.telemetry().snapshot().buffered_records, 2);

    timeout(Duration::from_secs(2), task.stop())
        .await
        .map_err(|_| anyhow!("stop blocked on a full buffer"))?;
    assert!(task.poll()?.is_empty());
    Ok(())
}

#[tokio::test]
async fn task_can_be_restarted_after_stop() -> Result<()> {
    init_tracing();
    let (first_tx, first) = memory_feed::<Post>();
    let (second_tx, second) = memory_feed::<Post>();
    let provider = Arc::new(MemoryFeedProvider::new().with_posts(first));
    let mut task = SourceTask::new(provider, Arc::new(MemoryOffsetStore::new()));
    let config = config("rust", "")?;

    task.start(&config).await?;
    first_tx.send(post("rust", 1))?;
    poll_until(&task, 1, Duration::from_secs(2)).await?;
    task.stop().await;

    let err = task
        .start(&config)
        .await
        .expect_err("the memory provider hands out each stream once");
    assert!(format!("{err:#}").contains("no posts stream available"));

    let provider = Arc::new(MemoryFeedProvider::new().with_posts(second));
    let mut task = SourceTask::new(provider, Arc::new(MemoryOffsetStore::new()));
    task.start(&config).await?;
    second_tx.send(post("rust", 2))?;
    let records = poll_until(&task, 1, Duration::from_secs(2)).await?;
    assert_eq!(offsets_of(&records, "rust"), vec![2]);
    task.stop().await;
    Ok(())
}
