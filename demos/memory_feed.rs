//! Streams synthetic posts and comments through a runner until Ctrl-C.
//!
//! Offsets are kept in `$TMPDIR/feedsource-demo-offsets.json`, so a second run
//! only prints items newer than the ones delivered before.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use feedsource::{
    init_tracing, memory_feed, ChannelSet, Comment, FeedFuture, FileOffsetStore,
    MemoryFeedProvider, MemoryFeedSender, Post, RecordSink, Runner, SourceConfig, SourceRecord,
};

struct LogSink;

impl RecordSink for LogSink {
    fn deliver<'a>(&'a mut self, records: &'a [SourceRecord]) -> FeedFuture<'a, ()> {
        Box::pin(async move {
            for record in records {
                tracing::info!(
                    topic = record.topic(),
                    partition = %record.partition(),
                    offset = %record.offset(),
                    key = record.key(),
                    "delivered record"
                );
            }
            Ok(())
        })
    }
}

fn spawn_producer(posts: MemoryFeedSender<Post>, comments: MemoryFeedSender<Comment>) {
    tokio::spawn(async move {
        let channels = ["rust", "programming"];
        let mut ticker = tokio::time::interval(Duration::from_millis(500));
        for sequence in 0u64.. {
            ticker.tick().await;
            let channel = channels[(sequence % 2) as usize];
            let created = Utc::now();
            let post_id = format!("t3_{sequence}");

            let post = Post {
                id: post_id.clone(),
                channel: channel.to_owned(),
                author: "ferris".to_owned(),
                title: format!("demo post #{sequence}"),
                body: None,
                url: Some(format!("https://example.com/{sequence}")),
                permalink: format!("/r/{channel}/comments/{sequence}"),
                score: 0,
                created,
            };
            let comment = Comment {
                id: format!("t1_{sequence}"),
                channel: channel.to_owned(),
                author: "crab".to_owned(),
                body: format!("reply to #{sequence}"),
                post_id,
                parent_id: None,
                score: 0,
                created,
            };

            if posts.send(post).is_err() || comments.send(comment).is_err() {
                tracing::info!("feeds closed; producer exiting");
                break;
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let (posts_tx, posts) = memory_feed::<Post>();
    let (comments_tx, comments) = memory_feed::<Comment>();
    let provider = MemoryFeedProvider::new()
        .with_posts(posts)
        .with_comments(comments);

    let config = SourceConfig::builder()
        .posts_channels(ChannelSet::parse("rust,programming"))
        .comments_channels(ChannelSet::parse("rust,programming"))
        .posts_topic("reddit.posts")
        .comments_topic("reddit.comments")
        .metrics_interval(Duration::from_secs(5))
        .build()?;

    let store = FileOffsetStore::new(std::env::temp_dir().join("feedsource-demo-offsets.json"));
    spawn_producer(posts_tx, comments_tx);

    let mut runner = Runner::new(config, Arc::new(provider), Arc::new(store), LogSink);
    runner.run_until_ctrl_c().await
}
