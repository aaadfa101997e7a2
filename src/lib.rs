pub mod model;
pub mod offsets;
pub mod provider;
pub mod runtime;
pub mod stream;

pub use model::converter::{CommentConverter, ConvertError, PostConverter, RecordConverter};
pub use model::item::{Comment, Post};
pub use model::partition::{ChannelSet, FeedKind, Offset, OffsetMap, Partition};
pub use model::record::SourceRecord;
pub use offsets::{offsets_for, FileOffsetStore, MemoryOffsetStore, OffsetStore};
pub use provider::memory::{memory_feed, MemoryFeedProvider, MemoryFeedSender, MemoryFeedStream};
pub use provider::paged::{PageSource, PagedFeedStream};
pub use provider::retry::RetryFeedStream;
pub use provider::stream::{BoxFeedStream, FeedFuture, FeedOptions, FeedProvider, FeedStream};
pub use runtime::config::{SourceConfig, SourceConfigBuilder, SourceConfigParams};
pub use runtime::fatal::FirstErrorLatch;
pub use runtime::runner::{RecordSink, Runner};
pub use runtime::task::SourceTask;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use stream::buffer::RecordBuffer;
pub use stream::error::{ReaderError, ReaderStage};
pub use stream::reader::{FeedReader, StreamReader, StreamReaderParams};
pub use stream::state::ReaderState;
