//! Feed provider boundary: the traits a live-data client implements, a paging
//! adapter that turns "fetch the newest N items" into an endless stream, a
//! retry wrapper, and an in-memory provider for embedding and tests.

pub mod backoff;
pub mod memory;
pub mod paged;
pub mod retry;
pub mod stream;
