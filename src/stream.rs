//! Per-feed background readers: fetch, dedup against stored offsets, convert,
//! and buffer records until the task polls them.

pub mod buffer;
pub mod error;
pub mod reader;
pub mod state;
