//! Data model shared by the readers and the task: partitions and offsets,
//! raw feed items, the records handed downstream, and the per-kind converters
//! that map one onto the other.

pub mod converter;
pub mod item;
pub mod partition;
pub mod record;
