use super::partition::{Offset, Partition};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unit handed to the downstream sink. Carries the partition and offset the
/// hosting runtime persists once the record has been delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    partition: Partition,
    offset: Offset,
    topic: String,
    key: String,
    payload: Value,
}

impl SourceRecord {
    pub fn new(
        partition: Partition,
        offset: Offset,
        topic: impl Into<String>,
        key: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            partition,
            offset,
            topic: topic.into(),
            key: key.into(),
            payload,
        }
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn offset(&self) -> Offset {
        self.offset
    }

    /// Destination topic or stream name.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Identifier of the raw item the record was built from.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }
}
