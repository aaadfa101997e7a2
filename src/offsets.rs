//! Durable offset storage consulted at start and updated by the hosting
//! runtime after a batch was delivered.

use crate::model::partition::{Offset, OffsetMap, Partition};
use crate::model::record::SourceRecord;
use crate::provider::stream::FeedFuture;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio::sync::Mutex as AsyncMutex;

pub trait OffsetStore: Send + Sync + 'static {
    /// Loads the last committed offset of every partition that has one.
    fn load_offsets<'a>(&'a self, partitions: &'a [Partition]) -> FeedFuture<'a, OffsetMap>;

    /// Persists `offsets`. Stored offsets never move backwards.
    fn commit<'a>(&'a self, offsets: &'a OffsetMap) -> FeedFuture<'a, ()>;
}

/// Highest offset per partition found in a delivered batch.
pub fn offsets_for(records: &[SourceRecord]) -> OffsetMap {
    let mut offsets = OffsetMap::new();
    for record in records {
        offsets.merge_max(record.partition().clone(), record.offset());
    }
    offsets
}

fn select(stored: &HashMap<Partition, Offset>, partitions: &[Partition]) -> OffsetMap {
    partitions
        .iter()
        .filter_map(|partition| {
            stored
                .get(partition)
                .map(|offset| (partition.clone(), *offset))
        })
        .collect()
}

fn merge(stored: &mut HashMap<Partition, Offset>, offsets: &OffsetMap) {
    for (partition, offset) in offsets.iter() {
        stored
            .entry(partition.clone())
            .and_modify(|current| {
                if *offset > *current {
                    *current = *offset;
                }
            })
            .or_insert(*offset);
    }
}

#[derive(Debug, Default)]
pub struct MemoryOffsetStore {
    offsets: Mutex<HashMap<Partition, Offset>>,
}

impl MemoryOffsetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_offsets(offsets: impl IntoIterator<Item = (Partition, Offset)>) -> Self {
        Self {
            offsets: Mutex::new(offsets.into_iter().collect()),
        }
    }

    pub fn get(&self, partition: &Partition) -> Option<Offset> {
        self.offsets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(partition)
            .copied()
    }
}

impl OffsetStore for MemoryOffsetStore {
    fn load_offsets<'a>(&'a self, partitions: &'a [Partition]) -> FeedFuture<'a, OffsetMap> {
        Box::pin(async move {
            let stored = self.offsets.lock().unwrap_or_else(PoisonError::into_inner);
            Ok(select(&stored, partitions))
        })
    }

    fn commit<'a>(&'a self, offsets: &'a OffsetMap) -> FeedFuture<'a, ()> {
        Box::pin(async move {
            let mut stored = self.offsets.lock().unwrap_or_else(PoisonError::into_inner);
            merge(&mut stored, offsets);
            Ok(())
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredOffset {
    partition: Partition,
    offset: Offset,
}

/// JSON file holding one entry per partition. Writes go through a temporary
/// file that is renamed over the previous contents.
#[derive(Debug)]
pub struct FileOffsetStore {
    path: PathBuf,
    cache: AsyncMutex<Option<HashMap<Partition, Offset>>>,
}

impl FileOffsetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: AsyncMutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(&self) -> Result<HashMap<Partition, Offset>> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(HashMap::new());
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read offsets from {}", self.path.display())
                });
            }
        };

        let entries: Vec<StoredOffset> = serde_json::from_slice(&contents)
            .with_context(|| format!("failed to parse offsets in {}", self.path.display()))?;
        Ok(entries
            .into_iter()
            .map(|entry| (entry.partition, entry.offset))
            .collect())
    }

    async fn write_file(&self, offsets: &HashMap<Partition, Offset>) -> Result<()> {
        let mut entries: Vec<StoredOffset> = offsets
            .iter()
            .map(|(partition, offset)| StoredOffset {
                partition: partition.clone(),
                offset: *offset,
            })
            .collect();
        entries.sort_by(|a, b| a.partition.cmp(&b.partition));

        let contents = serde_json::to_vec_pretty(&entries).context("failed to encode offsets")?;
        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, contents)
            .await
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

impl OffsetStore for FileOffsetStore {
    fn load_offsets<'a>(&'a self, partitions: &'a [Partition]) -> FeedFuture<'a, OffsetMap> {
        Box::pin(async move {
            let mut cache = self.cache.lock().await;
            if cache.is_none() {
                *cache = Some(self.read_file().await?);
            }
            let stored = cache.get_or_insert_with(HashMap::new);
            tracing::debug!(
                path = %self.path.display(),
                stored = stored.len(),
                requested = partitions.len(),
                "loaded offsets"
            );
            Ok(select(stored, partitions))
        })
    }

    fn commit<'a>(&'a self, offsets: &'a OffsetMap) -> FeedFuture<'a, ()> {
        Box::pin(async move {
            if offsets.is_empty() {
                return Ok(());
            }
            let mut cache = self.cache.lock().await;
            if cache.is_none() {
                *cache = Some(self.read_file().await?);
            }
            let stored = cache.get_or_insert_with(HashMap::new);
            merge(stored, offsets);
            self.write_file(stored).await
        })
    }
}
