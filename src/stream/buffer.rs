use crate::model::record::SourceRecord;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Bounded hand-off between one reader's fetch loop and the polling caller.
///
/// `push` waits while the buffer is full, which pauses the fetch loop until
/// the caller drains. `drain` never waits.
pub struct RecordBuffer {
    records: Mutex<VecDeque<SourceRecord>>,
    notify: Notify,
    capacity: usize,
}

impl RecordBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be greater than zero");
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(4_096))),
            notify: Notify::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn push(&self, mut record: SourceRecord) {
        loop {
            let notified = self.notify.notified();
            match self.try_push(record) {
                Ok(()) => return,
                Err(rejected) => record = rejected,
            }
            notified.await;
        }
    }

    /// Appends without waiting; hands the record back when the buffer is full.
    pub fn try_push(&self, record: SourceRecord) -> Result<(), SourceRecord> {
        let mut records = self.lock();
        if records.len() >= self.capacity {
            return Err(record);
        }
        records.push_back(record);
        Ok(())
    }

    /// Removes and returns everything buffered, in append order.
    pub fn drain(&self) -> Vec<SourceRecord> {
        let drained: Vec<SourceRecord> = self.lock().drain(..).collect();
        if !drained.is_empty() {
            self.notify.notify_waiters();
        }
        drained
    }

    pub fn clear(&self) {
        self.lock().clear();
        self.notify.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<SourceRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
