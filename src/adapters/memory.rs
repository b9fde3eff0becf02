//! In-process record store.
//!
//! Holds the collection in memory and pushes a fresh snapshot to every
//! subscriber after each mutation. Used by tests and by embedders that keep
//! their own persistence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;

use crate::domain::Record;

use super::{paginate, NewRecord, Page, PageRequest, RecordPatch, RecordStore, Snapshot, StoreError};

/// Record store backed by a `Vec` in memory
pub struct MemoryRecordStore {
    records: Mutex<Vec<Record>>,
    tx: watch::Sender<Snapshot>,
    fail_writes: AtomicBool,
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl MemoryRecordStore {
    /// Create a store seeded with `records`
    pub fn new(records: Vec<Record>) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(records.clone()));
        Self {
            records: Mutex::new(records),
            tx,
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent `update` fail with a write error
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Replace a record wholesale and notify subscribers, as another
    /// reviewer's write would
    pub fn put(&self, record: Record) {
        let mut records = self.lock();
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        self.publish(&records);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Record>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, records: &[Record]) {
        self.tx.send_replace(Arc::new(records.to_vec()));
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn subscribe_all(&self) -> Result<watch::Receiver<Snapshot>, StoreError> {
        Ok(self.tx.subscribe())
    }

    async fn snapshot(&self) -> Result<Snapshot, StoreError> {
        Ok(Arc::new(self.lock().clone()))
    }

    async fn update(&self, id: &str, patch: RecordPatch) -> Result<Record, StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::write(id, "store rejected the write"));
        }

        let mut records = self.lock();
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        patch.apply_to(record, Utc::now());
        let updated = record.clone();

        self.publish(&records);
        Ok(updated)
    }

    async fn create(&self, record: NewRecord) -> Result<Record, StoreError> {
        let record = record.into_record(Utc::now());
        let mut records = self.lock();
        records.push(record.clone());
        self.publish(&records);
        Ok(record)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut records = self.lock();
        let position = records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        records.remove(position);
        self.publish(&records);
        Ok(())
    }

    async fn list(&self, request: PageRequest) -> Result<Page, StoreError> {
        paginate(&self.lock(), &request)
    }
}
