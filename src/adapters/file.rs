//! Shared JSON-file record store.
//!
//! The whole collection lives in one JSON array on disk, shared by every
//! reviewer process pointed at it. Mutations are read-modify-write under an
//! exclusive lock on a sibling `.lock` file and replace the data file
//! atomically. Subscribers are kept current by watching the file's directory.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use fs2::FileExt;
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use serde_json::Value;
use tempfile::NamedTempFile;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::domain::Record;

use super::{paginate, NewRecord, Page, PageRequest, RecordPatch, RecordStore, Snapshot, StoreError};

/// Default debounce window for change notifications
const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// Record store backed by a JSON file
#[derive(Debug, Clone)]
pub struct FileRecordStore {
    /// Path to the JSON data file
    path: PathBuf,

    /// Path to the lock file guarding `path`
    lock_path: PathBuf,

    /// Debounce window for change notifications
    debounce: Duration,
}

impl FileRecordStore {
    /// Open a store at `path`; the file is created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = lock_path_for(&path);
        Self {
            path,
            lock_path,
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    /// Override the debounce window
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the collection under a shared lock
    pub async fn load(&self) -> Result<Vec<Record>, StoreError> {
        let path = self.path.clone();
        let lock_path = self.lock_path.clone();
        tokio::task::spawn_blocking(move || read_locked(&path, &lock_path))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::new(ErrorKind::Other, e)))?
    }

    /// Run `f` over the collection under an exclusive lock and persist the result
    async fn modify<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Vec<Record>) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let path = self.path.clone();
        let lock_path = self.lock_path.clone();
        tokio::task::spawn_blocking(move || {
            let lock = open_lock(&lock_path)?;
            lock.lock_exclusive()?;

            let mut records = read_records(&path)?;
            let result = f(&mut records)?;
            write_records(&path, &records)?;

            // Lock is released when `lock` is dropped
            Ok(result)
        })
        .await
        .map_err(|e| StoreError::Io(std::io::Error::new(ErrorKind::Other, e)))?
    }

    fn watch_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn subscribe_all(&self) -> Result<watch::Receiver<Snapshot>, StoreError> {
        let watch_dir = self.watch_dir();
        tokio::fs::create_dir_all(&watch_dir).await?;

        let (tx, rx) = watch::channel(Arc::new(self.load().await?));

        let (event_tx, event_rx) = std::sync::mpsc::channel();
        let mut debouncer = new_debouncer(self.debounce, event_tx)?;
        debouncer
            .watcher()
            .watch(&watch_dir, RecursiveMode::NonRecursive)?;

        info!("Watching {} for record changes", self.path.display());

        let path = self.path.clone();
        let lock_path = self.lock_path.clone();
        tokio::task::spawn_blocking(move || run_watcher(debouncer, event_rx, tx, path, lock_path));

        Ok(rx)
    }

    async fn snapshot(&self) -> Result<Snapshot, StoreError> {
        Ok(Arc::new(self.load().await?))
    }

    async fn update(&self, id: &str, patch: RecordPatch) -> Result<Record, StoreError> {
        let target = id.to_string();
        let result = self
            .modify(move |records| {
                let record = records
                    .iter_mut()
                    .find(|r| r.id == target)
                    .ok_or_else(|| StoreError::NotFound(target.clone()))?;
                patch.apply_to(record, Utc::now());
                Ok(record.clone())
            })
            .await;

        match result {
            Ok(record) => Ok(record),
            Err(StoreError::NotFound(id)) => Err(StoreError::NotFound(id)),
            Err(e) => Err(StoreError::write(id, e)),
        }
    }

    async fn create(&self, record: NewRecord) -> Result<Record, StoreError> {
        let record = record.into_record(Utc::now());
        let created = record.clone();
        self.modify(move |records| {
            records.push(record);
            Ok(())
        })
        .await?;
        Ok(created)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let target = id.to_string();
        self.modify(move |records| {
            let position = records
                .iter()
                .position(|r| r.id == target)
                .ok_or_else(|| StoreError::NotFound(target.clone()))?;
            records.remove(position);
            Ok(())
        })
        .await
    }

    async fn list(&self, request: PageRequest) -> Result<Page, StoreError> {
        paginate(&self.load().await?, &request)
    }
}

/// `records.json` -> `records.json.lock`
fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "records.json".into());
    name.push(".lock");
    path.with_file_name(name)
}

fn open_lock(lock_path: &Path) -> Result<File, StoreError> {
    if let Some(parent) = lock_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(lock_path)?)
}

fn read_locked(path: &Path, lock_path: &Path) -> Result<Vec<Record>, StoreError> {
    let lock = open_lock(lock_path)?;
    lock.lock_shared()?;
    read_records(path)
}

/// Parse the data file; records that cannot be decoded at all are skipped
fn read_records(path: &Path) -> Result<Vec<Record>, StoreError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let raw: Vec<Value> = serde_json::from_str(&content)?;
    Ok(raw
        .into_iter()
        .enumerate()
        .filter_map(|(i, value)| match serde_json::from_value::<Record>(value) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping undecodable record #{} in {}: {}", i, path.display(), e);
                None
            }
        })
        .collect())
}

/// Replace the data file atomically
fn write_records(path: &Path, records: &[Record]) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer_pretty(&mut writer, records)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

/// Forward file changes as snapshots until every receiver is gone
fn run_watcher(
    _debouncer: Debouncer<RecommendedWatcher>,
    events: Receiver<DebounceEventResult>,
    tx: watch::Sender<Snapshot>,
    path: PathBuf,
    lock_path: PathBuf,
) {
    let file_name = path.file_name().map(|n| n.to_os_string());

    loop {
        if tx.is_closed() {
            debug!("All subscribers gone, stopping watcher for {}", path.display());
            break;
        }

        match events.recv_timeout(Duration::from_millis(500)) {
            Ok(Ok(batch)) => {
                let touched = batch
                    .iter()
                    .any(|event| event.path.file_name().map(|n| n.to_os_string()) == file_name);
                if !touched {
                    continue;
                }

                match read_locked(&path, &lock_path) {
                    Ok(records) => {
                        let changed = tx.send_if_modified(|current| {
                            if current.as_slice() == records.as_slice() {
                                false
                            } else {
                                *current = Arc::new(records);
                                true
                            }
                        });
                        if changed {
                            debug!("Pushed new snapshot from {}", path.display());
                        }
                    }
                    Err(e) => {
                        warn!("Failed to reload {}: {}", path.display(), e);
                    }
                }
            }
            Ok(Err(e)) => {
                warn!("Watcher error: {:?}", e);
            }
            Err(RecvTimeoutError::Timeout) => {
                // Expected - loop to re-check for subscribers
            }
            Err(RecvTimeoutError::Disconnected) => {
                error!("Watcher channel disconnected");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Evaluation, EvaluationMap};
    use tempfile::TempDir;

    fn create_test_store() -> (FileRecordStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let store = FileRecordStore::new(temp.path().join("records.json"));
        (store, temp)
    }

    #[test]
    fn test_lock_path() {
        assert_eq!(
            lock_path_for(Path::new("/data/records.json")),
            PathBuf::from("/data/records.json.lock")
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let (store, _temp) = create_test_store();
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_update_roundtrip() {
        let (store, _temp) = create_test_store();

        let created = store
            .create(NewRecord {
                label: "Smith, John".to_string(),
                idx: "A1_1".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let mut evaluations = EvaluationMap::new();
        evaluations.insert("B2_2".to_string(), Evaluation::No);
        let updated = store
            .update(
                &created.id,
                RecordPatch {
                    reconciled_labels_evaluations: Some(evaluations),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.evaluation_for("B2_2"), Some(Evaluation::No));

        // A fresh handle sees the same data
        let reopened = FileRecordStore::new(store.path());
        let records = reopened.load().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].evaluation_for("B2_2"), Some(Evaluation::No));
    }

    #[tokio::test]
    async fn test_update_missing_record_is_not_found() {
        let (store, _temp) = create_test_store();
        let result = store.update("nope", RecordPatch::default()).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_text_encoded_fields_and_bad_records() {
        let (store, _temp) = create_test_store();
        std::fs::write(
            store.path(),
            r#"[
                {"id":"r1","label":"Smith","idx":"A1_1",
                 "reconciled_labels":"[{\"label\":\"Smith, J.\",\"idx\":\"B2_2\"}]",
                 "reconciled_labels_evaluations":"{\"B2_2\":\"yes\"}"},
                {"label":"no id here"},
                {"id":"r3","label":"Doe","idx":"C3_3","reconciled_labels":"{broken"}
            ]"#,
        )
        .unwrap();

        let records = store.load().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].reconciled_labels[0].idx, "B2_2");
        assert_eq!(records[0].evaluation_for("B2_2"), Some(Evaluation::Yes));
        assert!(records[1].reconciled_labels.is_empty());
    }
}
