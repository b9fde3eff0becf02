//! Record store adapters.
//!
//! The review core treats the record store as an opaque keyed collection
//! with partial updates and a push subscription that re-delivers the whole
//! collection on every change. Two implementations are provided:
//! an in-process store and a shared JSON file.

pub mod file;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

use crate::domain::{Candidate, EvaluationMap, ReconciledLabel, Record};

pub use file::FileRecordStore;
pub use memory::MemoryRecordStore;

/// A full, authoritative copy of the collection
pub type Snapshot = Arc<Vec<Record>>;

/// Errors that can occur talking to a record store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Write to record {id} failed: {reason}")]
    Write { id: String, reason: String },

    #[error("Invalid page token: {0}")]
    InvalidPageToken(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),
}

impl StoreError {
    /// Wrap any failure during an update as a write error for that record
    pub fn write(id: &str, reason: impl ToString) -> Self {
        Self::Write {
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn is_write_error(&self) -> bool {
        matches!(self, Self::Write { .. })
    }
}

/// Fields an update may change; `None` leaves the stored value alone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconciled_labels_evaluations: Option<EvaluationMap>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluator_id: Option<String>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self.reconciled_labels_evaluations.is_none() && self.evaluator_id.is_none()
    }

    /// Apply the named fields and stamp the update time
    pub fn apply_to(&self, record: &mut Record, now: DateTime<Utc>) {
        if let Some(evaluations) = &self.reconciled_labels_evaluations {
            record.reconciled_labels_evaluations = evaluations.clone();
        }
        if let Some(evaluator_id) = &self.evaluator_id {
            record.evaluator_id = Some(evaluator_id.clone());
        }
        record.updated_at = Some(now);
    }
}

/// Fields supplied when a record is created
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    pub label: String,
    pub idx: String,
    #[serde(default)]
    pub reconciled_labels: Vec<ReconciledLabel>,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

impl NewRecord {
    /// Materialize with a fresh id, no decisions and no evaluator
    pub fn into_record(self, now: DateTime<Utc>) -> Record {
        Record {
            id: Uuid::new_v4().to_string(),
            label: self.label,
            idx: self.idx,
            candidates: self.candidates,
            reconciled_labels: self.reconciled_labels,
            reconciled_labels_evaluations: EvaluationMap::new(),
            evaluator_id: None,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }
}

/// One page request for batch listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: usize,
    pub page_token: Option<String>,
}

impl PageRequest {
    pub fn first(limit: usize) -> Self {
        Self {
            limit,
            page_token: None,
        }
    }
}

/// A page of records plus the token for the next one
#[derive(Debug, Clone)]
pub struct Page {
    pub records: Vec<Record>,
    pub next_page_token: Option<String>,
}

/// Slice a collection into pages; tokens are opaque to callers
pub(crate) fn paginate(records: &[Record], request: &PageRequest) -> Result<Page, StoreError> {
    let start = match request.page_token.as_deref() {
        None => 0,
        Some(token) => token
            .parse::<usize>()
            .map_err(|_| StoreError::InvalidPageToken(token.to_string()))?,
    };
    if start > records.len() {
        return Err(StoreError::InvalidPageToken(start.to_string()));
    }

    let end = start.saturating_add(request.limit.max(1)).min(records.len());
    let next_page_token = (end < records.len()).then(|| end.to_string());

    Ok(Page {
        records: records[start..end].to_vec(),
        next_page_token,
    })
}

/// Trait for record stores
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Human-readable store name
    fn name(&self) -> &str;

    /// Live view of the full collection; each delivery replaces the previous one
    async fn subscribe_all(&self) -> Result<watch::Receiver<Snapshot>, StoreError>;

    /// One-off read of the full collection
    async fn snapshot(&self) -> Result<Snapshot, StoreError>;

    /// Update only the fields named in `patch`, returning the stored record
    async fn update(&self, id: &str, patch: RecordPatch) -> Result<Record, StoreError>;

    /// Create a record and return it with its assigned id
    async fn create(&self, record: NewRecord) -> Result<Record, StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Page through the collection in store order
    async fn list(&self, request: PageRequest) -> Result<Page, StoreError>;
}
