//! Attributed label decisions.
//!
//! Every time a reviewer sets or clears a label's evaluation, a decision event
//! is appended to the decision log. The log is the source of truth for who
//! made which decision; the record itself only holds the latest value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::record::Evaluation;

/// A single label-level decision in the append-only decision log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionEvent {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When the decision was made (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// Record the label belongs to
    pub record_id: String,

    /// idx of the reconciled label
    pub label_idx: String,

    /// New value; `None` clears the decision
    pub result: Option<Evaluation>,

    /// Reviewer who made the decision
    pub evaluator: String,
}

impl DecisionEvent {
    /// Create a decision event with the current timestamp
    pub fn new(
        record_id: impl Into<String>,
        label_idx: impl Into<String>,
        result: Option<Evaluation>,
        evaluator: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            record_id: record_id.into(),
            label_idx: label_idx.into(),
            result,
            evaluator: evaluator.into(),
        }
    }

    /// Override the timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// True if this event clears the label
    pub fn is_clear(&self) -> bool {
        self.result.is_none()
    }
}
