//! The record under review and its reconciliation fields.
//!
//! A record is one entity whose label was matched by the reconciliation
//! pipeline against entries of a knowledge base. Reviewers decide, label by
//! label, whether each proposed match is correct.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::decode;

/// Sparse mapping from a reconciled label's `idx` to its decision.
///
/// An absent key means the label has not been evaluated yet.
pub type EvaluationMap = BTreeMap<String, Evaluation>;

/// A reviewer's decision on a single reconciled label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Evaluation {
    /// The proposed match is correct
    Yes,

    /// The proposed match is wrong
    No,

    /// The reviewer cannot tell
    Unsure,
}

impl Evaluation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::Unsure => "unsure",
        }
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Evaluation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "yes" | "y" => Ok(Self::Yes),
            "no" | "n" => Ok(Self::No),
            "unsure" | "u" | "?" => Ok(Self::Unsure),
            other => Err(format!("Unknown evaluation: {}", other)),
        }
    }
}

/// A proposed match for a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciledLabel {
    #[serde(default)]
    pub label: String,

    #[serde(default, deserialize_with = "decode::idx")]
    pub idx: String,
}

impl ReconciledLabel {
    pub fn new(label: impl Into<String>, idx: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            idx: idx.into(),
        }
    }
}

/// A nearest-neighbour candidate, shown for context only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub label: String,

    #[serde(default, deserialize_with = "decode::idx")]
    pub idx: String,

    /// Similarity score in [0, 1]
    #[serde(default)]
    pub similarity: f64,
}

/// One entity awaiting name-reconciliation review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Store-assigned identifier (immutable)
    pub id: String,

    /// Display string for the entity
    #[serde(default)]
    pub label: String,

    /// External identifier; the part before the first `_` is the concept group
    #[serde(default, deserialize_with = "decode::idx")]
    pub idx: String,

    #[serde(default, deserialize_with = "decode::candidates_field")]
    pub candidates: Vec<Candidate>,

    #[serde(default, deserialize_with = "decode::labels_field")]
    pub reconciled_labels: Vec<ReconciledLabel>,

    #[serde(default, deserialize_with = "decode::evaluations_field")]
    pub reconciled_labels_evaluations: EvaluationMap,

    /// Reviewer who last advanced past this record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluator_id: Option<String>,

    #[serde(default, alias = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, alias = "updatedAt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Record {
    /// Create an unreviewed record
    pub fn new(id: impl Into<String>, label: impl Into<String>, idx: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            idx: idx.into(),
            candidates: Vec::new(),
            reconciled_labels: Vec::new(),
            reconciled_labels_evaluations: EvaluationMap::new(),
            evaluator_id: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Add a reconciled label
    pub fn with_label(mut self, label: impl Into<String>, idx: impl Into<String>) -> Self {
        self.reconciled_labels.push(ReconciledLabel::new(label, idx));
        self
    }

    /// Add a candidate
    pub fn with_candidate(
        mut self,
        label: impl Into<String>,
        idx: impl Into<String>,
        similarity: f64,
    ) -> Self {
        self.candidates.push(Candidate {
            label: label.into(),
            idx: idx.into(),
            similarity,
        });
        self
    }

    /// Record a decision
    pub fn with_evaluation(mut self, label_idx: impl Into<String>, result: Evaluation) -> Self {
        self.reconciled_labels_evaluations
            .insert(label_idx.into(), result);
        self
    }

    /// Stamp the evaluator
    pub fn with_evaluator(mut self, evaluator_id: impl Into<String>) -> Self {
        self.evaluator_id = Some(evaluator_id.into());
        self
    }

    /// True once some reviewer advanced past this record (blank ids do not count)
    pub fn is_processed(&self) -> bool {
        self.evaluator_id
            .as_deref()
            .map(|id| !id.trim().is_empty())
            .unwrap_or(false)
    }

    /// Concept group of this record
    pub fn concept_group(&self) -> &str {
        concept_group(&self.idx)
    }

    /// Current decision for a label, if any
    pub fn evaluation_for(&self, label_idx: &str) -> Option<Evaluation> {
        self.reconciled_labels_evaluations.get(label_idx).copied()
    }
}

impl AsRef<Record> for Record {
    fn as_ref(&self) -> &Record {
        self
    }
}

/// The substring before the first `_` of an idx
pub fn concept_group(idx: &str) -> &str {
    idx.split('_').next().unwrap_or_default()
}

/// Link to a concept page, or `None` when the idx has no concept group
pub fn concept_url(base_url: &str, idx: &str) -> Option<String> {
    let group = concept_group(idx);
    if group.is_empty() {
        return None;
    }
    Some(format!("{}/{}", base_url.trim_end_matches('/'), group))
}
