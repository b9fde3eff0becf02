//! Defensive decoding of fields that cross the storage boundary as JSON text.
//!
//! `reconciled_labels`, `candidates` and `reconciled_labels_evaluations` may
//! arrive either already structured or as serialized JSON strings. Both forms
//! are normalized into one typed representation on read. A field that fails to
//! decode becomes empty: one corrupt record must never stop the rest of the
//! collection from being reviewed.

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use super::record::{Candidate, Evaluation, EvaluationMap, ReconciledLabel};

/// A stored field could not be decoded
#[derive(Debug, Error)]
pub enum MalformedFieldError {
    #[error("Field '{field}' is not valid JSON: {source}")]
    InvalidJson {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Field '{field}' has an unexpected shape: {reason}")]
    UnexpectedShape { field: &'static str, reason: String },
}

/// Turn a JSON-text value into the structure it encodes.
///
/// Non-string values pass through unchanged; blank strings become `Null`.
pub fn normalize(field: &'static str, value: &Value) -> Result<Value, MalformedFieldError> {
    match value {
        Value::String(text) if text.trim().is_empty() => Ok(Value::Null),
        Value::String(text) => serde_json::from_str(text)
            .map_err(|source| MalformedFieldError::InvalidJson { field, source }),
        other => Ok(other.clone()),
    }
}

fn decode_list<T: DeserializeOwned>(
    field: &'static str,
    value: &Value,
) -> Result<Vec<T>, MalformedFieldError> {
    match normalize(field, value)? {
        Value::Null => Ok(Vec::new()),
        list @ Value::Array(_) => {
            serde_json::from_value(list).map_err(|e| MalformedFieldError::UnexpectedShape {
                field,
                reason: e.to_string(),
            })
        }
        other => Err(MalformedFieldError::UnexpectedShape {
            field,
            reason: format!("expected a list, found {}", kind_of(&other)),
        }),
    }
}

/// Decode `reconciled_labels`
pub fn decode_labels(value: &Value) -> Result<Vec<ReconciledLabel>, MalformedFieldError> {
    decode_list("reconciled_labels", value)
}

/// Decode `candidates`
pub fn decode_candidates(value: &Value) -> Result<Vec<Candidate>, MalformedFieldError> {
    decode_list("candidates", value)
}

/// Decode `reconciled_labels_evaluations`.
///
/// Entries whose value is not exactly `yes`, `no` or `unsure` are dropped,
/// since they count as unanswered anyway.
pub fn decode_evaluations(value: &Value) -> Result<EvaluationMap, MalformedFieldError> {
    const FIELD: &str = "reconciled_labels_evaluations";

    match normalize(FIELD, value)? {
        Value::Null => Ok(EvaluationMap::new()),
        Value::Object(entries) => Ok(entries
            .into_iter()
            .filter_map(|(idx, raw)| {
                serde_json::from_value::<Evaluation>(raw)
                    .ok()
                    .map(|evaluation| (idx, evaluation))
            })
            .collect()),
        other => Err(MalformedFieldError::UnexpectedShape {
            field: FIELD,
            reason: format!("expected an object, found {}", kind_of(&other)),
        }),
    }
}

/// Decode `reconciled_labels`, substituting an empty list on failure
pub fn labels_or_empty(value: &Value) -> Vec<ReconciledLabel> {
    decode_labels(value).unwrap_or_else(|e| {
        warn!("{}; treating as empty", e);
        Vec::new()
    })
}

/// Decode `candidates`, substituting an empty list on failure
pub fn candidates_or_empty(value: &Value) -> Vec<Candidate> {
    decode_candidates(value).unwrap_or_else(|e| {
        warn!("{}; treating as empty", e);
        Vec::new()
    })
}

/// Decode `reconciled_labels_evaluations`, substituting an empty map on failure
pub fn evaluations_or_empty(value: &Value) -> EvaluationMap {
    decode_evaluations(value).unwrap_or_else(|e| {
        warn!("{}; treating as empty", e);
        EvaluationMap::new()
    })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// serde field adapters
// ============================================================================

/// Accept an idx given as a string or a number
pub fn idx<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!(
            "idx must be a string or number, found {}",
            kind_of(&other)
        ))),
    }
}

pub(crate) fn labels_field<'de, D>(deserializer: D) -> Result<Vec<ReconciledLabel>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(labels_or_empty(&Value::deserialize(deserializer)?))
}

pub(crate) fn candidates_field<'de, D>(deserializer: D) -> Result<Vec<Candidate>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(candidates_or_empty(&Value::deserialize(deserializer)?))
}

pub(crate) fn evaluations_field<'de, D>(deserializer: D) -> Result<EvaluationMap, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(evaluations_or_empty(&Value::deserialize(deserializer)?))
}
