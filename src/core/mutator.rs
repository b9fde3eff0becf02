//! Label-level evaluation edits.
//!
//! Edits are computed against the latest locally observed snapshot of a
//! record and produce a whole new evaluation map. The map is written back as
//! one field, so two reviewers deciding the same label at the same moment
//! resolve last-write-wins.

use crate::adapters::RecordPatch;
use crate::domain::{Evaluation, EvaluationMap, Record};

/// New evaluation map for `record` after deciding (or clearing) one label.
///
/// `Some` overwrites any previous value for the label; `None` removes the key.
pub fn set_label_evaluation(
    record: &Record,
    label_idx: &str,
    result: Option<Evaluation>,
) -> EvaluationMap {
    let mut evaluations = record.reconciled_labels_evaluations.clone();
    match result {
        Some(evaluation) => {
            evaluations.insert(label_idx.to_string(), evaluation);
        }
        None => {
            evaluations.remove(label_idx);
        }
    }
    evaluations
}

/// Value a label should take when the reviewer picks `chosen`: picking the
/// current value again clears it.
pub fn toggle_evaluation(record: &Record, label_idx: &str, chosen: Evaluation) -> Option<Evaluation> {
    match record.evaluation_for(label_idx) {
        Some(current) if current == chosen => None,
        _ => Some(chosen),
    }
}

/// Partial update carrying only the evaluation map
pub fn evaluation_patch(evaluations: EvaluationMap) -> RecordPatch {
    RecordPatch {
        reconciled_labels_evaluations: Some(evaluations),
        ..Default::default()
    }
}

/// Partial update stamping the reviewer who advanced past the record
pub fn advance_patch(evaluator_id: &str) -> RecordPatch {
    RecordPatch {
        evaluator_id: Some(evaluator_id.to_string()),
        ..Default::default()
    }
}
