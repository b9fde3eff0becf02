//! Usefulness classification.
//!
//! A reconciled label whose idx equals its record's idx is a self-match and
//! never takes part in review. A record is useful only if something is left
//! once self-matches are removed.

use crate::domain::{Evaluation, ReconciledLabel, Record};

/// True if the label points back at its own record
pub fn is_self_match(record: &Record, label: &ReconciledLabel) -> bool {
    label.idx == record.idx
}

/// Reconciled labels a reviewer has to decide on, in stored order
pub fn evaluable_labels(record: &Record) -> impl Iterator<Item = &ReconciledLabel> + '_ {
    record
        .reconciled_labels
        .iter()
        .filter(move |label| !is_self_match(record, label))
}

/// Evaluable labels paired with their current decision
pub fn label_states(record: &Record) -> Vec<(&ReconciledLabel, Option<Evaluation>)> {
    evaluable_labels(record)
        .map(|label| (label, record.evaluation_for(&label.idx)))
        .collect()
}

/// True if the record has at least one non-self-match reconciled label
pub fn is_useful(record: &Record) -> bool {
    evaluable_labels(record).next().is_some()
}

/// Distinct concept groups of the record and its evaluable labels, record first
pub fn unique_concept_groups(record: &Record) -> Vec<&str> {
    let mut groups: Vec<&str> = Vec::new();
    let own = std::iter::once(record.concept_group());
    let labels = evaluable_labels(record).map(|label| crate::domain::concept_group(&label.idx));

    for group in own.chain(labels) {
        if !group.is_empty() && !groups.contains(&group) {
            groups.push(group);
        }
    }
    groups
}
