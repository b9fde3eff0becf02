//! Evaluation completeness and collection-wide progress counts.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::{Attribution, Record};

use super::usefulness::{evaluable_labels, is_useful};

/// True if every evaluable label has a yes/no/unsure decision.
///
/// A record with nothing to evaluate is vacuously complete.
pub fn is_fully_evaluated(record: &Record) -> bool {
    evaluable_labels(record).all(|label| record.evaluation_for(&label.idx).is_some())
}

/// Number of evaluable labels still lacking a decision
pub fn pending_labels(record: &Record) -> usize {
    evaluable_labels(record)
        .filter(|label| record.evaluation_for(&label.idx).is_none())
        .count()
}

/// Number of useful records
pub fn count_useful<T: AsRef<Record>>(records: &[T]) -> usize {
    records.iter().filter(|r| is_useful(r.as_ref())).count()
}

/// Number of useful records no reviewer has advanced past
pub fn count_unevaluated<T: AsRef<Record>>(records: &[T]) -> usize {
    records
        .iter()
        .map(|r| r.as_ref())
        .filter(|r| is_useful(r) && !r.is_processed())
        .count()
}

/// Current decisions per reviewer.
///
/// Only decisions still present on a record count, and only on labels that
/// take part in review; the decision log says who made each one.
pub fn decisions_by_evaluator<T: AsRef<Record>>(
    records: &[T],
    attribution: &Attribution,
) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();

    for record in records.iter().map(|r| r.as_ref()) {
        for label in evaluable_labels(record) {
            if record.evaluation_for(&label.idx).is_none() {
                continue;
            }
            if let Some(author) = attribution.author_of(&record.id, &label.idx) {
                *counts.entry(author.to_string()).or_insert(0) += 1;
            }
        }
    }

    counts
}

/// Number of current label decisions attributed to `user`
pub fn count_user_decisions<T: AsRef<Record>>(
    records: &[T],
    attribution: &Attribution,
    user: &str,
) -> usize {
    decisions_by_evaluator(records, attribution)
        .get(user)
        .copied()
        .unwrap_or(0)
}

/// Reviewer with the most current decisions; ties go to the lexically first id
pub fn leading_evaluator<T: AsRef<Record>>(
    records: &[T],
    attribution: &Attribution,
) -> Option<(String, usize)> {
    decisions_by_evaluator(records, attribution)
        .into_iter()
        .fold(None, |best: Option<(String, usize)>, (user, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((user, count)),
        })
}

/// Highest decision count across all reviewers (0 when nobody decided anything)
pub fn leading_evaluator_count<T: AsRef<Record>>(records: &[T], attribution: &Attribution) -> usize {
    leading_evaluator(records, attribution)
        .map(|(_, count)| count)
        .unwrap_or(0)
}

/// True if the reviewer may move on from this record
pub fn can_advance(record: &Record, total_useful: usize) -> bool {
    is_fully_evaluated(record) && total_useful > 1
}

/// Position of `current` among the useful records of `records`, with the
/// useful total. `None` if the current record is not useful or out of range.
pub fn useful_position<T: AsRef<Record>>(records: &[T], current: usize) -> Option<(usize, usize)> {
    let current_id = &records.get(current)?.as_ref().id;
    let useful: Vec<&Record> = records
        .iter()
        .map(|r| r.as_ref())
        .filter(|r| is_useful(r))
        .collect();

    useful
        .iter()
        .position(|r| &r.id == current_id)
        .map(|position| (position, useful.len()))
}

/// Progress figures shown to a reviewer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvaluationSummary {
    pub total_records: usize,
    pub total_useful: usize,
    pub unevaluated: usize,
    pub user_decisions: usize,
    pub leading_evaluator: Option<String>,
    pub leading_count: usize,
}

impl EvaluationSummary {
    /// Compute the summary for one reviewer
    pub fn compute<T: AsRef<Record>>(
        records: &[T],
        attribution: &Attribution,
        user: Option<&str>,
    ) -> Self {
        let leading = leading_evaluator(records, attribution);

        Self {
            total_records: records.len(),
            total_useful: count_useful(records),
            unevaluated: count_unevaluated(records),
            user_decisions: user
                .map(|u| count_user_decisions(records, attribution, u))
                .unwrap_or(0),
            leading_count: leading.as_ref().map(|(_, c)| *c).unwrap_or(0),
            leading_evaluator: leading.map(|(u, _)| u),
        }
    }

    /// Human-readable remaining-work line
    pub fn remaining_message(&self) -> String {
        match self.unevaluated {
            0 => "All records have been evaluated!".to_string(),
            1 => "1 record left to evaluate".to_string(),
            n => format!("{} records left to evaluate", n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DecisionEvent, Evaluation};

    fn scenario_record() -> Record {
        Record::new("r1", "Smith, John", "A1_1")
            .with_label("Smith, John", "A1_1")
            .with_label("Smith, J.", "B2_2")
    }

    #[test]
    fn test_unsure_completes_scenario_record() {
        let record = scenario_record();
        assert!(!is_fully_evaluated(&record));
        assert_eq!(pending_labels(&record), 1);

        let record = record.with_evaluation("B2_2", Evaluation::Unsure);
        assert!(is_fully_evaluated(&record));
        assert_eq!(pending_labels(&record), 0);
    }

    #[test]
    fn test_not_useful_is_vacuously_complete() {
        let record = Record::new("r1", "x", "A1_1").with_label("x", "A1_1");
        assert!(!is_useful(&record));
        assert!(is_fully_evaluated(&record));
    }

    #[test]
    fn test_self_match_decision_is_not_required() {
        let record = scenario_record().with_evaluation("B2_2", Evaluation::No);
        assert!(record.evaluation_for("A1_1").is_none());
        assert!(is_fully_evaluated(&record));
    }

    #[test]
    fn test_counts() {
        let records = vec![
            scenario_record(),
            Record::new("r2", "y", "C3_3").with_label("y", "C3_3"),
            Record::new("r3", "z", "D4_4")
                .with_label("z", "E5_5")
                .with_evaluator("ana"),
            Record::new("r4", "w", "F6_6")
                .with_label("w", "G7_7")
                .with_evaluator(""),
        ];

        assert_eq!(count_useful(&records), 3);
        assert_eq!(count_unevaluated(&records), 2);
    }

    #[test]
    fn test_user_decisions_follow_attribution() {
        let records = vec![
            Record::new("r1", "a", "A1_1")
                .with_label("x", "B2_2")
                .with_label("y", "C3_3")
                .with_evaluation("B2_2", Evaluation::Yes)
                .with_evaluation("C3_3", Evaluation::No),
            Record::new("r2", "b", "D4_4")
                .with_label("z", "E5_5")
                .with_evaluation("E5_5", Evaluation::Unsure),
        ];
        let attribution = Attribution::from_events(&[
            DecisionEvent::new("r1", "B2_2", Some(Evaluation::Yes), "ana"),
            DecisionEvent::new("r1", "C3_3", Some(Evaluation::No), "ben"),
            DecisionEvent::new("r2", "E5_5", Some(Evaluation::Unsure), "ana"),
            // decision on a label that no longer holds a value is not counted
            DecisionEvent::new("r2", "Z9_9", Some(Evaluation::Yes), "ben"),
        ]);

        assert_eq!(count_user_decisions(&records, &attribution, "ana"), 2);
        assert_eq!(count_user_decisions(&records, &attribution, "ben"), 1);
        assert_eq!(count_user_decisions(&records, &attribution, "cat"), 0);
        assert_eq!(
            leading_evaluator(&records, &attribution),
            Some(("ana".to_string(), 2))
        );
        assert_eq!(leading_evaluator_count(&records, &attribution), 2);
    }

    #[test]
    fn test_leading_tie_prefers_first_id() {
        let records = vec![Record::new("r1", "a", "A1_1")
            .with_label("x", "B2_2")
            .with_label("y", "C3_3")
            .with_evaluation("B2_2", Evaluation::Yes)
            .with_evaluation("C3_3", Evaluation::Yes)];
        let attribution = Attribution::from_events(&[
            DecisionEvent::new("r1", "C3_3", Some(Evaluation::Yes), "zoe"),
            DecisionEvent::new("r1", "B2_2", Some(Evaluation::Yes), "ana"),
        ]);

        assert_eq!(
            leading_evaluator(&records, &attribution),
            Some(("ana".to_string(), 1))
        );
    }

    #[test]
    fn test_no_decisions_leading_count_is_zero() {
        let records = vec![scenario_record()];
        assert_eq!(leading_evaluator_count(&records, &Attribution::new()), 0);
    }

    #[test]
    fn test_can_advance() {
        let done = scenario_record().with_evaluation("B2_2", Evaluation::Yes);
        assert!(can_advance(&done, 2));
        assert!(!can_advance(&done, 1));
        assert!(!can_advance(&scenario_record(), 5));
    }

    #[test]
    fn test_useful_position() {
        let records = vec![
            Record::new("r0", "a", "A1_1"),
            scenario_record(),
            Record::new("r2", "b", "C3_3").with_label("b", "D4_4"),
        ];

        assert_eq!(useful_position(&records, 1), Some((0, 2)));
        assert_eq!(useful_position(&records, 2), Some((1, 2)));
        assert_eq!(useful_position(&records, 0), None);
        assert_eq!(useful_position(&records, 9), None);
    }

    #[test]
    fn test_summary() {
        let records = vec![scenario_record()];
        let summary = EvaluationSummary::compute(&records, &Attribution::new(), Some("ana"));

        assert_eq!(summary.total_records, 1);
        assert_eq!(summary.total_useful, 1);
        assert_eq!(summary.unevaluated, 1);
        assert_eq!(summary.user_decisions, 0);
        assert_eq!(summary.leading_evaluator, None);
        assert_eq!(summary.remaining_message(), "1 record left to evaluate");
    }
}
