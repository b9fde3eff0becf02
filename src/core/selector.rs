//! Record selection: which record the reviewer sees next.
//!
//! All functions operate on a filtered view of the collection and return an
//! index into that view. When nothing else is eligible they return the current
//! index unchanged; "nowhere to go" is a no-op, not an error.

use std::fmt;
use std::str::FromStr;

use rand::rngs::{StdRng, ThreadRng};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::Record;

use super::usefulness::is_useful;

/// Source of uniformly distributed indices.
///
/// Kept separate from selection so tests can supply fixed sequences.
pub trait IndexSource {
    /// Return a value in `0..len` (`len` is never zero)
    fn pick(&mut self, len: usize) -> usize;
}

impl IndexSource for StdRng {
    fn pick(&mut self, len: usize) -> usize {
        self.gen_range(0..len)
    }
}

impl IndexSource for ThreadRng {
    fn pick(&mut self, len: usize) -> usize {
        self.gen_range(0..len)
    }
}

/// Replays a fixed list of indices, cycling when exhausted
#[derive(Debug, Clone)]
pub struct SequenceSource {
    values: Vec<usize>,
    position: usize,
}

impl SequenceSource {
    pub fn new(values: impl Into<Vec<usize>>) -> Self {
        Self {
            values: values.into(),
            position: 0,
        }
    }
}

impl IndexSource for SequenceSource {
    fn pick(&mut self, len: usize) -> usize {
        if self.values.is_empty() {
            return 0;
        }
        let value = self.values[self.position % self.values.len()];
        self.position += 1;
        value % len
    }
}

/// Evaluation-status part of a filter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,

    /// Some reviewer has advanced past the record
    Evaluated,

    /// No reviewer has advanced past the record yet
    Unevaluated,
}

impl StatusFilter {
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::All => true,
            Self::Evaluated => record.is_processed(),
            Self::Unevaluated => !record.is_processed(),
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Evaluated => write!(f, "evaluated"),
            Self::Unevaluated => write!(f, "unevaluated"),
        }
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "evaluated" => Ok(Self::Evaluated),
            "unevaluated" => Ok(Self::Unevaluated),
            other => Err(format!("Unknown status filter: {}", other)),
        }
    }
}

/// Which records the reviewer is currently browsing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    /// Substring that must appear in the record's idx
    pub text: Option<String>,

    pub status: StatusFilter,
}

impl RecordFilter {
    pub fn new(text: Option<String>, status: StatusFilter) -> Self {
        let text = text.filter(|t| !t.is_empty());
        Self { text, status }
    }

    pub fn matches(&self, record: &Record) -> bool {
        let text_ok = self
            .text
            .as_deref()
            .map(|t| record.idx.contains(t))
            .unwrap_or(true);
        text_ok && self.status.matches(record)
    }

    /// Filtered view of the collection, in collection order
    pub fn apply<'a>(&self, records: &'a [Record]) -> Vec<&'a Record> {
        records.iter().filter(|r| self.matches(r)).collect()
    }
}

/// Pick uniformly among useful records nobody has advanced past; failing that,
/// among all useful records; failing that, stay on `current`.
pub fn select_random_unevaluated<T: AsRef<Record>>(
    records: &[T],
    current: usize,
    source: &mut dyn IndexSource,
) -> usize {
    let useful: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| is_useful((*r).as_ref()))
        .map(|(i, _)| i)
        .collect();

    let unevaluated: Vec<usize> = useful
        .iter()
        .copied()
        .filter(|&i| !records[i].as_ref().is_processed())
        .collect();

    let eligible = if unevaluated.is_empty() {
        debug!(useful = useful.len(), "No unevaluated records, falling back to all useful");
        useful
    } else {
        unevaluated
    };

    if eligible.is_empty() {
        return current;
    }

    eligible[source.pick(eligible.len())]
}

/// Nearest useful record after `current`, wrapping to the start once
pub fn select_next<T: AsRef<Record>>(current: usize, records: &[T]) -> usize {
    let len = records.len();
    ((current + 1)..len)
        .chain(0..current.min(len))
        .find(|&i| is_useful(records[i].as_ref()))
        .unwrap_or(current)
}

/// Nearest useful record before `current`, wrapping to the end once
pub fn select_previous<T: AsRef<Record>>(current: usize, records: &[T]) -> usize {
    let len = records.len();
    (0..current.min(len))
        .rev()
        .chain(((current + 1)..len).rev())
        .find(|&i| is_useful(records[i].as_ref()))
        .unwrap_or(current)
}

/// First useful record, or 0 when there is none.
///
/// Callers must check usefulness before trusting a 0 result.
pub fn select_first_useful<T: AsRef<Record>>(records: &[T]) -> usize {
    records
        .iter()
        .position(|r| is_useful(r.as_ref()))
        .unwrap_or(0)
}

/// Current position plus the active filter
#[derive(Debug, Clone, Default)]
pub struct Selector {
    current: usize,
    filter: RecordFilter,
}

impl Selector {
    pub fn new(filter: RecordFilter) -> Self {
        Self { current: 0, filter }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn filter(&self) -> &RecordFilter {
        &self.filter
    }

    pub fn set_current(&mut self, index: usize) {
        self.current = index;
    }

    /// Filtered view of `records` under the active filter
    pub fn view<'a>(&self, records: &'a [Record]) -> Vec<&'a Record> {
        self.filter.apply(records)
    }

    /// Replace the filter and re-validate the position against the new view
    pub fn set_filter(&mut self, filter: RecordFilter, records: &[Record]) -> usize {
        self.filter = filter;
        self.revalidate(records)
    }

    /// Keep the position in bounds and on a useful record.
    ///
    /// An out-of-range index resets to 0; a position that does not land on a
    /// useful record moves to the first useful one.
    pub fn revalidate(&mut self, records: &[Record]) -> usize {
        let view = self.view(records);
        if self.current >= view.len() {
            self.current = 0;
        }
        let on_useful = view
            .get(self.current)
            .map(|r| is_useful(r))
            .unwrap_or(false);
        if !on_useful {
            self.current = select_first_useful(&view);
        }
        self.current
    }

    pub fn next(&mut self, records: &[Record]) -> usize {
        self.current = select_next(self.current, &self.view(records));
        self.current
    }

    pub fn previous(&mut self, records: &[Record]) -> usize {
        self.current = select_previous(self.current, &self.view(records));
        self.current
    }

    pub fn random_unevaluated(&mut self, records: &[Record], source: &mut dyn IndexSource) -> usize {
        self.current = select_random_unevaluated(&self.view(records), self.current, source);
        self.current
    }

    /// Move onto a record by id, if the active view contains it
    pub fn jump_to(&mut self, records: &[Record], id: &str) -> Option<usize> {
        let position = self.view(records).iter().position(|r| r.id == id)?;
        self.current = position;
        Some(position)
    }

    /// Record under the cursor, if the position is valid
    pub fn current_record<'a>(&self, records: &'a [Record]) -> Option<&'a Record> {
        self.view(records).get(self.current).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn useful(id: &str) -> Record {
        Record::new(id, id, format!("{}_0", id)).with_label("m", format!("{}_match", id))
    }

    fn useless(id: &str) -> Record {
        let idx = format!("{}_0", id);
        Record::new(id, id, idx.clone()).with_label("self", idx)
    }

    #[test]
    fn test_next_wraps_around() {
        let records = vec![useful("a"), useful("b"), useful("c")];
        assert_eq!(select_next(2, &records), 0);
        assert_eq!(select_next(0, &records), 1);
    }

    #[test]
    fn test_previous_wraps_around() {
        let records = vec![useful("a"), useful("b"), useful("c")];
        assert_eq!(select_previous(0, &records), 2);
        assert_eq!(select_previous(2, &records), 1);
    }

    #[test]
    fn test_skips_useless_records() {
        let records = vec![useful("a"), useless("b"), useless("c"), useful("d")];
        assert_eq!(select_next(0, &records), 3);
        assert_eq!(select_previous(0, &records), 3);
        assert_eq!(select_previous(3, &records), 0);
    }

    #[test]
    fn test_single_useful_record_is_a_no_op() {
        let records = vec![useless("a"), useful("b"), useless("c")];
        assert_eq!(select_next(1, &records), 1);
        assert_eq!(select_previous(1, &records), 1);
    }

    #[test]
    fn test_empty_view_is_a_no_op() {
        let records: Vec<Record> = Vec::new();
        assert_eq!(select_next(0, &records), 0);
        assert_eq!(select_previous(0, &records), 0);
        assert_eq!(select_first_useful(&records), 0);
    }

    #[test]
    fn test_out_of_range_current_does_not_panic() {
        let records = vec![useful("a"), useful("b")];
        assert_eq!(select_next(7, &records), 0);
        assert_eq!(select_previous(7, &records), 1);
    }

    #[test]
    fn test_first_useful() {
        let records = vec![useless("a"), useless("b"), useful("c")];
        assert_eq!(select_first_useful(&records), 2);
        assert_eq!(select_first_useful(&[useless("a")]), 0);
    }

    #[test]
    fn test_random_prefers_unevaluated() {
        let records = vec![
            useful("a").with_evaluator("ana"),
            useless("b"),
            useful("c"),
            useful("d").with_evaluator("ben"),
        ];
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..20 {
            assert_eq!(select_random_unevaluated(&records, 0, &mut rng), 2);
        }
    }

    #[test]
    fn test_random_falls_back_to_any_useful() {
        let records = vec![
            useful("a").with_evaluator("ana"),
            useless("b"),
            useful("c").with_evaluator("ben"),
        ];
        let mut source = SequenceSource::new(vec![0, 1, 2, 3]);

        let picks: Vec<usize> = (0..4)
            .map(|_| select_random_unevaluated(&records, 1, &mut source))
            .collect();
        assert_eq!(picks, vec![0, 2, 0, 2]);
    }

    #[test]
    fn test_thread_rng_stays_in_range() {
        let records = vec![useful("a"), useful("b"), useful("c")];
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            assert!(select_random_unevaluated(&records, 0, &mut rng) < 3);
        }
    }

    #[test]
    fn test_random_without_useful_keeps_current() {
        let records = vec![useless("a"), useless("b")];
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(select_random_unevaluated(&records, 1, &mut rng), 1);
    }

    #[test]
    fn test_filter_by_text_and_status() {
        let records = vec![
            useful("abc"),
            useful("abd").with_evaluator("ana"),
            useful("xyz"),
        ];

        let filter = RecordFilter::new(Some("ab".to_string()), StatusFilter::All);
        assert_eq!(filter.apply(&records).len(), 2);

        let filter = RecordFilter::new(Some("ab".to_string()), StatusFilter::Unevaluated);
        let view = filter.apply(&records);
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].id, "abc");

        let filter = RecordFilter::new(Some(String::new()), StatusFilter::Evaluated);
        assert_eq!(filter.text, None);
        assert_eq!(filter.apply(&records).len(), 1);
    }

    #[test]
    fn test_filter_change_revalidates_position() {
        let records = vec![
            useful("a"),
            useless("b"),
            useful("c"),
            useful("d"),
            useless("e_x"),
            useful("e_y"),
        ];
        let mut selector = Selector::new(RecordFilter::default());
        selector.set_current(5);

        // Narrow view: only "e_x" (useless) and "e_y"; index 5 is out of range
        let narrowed = RecordFilter::new(Some("e_".to_string()), StatusFilter::All);
        assert_eq!(selector.set_filter(narrowed, &records), 1);
        assert_eq!(selector.current_record(&records).unwrap().id, "e_y");
    }

    #[test]
    fn test_filter_change_keeps_valid_position() {
        let records = vec![useful("a"), useful("b"), useful("c")];
        let mut selector = Selector::new(RecordFilter::default());
        selector.set_current(1);

        let unevaluated = RecordFilter::new(None, StatusFilter::Unevaluated);
        assert_eq!(selector.set_filter(unevaluated, &records), 1);
    }

    #[test]
    fn test_selector_navigation_and_jump() {
        let records = vec![useful("a"), useless("b"), useful("c")];
        let mut selector = Selector::default();

        assert_eq!(selector.next(&records), 2);
        assert_eq!(selector.next(&records), 0);
        assert_eq!(selector.previous(&records), 2);
        assert_eq!(selector.jump_to(&records, "a"), Some(0));
        assert_eq!(selector.jump_to(&records, "missing"), None);
        assert_eq!(selector.current(), 0);
    }
}
