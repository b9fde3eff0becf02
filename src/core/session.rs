//! Review session: the live collection, the reviewer's cursor, and the
//! optimistic write path.
//!
//! The session is the only writer of its in-memory collection. It changes
//! through two doors:
//! - [`ReviewSession::apply_snapshot`], fed by the store subscription
//! - the edit paths, which apply a change locally before the store sees it
//!
//! Every local edit leaves a pending entry keyed by record and field. Pending
//! values are laid over incoming snapshots until the store has acknowledged
//! the write *and* a snapshot at least as new as that acknowledgement has
//! arrived. From then on the snapshot is authoritative, including any later
//! overwrite by another reviewer. A failed write retires its entry at once.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::adapters::{RecordPatch, RecordStore, StoreError};
use crate::core::decision_log::DecisionLog;
use crate::core::evaluation::{self, EvaluationSummary};
use crate::core::mutator;
use crate::core::selector::{IndexSource, RecordFilter, Selector};
use crate::core::usefulness::{evaluable_labels, is_self_match};
use crate::domain::{Attribution, DecisionEvent, Evaluation, Record};

/// Errors a session reports to its caller.
///
/// Store write failures are not among them: they are logged and the session
/// carries on with its local state.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No record is selected")]
    NoCurrentRecord,

    #[error("Record not found: {0}")]
    UnknownRecord(String),

    #[error("Record {record_id} has no reconciled label {label_idx}")]
    UnknownLabel { record_id: String, label_idx: String },

    #[error("Label {label_idx} is the record's own name and cannot be evaluated")]
    SelfMatch { record_id: String, label_idx: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Whether a local edit reached the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Persisted,
    LocalOnly,
}

/// Field of a record touched by a local edit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PendingField {
    Evaluations,
    Evaluator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingState {
    InFlight,
    /// Store accepted the write; `None` if it did not report a timestamp
    Acked(Option<DateTime<Utc>>),
}

#[derive(Debug, Clone)]
struct Pending {
    seq: u64,
    patch: RecordPatch,
    state: PendingState,
}

impl Pending {
    /// True once `snapshot_record` reflects this write or something newer
    fn superseded_by(&self, snapshot_record: &Record) -> bool {
        match self.state {
            PendingState::InFlight => false,
            PendingState::Acked(None) => true,
            PendingState::Acked(Some(acked_at)) => snapshot_record
                .updated_at
                .map(|updated_at| updated_at >= acked_at)
                .unwrap_or(false),
        }
    }
}

/// A locally applied edit waiting to be written to the store
#[derive(Debug, Clone)]
pub struct PendingWrite {
    pub seq: u64,
    pub record_id: String,
    pub patch: RecordPatch,
    decision: Option<DecisionEvent>,
}

/// Lay a patch over a record without touching its timestamps
fn overlay(record: &mut Record, patch: &RecordPatch) {
    if let Some(evaluations) = &patch.reconciled_labels_evaluations {
        record.reconciled_labels_evaluations = evaluations.clone();
    }
    if let Some(evaluator_id) = &patch.evaluator_id {
        record.evaluator_id = Some(evaluator_id.clone());
    }
}

/// One reviewer's view of the shared collection
pub struct ReviewSession {
    store: Arc<dyn RecordStore>,
    reviewer: String,
    records: Vec<Record>,
    selector: Selector,
    pending: HashMap<(String, PendingField), Pending>,
    next_seq: u64,
    initialized: bool,
    decision_log: Option<DecisionLog>,
    attribution: Attribution,
    source: Box<dyn IndexSource + Send>,
}

impl ReviewSession {
    /// Create a session for `reviewer` with an entropy-seeded random source
    pub fn new(store: Arc<dyn RecordStore>, reviewer: impl Into<String>) -> Self {
        Self {
            store,
            reviewer: reviewer.into(),
            records: Vec::new(),
            selector: Selector::default(),
            pending: HashMap::new(),
            next_seq: 0,
            initialized: false,
            decision_log: None,
            attribution: Attribution::new(),
            source: Box::new(StdRng::from_entropy()),
        }
    }

    /// Replace the random source used for record picks
    pub fn with_index_source(mut self, source: impl IndexSource + Send + 'static) -> Self {
        self.source = Box::new(source);
        self
    }

    /// Start with a filter already active
    pub fn with_filter(mut self, filter: RecordFilter) -> Self {
        self.selector = Selector::new(filter);
        self
    }

    /// Record each label decision in `log` and load existing attribution from it
    pub async fn with_decision_log(mut self, log: DecisionLog) -> Self {
        match log.attribution().await {
            Ok(attribution) => self.attribution = attribution,
            Err(e) => warn!("Could not replay decision log {}: {}", log.path().display(), e),
        }
        self.decision_log = Some(log);
        self
    }

    pub fn reviewer(&self) -> &str {
        &self.reviewer
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Full local collection, pending edits included
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Collection under the active filter
    pub fn view(&self) -> Vec<&Record> {
        self.selector.view(&self.records)
    }

    pub fn current_index(&self) -> usize {
        self.selector.current()
    }

    pub fn current_record(&self) -> Option<&Record> {
        self.selector.current_record(&self.records)
    }

    pub fn filter(&self) -> &RecordFilter {
        self.selector.filter()
    }

    pub fn attribution(&self) -> &Attribution {
        &self.attribution
    }

    /// Number of local edits not yet settled against a snapshot
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Take in a full snapshot from the store.
    ///
    /// The snapshot replaces the local collection. Pending edits that it does
    /// not yet reflect are laid back on top; the rest retire. The cursor stays
    /// on the same record when that record is still in view.
    pub fn apply_snapshot(&mut self, snapshot: &[Record]) {
        let current_id = self.current_record().map(|r| r.id.clone());
        let mut records = snapshot.to_vec();

        let before = self.pending.len();
        self.pending.retain(|(record_id, _), pending| {
            match records.iter_mut().find(|r| &r.id == record_id) {
                Some(record) if pending.superseded_by(record) => false,
                Some(record) => {
                    overlay(record, &pending.patch);
                    true
                }
                // Record vanished from the store
                None => false,
            }
        });
        let retired = before - self.pending.len();
        if retired > 0 {
            debug!(retired, remaining = self.pending.len(), "Retired pending edits");
        }

        self.records = records;

        if !self.initialized && !self.records.is_empty() {
            self.initialized = true;
            if self.selector.current() == 0 {
                let index = self
                    .selector
                    .random_unevaluated(&self.records, self.source.as_mut());
                debug!(index, "Initial random selection");
            }
        } else if let Some(id) = current_id {
            self.selector.jump_to(&self.records, &id);
        }

        self.selector.revalidate(&self.records);
    }

    /// Move to the next useful record in view
    pub fn next(&mut self) -> usize {
        self.selector.next(&self.records)
    }

    /// Move to the previous useful record in view
    pub fn previous(&mut self) -> usize {
        self.selector.previous(&self.records)
    }

    /// Jump to a random unevaluated record in view
    pub fn random(&mut self) -> usize {
        self.selector.random_unevaluated(&self.records, self.source.as_mut())
    }

    /// Move the cursor onto a record by id
    pub fn jump_to(&mut self, record_id: &str) -> Option<usize> {
        self.selector.jump_to(&self.records, record_id)
    }

    /// Replace the active filter and re-validate the cursor
    pub fn set_filter(&mut self, filter: RecordFilter) -> usize {
        let index = self.selector.set_filter(filter, &self.records);
        debug!(index, filter = ?self.selector.filter(), "Filter changed");
        index
    }

    /// Progress figures for this reviewer over the whole collection.
    ///
    /// Filters narrow navigation only.
    pub fn summary(&self) -> EvaluationSummary {
        EvaluationSummary::compute(&self.records, &self.attribution, Some(&self.reviewer))
    }

    /// Whether the reviewer may move on from the current record
    pub fn can_advance(&self) -> bool {
        let total_useful = evaluation::count_useful(&self.records);
        self.current_record()
            .map(|record| evaluation::can_advance(record, total_useful))
            .unwrap_or(false)
    }

    /// Position of the current record among the useful records in view
    pub fn useful_position(&self) -> Option<(usize, usize)> {
        evaluation::useful_position(&self.view(), self.selector.current())
    }

    /// Re-read attribution from the decision log, picking up other reviewers
    pub async fn refresh_attribution(&mut self) {
        if let Some(log) = &self.decision_log {
            match log.attribution().await {
                Ok(attribution) => self.attribution = attribution,
                Err(e) => warn!("Could not replay decision log: {}", e),
            }
        }
    }

    /// Apply a label decision locally and return the write to send.
    ///
    /// The new map is built from the latest local copy of the record.
    pub fn stage_label_evaluation(
        &mut self,
        record_id: &str,
        label_idx: &str,
        result: Option<Evaluation>,
    ) -> Result<PendingWrite, SessionError> {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.id == record_id)
            .ok_or_else(|| SessionError::UnknownRecord(record_id.to_string()))?;

        if !evaluable_labels(record).any(|l| l.idx == label_idx) {
            let self_match = record
                .reconciled_labels
                .iter()
                .any(|l| l.idx == label_idx && is_self_match(record, l));
            let (record_id, label_idx) = (record_id.to_string(), label_idx.to_string());
            return Err(if self_match {
                SessionError::SelfMatch { record_id, label_idx }
            } else {
                SessionError::UnknownLabel { record_id, label_idx }
            });
        }

        let evaluations = mutator::set_label_evaluation(record, label_idx, result);
        let patch = mutator::evaluation_patch(evaluations);
        overlay(record, &patch);

        let decision = DecisionEvent::new(record_id, label_idx, result, self.reviewer.clone());
        Ok(self.track(record_id, PendingField::Evaluations, patch, Some(decision)))
    }

    /// Stamp the current record as reviewed and move to a random unevaluated
    /// record. Returns `None` when nothing is selected.
    pub fn stage_advance(&mut self) -> Option<PendingWrite> {
        let view_index = self.selector.current();
        let record_id = self.current_record()?.id.clone();

        let patch = mutator::advance_patch(&self.reviewer);
        if let Some(record) = self.records.iter_mut().find(|r| r.id == record_id) {
            overlay(record, &patch);
        }
        let write = self.track(&record_id, PendingField::Evaluator, patch, None);

        let index = self.random();
        debug!(from = view_index, to = index, "Advanced");
        Some(write)
    }

    fn track(
        &mut self,
        record_id: &str,
        field: PendingField,
        patch: RecordPatch,
        decision: Option<DecisionEvent>,
    ) -> PendingWrite {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.pending.insert(
            (record_id.to_string(), field),
            Pending {
                seq,
                patch: patch.clone(),
                state: PendingState::InFlight,
            },
        );
        PendingWrite {
            seq,
            record_id: record_id.to_string(),
            patch,
            decision,
        }
    }

    /// Settle a staged write with the store's answer
    pub fn complete_write(&mut self, write: &PendingWrite, result: &Result<Record, StoreError>) {
        match result {
            Ok(stored) => {
                for ((record_id, _), pending) in self.pending.iter_mut() {
                    if pending.seq == write.seq && record_id == &write.record_id {
                        pending.state = PendingState::Acked(stored.updated_at);
                    }
                }

                // The store's copy is at least as new as ours; keep newer local edits on top
                if let Some(record) = self.records.iter_mut().find(|r| r.id == stored.id) {
                    *record = stored.clone();
                    for ((record_id, _), pending) in &self.pending {
                        if record_id == &stored.id && pending.state == PendingState::InFlight {
                            overlay(record, &pending.patch);
                        }
                    }
                }
            }
            Err(e) => {
                warn!("Write to record {} failed, keeping local state: {}", write.record_id, e);
                self.pending.retain(|_, pending| pending.seq != write.seq);
            }
        }
    }

    /// Send a staged write to the store and settle it
    pub async fn send(&mut self, write: PendingWrite) -> WriteOutcome {
        let result = self.store.update(&write.record_id, write.patch.clone()).await;
        self.complete_write(&write, &result);

        if result.is_err() {
            return WriteOutcome::LocalOnly;
        }

        if let Some(decision) = &write.decision {
            self.attribution.apply_event(decision);
            if let Some(log) = &self.decision_log {
                if let Err(e) = log.append(decision).await {
                    warn!("Failed to log decision on {}: {}", decision.record_id, e);
                }
            }
        }
        WriteOutcome::Persisted
    }

    /// Set or clear one label decision
    #[instrument(skip(self), fields(reviewer = %self.reviewer))]
    pub async fn set_label_evaluation(
        &mut self,
        record_id: &str,
        label_idx: &str,
        result: Option<Evaluation>,
    ) -> Result<WriteOutcome, SessionError> {
        let write = self.stage_label_evaluation(record_id, label_idx, result)?;
        let outcome = self.send(write).await;
        info!(?outcome, "Label evaluation {:?}", result.map(|r| r.as_str()));
        Ok(outcome)
    }

    /// Pick `chosen` for a label, or clear it if it already holds `chosen`
    pub async fn toggle(
        &mut self,
        record_id: &str,
        label_idx: &str,
        chosen: Evaluation,
    ) -> Result<WriteOutcome, SessionError> {
        let record = self
            .records
            .iter()
            .find(|r| r.id == record_id)
            .ok_or_else(|| SessionError::UnknownRecord(record_id.to_string()))?;
        let result = mutator::toggle_evaluation(record, label_idx, chosen);
        self.set_label_evaluation(record_id, label_idx, result).await
    }

    /// Stamp the current record with this reviewer and move on.
    ///
    /// The cursor moves even if the store rejects the stamp.
    #[instrument(skip(self), fields(reviewer = %self.reviewer))]
    pub async fn advance(&mut self) -> Result<WriteOutcome, SessionError> {
        let write = self.stage_advance().ok_or(SessionError::NoCurrentRecord)?;
        let record_id = write.record_id.clone();
        let outcome = self.send(write).await;
        info!(record = %record_id, ?outcome, "Advanced past record");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryRecordStore;
    use crate::core::selector::{SequenceSource, StatusFilter};

    fn useful(id: &str) -> Record {
        Record::new(id, id, format!("{}_0", id))
            .with_label(id, format!("{}_0", id))
            .with_label("match", format!("{}_1", id))
    }

    fn session_with(records: Vec<Record>) -> (ReviewSession, Arc<MemoryRecordStore>) {
        let store = Arc::new(MemoryRecordStore::new(records.clone()));
        let mut session = ReviewSession::new(store.clone(), "ana")
            .with_index_source(SequenceSource::new(vec![0]));
        session.apply_snapshot(&records);
        (session, store)
    }

    #[test]
    fn test_initial_selection_is_unevaluated() {
        let records = vec![
            useful("a").with_evaluator("ben"),
            useful("b"),
            useful("c").with_evaluator("ben"),
        ];
        let (session, _store) = session_with(records);
        assert_eq!(session.current_record().unwrap().id, "b");
    }

    #[test]
    fn test_stale_snapshot_keeps_in_flight_edit() {
        let records = vec![useful("a")];
        let (mut session, _store) = session_with(records.clone());

        session
            .stage_label_evaluation("a", "a_1", Some(Evaluation::Yes))
            .unwrap();
        session.apply_snapshot(&records);

        assert_eq!(
            session.records()[0].evaluation_for("a_1"),
            Some(Evaluation::Yes)
        );
        assert_eq!(session.pending_count(), 1);
    }

    #[test]
    fn test_failed_write_retires_pending() {
        let records = vec![useful("a")];
        let (mut session, _store) = session_with(records.clone());

        let write = session
            .stage_label_evaluation("a", "a_1", Some(Evaluation::No))
            .unwrap();
        session.complete_write(&write, &Err(StoreError::write("a", "offline")));

        // Local value survives until the next snapshot
        assert_eq!(session.records()[0].evaluation_for("a_1"), Some(Evaluation::No));
        assert_eq!(session.pending_count(), 0);

        session.apply_snapshot(&records);
        assert_eq!(session.records()[0].evaluation_for("a_1"), None);
    }

    #[test]
    fn test_unknown_label_rejected() {
        let (mut session, _store) = session_with(vec![useful("a")]);
        let result = session.stage_label_evaluation("a", "zz", Some(Evaluation::Yes));
        assert!(matches!(result, Err(SessionError::UnknownLabel { .. })));
    }

    #[test]
    fn test_self_match_label_rejected() {
        let (mut session, _store) = session_with(vec![useful("a")]);
        let result = session.stage_label_evaluation("a", "a_0", Some(Evaluation::Yes));

        assert!(matches!(result, Err(SessionError::SelfMatch { .. })));
        assert_eq!(session.records()[0].evaluation_for("a_0"), None);
        assert_eq!(session.pending_count(), 0);
    }

    #[test]
    fn test_summary_ignores_filter() {
        let records = vec![
            useful("a"),
            useful("b").with_evaluator("ben"),
            useful("c"),
            useful("d"),
        ];
        let (mut session, _store) = session_with(records);
        let before = session.summary();
        assert_eq!(before.total_useful, 4);
        assert_eq!(before.unevaluated, 3);

        session.set_filter(RecordFilter::new(None, StatusFilter::Evaluated));
        assert_eq!(session.summary(), before);

        session.set_filter(RecordFilter::new(Some("c_".to_string()), StatusFilter::All));
        assert_eq!(session.summary(), before);
        assert_ne!(session.summary().remaining_message(), "All records have been evaluated!");
    }

    #[test]
    fn test_can_advance_under_text_filter() {
        let records = vec![useful("a"), useful("b"), useful("c"), useful("d")];
        let (mut session, _store) = session_with(records);

        session.set_filter(RecordFilter::new(Some("b_".to_string()), StatusFilter::All));
        assert_eq!(session.current_record().unwrap().id, "b");
        assert!(!session.can_advance());

        session
            .stage_label_evaluation("b", "b_1", Some(Evaluation::Yes))
            .unwrap();
        assert!(session.can_advance());
    }

    #[test]
    fn test_filter_change_revalidates() {
        let records = vec![useful("a"), useful("b").with_evaluator("ben")];
        let (mut session, _store) = session_with(records);
        assert_eq!(session.current_record().unwrap().id, "a");

        session.set_filter(RecordFilter::new(None, StatusFilter::Evaluated));
        assert_eq!(session.current_index(), 0);
        assert_eq!(session.current_record().unwrap().id, "b");
    }

    #[tokio::test]
    async fn test_set_label_evaluation_persists() {
        let (mut session, store) = session_with(vec![useful("a")]);

        let outcome = session
            .set_label_evaluation("a", "a_1", Some(Evaluation::Unsure))
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Persisted);

        let stored = store.snapshot().await.unwrap();
        assert_eq!(stored[0].evaluation_for("a_1"), Some(Evaluation::Unsure));
        assert_eq!(session.attribution().author_of("a", "a_1"), Some("ana"));
    }

    #[tokio::test]
    async fn test_advance_moves_even_when_write_fails() {
        let (mut session, store) = session_with(vec![useful("a"), useful("b")]);
        store.set_fail_writes(true);
        assert_eq!(session.current_record().unwrap().id, "a");

        let outcome = session.advance().await.unwrap();
        assert_eq!(outcome, WriteOutcome::LocalOnly);
        assert_eq!(session.current_record().unwrap().id, "b");
        assert_eq!(session.records()[0].evaluator_id.as_deref(), Some("ana"));
    }
}
