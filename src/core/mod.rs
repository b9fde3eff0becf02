//! Core review logic.
//!
//! This module contains:
//! - Usefulness: which records carry anything worth reviewing
//! - Evaluation: completion checks and collection-wide aggregates
//! - Selector: filtered cursor and record picking
//! - Mutator: label-level evaluation edits
//! - DecisionLog: append-only record of who decided what
//! - ReviewSession: live collection with optimistic writes

pub mod decision_log;
pub mod evaluation;
pub mod mutator;
pub mod selector;
pub mod session;
pub mod usefulness;

// Re-export commonly used types
pub use decision_log::{DecisionLog, DecisionLogError};
pub use evaluation::{
    can_advance, count_unevaluated, count_useful, count_user_decisions, decisions_by_evaluator,
    is_fully_evaluated, leading_evaluator, leading_evaluator_count, pending_labels,
    useful_position, EvaluationSummary,
};
pub use mutator::{advance_patch, evaluation_patch, set_label_evaluation, toggle_evaluation};
pub use selector::{
    select_first_useful, select_next, select_previous, select_random_unevaluated, IndexSource,
    RecordFilter, Selector, SequenceSource, StatusFilter,
};
pub use session::{PendingWrite, ReviewSession, SessionError, WriteOutcome};
pub use usefulness::{evaluable_labels, is_self_match, is_useful, label_states, unique_concept_groups};
