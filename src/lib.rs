//! namerec - Review name-reconciliation suggestions
//!
//! A reviewer tool for confirming or rejecting automatically suggested
//! matches between names in a catalogue.
//!
//! # Architecture
//!
//! The shared record collection is treated as a live, push-updated view:
//! - Every store delivery is the whole, authoritative collection
//! - Reviewer edits are applied locally first, then written to the store
//! - Each label decision is appended to a decision log for attribution
//!
//! # Modules
//!
//! - `adapters`: Record stores (in-memory, shared JSON file)
//! - `core`: Usefulness, evaluation state, selection, mutation, sessions
//! - `domain`: Data structures (Record, Evaluation, DecisionEvent)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Overall progress
//! namerec status
//!
//! # Decide a suggested label, then move on
//! namerec --user ana evaluate <record-id> B2_2 yes
//! namerec --user ana advance <record-id>
//!
//! # Interactive review
//! namerec --user ana review
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use adapters::{FileRecordStore, MemoryRecordStore, RecordPatch, RecordStore, StoreError};
pub use core::{
    is_fully_evaluated, is_useful, EvaluationSummary, RecordFilter, ReviewSession, Selector,
    StatusFilter,
};
pub use domain::{Attribution, DecisionEvent, Evaluation, EvaluationMap, Record};
