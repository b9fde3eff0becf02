//! Domain types for the reconciliation review tool.
//!
//! This module contains the core data structures:
//! - Record: an entity with its proposed matches and decisions
//! - Decode: tolerant decoding of JSON-text fields
//! - Decision: attributed label decisions and their replay

pub mod attribution;
pub mod decision;
pub mod decode;
pub mod record;

// Re-export commonly used types
pub use attribution::Attribution;
pub use decision::DecisionEvent;
pub use decode::MalformedFieldError;
pub use record::{
    concept_group, concept_url, Candidate, Evaluation, EvaluationMap, ReconciledLabel, Record,
};
