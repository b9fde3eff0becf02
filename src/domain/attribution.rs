//! Who made each current decision, reconstructed from decision events.

use std::collections::HashMap;

use super::decision::DecisionEvent;

/// Latest author per `(record_id, label_idx)`, derived by replaying the
/// decision log in order.
#[derive(Debug, Clone, Default)]
pub struct Attribution {
    authors: HashMap<(String, String), String>,
}

impl Attribution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconstruct attribution from a sequence of events
    pub fn from_events(events: &[DecisionEvent]) -> Self {
        let mut attribution = Self::new();
        for event in events {
            attribution.apply_event(event);
        }
        attribution
    }

    /// Apply a single event; later events supersede earlier ones
    pub fn apply_event(&mut self, event: &DecisionEvent) {
        let key = (event.record_id.clone(), event.label_idx.clone());
        if event.is_clear() {
            self.authors.remove(&key);
        } else {
            self.authors.insert(key, event.evaluator.clone());
        }
    }

    /// Author of the current decision on a label
    pub fn author_of(&self, record_id: &str, label_idx: &str) -> Option<&str> {
        self.authors
            .get(&(record_id.to_string(), label_idx.to_string()))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.authors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.authors.is_empty()
    }
}
