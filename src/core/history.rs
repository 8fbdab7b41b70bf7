//! Transition history tracking.
//!
//! Every completed entry step (including the initial one) leaves a record
//! here, in the order the sequencer ran them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Record of a single completed entry step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// The state being left, `None` for the initial entry
    pub from: Option<String>,
    /// The state that was entered
    pub to: String,
    /// When the entry step finished its `on_enter`
    pub timestamp: DateTime<Utc>,
    /// Position of this step in the machine's lifetime, starting at 0
    pub sequence: u64,
}

/// Ordered history of transitions, optionally bounded.
///
/// When a limit is set, the oldest records are discarded first.
///
/// # Example
///
/// ```rust
/// use queued_fsm::core::TransitionHistory;
///
/// let mut history = TransitionHistory::new();
/// history.record(None, "a");
/// history.record(Some("a".to_string()), "b");
///
/// assert_eq!(history.path(), vec!["a", "b"]);
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TransitionHistory {
    transitions: VecDeque<TransitionRecord>,
    limit: Option<usize>,
    recorded: u64,
}

impl TransitionHistory {
    /// Create a new, unbounded, empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a history that keeps at most `limit` records.
    pub fn bounded(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Append a record stamped with the current time.
    pub fn record(&mut self, from: Option<String>, to: impl Into<String>) {
        let record = TransitionRecord {
            from,
            to: to.into(),
            timestamp: Utc::now(),
            sequence: self.recorded,
        };
        self.recorded += 1;

        if self.limit == Some(0) {
            return;
        }
        if let Some(limit) = self.limit {
            while self.transitions.len() >= limit {
                self.transitions.pop_front();
            }
        }
        self.transitions.push_back(record);
    }

    /// Names of the states traversed, oldest first.
    ///
    /// Starts with the `from` of the oldest retained record when it has one,
    /// followed by the `to` of every record.
    pub fn path(&self) -> Vec<&str> {
        let mut path = Vec::new();
        if let Some(from) = self.transitions.front().and_then(|t| t.from.as_deref()) {
            path.push(from);
        }
        for transition in &self.transitions {
            path.push(transition.to.as_str());
        }
        path
    }

    /// Time between the oldest and newest retained records.
    pub fn duration(&self) -> Option<Duration> {
        let (first, last) = (self.transitions.front()?, self.transitions.back()?);
        last.timestamp
            .signed_duration_since(first.timestamp)
            .to_std()
            .ok()
    }

    pub fn transitions(&self) -> impl Iterator<Item = &TransitionRecord> {
        self.transitions.iter()
    }

    pub fn last(&self) -> Option<&TransitionRecord> {
        self.transitions.back()
    }

    /// Number of retained records.
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Total number of records ever written, including discarded ones.
    pub fn total_recorded(&self) -> u64 {
        self.recorded
    }
}
