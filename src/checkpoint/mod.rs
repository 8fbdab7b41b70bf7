//! Serializable snapshots of a machine.
//!
//! A [`Snapshot`] captures everything about a machine except its handlers and
//! context: the current/prior bookkeeping, every state's queue metadata, the
//! number of steps still waiting in the sequencer, and the transition history.
//! It is meant for diagnostics, in particular for spotting queues that grow
//! because their state is never re-entered.

use crate::core::{QueueMeta, QueuedEvent, TransitionHistory};
use crate::runtime::Machine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub mod error;

pub use error::SnapshotError;

/// Version identifier for snapshot format
pub const SNAPSHOT_VERSION: u32 = 1;

/// Queue metadata of one state at snapshot time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub deferring: bool,
    pub depth: Option<usize>,
    pub pending: Vec<QueuedEvent>,
}

impl From<&QueueMeta> for QueueSnapshot {
    fn from(meta: &QueueMeta) -> Self {
        Self {
            deferring: meta.is_deferring(),
            depth: meta.depth(),
            pending: meta.pending().cloned().collect(),
        }
    }
}

/// Serializable view of a machine.
/// Does NOT include handlers or the context payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot format version
    pub version: u32,

    /// Unique snapshot identifier
    pub id: Uuid,

    /// Identifier of the machine the snapshot was taken from
    pub machine_id: Uuid,

    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,

    pub initial_state: String,
    pub current_state: Option<String>,
    pub prior_state: Option<String>,
    pub prior_event: Option<String>,

    /// Queue metadata for every registered state
    pub queues: BTreeMap<String, QueueSnapshot>,

    /// Steps still waiting in the sequencer
    pub pending_steps: usize,

    /// Retained transition history
    pub history: TransitionHistory,
}

impl Snapshot {
    /// Capture the current state of `machine`.
    pub fn capture<C>(machine: &Machine<C>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            id: Uuid::new_v4(),
            machine_id: machine.id(),
            timestamp: Utc::now(),
            initial_state: machine.initial_state().to_string(),
            current_state: machine.current_state().map(str::to_string),
            prior_state: machine.prior_state().map(str::to_string),
            prior_event: machine.prior_event().map(str::to_string),
            queues: machine
                .queues
                .iter()
                .map(|(name, meta)| (name.clone(), QueueSnapshot::from(meta)))
                .collect(),
            pending_steps: machine.pending_steps(),
            history: machine.history().clone(),
        }
    }

    /// Total number of events waiting across all states.
    pub fn total_pending(&self) -> usize {
        self.queues.values().map(|queue| queue.pending.len()).sum()
    }

    /// States with at least one waiting event, with their queue lengths.
    pub fn backlog(&self) -> Vec<(&str, usize)> {
        self.queues
            .iter()
            .filter(|(_, queue)| !queue.pending.is_empty())
            .map(|(name, queue)| (name.as_str(), queue.pending.len()))
            .collect()
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_str(json)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Check the version and internal consistency.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: self.version,
                supported: SNAPSHOT_VERSION,
            });
        }
        let named = [&self.current_state, &self.prior_state]
            .into_iter()
            .flatten()
            .chain(std::iter::once(&self.initial_state));
        for state in named {
            if !self.queues.contains_key(state) {
                return Err(SnapshotError::MissingQueue {
                    state: state.clone(),
                });
            }
        }
        Ok(())
    }
}

impl<C> Machine<C> {
    /// Capture a [`Snapshot`] of this machine.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(self)
    }
}
