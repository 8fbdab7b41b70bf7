//! Lifecycle notifications and observers.
//!
//! The machine emits a [`MachineEvent`] at each lifecycle point. Handler
//! failures are only ever surfaced as [`MachineEvent::Exception`], so an
//! embedding application that cares about them must register an
//! [`Observer`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Which part of a state was running when a handler failed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Phase {
    Enter,
    Exit,
    Event(String),
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enter => f.write_str("on_enter"),
            Self::Exit => f.write_str("on_exit"),
            Self::Event(name) => f.write_str(name),
        }
    }
}

/// A lifecycle notification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MachineEvent {
    /// About to run a state's `on_enter`
    BeforeEnter { state: String },

    /// About to run a state's `on_exit`
    BeforeExit { state: String },

    /// About to run an event handler; `queued` is true when it came from a drain
    BeforeHandle {
        state: String,
        event: String,
        queued: bool,
    },

    /// An entry step finished its `on_enter`; the drain follows
    AfterTransition { from: Option<String>, to: String },

    /// Deferral was switched on for a state
    AfterDefer { state: String },

    /// A queue depth override was set for a state
    AfterDepth { state: String, depth: usize },

    /// A handler returned an error or panicked
    Exception {
        state: String,
        phase: Phase,
        error: String,
    },
}

impl MachineEvent {
    pub fn is_exception(&self) -> bool {
        matches!(self, Self::Exception { .. })
    }
}

/// Receives every [`MachineEvent`] a machine emits, synchronously, in order.
///
/// Any `Fn(&MachineEvent) + Send + Sync` closure is an observer.
pub trait Observer: Send + Sync {
    fn notify(&self, event: &MachineEvent);
}

impl<F> Observer for F
where
    F: Fn(&MachineEvent) + Send + Sync,
{
    fn notify(&self, event: &MachineEvent) {
        self(event)
    }
}

/// An observer that keeps every event it sees.
///
/// Clones share the same log, so one clone can be handed to the machine and
/// the other inspected afterwards.
///
/// # Example
///
/// ```rust
/// use queued_fsm::core::{EventLog, MachineEvent, Observer};
///
/// let log = EventLog::new();
/// log.notify(&MachineEvent::AfterDefer { state: "a".to_string() });
///
/// assert_eq!(log.len(), 1);
/// assert!(log.exceptions().is_empty());
/// ```
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<MachineEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    pub fn events(&self) -> Vec<MachineEvent> {
        self.lock().clone()
    }

    /// Only the [`MachineEvent::Exception`] entries.
    pub fn exceptions(&self) -> Vec<MachineEvent> {
        self.lock()
            .iter()
            .filter(|event| event.is_exception())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<MachineEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Observer for EventLog {
    fn notify(&self, event: &MachineEvent) {
        self.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn closures_are_observers() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let observer = move |_: &MachineEvent| {
            seen.fetch_add(1, Ordering::SeqCst);
        };

        observer.notify(&MachineEvent::BeforeEnter {
            state: "a".to_string(),
        });
        observer.notify(&MachineEvent::BeforeExit {
            state: "a".to_string(),
        });

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn log_clones_share_storage() {
        let log = EventLog::new();
        let handle = log.clone();
        handle.notify(&MachineEvent::AfterDepth {
            state: "a".to_string(),
            depth: 2,
        });

        assert_eq!(log.len(), 1);
        log.clear();
        assert!(handle.is_empty());
    }

    #[test]
    fn exceptions_are_filtered() {
        let log = EventLog::new();
        log.notify(&MachineEvent::AfterDefer {
            state: "a".to_string(),
        });
        log.notify(&MachineEvent::Exception {
            state: "a".to_string(),
            phase: Phase::Event("boom".to_string()),
            error: "failed".to_string(),
        });

        let exceptions = log.exceptions();
        assert_eq!(exceptions.len(), 1);
        assert!(exceptions[0].is_exception());
    }

    #[test]
    fn phase_display() {
        assert_eq!(Phase::Enter.to_string(), "on_enter");
        assert_eq!(Phase::Exit.to_string(), "on_exit");
        assert_eq!(Phase::Event("test".to_string()).to_string(), "test");
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = MachineEvent::Exception {
            state: "a".to_string(),
            phase: Phase::Exit,
            error: "boom".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "exception");
        assert_eq!(json["phase"]["kind"], "exit");

        let back: MachineEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
