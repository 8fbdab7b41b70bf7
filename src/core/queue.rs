//! Per-state queue metadata.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;

/// An event waiting in a state's queue.
///
/// Immutable once enqueued; consumed exactly once by a drain of the state it
/// targets (or removed by a purge).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueuedEvent {
    /// Name of the handler to invoke
    pub event: String,
    /// Arguments passed to the handler, in order
    pub args: Vec<Value>,
}

impl QueuedEvent {
    pub fn new(event: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            event: event.into(),
            args,
        }
    }
}

/// Deferral flag, depth override and pending events for one state.
///
/// Flags are scoped to a single visit: [`QueueMeta::reset`] runs every time the
/// owning state is entered. The pending events survive resets.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueMeta {
    deferring: bool,
    depth: Option<usize>,
    pending: VecDeque<QueuedEvent>,
}

impl QueueMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_deferring(&self) -> bool {
        self.deferring
    }

    pub fn depth(&self) -> Option<usize> {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Pending events, front first.
    pub fn pending(&self) -> impl Iterator<Item = &QueuedEvent> {
        self.pending.iter()
    }

    pub(crate) fn defer(&mut self) {
        self.deferring = true;
    }

    pub(crate) fn set_depth(&mut self, depth: usize) {
        self.depth = Some(depth);
    }

    /// Clear the visit-scoped flags. Queue contents are left alone.
    pub(crate) fn reset(&mut self) {
        self.deferring = false;
        self.depth = None;
    }

    pub(crate) fn push(&mut self, event: QueuedEvent) {
        self.pending.push_back(event);
    }

    /// Remove the events the next drain should run.
    ///
    /// A depth of zero (or none) takes everything currently queued. Whatever is
    /// pushed after this returns belongs to a later drain.
    pub(crate) fn take_batch(&mut self) -> Vec<QueuedEvent> {
        let n = match self.depth {
            Some(depth) if depth > 0 => depth.min(self.pending.len()),
            _ => self.pending.len(),
        };
        self.pending.drain(..n).collect()
    }

    /// Remove and return every pending event.
    pub(crate) fn purge(&mut self) -> Vec<QueuedEvent> {
        self.pending.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn queue_of(names: &[&str]) -> QueueMeta {
        let mut meta = QueueMeta::new();
        for name in names {
            meta.push(QueuedEvent::new(*name, vec![]));
        }
        meta
    }

    fn names(events: &[QueuedEvent]) -> Vec<&str> {
        events.iter().map(|e| e.event.as_str()).collect()
    }

    #[test]
    fn batch_without_depth_takes_everything() {
        let mut meta = queue_of(&["a", "b", "c"]);
        let batch = meta.take_batch();
        assert_eq!(names(&batch), vec!["a", "b", "c"]);
        assert!(meta.is_empty());
    }

    #[test]
    fn batch_respects_depth_in_fifo_order() {
        let mut meta = queue_of(&["a", "b", "c"]);
        meta.set_depth(1);
        let batch = meta.take_batch();
        assert_eq!(names(&batch), vec!["a"]);
        let rest: Vec<&str> = meta.pending().map(|e| e.event.as_str()).collect();
        assert_eq!(rest, vec!["b", "c"]);
    }

    #[test]
    fn zero_depth_means_full_drain() {
        let mut meta = queue_of(&["a", "b"]);
        meta.set_depth(0);
        assert_eq!(meta.take_batch().len(), 2);
    }

    #[test]
    fn depth_larger_than_queue_is_clamped() {
        let mut meta = queue_of(&["a"]);
        meta.set_depth(10);
        assert_eq!(names(&meta.take_batch()), vec!["a"]);
    }

    #[test]
    fn reset_keeps_pending_events() {
        let mut meta = queue_of(&["a", "b"]);
        meta.defer();
        meta.set_depth(1);
        meta.reset();

        assert!(!meta.is_deferring());
        assert_eq!(meta.depth(), None);
        assert_eq!(meta.len(), 2);
    }

    #[test]
    fn purge_empties_queue() {
        let mut meta = queue_of(&["a", "b"]);
        let purged = meta.purge();
        assert_eq!(names(&purged), vec!["a", "b"]);
        assert!(meta.is_empty());
    }

    #[test]
    fn queued_event_serializes() {
        let event = QueuedEvent::new("test", vec![json!(22), json!("Peter")]);
        let json = serde_json::to_string(&event).unwrap();
        let back: QueuedEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }
}
