//! Handler sets and the state registry.
//!
//! A state is described by the capabilities it chooses to implement: an
//! optional entry callback, an optional exit callback, and any number of
//! named event handlers. None of them are required.

use crate::runtime::Machine;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Outcome of a user-supplied handler.
///
/// An `Err` is treated exactly like a thrown exception: it is caught by the
/// machine, reported through [`MachineEvent::Exception`](super::MachineEvent),
/// and execution continues.
pub type HandlerResult = anyhow::Result<()>;

/// Ordered arguments carried by a transition or an event.
pub type Args = Vec<Value>;

/// Entry callback and named event handlers share this shape.
pub type EventHandler<C> =
    Arc<dyn Fn(&mut Machine<C>, &[Value]) -> HandlerResult + Send + Sync>;

/// Exit callbacks take no arguments.
pub type ExitHandler<C> = Arc<dyn Fn(&mut Machine<C>) -> HandlerResult + Send + Sync>;

/// The capability record for a single state.
///
/// # Example
///
/// ```rust
/// use queued_fsm::core::StateHandlers;
///
/// let idle = StateHandlers::<Vec<String>>::new()
///     .on_enter(|machine, _args| {
///         machine.context_mut().push("entered idle".to_string());
///         Ok(())
///     })
///     .on("ping", |machine, args| {
///         machine.context_mut().push(format!("ping {args:?}"));
///         Ok(())
///     });
///
/// assert!(idle.has_enter());
/// assert!(!idle.has_exit());
/// assert!(idle.handles("ping"));
/// ```
pub struct StateHandlers<C> {
    on_enter: Option<EventHandler<C>>,
    on_exit: Option<ExitHandler<C>>,
    events: HashMap<String, EventHandler<C>>,
}

impl<C> StateHandlers<C> {
    /// Create a handler set with no capabilities.
    pub fn new() -> Self {
        Self {
            on_enter: None,
            on_exit: None,
            events: HashMap::new(),
        }
    }

    /// Set the entry callback. It receives the extra arguments passed to
    /// `transition`.
    pub fn on_enter<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut Machine<C>, &[Value]) -> HandlerResult + Send + Sync + 'static,
    {
        self.on_enter = Some(Arc::new(handler));
        self
    }

    /// Set the exit callback.
    pub fn on_exit<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut Machine<C>) -> HandlerResult + Send + Sync + 'static,
    {
        self.on_exit = Some(Arc::new(handler));
        self
    }

    /// Register a named event handler, replacing any previous one with the
    /// same name.
    pub fn on<F>(mut self, event: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut Machine<C>, &[Value]) -> HandlerResult + Send + Sync + 'static,
    {
        self.events.insert(event.into(), Arc::new(handler));
        self
    }

    pub fn has_enter(&self) -> bool {
        self.on_enter.is_some()
    }

    pub fn has_exit(&self) -> bool {
        self.on_exit.is_some()
    }

    /// Whether a handler named `event` exists in this set.
    pub fn handles(&self, event: &str) -> bool {
        self.events.contains_key(event)
    }

    /// Names of all registered event handlers, sorted.
    pub fn event_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.events.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub(crate) fn enter_handler(&self) -> Option<EventHandler<C>> {
        self.on_enter.clone()
    }

    pub(crate) fn exit_handler(&self) -> Option<ExitHandler<C>> {
        self.on_exit.clone()
    }

    pub(crate) fn event_handler(&self, event: &str) -> Option<EventHandler<C>> {
        self.events.get(event).cloned()
    }
}

impl<C> Default for StateHandlers<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for StateHandlers<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateHandlers")
            .field("on_enter", &self.has_enter())
            .field("on_exit", &self.has_exit())
            .field("events", &self.event_names())
            .finish()
    }
}

/// Immutable mapping from state name to its handler set.
///
/// The key set is fixed once the registry is built; it is the only thing a
/// transition target is validated against.
pub struct StateRegistry<C> {
    states: BTreeMap<String, StateHandlers<C>>,
}

impl<C> StateRegistry<C> {
    pub(crate) fn new(states: BTreeMap<String, StateHandlers<C>>) -> Self {
        Self { states }
    }

    pub fn contains(&self, state: &str) -> bool {
        self.states.contains_key(state)
    }

    pub fn get(&self, state: &str) -> Option<&StateHandlers<C>> {
        self.states.get(state)
    }

    /// Registered state names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.states.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl<C> fmt::Debug for StateRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.states.iter()).finish()
    }
}
