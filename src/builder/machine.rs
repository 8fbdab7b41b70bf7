//! Builder for constructing machines.

use crate::builder::error::BuildError;
use crate::builder::options::MachineOptions;
use crate::core::{Observer, StateHandlers, StateRegistry};
use crate::runtime::Machine;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builder for constructing machines with a fluent API.
///
/// The context payload replaces ad hoc properties on the machine: whatever an
/// embedding application wants its handlers to reach goes in `C`.
pub struct MachineBuilder<C> {
    initial: Option<String>,
    states: Vec<(String, StateHandlers<C>)>,
    observers: Vec<Arc<dyn Observer>>,
    options: MachineOptions,
    context: C,
}

impl<C: Default> MachineBuilder<C> {
    /// Create a new builder with a default context.
    pub fn new() -> Self {
        Self::with_context(C::default())
    }
}

impl<C> MachineBuilder<C> {
    /// Create a new builder carrying `context`.
    pub fn with_context(context: C) -> Self {
        Self {
            initial: None,
            states: Vec::new(),
            observers: Vec::new(),
            options: MachineOptions::default(),
            context,
        }
    }

    /// Set the initial state (required).
    pub fn initial(mut self, state: impl Into<String>) -> Self {
        self.initial = Some(state.into());
        self
    }

    /// Register a state and its handlers.
    pub fn state(mut self, name: impl Into<String>, handlers: StateHandlers<C>) -> Self {
        self.states.push((name.into(), handlers));
        self
    }

    /// Register several states at once.
    pub fn states<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = (S, StateHandlers<C>)>,
        S: Into<String>,
    {
        self.states
            .extend(states.into_iter().map(|(name, handlers)| (name.into(), handlers)));
        self
    }

    /// Add an observer for lifecycle notifications.
    pub fn observer(mut self, observer: impl Observer + 'static) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    pub fn options(mut self, options: MachineOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the machine.
    ///
    /// The returned machine has its initial entry scheduled but not run; call
    /// [`Machine::settle`] (or hand it to [`crate::actor::spawn`]).
    pub fn build(self) -> Result<Machine<C>, BuildError> {
        let initial = self.initial.ok_or(BuildError::MissingInitialState)?;

        if self.states.is_empty() {
            return Err(BuildError::NoStates);
        }

        let mut states = BTreeMap::new();
        for (name, handlers) in self.states {
            if states.contains_key(&name) {
                return Err(BuildError::DuplicateState(name));
            }
            states.insert(name, handlers);
        }

        Machine::new(
            initial.clone(),
            StateRegistry::new(states),
            self.context,
            self.observers,
            self.options,
        )
        .map_err(|_| BuildError::UnknownInitialState(initial))
    }
}

impl<C: Default> Default for MachineBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}
