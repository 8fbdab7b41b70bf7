//! Event routing, deferral and queue diagnostics.

use crate::core::{Args, MachineEvent, Phase, QueuedEvent};
use crate::runtime::error::FsmError;
use crate::runtime::machine::Machine;
use serde_json::Value;

impl<C> Machine<C> {
    /// Dispatch `event` to the current state.
    ///
    /// Runs the handler right away unless the current state is deferring, in
    /// which case the event joins that state's queue. Handler failures are
    /// reported, not returned; `prior_event` only moves on success.
    pub fn handle_local(&mut self, event: &str, args: Args) -> Result<(), FsmError> {
        let state = self.active_state()?;
        self.route(state, event, args)
    }

    /// Dispatch `event` to the named `state`.
    ///
    /// When `state` is not the current state the event is always queued, to
    /// run the next time `state` is entered.
    pub fn handle_in(&mut self, state: &str, event: &str, args: Args) -> Result<(), FsmError> {
        self.ensure_state(state)?;
        self.route(state.to_string(), event, args)
    }

    /// Positional dispatch.
    ///
    /// - `[event]` dispatches to the current state
    /// - `[event, arg]` dispatches to the current state with `arg` as the sole
    ///   argument
    /// - `[state, event, args...]` dispatches to `state`
    ///
    /// Names must be JSON strings. Prefer [`Machine::handle_local`] and
    /// [`Machine::handle_in`]; the two-item form cannot name a state.
    pub fn handle(&mut self, argv: Vec<Value>) -> Result<(), FsmError> {
        let mut argv = argv.into_iter();
        let first = name_of(argv.next().ok_or(FsmError::MissingArguments)?)?;
        let mut rest: Vec<Value> = argv.collect();

        if rest.len() < 2 {
            return self.handle_local(&first, rest);
        }
        let event = name_of(rest.remove(0))?;
        self.handle_in(&first, &event, rest)
    }

    /// Schedule a transition to `target`, then dispatch `event` to it.
    ///
    /// Unless `target` is already current, the event is queued and runs in the
    /// drain that follows `target`'s entry.
    pub fn transition_and_handle(
        &mut self,
        target: &str,
        event: &str,
        args: Args,
    ) -> Result<(), FsmError> {
        self.transition(target, Vec::new())?;
        self.handle_in(target, event, args)
    }

    /// Queue further same-state events until the current state is re-entered.
    pub fn defer_events(&mut self) -> Result<(), FsmError> {
        let state = self.active_state()?;
        if let Some(meta) = self.queues.get_mut(&state) {
            meta.defer();
        }
        self.emit(MachineEvent::AfterDefer { state });
        Ok(())
    }

    /// Limit how many queued events the next drain of the current state runs.
    ///
    /// Zero means no limit. The override is cleared when the state is entered,
    /// so it only affects a drain if set during that entry's `on_enter`.
    pub fn set_queue_depth(&mut self, depth: usize) -> Result<(), FsmError> {
        let state = self.active_state()?;
        if let Some(meta) = self.queues.get_mut(&state) {
            meta.set_depth(depth);
        }
        self.emit(MachineEvent::AfterDepth { state, depth });
        Ok(())
    }

    /// Whether `state` is currently deferring same-state events.
    pub fn is_deferring(&self, state: &str) -> Result<bool, FsmError> {
        self.queue_meta(state).map(|meta| meta.is_deferring())
    }

    /// The depth override in force for `state`, if any.
    pub fn queue_depth(&self, state: &str) -> Result<Option<usize>, FsmError> {
        self.queue_meta(state).map(|meta| meta.depth())
    }

    /// Copy of the events waiting in `state`'s queue, front first.
    pub fn pending_events(&self, state: &str) -> Result<Vec<QueuedEvent>, FsmError> {
        self.queue_meta(state)
            .map(|meta| meta.pending().cloned().collect())
    }

    /// Remove and return everything waiting in `state`'s queue.
    ///
    /// Queues are never expired on their own; this is the way to reclaim the
    /// events of a state that will not be entered again.
    pub fn purge_queue(&mut self, state: &str) -> Result<Vec<QueuedEvent>, FsmError> {
        self.ensure_state(state)?;
        let purged = self
            .queues
            .get_mut(state)
            .map(|meta| meta.purge())
            .unwrap_or_default();
        if !purged.is_empty() {
            tracing::debug!(machine = %self.id(), state, events = purged.len(), "queue purged");
        }
        Ok(purged)
    }

    fn queue_meta(&self, state: &str) -> Result<&crate::core::QueueMeta, FsmError> {
        self.queues.get(state).ok_or_else(|| FsmError::UnknownState {
            state: state.to_string(),
        })
    }

    fn route(&mut self, state: String, event: &str, args: Args) -> Result<(), FsmError> {
        if self.options().strict_events && !self.has_handler(&state, event) {
            return Err(FsmError::UnknownEvent {
                state,
                event: event.to_string(),
            });
        }

        let is_current = self.current_state() == Some(state.as_str());
        let deferring = self.is_deferring(&state)?;
        if is_current && !deferring {
            self.dispatch_now(&state, event, &args);
            return Ok(());
        }

        tracing::trace!(machine = %self.id(), state = %state, event, "event queued");
        if let Some(meta) = self.queues.get_mut(&state) {
            meta.push(QueuedEvent::new(event, args));
        }
        Ok(())
    }

    fn dispatch_now(&mut self, state: &str, event: &str, args: &[Value]) {
        self.emit(MachineEvent::BeforeHandle {
            state: state.to_string(),
            event: event.to_string(),
            queued: false,
        });
        match self.call_event(state, event, args) {
            Ok(()) => self.set_prior_event(event),
            Err(error) => self.report(state, Phase::Event(event.to_string()), &error),
        }
    }

    fn has_handler(&self, state: &str, event: &str) -> bool {
        self.registry()
            .get(state)
            .is_some_and(|handlers| handlers.handles(event))
    }
}

fn name_of(value: Value) -> Result<String, FsmError> {
    match value {
        Value::String(name) => Ok(name),
        other => Err(FsmError::InvalidName {
            found: other.to_string(),
        }),
    }
}
