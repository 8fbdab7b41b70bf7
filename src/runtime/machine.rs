//! The machine record and its transition sequencer.

use crate::builder::MachineOptions;
use crate::core::{
    Args, HandlerResult, MachineEvent, Observer, Phase, QueueMeta, StateRegistry,
    TransitionHistory,
};
use crate::runtime::error::FsmError;
use crate::runtime::sequencer::{Sequencer, Step};
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use uuid::Uuid;

/// A running finite state machine.
///
/// `C` is the user payload available to every handler through
/// [`Machine::context`] and [`Machine::context_mut`].
///
/// Transitions are never run by the call that requests them. They are
/// appended to a strictly ordered pipeline which [`Machine::settle`] works
/// through; the initial entry is the first step in that pipeline, so a freshly
/// built machine has no current state until it is settled.
///
/// # Example
///
/// ```rust
/// use queued_fsm::{MachineBuilder, StateHandlers};
///
/// let mut machine = MachineBuilder::<Vec<String>>::new()
///     .initial("a")
///     .state("a", StateHandlers::<Vec<String>>::new().on_enter(|m, _| {
///         m.context_mut().push("enter a".into());
///         m.transition("b", vec![])?;
///         Ok(())
///     }))
///     .state("b", StateHandlers::new())
///     .build()
///     .unwrap();
///
/// assert_eq!(machine.current_state(), None);
/// machine.settle();
/// assert_eq!(machine.current_state(), Some("b"));
/// assert_eq!(machine.prior_state(), Some("a"));
/// ```
pub struct Machine<C = ()> {
    id: Uuid,
    initial_state: String,
    current_state: Option<String>,
    prior_state: Option<String>,
    prior_event: Option<String>,
    registry: Arc<StateRegistry<C>>,
    pub(crate) queues: BTreeMap<String, QueueMeta>,
    sequencer: Sequencer,
    history: TransitionHistory,
    observers: Vec<Arc<dyn Observer>>,
    options: MachineOptions,
    handler_depth: usize,
    context: C,
}

impl<C> Machine<C> {
    pub(crate) fn new(
        initial_state: String,
        registry: StateRegistry<C>,
        context: C,
        observers: Vec<Arc<dyn Observer>>,
        options: MachineOptions,
    ) -> Result<Self, FsmError> {
        if !registry.contains(&initial_state) {
            return Err(FsmError::UnknownState {
                state: initial_state,
            });
        }

        let queues = registry
            .names()
            .map(|name| (name.to_string(), QueueMeta::new()))
            .collect();
        let history = match options.history_limit {
            Some(limit) => TransitionHistory::bounded(limit),
            None => TransitionHistory::new(),
        };
        let id = Uuid::new_v4();
        tracing::debug!(
            machine = %id,
            initial = %initial_state,
            states = registry.len(),
            "machine created"
        );

        Ok(Self {
            id,
            initial_state,
            current_state: None,
            prior_state: None,
            prior_event: None,
            registry: Arc::new(registry),
            queues,
            sequencer: Sequencer::seeded(),
            history,
            observers,
            options,
            handler_depth: 0,
            context,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn initial_state(&self) -> &str {
        &self.initial_state
    }

    /// The active state, or `None` before the initial entry step has run.
    pub fn current_state(&self) -> Option<&str> {
        self.current_state.as_deref()
    }

    /// The state that was active before the most recent transition.
    pub fn prior_state(&self) -> Option<&str> {
        self.prior_state.as_deref()
    }

    /// The most recently executed event.
    pub fn prior_event(&self) -> Option<&str> {
        self.prior_event.as_deref()
    }

    pub fn registry(&self) -> &StateRegistry<C> {
        &self.registry
    }

    pub fn history(&self) -> &TransitionHistory {
        &self.history
    }

    pub fn options(&self) -> &MachineOptions {
        &self.options
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    /// Consume the machine, returning its payload.
    pub fn into_context(self) -> C {
        self.context
    }

    /// Register another observer. It sees every event emitted from now on.
    pub fn subscribe(&mut self, observer: impl Observer + 'static) {
        self.observers.push(Arc::new(observer));
    }

    /// Number of steps waiting in the sequencer.
    pub fn pending_steps(&self) -> usize {
        self.sequencer.len()
    }

    /// True when no steps are waiting.
    pub fn is_settled(&self) -> bool {
        self.sequencer.len() == 0
    }

    /// Schedule a move to `target`.
    ///
    /// Fails immediately if `target` is not registered; otherwise the step is
    /// appended to the sequencer and this returns without running it. `args`
    /// are handed to the target's `on_enter`.
    pub fn transition(&mut self, target: &str, args: Args) -> Result<(), FsmError> {
        self.ensure_state(target)?;
        tracing::debug!(
            machine = %self.id,
            to = target,
            pending = self.sequencer.len(),
            "transition scheduled"
        );
        self.sequencer.push(Step::Transition {
            target: target.to_string(),
            args,
        });
        Ok(())
    }

    /// Run pending steps, in order, until the sequencer is empty.
    ///
    /// Steps scheduled while this runs are appended and run by the same call.
    /// Returns the number of steps executed. Calling this from inside a handler
    /// or from inside another `settle` does nothing and returns 0; the outer
    /// loop picks the new steps up.
    pub fn settle(&mut self) -> usize {
        self.settle_with(|_| {})
    }

    /// Like [`Machine::settle`], calling `after_step` once every step has
    /// finished, drain included.
    pub(crate) fn settle_with<F>(&mut self, mut after_step: F) -> usize
    where
        F: FnMut(&Self),
    {
        if self.handler_depth > 0 || !self.sequencer.begin() {
            return 0;
        }

        let mut executed = 0;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            while let Some(step) = self.sequencer.next() {
                self.run_step(step);
                executed += 1;
                after_step(&*self);
            }
        }));
        self.sequencer.finish();
        if let Err(payload) = outcome {
            panic::resume_unwind(payload);
        }
        executed
    }

    fn run_step(&mut self, step: Step) {
        match step {
            // The initial entry never drains: events queued for the initial
            // state wait for its first re-entry.
            Step::Initialize => {
                let target = self.initial_state.clone();
                self.current_state = Some(target.clone());
                self.enter(&target, &[]);
            }
            Step::Transition { target, args } => {
                if let Some(current) = self.current_state.clone() {
                    self.exit(&current);
                }
                self.prior_state = self.current_state.replace(target.clone());
                self.enter(&target, &args);
                self.drain(&target);
            }
        }
    }

    fn exit(&mut self, state: &str) {
        let Some(on_exit) = self.registry.get(state).and_then(|h| h.exit_handler()) else {
            return;
        };
        self.emit(MachineEvent::BeforeExit {
            state: state.to_string(),
        });
        if let Err(error) = self.invoke(|machine| on_exit(machine)) {
            self.report(state, Phase::Exit, &error);
        }
    }

    fn enter(&mut self, state: &str, args: &[Value]) {
        if let Some(meta) = self.queues.get_mut(state) {
            meta.reset();
        }

        if let Some(on_enter) = self.registry.get(state).and_then(|h| h.enter_handler()) {
            self.emit(MachineEvent::BeforeEnter {
                state: state.to_string(),
            });
            if let Err(error) = self.invoke(|machine| on_enter(machine, args)) {
                self.report(state, Phase::Enter, &error);
            }
        }

        self.history.record(self.prior_state.clone(), state);
        self.emit(MachineEvent::AfterTransition {
            from: self.prior_state.clone(),
            to: state.to_string(),
        });
    }

    /// Run the batch of queued events the state's depth allows.
    ///
    /// The batch is taken up front; anything enqueued by the handlers below
    /// waits for a later entry.
    fn drain(&mut self, state: &str) {
        let batch = match self.queues.get_mut(state) {
            Some(meta) => meta.take_batch(),
            None => return,
        };
        if batch.is_empty() {
            return;
        }
        tracing::debug!(machine = %self.id, state, events = batch.len(), "draining queue");

        for queued in batch {
            self.emit(MachineEvent::BeforeHandle {
                state: state.to_string(),
                event: queued.event.clone(),
                queued: true,
            });
            if let Err(error) = self.call_event(state, &queued.event, &queued.args) {
                self.report(state, Phase::Event(queued.event.clone()), &error);
            }
            self.prior_event = Some(queued.event);
        }
    }

    /// Look up and run `event` on `state`, catching panics.
    pub(crate) fn call_event(&mut self, state: &str, event: &str, args: &[Value]) -> HandlerResult {
        let handler = self
            .registry
            .get(state)
            .and_then(|h| h.event_handler(event))
            .ok_or_else(|| FsmError::UnknownEvent {
                state: state.to_string(),
                event: event.to_string(),
            })?;
        self.invoke(|machine| handler(machine, args))
    }

    fn invoke<F>(&mut self, call: F) -> HandlerResult
    where
        F: FnOnce(&mut Self) -> HandlerResult,
    {
        self.handler_depth += 1;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| call(&mut *self)));
        self.handler_depth -= 1;

        outcome.unwrap_or_else(|payload| {
            Err(FsmError::HandlerPanicked {
                message: panic_message(payload.as_ref()),
            }
            .into())
        })
    }

    pub(crate) fn ensure_state(&self, state: &str) -> Result<(), FsmError> {
        if self.registry.contains(state) {
            Ok(())
        } else {
            tracing::debug!(machine = %self.id, state, "rejected unknown state");
            Err(FsmError::UnknownState {
                state: state.to_string(),
            })
        }
    }

    pub(crate) fn report(&self, state: &str, phase: Phase, error: &anyhow::Error) {
        tracing::warn!(machine = %self.id, state, phase = %phase, error = %error, "handler failed");
        self.emit(MachineEvent::Exception {
            state: state.to_string(),
            phase,
            error: format!("{error:#}"),
        });
    }

    pub(crate) fn emit(&self, event: MachineEvent) {
        match &event {
            MachineEvent::BeforeEnter { state } => {
                tracing::debug!(machine = %self.id, state = %state, "entering state")
            }
            MachineEvent::BeforeExit { state } => {
                tracing::debug!(machine = %self.id, state = %state, "leaving state")
            }
            MachineEvent::BeforeHandle {
                state,
                event,
                queued,
            } => {
                tracing::trace!(
                    machine = %self.id,
                    state = %state,
                    event = %event,
                    queued,
                    "handling event"
                )
            }
            MachineEvent::AfterTransition { from, to } => {
                tracing::debug!(machine = %self.id, from = ?from, to = %to, "transition complete")
            }
            MachineEvent::AfterDefer { state } => {
                tracing::trace!(machine = %self.id, state = %state, "deferring events")
            }
            MachineEvent::AfterDepth { state, depth } => {
                tracing::trace!(machine = %self.id, state = %state, depth, "queue depth set")
            }
            MachineEvent::Exception { .. } => {}
        }

        for observer in &self.observers {
            let notified = panic::catch_unwind(AssertUnwindSafe(|| observer.notify(&event)));
            if let Err(payload) = notified {
                tracing::error!(
                    machine = %self.id,
                    panic = %panic_message(payload.as_ref()),
                    "observer panicked"
                );
            }
        }
    }

    pub(crate) fn set_prior_event(&mut self, event: &str) {
        self.prior_event = Some(event.to_string());
    }

    /// The active state, or `NoActiveState` before the initial entry.
    pub(crate) fn active_state(&self) -> Result<String, FsmError> {
        self.current_state.clone().ok_or(FsmError::NoActiveState)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl<C: fmt::Debug> fmt::Debug for Machine<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("id", &self.id)
            .field("initial_state", &self.initial_state)
            .field("current_state", &self.current_state)
            .field("prior_state", &self.prior_state)
            .field("prior_event", &self.prior_event)
            .field("queues", &self.queues)
            .field("pending_steps", &self.sequencer.len())
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::MachineBuilder;
    use crate::core::{EventLog, MachineEvent, Phase, StateHandlers};
    use crate::runtime::{FsmError, Machine};

    type Trace = Vec<String>;

    fn log(machine: &mut Machine<Trace>, line: impl Into<String>) {
        machine.context_mut().push(line.into());
    }

    #[test]
    fn initial_entry_runs_on_settle() {
        let mut machine = MachineBuilder::<Trace>::new()
            .initial("a")
            .state(
                "a",
                StateHandlers::new().on_enter(|m, _| {
                    log(m, "enter a");
                    Ok(())
                }),
            )
            .build()
            .unwrap();

        assert_eq!(machine.current_state(), None);
        assert_eq!(machine.pending_steps(), 1);
        assert!(machine.context().is_empty());

        assert_eq!(machine.settle(), 1);
        assert_eq!(machine.current_state(), Some("a"));
        assert_eq!(machine.prior_state(), None);
        assert_eq!(machine.context(), &vec!["enter a".to_string()]);
        assert!(machine.is_settled());
    }

    #[test]
    fn transition_is_not_run_by_the_caller() {
        let mut machine = MachineBuilder::<Trace>::new()
            .initial("a")
            .state("a", StateHandlers::new())
            .state(
                "b",
                StateHandlers::new().on_enter(|m, _| {
                    log(m, "enter b");
                    Ok(())
                }),
            )
            .build()
            .unwrap();
        machine.settle();

        machine.transition("b", vec![]).unwrap();
        assert_eq!(machine.current_state(), Some("a"));
        assert!(machine.context().is_empty());

        machine.settle();
        assert_eq!(machine.current_state(), Some("b"));
        assert_eq!(machine.prior_state(), Some("a"));
    }

    #[test]
    fn unknown_target_fails_before_scheduling() {
        let mut machine = MachineBuilder::<()>::new()
            .initial("a")
            .state("a", StateHandlers::new())
            .build()
            .unwrap();

        let result = machine.transition("nowhere", vec![]);
        assert_eq!(
            result,
            Err(FsmError::UnknownState {
                state: "nowhere".to_string()
            })
        );
        assert_eq!(machine.pending_steps(), 1);
    }

    #[test]
    fn enter_receives_transition_args() {
        let mut machine = MachineBuilder::<Trace>::new()
            .initial("a")
            .state("a", StateHandlers::new())
            .state(
                "b",
                StateHandlers::new().on_enter(|m, args| {
                    log(m, format!("enter b {}", args[0]));
                    Ok(())
                }),
            )
            .build()
            .unwrap();

        machine
            .transition("b", vec![serde_json::json!(7)])
            .unwrap();
        machine.settle();
        assert_eq!(machine.context(), &vec!["enter b 7".to_string()]);
    }

    #[test]
    fn nested_transitions_run_after_the_outer_step() {
        let mut machine = MachineBuilder::<Trace>::new()
            .initial("a")
            .state(
                "a",
                StateHandlers::new()
                    .on_enter(|m, _| {
                        m.transition("b", vec![])?;
                        log(m, "a entered");
                        Ok(())
                    })
                    .on_exit(|m| {
                        log(m, "a exited");
                        Ok(())
                    }),
            )
            .state(
                "b",
                StateHandlers::new().on_enter(|m, _| {
                    log(m, "b entered");
                    Ok(())
                }),
            )
            .build()
            .unwrap();

        assert_eq!(machine.settle(), 2);
        assert_eq!(
            machine.context(),
            &vec![
                "a entered".to_string(),
                "a exited".to_string(),
                "b entered".to_string()
            ]
        );
    }

    #[test]
    fn settle_inside_a_handler_is_a_no_op() {
        let mut machine = MachineBuilder::<Vec<usize>>::new()
            .initial("a")
            .state(
                "a",
                StateHandlers::<Vec<usize>>::new().on_enter(|m, _| {
                    m.transition("b", vec![])?;
                    let ran = m.settle();
                    m.context_mut().push(ran);
                    Ok(())
                }),
            )
            .state("b", StateHandlers::new())
            .build()
            .unwrap();

        assert_eq!(machine.settle(), 2);
        assert_eq!(machine.context(), &vec![0]);
    }

    #[test]
    fn failing_exit_does_not_block_enter() {
        let log_events = EventLog::new();
        let mut machine = MachineBuilder::<Trace>::new()
            .initial("a")
            .observer(log_events.clone())
            .state(
                "a",
                StateHandlers::new().on_exit(|_| anyhow::bail!("exit failed")),
            )
            .state(
                "b",
                StateHandlers::new().on_enter(|m, _| {
                    log(m, "enter b");
                    Ok(())
                }),
            )
            .build()
            .unwrap();

        machine.transition("b", vec![]).unwrap();
        machine.settle();

        assert_eq!(machine.current_state(), Some("b"));
        assert_eq!(machine.prior_state(), Some("a"));
        assert_eq!(machine.context(), &vec!["enter b".to_string()]);
        assert_eq!(
            log_events.exceptions(),
            vec![MachineEvent::Exception {
                state: "a".to_string(),
                phase: Phase::Exit,
                error: "exit failed".to_string(),
            }]
        );
    }

    #[test]
    fn panicking_enter_is_reported() {
        let log_events = EventLog::new();
        let mut machine = MachineBuilder::<()>::new()
            .initial("a")
            .observer(log_events.clone())
            .state(
                "a",
                StateHandlers::new().on_enter(|_, _| panic!("enter blew up")),
            )
            .build()
            .unwrap();

        machine.settle();

        assert_eq!(machine.current_state(), Some("a"));
        let exceptions = log_events.exceptions();
        assert_eq!(exceptions.len(), 1);
        match &exceptions[0] {
            MachineEvent::Exception { state, phase, error } => {
                assert_eq!(state, "a");
                assert_eq!(phase, &Phase::Enter);
                assert!(error.contains("enter blew up"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn lifecycle_events_are_emitted_in_order() {
        let log_events = EventLog::new();
        let mut machine = MachineBuilder::<()>::new()
            .initial("a")
            .observer(log_events.clone())
            .state(
                "a",
                StateHandlers::new()
                    .on_enter(|_, _| Ok(()))
                    .on_exit(|_| Ok(())),
            )
            .state("b", StateHandlers::new())
            .build()
            .unwrap();

        machine.transition("b", vec![]).unwrap();
        machine.settle();

        assert_eq!(
            log_events.events(),
            vec![
                MachineEvent::BeforeEnter {
                    state: "a".to_string()
                },
                MachineEvent::AfterTransition {
                    from: None,
                    to: "a".to_string()
                },
                MachineEvent::BeforeExit {
                    state: "a".to_string()
                },
                MachineEvent::AfterTransition {
                    from: Some("a".to_string()),
                    to: "b".to_string()
                },
            ]
        );
    }

    #[test]
    fn history_tracks_every_entry() {
        let mut machine = MachineBuilder::<()>::new()
            .initial("a")
            .state("a", StateHandlers::new())
            .state("b", StateHandlers::new())
            .build()
            .unwrap();

        machine.transition("b", vec![]).unwrap();
        machine.transition("a", vec![]).unwrap();
        machine.settle();

        assert_eq!(machine.history().path(), vec!["a", "b", "a"]);
    }

    #[test]
    fn self_transition_reenters() {
        let mut machine = MachineBuilder::<Trace>::new()
            .initial("a")
            .state(
                "a",
                StateHandlers::new()
                    .on_enter(|m, _| {
                        log(m, "enter");
                        Ok(())
                    })
                    .on_exit(|m| {
                        log(m, "exit");
                        Ok(())
                    }),
            )
            .build()
            .unwrap();

        machine.transition("a", vec![]).unwrap();
        machine.settle();

        assert_eq!(machine.context(), &vec!["enter", "exit", "enter"]);
        assert_eq!(machine.prior_state(), Some("a"));
    }

    #[test]
    fn initial_entry_leaves_its_queue_alone() {
        let mut machine = MachineBuilder::<Trace>::new()
            .initial("a")
            .state(
                "a",
                StateHandlers::new()
                    .on_enter(|m, _| {
                        log(m, "enter a");
                        m.defer_events()?;
                        m.handle_in("a", "test", vec![serde_json::json!(22)])?;
                        Ok(())
                    })
                    .on("test", |m, args| {
                        log(m, format!("a.test({})", args[0]));
                        Ok(())
                    }),
            )
            .build()
            .unwrap();

        machine.settle();

        assert_eq!(machine.context(), &vec!["enter a".to_string()]);
        assert_eq!(machine.pending_events("a").unwrap().len(), 1);
        assert_eq!(machine.prior_event(), None);
    }

    #[test]
    fn events_queued_before_the_first_settle_wait_for_reentry() {
        let mut machine = MachineBuilder::<Trace>::new()
            .initial("a")
            .state(
                "a",
                StateHandlers::new().on("test", |m, args| {
                    log(m, format!("a.test({})", args[0]));
                    Ok(())
                }),
            )
            .state("b", StateHandlers::new())
            .build()
            .unwrap();

        machine
            .handle_in("a", "test", vec![serde_json::json!(1)])
            .unwrap();
        machine.settle();
        assert!(machine.context().is_empty());
        assert_eq!(machine.pending_events("a").unwrap().len(), 1);

        machine.transition("b", vec![]).unwrap();
        machine.transition("a", vec![]).unwrap();
        machine.settle();
        assert_eq!(machine.context(), &vec!["a.test(1)".to_string()]);
        assert!(machine.pending_events("a").unwrap().is_empty());
    }

    #[test]
    fn panicking_observer_does_not_stall_the_sequencer() {
        let log_events = EventLog::new();
        let mut machine = MachineBuilder::<()>::new()
            .initial("a")
            .observer(|event: &MachineEvent| {
                if matches!(event, MachineEvent::AfterTransition { .. }) {
                    panic!("observer blew up");
                }
            })
            .observer(log_events.clone())
            .state("a", StateHandlers::new())
            .state("b", StateHandlers::new())
            .build()
            .unwrap();

        assert_eq!(machine.settle(), 1);
        assert_eq!(machine.current_state(), Some("a"));

        machine.transition("b", vec![]).unwrap();
        assert_eq!(machine.settle(), 1);
        assert_eq!(machine.current_state(), Some("b"));
        assert!(machine.is_settled());
        assert_eq!(log_events.len(), 2);
    }

    #[test]
    fn settle_with_reports_every_step() {
        let mut machine = MachineBuilder::<()>::new()
            .initial("a")
            .state(
                "a",
                StateHandlers::new().on_enter(|m, _| {
                    m.transition("b", vec![])?;
                    Ok(())
                }),
            )
            .state(
                "b",
                StateHandlers::new().on_enter(|m, _| {
                    m.transition("c", vec![])?;
                    Ok(())
                }),
            )
            .state("c", StateHandlers::new())
            .build()
            .unwrap();

        let mut seen = Vec::new();
        let ran = machine.settle_with(|m| seen.extend(m.current_state().map(str::to_string)));

        assert_eq!(ran, 3);
        assert_eq!(seen, vec!["a", "b", "c"]);
    }
}
