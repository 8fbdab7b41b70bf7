//! Single-owner Tokio task wrapping a [`Machine`].
//!
//! [`spawn`] moves the machine into a background task. Every mutation goes
//! through that task, so the ordering guarantees of the sequencer hold no
//! matter how many threads hold a [`MachineHandle`]. After each command the
//! task settles the machine, running every step the command scheduled.
//!
//! # Example
//!
//! ```rust
//! use queued_fsm::{actor, MachineBuilder, StateHandlers};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let machine = MachineBuilder::<()>::new()
//!     .initial("idle")
//!     .state("idle", StateHandlers::new())
//!     .state("busy", StateHandlers::new())
//!     .build()
//!     .unwrap();
//!
//! let (handle, task) = actor::spawn(machine);
//! handle.transition("busy", vec![]).unwrap();
//! handle.wait_for_state("busy").await.unwrap();
//!
//! handle.shutdown_graceful();
//! let machine = task.await.unwrap();
//! assert_eq!(machine.prior_state(), Some("idle"));
//! # }
//! ```

use crate::checkpoint::Snapshot;
use crate::core::{Args, QueuedEvent};
use crate::runtime::{FsmError, Machine};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Shutdown mode for the machine task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Apply every command already sent, then stop and return the machine.
    Graceful,
    /// Stop right away, dropping commands that have not been applied.
    Immediate,
}

/// Entries retained for [`MachineHandle::wait_for_state`] callers that fall
/// behind the task.
const ENTRY_BUFFER: usize = 64;

/// Error returned by the machine task.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The background task panicked or was cancelled.
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

enum Command {
    Transition {
        target: String,
        args: Args,
    },
    HandleLocal {
        event: String,
        args: Args,
    },
    HandleIn {
        state: String,
        event: String,
        args: Args,
    },
    TransitionAndHandle {
        target: String,
        event: String,
        args: Args,
    },
    Snapshot(oneshot::Sender<Snapshot>),
    Purge {
        state: String,
        reply: oneshot::Sender<Vec<QueuedEvent>>,
    },
}

/// Cloneable handle for sending commands to a spawned machine.
///
/// Commands are fire-and-forget: they return once queued for the task. Names
/// are checked against the registry before anything is sent, so an unknown
/// state fails at the call site. With `strict_events` on, so does an event
/// the named state has no handler for.
#[derive(Clone, Debug)]
pub struct MachineHandle {
    commands: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<Option<String>>,
    entries: Arc<broadcast::Receiver<String>>,
    shutdown_tx: Arc<watch::Sender<Option<ShutdownMode>>>,
    events: Arc<BTreeMap<String, BTreeSet<String>>>,
    strict_events: bool,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transition { target, .. } => write!(f, "Transition({target})"),
            Self::HandleLocal { event, .. } => write!(f, "HandleLocal({event})"),
            Self::HandleIn { state, event, .. } => write!(f, "HandleIn({state}, {event})"),
            Self::TransitionAndHandle { target, event, .. } => {
                write!(f, "TransitionAndHandle({target}, {event})")
            }
            Self::Snapshot(_) => f.write_str("Snapshot"),
            Self::Purge { state, .. } => write!(f, "Purge({state})"),
        }
    }
}

impl MachineHandle {
    /// Schedule a transition to `target`.
    pub fn transition(&self, target: &str, args: Args) -> Result<(), FsmError> {
        self.ensure_state(target)?;
        self.send(Command::Transition {
            target: target.to_string(),
            args,
        })
    }

    /// Dispatch `event` to whichever state is current when the task applies it.
    ///
    /// The handle can't know which state that will be, so a missing handler
    /// is never caught here; under `strict_events` the task rejects the
    /// command and logs it.
    pub fn handle_local(&self, event: &str, args: Args) -> Result<(), FsmError> {
        self.send(Command::HandleLocal {
            event: event.to_string(),
            args,
        })
    }

    /// Dispatch `event` to `state`.
    pub fn handle_in(&self, state: &str, event: &str, args: Args) -> Result<(), FsmError> {
        self.ensure_event(state, event)?;
        self.send(Command::HandleIn {
            state: state.to_string(),
            event: event.to_string(),
            args,
        })
    }

    /// Schedule a transition to `target` and dispatch `event` to it.
    pub fn transition_and_handle(
        &self,
        target: &str,
        event: &str,
        args: Args,
    ) -> Result<(), FsmError> {
        self.ensure_event(target, event)?;
        self.send(Command::TransitionAndHandle {
            target: target.to_string(),
            event: event.to_string(),
            args,
        })
    }

    /// The last state published by the task.
    pub fn current_state(&self) -> Option<String> {
        self.state_rx.borrow().clone()
    }

    /// Resolves at once if the machine is in `target`, otherwise the next
    /// time it enters `target`.
    ///
    /// Every entry is seen, including states that are entered and left while
    /// the task settles a single command.
    pub async fn wait_for_state(&self, target: &str) -> Result<(), FsmError> {
        let mut entries = self.entries.resubscribe();
        if self.is_in(target) {
            return Ok(());
        }
        loop {
            match entries.recv().await {
                Ok(state) if state == target => return Ok(()),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, state = target, "state waiter fell behind");
                    if self.is_in(target) {
                        return Ok(());
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return Err(FsmError::Stopped),
            }
        }
    }

    /// Capture a snapshot once every earlier command has been applied.
    pub async fn snapshot(&self) -> Result<Snapshot, FsmError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot(reply))?;
        rx.await.map_err(|_| FsmError::Stopped)
    }

    /// Remove and return the events waiting in `state`'s queue.
    pub async fn purge_queue(&self, state: &str) -> Result<Vec<QueuedEvent>, FsmError> {
        self.ensure_state(state)?;
        let (reply, rx) = oneshot::channel();
        self.send(Command::Purge {
            state: state.to_string(),
            reply,
        })?;
        rx.await.map_err(|_| FsmError::Stopped)
    }

    /// Initiates a graceful shutdown. Applies remaining commands before exiting.
    pub fn shutdown_graceful(&self) {
        let _ = self.shutdown_tx.send(Some(ShutdownMode::Graceful));
    }

    /// Initiates an immediate shutdown. Drops unapplied commands.
    pub fn shutdown_immediate(&self) {
        let _ = self.shutdown_tx.send(Some(ShutdownMode::Immediate));
    }

    fn is_in(&self, state: &str) -> bool {
        self.state_rx.borrow().as_deref() == Some(state)
    }

    fn ensure_state(&self, state: &str) -> Result<(), FsmError> {
        if self.events.contains_key(state) {
            Ok(())
        } else {
            Err(FsmError::UnknownState {
                state: state.to_string(),
            })
        }
    }

    fn ensure_event(&self, state: &str, event: &str) -> Result<(), FsmError> {
        self.ensure_state(state)?;
        let handled = self
            .events
            .get(state)
            .is_some_and(|events| events.contains(event));
        if self.strict_events && !handled {
            return Err(FsmError::UnknownEvent {
                state: state.to_string(),
                event: event.to_string(),
            });
        }
        Ok(())
    }

    fn send(&self, command: Command) -> Result<(), FsmError> {
        self.commands.send(command).map_err(|_| FsmError::Stopped)
    }
}

/// The spawned machine task. Resolves to the machine once it stops.
#[derive(Debug)]
pub struct MachineTask<C> {
    handle: JoinHandle<Machine<C>>,
}

impl<C> Future for MachineTask<C> {
    type Output = Result<Machine<C>, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.handle).poll(cx) {
            Poll::Ready(Ok(machine)) => Poll::Ready(Ok(machine)),
            Poll::Ready(Err(e)) => Poll::Ready(Err(TaskError::Join(e))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Move `machine` into a Tokio task.
///
/// The task settles the machine first, so the initial entry runs before any
/// command. It stops on shutdown or once every handle has been dropped.
pub fn spawn<C>(machine: Machine<C>) -> (MachineHandle, MachineTask<C>)
where
    C: Send + 'static,
{
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(machine.current_state().map(str::to_string));
    let (entry_tx, entry_rx) = broadcast::channel(ENTRY_BUFFER);
    let (shutdown_tx, shutdown_rx) = watch::channel(None);
    let registry = machine.registry();
    let events: BTreeMap<String, BTreeSet<String>> = registry
        .names()
        .map(|name| {
            let handled = registry
                .get(name)
                .map(|handlers| {
                    handlers
                        .event_names()
                        .into_iter()
                        .map(str::to_string)
                        .collect::<BTreeSet<_>>()
                })
                .unwrap_or_default();
            (name.to_string(), handled)
        })
        .collect();
    let strict_events = machine.options().strict_events;

    let publisher = Publisher {
        state: state_tx,
        entries: entry_tx,
    };
    let handle = tokio::spawn(run(machine, command_rx, shutdown_rx, publisher));

    (
        MachineHandle {
            commands: command_tx,
            state_rx,
            entries: Arc::new(entry_rx),
            shutdown_tx: Arc::new(shutdown_tx),
            events: Arc::new(events),
            strict_events,
        },
        MachineTask { handle },
    )
}

async fn run<C>(
    mut machine: Machine<C>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut shutdown: watch::Receiver<Option<ShutdownMode>>,
    publisher: Publisher,
) -> Machine<C> {
    settle(&mut machine, &publisher);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                let mode = if changed.is_ok() { *shutdown.borrow() } else { None };
                match mode {
                    Some(ShutdownMode::Immediate) => break,
                    Some(ShutdownMode::Graceful) => {
                        while let Ok(command) = commands.try_recv() {
                            apply(&mut machine, command);
                            settle(&mut machine, &publisher);
                        }
                        break;
                    }
                    // Every handle is gone; keep serving until the command
                    // channel reports the same.
                    None if changed.is_err() => {
                        while let Some(command) = commands.recv().await {
                            apply(&mut machine, command);
                            settle(&mut machine, &publisher);
                        }
                        break;
                    }
                    None => {}
                }
            }
            command = commands.recv() => {
                let Some(command) = command else { break };
                apply(&mut machine, command);
                settle(&mut machine, &publisher);
            }
        }
    }

    tracing::debug!(machine = %machine.id(), "machine task stopped");
    machine
}

fn apply<C>(machine: &mut Machine<C>, command: Command) {
    let result = match command {
        Command::Transition { target, args } => machine.transition(&target, args),
        Command::HandleLocal { event, args } => machine.handle_local(&event, args),
        Command::HandleIn { state, event, args } => machine.handle_in(&state, &event, args),
        Command::TransitionAndHandle {
            target,
            event,
            args,
        } => machine.transition_and_handle(&target, &event, args),
        Command::Snapshot(reply) => {
            let _ = reply.send(machine.snapshot());
            Ok(())
        }
        Command::Purge { state, reply } => machine.purge_queue(&state).map(|purged| {
            let _ = reply.send(purged);
        }),
    };

    if let Err(error) = result {
        tracing::warn!(machine = %machine.id(), error = %error, "command rejected");
    }
}

/// Task-side ends of the state channels. Dropped with the task, which is
/// what tells waiters the machine has stopped.
struct Publisher {
    state: watch::Sender<Option<String>>,
    entries: broadcast::Sender<String>,
}

impl Publisher {
    fn publish(&self, current: Option<&str>) {
        let current = current.map(str::to_string);
        self.state.send_if_modified(|published| {
            if *published == current {
                false
            } else {
                published.clone_from(&current);
                true
            }
        });
        if let Some(state) = current {
            // No receivers is fine; nobody is waiting.
            let _ = self.entries.send(state);
        }
    }
}

fn settle<C>(machine: &mut Machine<C>, publisher: &Publisher) {
    machine.settle_with(|machine| publisher.publish(machine.current_state()));
}
