//! Core data types of the machine.
//!
//! This module holds the pieces that carry no scheduling logic of their own:
//! - Handler sets and the immutable state registry
//! - Per-state queue metadata and queued events
//! - Transition history
//! - Lifecycle notifications and observers
//!
//! The ordering rules that tie them together live in [`crate::runtime`].

mod event;
mod handlers;
mod history;
mod queue;

pub use event::{EventLog, MachineEvent, Observer, Phase};
pub use handlers::{Args, EventHandler, ExitHandler, HandlerResult, StateHandlers, StateRegistry};
pub use history::{TransitionHistory, TransitionRecord};
pub use queue::{QueueMeta, QueuedEvent};
