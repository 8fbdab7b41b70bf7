//! The transition sequencer and event dispatcher.
//!
//! # Ordering rules
//!
//! - `transition` only appends a step; steps run one at a time, in the order
//!   they were requested, inside [`Machine::settle`]
//! - each step runs exit, then entry (after resetting the target's deferral
//!   and depth), then a drain of the target's queue
//! - the initial entry has no exit and no drain; events queued for the
//!   initial state wait until it is entered again
//! - a drain processes the batch present when it starts; events queued by the
//!   handlers it runs wait for a later entry
//! - `handle_*` never suspends: it either runs the handler right away or
//!   queues the event, before returning
//! - handler errors and panics are reported and never stop a step or a drain
//!
//! Queued events are never expired. A state that is not entered again keeps
//! its queue until [`Machine::purge_queue`] is called.

mod dispatch;
mod error;
mod machine;
mod sequencer;

pub use error::FsmError;
pub use machine::Machine;
