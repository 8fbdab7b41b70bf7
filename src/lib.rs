//! Queued FSM: a finite state machine runtime with deferred event queues
//!
//! A machine is declared as a map of named states, each with optional
//! `on_enter`/`on_exit` callbacks and named event handlers. The runtime keeps
//! track of the current state, serializes transitions, and routes events to
//! the handler of the current (or a named) state.
//!
//! # Core Concepts
//!
//! - **Transition**: a scheduled move that runs exit, then entry, then a drain
//!   of the target's queue; transitions never interleave
//! - **Event**: a named, argument-carrying call to one state's handler
//! - **Defer**: a per-visit flag that makes same-state events queue instead of
//!   running immediately
//! - **Drain**: the processing of up to N queued events right after a state is
//!   entered
//! - **Queue depth**: an override limiting how many events one drain runs
//!
//! Handler failures (errors or panics) never escape the machine. They are
//! reported as [`MachineEvent::Exception`] to registered observers and the
//! machine carries on.
//!
//! # Example
//!
//! ```rust
//! use queued_fsm::{MachineBuilder, StateHandlers};
//! use serde_json::json;
//!
//! let mut machine = MachineBuilder::<Vec<String>>::new()
//!     .initial("a")
//!     .state(
//!         "a",
//!         StateHandlers::new().on_exit(|m| {
//!             m.handle_in("b", "greet", vec![json!("Peter")])?;
//!             Ok(())
//!         }),
//!     )
//!     .state(
//!         "b",
//!         StateHandlers::<Vec<String>>::new().on("greet", |m, args| {
//!             m.context_mut().push(format!("hello {}", args[0]));
//!             Ok(())
//!         }),
//!     )
//!     .build()
//!     .unwrap();
//!
//! machine.transition("b", vec![]).unwrap();
//! machine.settle();
//!
//! assert_eq!(machine.current_state(), Some("b"));
//! assert_eq!(machine.context(), &vec![r#"hello "Peter""#.to_string()]);
//! ```

pub mod actor;
pub mod builder;
pub mod checkpoint;
pub mod core;
pub mod runtime;

// Re-export commonly used types
pub use crate::builder::{BuildError, MachineBuilder, MachineOptions};
pub use crate::checkpoint::Snapshot;
pub use crate::core::{EventLog, MachineEvent, Observer, Phase, QueuedEvent, StateHandlers};
pub use crate::runtime::{FsmError, Machine};

#[doc(hidden)]
pub mod __private {
    pub use serde_json::{json, Value};
}
