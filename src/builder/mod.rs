//! Builder API for machine construction.
//!
//! This module provides the fluent [`MachineBuilder`], the serde-loadable
//! [`MachineOptions`], and the [`fsm_args!`](crate::fsm_args) macro for
//! assembling handler arguments.

pub mod error;
pub mod machine;
pub mod macros;
pub mod options;

pub use error::BuildError;
pub use machine::MachineBuilder;
pub use options::{MachineOptions, DEFAULT_HISTORY_LIMIT};
