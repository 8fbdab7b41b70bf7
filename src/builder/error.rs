//! Build errors for the machine builder.

use thiserror::Error;

/// Errors that can occur when building a machine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("Initial state not specified. Call .initial(name) before .build()")]
    MissingInitialState,

    #[error("Initial state '{0}' is not one of the registered states")]
    UnknownInitialState(String),

    #[error("No states defined. Add at least one state")]
    NoStates,

    #[error("State '{0}' is registered more than once")]
    DuplicateState(String),

    #[error("Invalid machine options: {0}")]
    InvalidOptions(String),
}
