//! Runtime errors.

use thiserror::Error;

/// Errors raised by the machine.
///
/// Misuse by the embedding code (`UnknownState`, `MissingArguments`,
/// `InvalidName`, `NoActiveState`, `Stopped`, and `UnknownEvent` under strict
/// dispatch) is returned synchronously from the offending call. The remaining
/// variants describe handler failures and are only ever reported through the
/// exception notification.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FsmError {
    #[error("Target state '{state}' is not registered")]
    UnknownState { state: String },

    #[error("handle requires at least one argument")]
    MissingArguments,

    #[error("Expected a state or event name, found {found}")]
    InvalidName { found: String },

    #[error("No state is active yet; the initial entry step has not run")]
    NoActiveState,

    #[error("State '{state}' has no handler for event '{event}'")]
    UnknownEvent { state: String, event: String },

    #[error("Handler panicked: {message}")]
    HandlerPanicked { message: String },

    #[error("The machine task has stopped")]
    Stopped,
}
