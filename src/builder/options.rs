//! Tunable machine behaviour.

use crate::builder::error::BuildError;
use serde::{Deserialize, Serialize};

/// Default number of transition records a machine keeps.
pub const DEFAULT_HISTORY_LIMIT: usize = 256;

/// Options applied when a machine is built.
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```rust
/// use queued_fsm::MachineOptions;
///
/// let options = MachineOptions::from_json(r#"{ "strict_events": true }"#).unwrap();
/// assert!(options.strict_events);
/// assert_eq!(options.history_limit, Some(256));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineOptions {
    /// How many transition records to retain; `None` keeps all of them
    pub history_limit: Option<usize>,

    /// Reject dispatches naming an event the target state has no handler for,
    /// instead of reporting them when they run
    pub strict_events: bool,
}

impl Default for MachineOptions {
    fn default() -> Self {
        Self {
            history_limit: Some(DEFAULT_HISTORY_LIMIT),
            strict_events: false,
        }
    }
}

impl MachineOptions {
    pub fn from_json(json: &str) -> Result<Self, BuildError> {
        serde_json::from_str(json).map_err(|e| BuildError::InvalidOptions(e.to_string()))
    }
}
