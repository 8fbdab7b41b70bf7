//! Snapshot error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The snapshot could not be written to or read from JSON.
    #[error("snapshot encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported snapshot version {found}, supported: {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// A state named by the snapshot has no queue entry, so the snapshot
    /// was not captured from a machine with that registry.
    #[error("snapshot names state '{state}' but carries no queue for it")]
    MissingQueue { state: String },
}
