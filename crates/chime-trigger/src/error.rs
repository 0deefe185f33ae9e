//! Error types for trigger operations.

use thiserror::Error;

/// Errors that can occur in trigger operations.
#[derive(Debug, Error)]
pub enum TriggerError {
    /// Listener name is already attached to the trigger.
    #[error("listener already attached: {0}")]
    DuplicateListener(String),

    /// Invalid trigger or schedule configuration.
    #[error("invalid trigger configuration: {0}")]
    InvalidConfig(String),

    /// The calendar excluded every candidate fire time within the search bound.
    #[error("no schedulable fire time after skipping {skips} excluded candidates")]
    SchedulingImpossible { skips: u32 },

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
