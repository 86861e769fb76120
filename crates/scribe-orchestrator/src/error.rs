// Error types for orchestration

use thiserror::Error;

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Orchestration errors
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The decision policy returned an action outside the known set. This
    /// terminates the run as a control error, distinct from a normal finish.
    #[error("Decision policy returned unknown action '{0}'")]
    ControlError(String),

    /// A capability call failed. Callers inside the engine convert this into
    /// the capability's defined fallback; it only propagates from capability
    /// implementations themselves.
    #[error("Capability error: {0}")]
    Capability(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error
    #[error("Orchestration error: {0}")]
    Other(String),
}
