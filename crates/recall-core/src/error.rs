use thiserror::Error;

/// A convenience `Result` alias using [`RecallError`].
pub type RecallResult<T> = Result<T, RecallError>;

/// Top-level error type for the recall workspace.
///
/// Each variant corresponds to a subsystem that can produce errors. Crates
/// with richer error types (such as the session store) convert into this one
/// at their public boundary.
#[derive(Error, Debug)]
pub enum RecallError {
    /// An error related to session persistence, lookup, or migration.
    #[error("Session error: {0}")]
    Session(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error raised by the heartbeat service.
    #[error("Heartbeat error: {0}")]
    Heartbeat(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
