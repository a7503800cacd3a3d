use crate::context::Interruption;
use recall_core::RecallError;
use std::path::PathBuf;
use thiserror::Error;

/// A convenience `Result` alias using [`StoreError`].
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors produced by the session store and the legacy importer.
///
/// `Open` and `CreateDir` are fatal: the store never came up. Every other
/// variant is scoped to one operation, whose partial effects have already
/// been rolled back when the error is returned.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The storage directory could not be created.
    #[error("failed to create store directory {path}: {source}")]
    CreateDir {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Connecting, tuning, or creating the schema failed.
    #[error("failed to open session store at {path} ({stage}): {source}")]
    Open {
        /// Database file path.
        path: PathBuf,
        /// Which open step failed (`connect`, `journal_mode`, `schema`, ...).
        stage: &'static str,
        /// Underlying SQLite error.
        #[source]
        source: rusqlite::Error,
    },

    /// A statement inside an operation failed.
    #[error("{op} failed for session '{key}': {source}")]
    Operation {
        /// Operation name.
        op: &'static str,
        /// Session key the operation targeted (`*` for store-wide operations).
        key: String,
        /// Underlying SQLite error.
        #[source]
        source: rusqlite::Error,
    },

    /// Tool calls could not be encoded or decoded.
    #[error("{op} failed for session '{key}': tool call encoding: {source}")]
    Codec {
        /// Operation name.
        op: &'static str,
        /// Session key the operation targeted.
        key: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A persisted value could not be interpreted.
    #[error("{op} failed for session '{key}': corrupt row: {detail}")]
    Corrupt {
        /// Operation name.
        op: &'static str,
        /// Session key the operation targeted.
        key: String,
        /// What was wrong with the row.
        detail: String,
    },

    /// A filesystem operation outside the database failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The store has been closed.
    #[error("session store is closed")]
    Closed,

    /// The operation's context was cancelled.
    #[error("{op} cancelled for session '{key}'")]
    Cancelled {
        /// Operation name.
        op: &'static str,
        /// Session key the operation targeted.
        key: String,
    },

    /// The operation's deadline passed before it completed.
    #[error("{op} exceeded its deadline for session '{key}'")]
    DeadlineExceeded {
        /// Operation name.
        op: &'static str,
        /// Session key the operation targeted.
        key: String,
    },

    /// The blocking worker running the operation panicked or was aborted.
    #[error("{op} worker failed: {message}")]
    Task {
        /// Operation name.
        op: &'static str,
        /// Join error description.
        message: String,
    },
}

impl StoreError {
    pub(crate) fn interrupted(op: &'static str, key: &str, reason: Interruption) -> Self {
        match reason {
            Interruption::Cancelled => StoreError::Cancelled {
                op,
                key: key.to_string(),
            },
            Interruption::DeadlineExceeded => StoreError::DeadlineExceeded {
                op,
                key: key.to_string(),
            },
        }
    }

    /// True when the error came from the caller's context rather than storage.
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            StoreError::Cancelled { .. } | StoreError::DeadlineExceeded { .. }
        )
    }

    /// True for errors raised while opening the store.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Open { .. } | StoreError::CreateDir { .. })
    }
}

impl From<StoreError> for RecallError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Io { source, .. } | StoreError::CreateDir { source, .. } => {
                RecallError::Io(source)
            }
            other => RecallError::Session(other.to_string()),
        }
    }
}
