use async_trait::async_trait;
use std::fmt;

/// What a heartbeat delivery produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// The handler finished its work; carries its report.
    Completed(String),
    /// The handler kicked off work that continues in the background.
    AsyncStarted(String),
    /// The handler could not act on the prompt.
    Failed(String),
}

impl HeartbeatOutcome {
    /// The handler's message, regardless of classification.
    pub fn message(&self) -> &str {
        match self {
            Self::Completed(m) | Self::AsyncStarted(m) | Self::Failed(m) => m,
        }
    }

    /// Returns `true` for [`HeartbeatOutcome::Failed`].
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for HeartbeatOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed(m) => write!(f, "Heartbeat completed: {m}"),
            Self::AsyncStarted(m) => write!(f, "Async task started: {m}"),
            Self::Failed(m) => write!(f, "Heartbeat error: {m}"),
        }
    }
}

/// Receives heartbeat prompts.
///
/// Implementations usually forward the prompt to an agent and translate its
/// result into a [`HeartbeatOutcome`].
#[async_trait]
pub trait HeartbeatHandler: Send + Sync {
    /// Handles one heartbeat prompt.
    async fn deliver(&self, prompt: &str) -> HeartbeatOutcome;
}
