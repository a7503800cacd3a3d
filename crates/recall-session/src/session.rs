use chrono::{DateTime, Utc};
use recall_core::Message;
use serde::Serialize;

/// Summary row for one stored session, without its messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    /// Caller-assigned session key, exactly as written.
    pub key: String,
    /// Rolling summary text; empty when never set.
    pub summary: String,
    /// Number of messages currently in the history.
    pub message_count: u64,
    /// When the session row was first written.
    pub created_at: DateTime<Utc>,
    /// Last mutation of the summary or the history.
    pub updated_at: DateTime<Utc>,
}

/// A message together with the position the store assigned to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredMessage {
    /// 1-based position within the session.
    pub seq: u64,
    /// When the row was written.
    pub created_at: DateTime<Utc>,
    /// The message itself.
    pub message: Message,
}

impl From<StoredMessage> for Message {
    fn from(stored: StoredMessage) -> Self {
        stored.message
    }
}
