//! Encoding of the nullable `tool_calls_json` column.

use recall_core::ToolCall;

/// The `tool_calls_json` column: NULL when a message carries no tool calls,
/// otherwise the JSON array of calls in model order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ToolCallsColumn {
    Absent,
    Present(String),
}

impl ToolCallsColumn {
    /// Serializes `calls`; an empty slice is stored as NULL.
    pub(crate) fn encode(calls: &[ToolCall]) -> Result<Self, serde_json::Error> {
        if calls.is_empty() {
            return Ok(Self::Absent);
        }
        serde_json::to_string(calls).map(Self::Present)
    }

    /// Wraps a raw column value. Empty text counts as absent.
    pub(crate) fn from_column(raw: Option<String>) -> Self {
        match raw {
            Some(json) if !json.is_empty() => Self::Present(json),
            _ => Self::Absent,
        }
    }

    /// Value to bind into an INSERT.
    pub(crate) fn as_sql(&self) -> Option<&str> {
        match self {
            Self::Absent => None,
            Self::Present(json) => Some(json),
        }
    }

    /// Decodes the calls. Only parses when the column is present.
    pub(crate) fn decode(&self) -> Result<Vec<ToolCall>, serde_json::Error> {
        match self {
            Self::Absent => Ok(Vec::new()),
            Self::Present(json) => serde_json::from_str(json),
        }
    }
}
