use crate::serde_util::null_as_default;
use crate::tool::ToolCall;
use serde::{Deserialize, Serialize};

/// A single message exchanged within a conversation session.
///
/// The role is a free-form tag (`"user"`, `"assistant"`, `"tool"`, or any
/// actor identity the caller chooses). Ordering is owned by the store, so a
/// message carries no sequence number of its own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message author.
    pub role: String,
    /// The textual content of the message. May be empty.
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    /// Tool invocations requested by this message, in model order.
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tool_calls: Vec<ToolCall>,
    /// For tool responses, the id of the [`ToolCall`] being answered.
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub tool_call_id: String,
}

impl Message {
    /// Creates a plain text message with the given role.
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    /// Creates a message with role `"user"`.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    /// Creates a message with role `"assistant"`.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }

    /// Creates a message with role `"system"`.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    /// Creates a tool response answering the call with id `tool_call_id`.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: content.into(),
            tool_call_id: tool_call_id.into(),
            ..Self::default()
        }
    }

    /// Attaches tool calls to this message.
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }
}
