use crate::serde_util::null_as_default;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A request from the LLM to invoke a specific tool.
///
/// Stored verbatim with the assistant message that issued it, so field names
/// on the wire must stay stable. Fields this type does not name are kept in
/// [`extra`](Self::extra) and written back out unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier assigned by the LLM; tool responses echo it back.
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    /// Call type, usually `"function"`.
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: String,
    /// The function to invoke, when the call is a function call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionCall>,
    /// Provider-specific fields, preserved as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Function name plus the raw JSON argument string produced by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Name of the tool to invoke.
    pub name: String,
    /// JSON-encoded arguments, kept as text so they round-trip byte for byte.
    #[serde(default, deserialize_with = "null_as_default")]
    pub arguments: String,
}

impl ToolCall {
    /// Creates a `"function"` tool call.
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: "function".to_string(),
            function: Some(FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            }),
            extra: Map::new(),
        }
    }

    /// Name of the invoked function, if any.
    pub fn function_name(&self) -> Option<&str> {
        self.function.as_ref().map(|f| f.name.as_str())
    }
}
