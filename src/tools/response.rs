use crate::error::McpResult;
use serde::Serialize;
use serde_json::Value;

/// Result of a tool call before it becomes MCP text content
#[derive(Debug)]
pub enum ToolResponse {
    /// Structured data, rendered as pretty-printed JSON
    Data(Value),

    /// Informational text passed through verbatim (e.g. "not found")
    Message(String),
}

impl ToolResponse {
    pub fn data(data: Value) -> Self {
        ToolResponse::Data(data)
    }

    /// Serialize a typed result, keeping its field order
    pub fn serialize<T: Serialize>(data: &T) -> McpResult<Self> {
        Ok(ToolResponse::Data(serde_json::to_value(data)?))
    }

    pub fn message(text: impl Into<String>) -> Self {
        ToolResponse::Message(text.into())
    }

    /// Convert to JSON Value for MCP protocol
    pub fn into_json(self) -> Value {
        match self {
            ToolResponse::Data(data) => data,
            ToolResponse::Message(text) => Value::String(text),
        }
    }
}

/// Helper trait for converting tool results to responses
pub trait IntoToolResponse {
    fn into_response(self) -> McpResult<Value>;
}

impl IntoToolResponse for ToolResponse {
    fn into_response(self) -> McpResult<Value> {
        Ok(self.into_json())
    }
}

/// Render a tool result as the single text block returned to the caller.
/// Strings pass through; everything else is pretty-printed JSON.
pub fn render_text(result: &Value) -> McpResult<String> {
    match result.as_str() {
        Some(text) => Ok(text.to_string()),
        None => Ok(serde_json::to_string_pretty(result)?),
    }
}
