use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol revisions this server can speak. Clients asking for a 2025
/// revision get the newer one, everyone else the 2024 baseline.
pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const PROTOCOL_VERSION_2025: &str = "2025-06-18";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    /// Absent for notifications
    #[serde(default)]
    pub id: Option<Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// `initialize` params. Only the requested protocol version drives behavior.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeRequest {
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: Value,
    #[serde(default)]
    pub client_info: Option<PeerInfo>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub server_info: PeerInfo,
}

/// Advertises the tools capability only; the tool set never changes at runtime.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCapabilities {
    pub tools: ToolsCapability,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    pub list_changed: bool,
}

/// Name and version of either side of the session
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PeerInfo {
    pub name: String,
    pub version: String,
}

/// Entry in a `tools/list` result
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: ToolInputSchema,
}

/// JSON Schema for a tool's arguments. Properties serialize in name order.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolInputSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: BTreeMap<String, Property>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl ToolInputSchema {
    pub fn object(properties: Vec<(&str, Property)>, required: &[&str]) -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: properties
                .into_iter()
                .map(|(name, prop)| (name.to_string(), prop))
                .collect(),
            required: required.iter().map(|r| r.to_string()).collect(),
        }
    }

    pub fn empty() -> Self {
        Self::object(Vec::new(), &[])
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Property {
    #[serde(rename = "type")]
    pub property_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl Property {
    pub fn string(description: &str) -> Self {
        Self {
            property_type: "string".to_string(),
            description: Some(description.to_string()),
            default: None,
        }
    }

    pub fn integer(description: &str, default: u32) -> Self {
        Self {
            property_type: "integer".to_string(),
            description: Some(description.to_string()),
            default: Some(Value::Number(default.into())),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListToolsResult {
    pub tools: Vec<Tool>,
}

/// `tools/call` params. Missing `arguments` deserialize as null.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CallToolRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CallToolResult {
    pub content: Vec<ToolContent>,
}

impl CallToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
        }
    }
}

/// Content blocks returned by a tool call. Only text is produced.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text { text: String },
}

/// JSON-RPC 2.0 error codes
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

impl JsonRpcError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error() -> Self {
        Self::new(error_codes::PARSE_ERROR, "Parse error")
    }

    pub fn invalid_request() -> Self {
        Self::new(error_codes::INVALID_REQUEST, "Invalid request")
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            error_codes::METHOD_NOT_FOUND,
            format!("Method not found: {}", method),
        )
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(error_codes::INVALID_PARAMS, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(error_codes::INTERNAL_ERROR, message)
    }
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<Value>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_input_schema_serialization() {
        let schema = ToolInputSchema::object(
            vec![
                ("channel", Property::string("Channel ID")),
                ("limit", Property::integer("Max messages", 100)),
            ],
            &["channel"],
        );

        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(value["type"], "object");
        assert_eq!(value["properties"]["channel"]["type"], "string");
        assert_eq!(value["properties"]["limit"]["type"], "integer");
        assert_eq!(value["properties"]["limit"]["default"], 100);
        assert!(value["properties"]["channel"].get("default").is_none());
        assert_eq!(value["required"], json!(["channel"]));
    }

    #[test]
    fn test_empty_schema() {
        let value = serde_json::to_value(ToolInputSchema::empty()).unwrap();
        assert_eq!(value, json!({"type": "object", "properties": {}, "required": []}));
    }

    #[test]
    fn test_text_content_shape() {
        let value = serde_json::to_value(CallToolResult::text("hello")).unwrap();
        assert_eq!(value, json!({"content": [{"type": "text", "text": "hello"}]}));
    }

    #[test]
    fn test_call_tool_request_without_arguments() {
        let request: CallToolRequest =
            serde_json::from_value(json!({"name": "slack_list_channels"})).unwrap();
        assert!(request.arguments.is_null());
    }

    #[test]
    fn test_error_response_omits_result() {
        let response = JsonRpcResponse::error(Some(json!(1)), JsonRpcError::parse_error());
        let value = serde_json::to_value(response).unwrap();
        assert!(value.get("result").is_none());
        assert_eq!(value["error"]["code"], -32700);
        assert_eq!(value["jsonrpc"], JSONRPC_VERSION);
    }

    #[test]
    fn test_initialize_shapes_use_camel_case() {
        let request: InitializeRequest = serde_json::from_value(json!({
            "protocolVersion": "2025-06-18",
            "clientInfo": {"name": "inspector", "version": "0.1"}
        }))
        .unwrap();
        assert_eq!(request.protocol_version, "2025-06-18");
        assert_eq!(request.client_info.unwrap().name, "inspector");

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities::default(),
            server_info: PeerInfo {
                name: "slack-mcp-server".to_string(),
                version: "0.0.0".to_string(),
            },
        };
        let value = serde_json::to_value(result).unwrap();
        assert_eq!(value["capabilities"], json!({"tools": {"listChanged": false}}));
        assert_eq!(value["serverInfo"]["name"], "slack-mcp-server");
    }
}
