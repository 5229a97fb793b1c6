use crate::error::{McpError, McpResult};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Parse JSON value into a typed parameter struct.
/// A missing `arguments` object is treated as `{}`.
pub fn parse_params<T: DeserializeOwned>(params: Value) -> McpResult<T> {
    let params = if params.is_null() {
        Value::Object(Default::default())
    } else {
        params
    };

    serde_json::from_value(params)
        .map_err(|e| McpError::InvalidParameter(format!("Invalid parameters: {}", e)))
}
