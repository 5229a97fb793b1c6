pub mod channels;
pub mod messages;
pub mod response;
pub mod users;

use crate::error::McpResult;
use crate::mcp::types::ToolInputSchema;
use async_trait::async_trait;
use serde_json::Value;

pub use response::{IntoToolResponse, ToolResponse};

#[async_trait]
pub trait Tool {
    fn name(&self) -> &'static str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> ToolInputSchema;
    async fn execute(&self, params: Value) -> McpResult<Value>;
}
