use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::McpError;
use crate::slack::SlackClient;
use crate::tools::response::render_text;
use crate::tools::{Tool, channels, messages, users};

use super::types::{CallToolResult, Tool as McpTool};

/// Returned for every call while the Slack client could not be built.
pub const CLIENT_NOT_INITIALIZED: &str =
    "Error: Slack client not initialized. Check SLACK_BOT_TOKEN environment variable.";

/// Static tool registry. Every outcome of `call_tool`, including failures,
/// is reported to the caller as text content.
pub struct RequestHandler {
    tools: Vec<Box<dyn Tool + Send + Sync>>,
    client_available: bool,
}

impl RequestHandler {
    pub fn new(slack_client: Option<Arc<SlackClient>>) -> Self {
        let Some(slack_client) = slack_client else {
            warn!("Slack client unavailable; serving an empty tool list");
            return Self {
                tools: Vec::new(),
                client_available: false,
            };
        };

        let tools: Vec<Box<dyn Tool + Send + Sync>> = vec![
            Box::new(channels::ListChannelsTool::new(slack_client.clone())),
            Box::new(channels::GetChannelInfoTool::new(slack_client.clone())),
            Box::new(messages::SendMessageTool::new(slack_client.clone())),
            Box::new(messages::GetMessagesTool::new(slack_client.clone())),
            Box::new(users::ListUsersTool::new(slack_client.clone())),
            Box::new(users::GetUserInfoTool::new(slack_client)),
        ];

        Self {
            tools,
            client_available: true,
        }
    }

    pub fn list_tools(&self) -> Vec<McpTool> {
        self.tools
            .iter()
            .map(|tool| McpTool {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.input_schema(),
            })
            .collect()
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> CallToolResult {
        if !self.client_available {
            return CallToolResult::text(CLIENT_NOT_INITIALIZED);
        }

        let Some(tool) = self.tools.iter().find(|tool| tool.name() == name) else {
            warn!("Unknown tool requested: {}", name);
            return CallToolResult::text(format!("Unknown tool: {}", name));
        };

        info!(tool = name, "Executing tool");

        let text = match tool.execute(arguments).await.and_then(|r| render_text(&r)) {
            Ok(text) => text,
            Err(McpError::Slack(e)) => {
                warn!(tool = name, "Slack error: {}", e);
                format!("Slack error: {}", e)
            }
            Err(e) => {
                warn!(tool = name, "Tool failed: {}", e);
                format!("Error: {}", e)
            }
        };

        CallToolResult::text(text)
    }
}
