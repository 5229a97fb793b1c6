use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use super::{IntoToolResponse, Tool, ToolResponse};
use crate::error::McpResult;
use crate::mcp::types::{Property, ToolInputSchema};
use crate::slack::SlackClient;
use crate::utils::parse_params;

pub struct SendMessageTool {
    slack_client: Arc<SlackClient>,
}

pub struct GetMessagesTool {
    slack_client: Arc<SlackClient>,
}

impl SendMessageTool {
    pub fn new(slack_client: Arc<SlackClient>) -> Self {
        Self { slack_client }
    }
}

impl GetMessagesTool {
    pub fn new(slack_client: Arc<SlackClient>) -> Self {
        Self { slack_client }
    }
}

#[derive(Debug, Deserialize)]
struct SendMessageParams {
    channel: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct GetMessagesParams {
    channel: String,
    #[serde(default)]
    limit: Option<u32>,
}

#[async_trait]
impl Tool for SendMessageTool {
    fn name(&self) -> &'static str {
        "slack_send_message"
    }

    fn description(&self) -> &str {
        "Send a message to a Slack channel"
    }

    fn input_schema(&self) -> ToolInputSchema {
        ToolInputSchema::object(
            vec![
                (
                    "channel",
                    Property::string("Channel ID or name (e.g., C1234567890 or #general)"),
                ),
                ("text", Property::string("The message text to send")),
            ],
            &["channel", "text"],
        )
    }

    async fn execute(&self, params: Value) -> McpResult<Value> {
        let params: SendMessageParams = parse_params(params)?;

        let posted = self
            .slack_client
            .post_message(&params.channel, &params.text)
            .await?;

        ToolResponse::serialize(&posted)?.into_response()
    }
}

#[async_trait]
impl Tool for GetMessagesTool {
    fn name(&self) -> &'static str {
        "slack_get_messages"
    }

    fn description(&self) -> &str {
        "Get recent messages from a Slack channel"
    }

    fn input_schema(&self) -> ToolInputSchema {
        let default_limit = self.slack_client.limits().message_limit;
        ToolInputSchema::object(
            vec![
                ("channel", Property::string("Channel ID or name")),
                (
                    "limit",
                    Property::integer(
                        &format!(
                            "Maximum number of messages to retrieve (default: {})",
                            default_limit
                        ),
                        default_limit,
                    ),
                ),
            ],
            &["channel"],
        )
    }

    async fn execute(&self, params: Value) -> McpResult<Value> {
        let params: GetMessagesParams = parse_params(params)?;
        let limit = params
            .limit
            .unwrap_or(self.slack_client.limits().message_limit);

        let messages = self
            .slack_client
            .get_messages(&params.channel, limit)
            .await?;

        let result: Vec<Value> = messages
            .into_iter()
            .map(|msg| {
                json!({
                    "ts": msg.ts,
                    "user": msg.user,
                    "text": msg.text,
                    "type": msg.kind,
                })
            })
            .collect();

        ToolResponse::data(json!(result)).into_response()
    }
}
