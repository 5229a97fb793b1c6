use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use super::{IntoToolResponse, Tool, ToolResponse};
use crate::error::McpResult;
use crate::mcp::types::{Property, ToolInputSchema};
use crate::slack::SlackClient;
use crate::slack::types::SlackChannel;
use crate::utils::parse_params;

pub struct ListChannelsTool {
    slack_client: Arc<SlackClient>,
}

pub struct GetChannelInfoTool {
    slack_client: Arc<SlackClient>,
}

impl ListChannelsTool {
    pub fn new(slack_client: Arc<SlackClient>) -> Self {
        Self { slack_client }
    }
}

impl GetChannelInfoTool {
    pub fn new(slack_client: Arc<SlackClient>) -> Self {
        Self { slack_client }
    }
}

#[derive(Debug, Deserialize)]
struct GetChannelInfoParams {
    channel_id: String,
}

fn channel_summary(channel: &SlackChannel) -> Value {
    json!({
        "id": channel.id,
        "name": channel.name,
        "is_private": channel.is_private,
        "is_archived": channel.is_archived,
    })
}

#[async_trait]
impl Tool for ListChannelsTool {
    fn name(&self) -> &'static str {
        "slack_list_channels"
    }

    fn description(&self) -> &str {
        "List all channels in the Slack workspace"
    }

    fn input_schema(&self) -> ToolInputSchema {
        ToolInputSchema::empty()
    }

    async fn execute(&self, _params: Value) -> McpResult<Value> {
        let max_pages = self.slack_client.limits().max_pages;
        let channels = self
            .slack_client
            .list_channels_all(self.slack_client.channel_options(), max_pages)
            .await?;

        let result: Vec<Value> = channels.iter().map(channel_summary).collect();

        ToolResponse::data(json!(result)).into_response()
    }
}

#[async_trait]
impl Tool for GetChannelInfoTool {
    fn name(&self) -> &'static str {
        "slack_get_channel_info"
    }

    fn description(&self) -> &str {
        "Get information about a specific Slack channel"
    }

    fn input_schema(&self) -> ToolInputSchema {
        ToolInputSchema::object(
            vec![(
                "channel_id",
                Property::string("The channel ID (e.g., C1234567890)"),
            )],
            &["channel_id"],
        )
    }

    async fn execute(&self, params: Value) -> McpResult<Value> {
        let params: GetChannelInfoParams = parse_params(params)?;

        let response = match self
            .slack_client
            .get_channel_info(&params.channel_id)
            .await?
        {
            Some(channel) => ToolResponse::data(json!({
                "id": channel.id,
                "name": channel.name,
                "is_private": channel.is_private,
                "is_archived": channel.is_archived,
                "created": channel.created,
                "num_members": channel.num_members,
            })),
            None => ToolResponse::message(format!("Channel {} not found", params.channel_id)),
        };

        response.into_response()
    }
}
