use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use super::{IntoToolResponse, Tool, ToolResponse};
use crate::error::McpResult;
use crate::mcp::types::{Property, ToolInputSchema};
use crate::slack::SlackClient;
use crate::utils::parse_params;

pub struct ListUsersTool {
    slack_client: Arc<SlackClient>,
}

pub struct GetUserInfoTool {
    slack_client: Arc<SlackClient>,
}

impl ListUsersTool {
    pub fn new(slack_client: Arc<SlackClient>) -> Self {
        Self { slack_client }
    }
}

impl GetUserInfoTool {
    pub fn new(slack_client: Arc<SlackClient>) -> Self {
        Self { slack_client }
    }
}

#[derive(Debug, Deserialize)]
struct GetUserInfoParams {
    user_id: String,
}

#[async_trait]
impl Tool for ListUsersTool {
    fn name(&self) -> &'static str {
        "slack_list_users"
    }

    fn description(&self) -> &str {
        "List all users in the Slack workspace"
    }

    fn input_schema(&self) -> ToolInputSchema {
        ToolInputSchema::empty()
    }

    async fn execute(&self, _params: Value) -> McpResult<Value> {
        let limits = self.slack_client.limits();
        let users = self
            .slack_client
            .list_users_all(limits.page_size, limits.max_pages)
            .await?;

        let result: Vec<Value> = users
            .iter()
            .map(|user| {
                json!({
                    "id": user.id,
                    "name": user.name,
                    "real_name": user.real_name(),
                    "is_bot": user.is_bot,
                    "deleted": user.deleted,
                })
            })
            .collect();

        ToolResponse::data(json!(result)).into_response()
    }
}

#[async_trait]
impl Tool for GetUserInfoTool {
    fn name(&self) -> &'static str {
        "slack_get_user_info"
    }

    fn description(&self) -> &str {
        "Get information about a specific Slack user"
    }

    fn input_schema(&self) -> ToolInputSchema {
        ToolInputSchema::object(
            vec![("user_id", Property::string("The user ID (e.g., U1234567890)"))],
            &["user_id"],
        )
    }

    async fn execute(&self, params: Value) -> McpResult<Value> {
        let params: GetUserInfoParams = parse_params(params)?;

        let response = match self.slack_client.get_user_info(&params.user_id).await? {
            Some(user) => ToolResponse::data(json!({
                "id": user.id,
                "name": user.name,
                "real_name": user.real_name(),
                "display_name": user.display_name(),
                "email": user.email(),
                "is_bot": user.is_bot,
                "deleted": user.deleted,
            })),
            None => ToolResponse::message(format!("User {} not found", params.user_id)),
        };

        response.into_response()
    }
}
