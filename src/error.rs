use thiserror::Error;

use crate::slack::SlackError;

#[derive(Error, Debug)]
pub enum McpError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Slack(#[from] SlackError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type McpResult<T> = std::result::Result<T, McpError>;

/// Startup-time misconfiguration. Fatal to client construction only.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing SLACK_BOT_TOKEN. Put it in your .env.")]
    MissingToken,

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
