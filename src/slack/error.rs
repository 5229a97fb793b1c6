use serde_json::Value;
use thiserror::Error;

/// Failures surfaced by [`super::SlackClient`]. Upstream transport and
/// decoding errors never escape as their native types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SlackError {
    /// Posting target is outside the configured allowlist
    #[error("Channel {0} is not in SLACK_ALLOWED_CHANNELS. Add it to allow posting.")]
    ChannelNotAllowed(String),

    /// Any Slack Web API failure, tagged with the attempted action
    #[error("Slack API error ({action}): {detail}")]
    Api { action: &'static str, detail: String },
}

impl SlackError {
    pub fn api(action: &'static str, detail: impl Into<String>) -> Self {
        SlackError::Api {
            action,
            detail: detail.into(),
        }
    }

    /// Upstream error code, when this is an API failure
    pub fn detail(&self) -> Option<&str> {
        match self {
            SlackError::Api { detail, .. } => Some(detail),
            SlackError::ChannelNotAllowed(_) => None,
        }
    }
}

pub type SlackResult<T> = Result<T, SlackError>;

/// Best-effort read of the `error` field of a Slack response body, falling
/// back to the raw text when the shape is not recognized.
pub fn error_detail(body: Option<&Value>, fallback: &str) -> String {
    body.and_then(|b| b.get("error"))
        .and_then(Value::as_str)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| fallback.to_string())
}
