use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackUserProfile {
    pub display_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackUser {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub deleted: bool,
    pub profile: Option<SlackUserProfile>,
}

impl SlackUser {
    /// Top-level `real_name` only; the `profile.real_name` copy is ignored.
    pub fn real_name(&self) -> Option<&str> {
        self.real_name.as_deref()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.profile.as_ref()?.display_name.as_deref()
    }

    pub fn email(&self) -> Option<&str> {
        self.profile.as_ref()?.email.as_deref()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackChannel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub is_archived: bool,
    pub created: Option<i64>,
    pub num_members: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackMessage {
    pub ts: String,
    pub user: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub thread_ts: Option<String>,
    pub reply_count: Option<i32>,
}

/// `response_metadata` block carried by cursor-paginated methods
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseMetadata {
    pub next_cursor: Option<String>,
}

/// One page of a cursor-paginated listing. `next_cursor` is `None` on the
/// last page; an empty cursor from Slack is normalized to `None`.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, metadata: Option<ResponseMetadata>) -> Self {
        let next_cursor = metadata
            .and_then(|m| m.next_cursor)
            .filter(|c| !c.is_empty());
        Self { items, next_cursor }
    }
}

/// Normalized `chat.postMessage` result
#[derive(Debug, Clone, Serialize)]
pub struct PostedMessage {
    pub ok: bool,
    pub channel: Option<String>,
    pub ts: Option<String>,
    pub message: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChannelsListResponse {
    #[serde(default)]
    pub channels: Vec<SlackChannel>,
    #[serde(default)]
    pub response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UsersListResponse {
    #[serde(default)]
    pub members: Vec<SlackUser>,
    #[serde(default)]
    pub response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessagesResponse {
    #[serde(default)]
    pub messages: Vec<SlackMessage>,
}
