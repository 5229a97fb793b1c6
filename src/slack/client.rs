use std::collections::HashSet;
use std::future::Future;
use std::num::NonZeroU32;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, error, warn};

use super::error::{SlackError, SlackResult, error_detail};
use super::types::{
    ChannelsListResponse, MessagesResponse, Page, PostedMessage, SlackChannel, SlackMessage,
    SlackUser, UsersListResponse,
};
use crate::config::{Config, Credentials, PaginationConfig, RetryConfig};
use crate::error::ConfigError;

const CHANNEL_NOT_FOUND: &str = "channel_not_found";
const USER_NOT_FOUND: &str = "user_not_found";

/// Which failures a Web API call may be repeated after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryPolicy {
    /// Reads: throttling, server errors, connect failures and timeouts.
    Idempotent,
    /// Writes: only failures Slack rejects before processing, so a
    /// repeat can never duplicate the side effect.
    RejectedOnly,
}

/// Filters for `conversations.list`
#[derive(Debug, Clone)]
pub struct ListChannelsOptions {
    pub limit: u32,
    pub types: String,
    pub exclude_archived: bool,
}

impl Default for ListChannelsOptions {
    fn default() -> Self {
        let slack = crate::config::SlackConfig::default();
        Self {
            limit: PaginationConfig::default().page_size,
            types: slack.channel_types,
            exclude_archived: slack.exclude_archived,
        }
    }
}

/// Slack Web API client. Holds one pooled HTTP client and no per-call
/// state, so a single instance can be shared behind an `Arc`.
pub struct SlackClient {
    http: Client,
    base_url: String,
    credentials: Credentials,
    channel_options: ListChannelsOptions,
    limits: PaginationConfig,
    retry: RetryConfig,
    limiter: DefaultDirectRateLimiter,
}

impl SlackClient {
    pub fn new(credentials: Credentials, config: &Config) -> Result<Self, ConfigError> {
        let connection = &config.connection;
        let http = Client::builder()
            .timeout(Duration::from_secs(connection.timeout_seconds))
            .pool_max_idle_per_host(connection.max_idle_per_host.max(0) as usize)
            .pool_idle_timeout(Duration::from_secs(connection.pool_idle_timeout_seconds))
            .build()?;

        let per_minute =
            NonZeroU32::new(connection.requests_per_minute).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            http,
            base_url: config.slack.api_base_url.trim_end_matches('/').to_string(),
            credentials,
            channel_options: ListChannelsOptions {
                limit: config.pagination.page_size,
                types: config.slack.channel_types.clone(),
                exclude_archived: config.slack.exclude_archived,
            },
            limits: config.pagination.clone(),
            retry: config.retry.clone(),
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        })
    }

    /// Build from layered configuration; fails when no bot token is configured.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let credentials = Credentials::from_config(&config.slack)?;
        Self::new(credentials, config)
    }

    /// Build directly from a token, bypassing process configuration.
    pub fn from_token(
        bot_token: impl Into<String>,
        allowed_channels: Option<HashSet<String>>,
    ) -> Result<Self, ConfigError> {
        Self::new(
            Credentials::new(bot_token, allowed_channels)?,
            &Config::default(),
        )
    }

    pub fn limits(&self) -> &PaginationConfig {
        &self.limits
    }

    /// Channel listing filters taken from configuration
    pub fn channel_options(&self) -> &ListChannelsOptions {
        &self.channel_options
    }

    pub fn allowed_channels(&self) -> Option<&HashSet<String>> {
        self.credentials.allowed_channels()
    }

    pub fn is_channel_allowed(&self, channel: &str) -> bool {
        self.allowed_channels()
            .is_none_or(|allowed| allowed.contains(channel))
    }

    fn enforce_allowed_channel(&self, channel: &str) -> SlackResult<()> {
        if self.is_channel_allowed(channel) {
            Ok(())
        } else {
            warn!(channel, "Refusing to post outside the channel allowlist");
            Err(SlackError::ChannelNotAllowed(channel.to_string()))
        }
    }

    // -------------------------
    // Connection / auth
    // -------------------------

    /// Validate the token with `auth.test`. Never fails.
    pub async fn test_connection(&self) -> bool {
        match self.call("test_connection", "auth.test", &[]).await {
            Ok(body) => {
                let ok = is_ok(&body);
                if !ok {
                    warn!(
                        "Slack auth.test rejected the token: {}",
                        error_detail(Some(&body), "unknown error")
                    );
                }
                ok
            }
            Err(e) => {
                warn!("Slack connection test failed: {}", e);
                false
            }
        }
    }

    // -------------------------
    // Channels
    // -------------------------

    pub async fn list_channels(
        &self,
        options: &ListChannelsOptions,
        cursor: Option<&str>,
    ) -> SlackResult<Page<SlackChannel>> {
        let mut form = vec![
            ("limit", options.limit.to_string()),
            ("types", options.types.clone()),
            ("exclude_archived", options.exclude_archived.to_string()),
        ];
        push_cursor(&mut form, cursor);

        let body = self
            .call_ok("list_channels", "conversations.list", &form)
            .await?;
        let response: ChannelsListResponse = decode("list_channels", body)?;

        Ok(Page::new(response.channels, response.response_metadata))
    }

    /// Fetch every page of channels, bounded by `max_pages`.
    pub async fn list_channels_all(
        &self,
        options: &ListChannelsOptions,
        max_pages: usize,
    ) -> SlackResult<Vec<SlackChannel>> {
        paginate(max_pages, |cursor| async move {
            self.list_channels(options, cursor.as_deref()).await
        })
        .await
    }

    /// `None` when Slack reports the channel does not exist.
    pub async fn get_channel_info(&self, channel_id: &str) -> SlackResult<Option<SlackChannel>> {
        self.lookup(
            "get_channel_info",
            "conversations.info",
            &[("channel", channel_id.to_string())],
            "channel",
            CHANNEL_NOT_FOUND,
        )
        .await
    }

    // -------------------------
    // Messaging
    // -------------------------

    /// Post as the bot. The allowlist is checked before any request is made.
    pub async fn post_message(&self, channel: &str, text: &str) -> SlackResult<PostedMessage> {
        self.enforce_allowed_channel(channel)?;

        let body = self
            .send(
                "post_message",
                "chat.postMessage",
                &[("channel", channel.to_string()), ("text", text.to_string())],
                RetryPolicy::RejectedOnly,
            )
            .await?;
        let body = require_ok("post_message", "chat.postMessage", body)?;

        Ok(PostedMessage {
            ok: is_ok(&body),
            channel: str_field(&body, "channel"),
            ts: str_field(&body, "ts"),
            message: body.get("message").cloned().unwrap_or_else(|| json!({})),
        })
    }

    /// Recent channel history, newest first as Slack returns it.
    pub async fn get_messages(&self, channel: &str, limit: u32) -> SlackResult<Vec<SlackMessage>> {
        self.fetch_messages(
            "get_messages",
            "conversations.history",
            &[("channel", channel.to_string()), ("limit", limit.to_string())],
        )
        .await
    }

    /// Thread parent followed by its replies in chronological order.
    /// `limit` defaults to `pagination.thread_limit`.
    pub async fn get_thread(
        &self,
        channel: &str,
        thread_ts: &str,
        limit: Option<u32>,
    ) -> SlackResult<Vec<SlackMessage>> {
        let limit = limit.unwrap_or(self.limits.thread_limit);
        self.fetch_messages(
            "get_thread",
            "conversations.replies",
            &[
                ("channel", channel.to_string()),
                ("ts", thread_ts.to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    /// Workspace-wide search. Requires a token with `search:read`.
    /// `limit` defaults to `pagination.search_limit`.
    pub async fn search_messages(
        &self,
        query: &str,
        limit: Option<u32>,
    ) -> SlackResult<Vec<Value>> {
        let limit = limit.unwrap_or(self.limits.search_limit);
        let body = self
            .call_ok(
                "search_messages",
                "search.messages",
                &[("query", query.to_string()), ("count", limit.to_string())],
            )
            .await?;

        Ok(extract_matches(&body))
    }

    // -------------------------
    // Users
    // -------------------------

    pub async fn list_users(&self, limit: u32, cursor: Option<&str>) -> SlackResult<Page<SlackUser>> {
        let mut form = vec![("limit", limit.to_string())];
        push_cursor(&mut form, cursor);

        let body = self.call_ok("list_users", "users.list", &form).await?;
        let response: UsersListResponse = decode("list_users", body)?;

        Ok(Page::new(response.members, response.response_metadata))
    }

    pub async fn list_users_all(&self, limit: u32, max_pages: usize) -> SlackResult<Vec<SlackUser>> {
        paginate(max_pages, |cursor| async move {
            self.list_users(limit, cursor.as_deref()).await
        })
        .await
    }

    /// `None` when Slack reports the user does not exist.
    pub async fn get_user_info(&self, user_id: &str) -> SlackResult<Option<SlackUser>> {
        self.lookup(
            "get_user_info",
            "users.info",
            &[("user", user_id.to_string())],
            "user",
            USER_NOT_FOUND,
        )
        .await
    }

    // -------------------------
    // Internal helpers
    // -------------------------

    async fn lookup<T: DeserializeOwned>(
        &self,
        action: &'static str,
        method: &str,
        form: &[(&str, String)],
        field: &str,
        not_found: &str,
    ) -> SlackResult<Option<T>> {
        let body = self.call(action, method, form).await?;

        if !is_ok(&body) {
            let detail = error_detail(Some(&body), &body.to_string());
            if detail == not_found {
                debug!(method, "Slack reported {}", not_found);
                return Ok(None);
            }
            return Err(SlackError::api(action, detail));
        }

        body.get(field)
            .cloned()
            .map(|value| decode(action, value))
            .transpose()
    }

    async fn fetch_messages(
        &self,
        action: &'static str,
        method: &str,
        form: &[(&str, String)],
    ) -> SlackResult<Vec<SlackMessage>> {
        let body = self.call(action, method, form).await?;

        if !is_ok(&body) {
            warn!(
                "Slack {} returned not-ok ({}), treating as empty",
                method,
                error_detail(Some(&body), "no error code")
            );
            return Ok(Vec::new());
        }

        let response: MessagesResponse = decode(action, body)?;
        Ok(response.messages)
    }

    /// Like [`Self::call`] but turns `"ok": false` into an error.
    async fn call_ok(
        &self,
        action: &'static str,
        method: &str,
        form: &[(&str, String)],
    ) -> SlackResult<Value> {
        let body = self.call(action, method, form).await?;
        require_ok(action, method, body)
    }

    async fn call(
        &self,
        action: &'static str,
        method: &str,
        form: &[(&str, String)],
    ) -> SlackResult<Value> {
        self.send(action, method, form, RetryPolicy::Idempotent).await
    }

    /// POST a form-encoded Web API call and return the decoded JSON body,
    /// whether or not Slack reported `ok`. Failures allowed by `policy` are
    /// retried up to `retry.max_attempts`.
    async fn send(
        &self,
        action: &'static str,
        method: &str,
        form: &[(&str, String)],
        policy: RetryPolicy,
    ) -> SlackResult<Value> {
        let url = format!("{}/{}", self.base_url, method);
        let max_attempts = self.retry.max_attempts.max(1);
        let max_delay = Duration::from_millis(self.retry.max_delay_ms);
        let mut delay = Duration::from_millis(self.retry.initial_delay_ms).min(max_delay);
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.limiter.until_ready().await;
            debug!(method, attempt, "Calling Slack API");

            let result = self
                .http
                .post(&url)
                .bearer_auth(self.credentials.token())
                .form(form)
                .send()
                .await;

            let response = match result {
                Ok(response) => response,
                Err(e)
                    if attempt < max_attempts
                        && (e.is_connect()
                            || (e.is_timeout() && policy == RetryPolicy::Idempotent)) =>
                {
                    warn!(method, attempt, "Slack request failed, retrying: {}", e);
                    tokio::time::sleep(delay).await;
                    delay = next_delay(delay, self.retry.exponential_base, max_delay);
                    continue;
                }
                Err(e) => {
                    error!(method, "Slack request failed: {}", e);
                    return Err(SlackError::api(action, e.to_string()));
                }
            };

            let status = response.status();
            if is_retryable(status, policy) && attempt < max_attempts {
                let wait = retry_after(&response).unwrap_or(delay).min(max_delay);
                warn!(
                    method,
                    attempt,
                    status = status.as_u16(),
                    "Slack API throttled or unavailable, retrying in {:?}",
                    wait
                );
                tokio::time::sleep(wait).await;
                delay = next_delay(delay, self.retry.exponential_base, max_delay);
                continue;
            }

            let text = response
                .text()
                .await
                .map_err(|e| SlackError::api(action, e.to_string()))?;
            let body = serde_json::from_str::<Value>(&text);

            if !status.is_success() {
                let fallback = format!("HTTP {}", status);
                return Err(SlackError::api(
                    action,
                    error_detail(body.as_ref().ok(), &fallback),
                ));
            }

            return body
                .map_err(|e| SlackError::api(action, format!("invalid JSON response: {}", e)));
        }
    }
}

/// Drive a cursor-paginated fetch until Slack stops returning a cursor or
/// `max_pages` pages have been read. Items keep page order, then
/// within-page order; nothing is deduplicated or sorted.
pub async fn paginate<T, F, Fut>(max_pages: usize, mut fetch: F) -> SlackResult<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = SlackResult<Page<T>>>,
{
    let mut items = Vec::new();
    let mut cursor: Option<String> = None;

    for page_number in 1..=max_pages {
        let page = fetch(cursor.take()).await?;
        debug!(page = page_number, count = page.items.len(), "Fetched page");
        items.extend(page.items);

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    if cursor.is_some() {
        warn!(
            max_pages,
            "Stopped paginating at the page cap with more results available"
        );
    }

    Ok(items)
}

/// `messages.matches` of a `search.messages` body; anything missing or of
/// the wrong shape yields an empty list.
pub fn extract_matches(body: &Value) -> Vec<Value> {
    body.get("messages")
        .and_then(|m| m.get("matches"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn is_ok(body: &Value) -> bool {
    body.get("ok").and_then(Value::as_bool).unwrap_or(false)
}

fn str_field(body: &Value, key: &str) -> Option<String> {
    body.get(key).and_then(Value::as_str).map(str::to_string)
}

fn push_cursor(form: &mut Vec<(&str, String)>, cursor: Option<&str>) {
    if let Some(cursor) = cursor.filter(|c| !c.is_empty()) {
        form.push(("cursor", cursor.to_string()));
    }
}

fn decode<T: DeserializeOwned>(action: &'static str, value: Value) -> SlackResult<T> {
    serde_json::from_value(value)
        .map_err(|e| SlackError::api(action, format!("unexpected response shape: {}", e)))
}

fn require_ok(action: &'static str, method: &str, body: Value) -> SlackResult<Value> {
    if is_ok(&body) {
        Ok(body)
    } else {
        let detail = error_detail(Some(&body), &body.to_string());
        warn!(method, "Slack API returned error: {}", detail);
        Err(SlackError::api(action, detail))
    }
}

/// 429 is rejected before processing and always safe to repeat; a 5xx may
/// arrive after Slack already acted on the request.
fn is_retryable(status: StatusCode, policy: RetryPolicy) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || (policy == RetryPolicy::Idempotent && status.is_server_error())
}

/// Exponential step capped at `max_delay`. Bases below 1 (or NaN) hold the
/// delay constant; anything that overflows lands on the cap.
fn next_delay(delay: Duration, base: f64, max_delay: Duration) -> Duration {
    let base = if base.is_nan() { 1.0 } else { base.max(1.0) };
    Duration::try_from_secs_f64(delay.as_secs_f64() * base)
        .map_or(max_delay, |next| next.min(max_delay))
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slack::types::ResponseMetadata;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::collections::VecDeque;

    fn page(ids: &[&str], next: Option<&str>) -> Page<String> {
        Page::new(
            ids.iter().map(|s| s.to_string()).collect(),
            Some(ResponseMetadata {
                next_cursor: next.map(str::to_string),
            }),
        )
    }

    #[tokio::test]
    async fn test_paginate_concatenates_pages_in_order() {
        let mut pages = VecDeque::from(vec![page(&["a", "b"], Some("X")), page(&["c"], None)]);
        let mut seen_cursors = Vec::new();

        let items = paginate(50, |cursor| {
            seen_cursors.push(cursor);
            let next = pages.pop_front().unwrap();
            async move { Ok(next) }
        })
        .await
        .unwrap();

        assert_eq!(items, vec!["a", "b", "c"]);
        assert_eq!(seen_cursors, vec![None, Some("X".to_string())]);
    }

    #[tokio::test]
    async fn test_paginate_stops_at_max_pages() {
        let mut calls = 0;

        let items = paginate(3, |_| {
            calls += 1;
            async { Ok(page(&["x"], Some("more"))) }
        })
        .await
        .unwrap();

        assert_eq!(calls, 3);
        assert_eq!(items.len(), 3);
    }

    #[tokio::test]
    async fn test_paginate_treats_empty_cursor_as_last_page() {
        let mut calls = 0;

        let items = paginate(50, |_| {
            calls += 1;
            async { Ok(page(&["x", "x"], Some(""))) }
        })
        .await
        .unwrap();

        assert_eq!(calls, 1);
        assert_eq!(items, vec!["x", "x"]);
    }

    #[tokio::test]
    async fn test_paginate_propagates_errors() {
        let result: SlackResult<Vec<String>> = paginate(5, |cursor| async move {
            match cursor {
                None => Ok(page(&["a"], Some("X"))),
                Some(_) => Err(SlackError::api("list_channels", "ratelimited")),
            }
        })
        .await;

        assert_eq!(
            result.unwrap_err(),
            SlackError::api("list_channels", "ratelimited")
        );
    }

    #[test]
    fn test_extract_matches() {
        let body = json!({"ok": true, "messages": {"matches": [{"ts": "1"}, {"ts": "2"}]}});
        assert_eq!(extract_matches(&body).len(), 2);
    }

    #[test]
    fn test_extract_matches_degrades_to_empty() {
        assert!(extract_matches(&json!({"ok": true})).is_empty());
        assert!(extract_matches(&json!({"ok": true, "messages": null})).is_empty());
        assert!(extract_matches(&json!({"ok": true, "messages": {"matches": null}})).is_empty());
        assert!(extract_matches(&json!({"ok": true, "messages": "oops"})).is_empty());
    }

    #[test]
    fn test_allowlist_membership() {
        let allowed: HashSet<String> = ["C100".to_string()].into_iter().collect();
        let client = SlackClient::from_token("xoxb-test", Some(allowed)).unwrap();

        assert!(client.is_channel_allowed("C100"));
        assert!(!client.is_channel_allowed("C200"));
        assert!(!client.is_channel_allowed("c100"));
    }

    #[test]
    fn test_no_allowlist_allows_everything() {
        let client = SlackClient::from_token("xoxb-test", None).unwrap();
        assert!(client.allowed_channels().is_none());
        assert!(client.is_channel_allowed("C200"));
    }

    #[test]
    fn test_from_token_rejects_blank_token() {
        assert!(matches!(
            SlackClient::from_token("  ", None),
            Err(ConfigError::MissingToken)
        ));
    }

    #[tokio::test]
    async fn test_post_message_rejected_before_network() {
        // Unroutable base URL: any request would fail with an Api error instead
        let mut config = Config::default();
        config.slack.api_base_url = "http://127.0.0.1:9".to_string();
        let allowed: HashSet<String> = ["C100".to_string()].into_iter().collect();
        let client = SlackClient::new(
            Credentials::new("xoxb-test", Some(allowed)).unwrap(),
            &config,
        )
        .unwrap();

        let err = client.post_message("C200", "hi").await.unwrap_err();
        assert_eq!(err, SlackError::ChannelNotAllowed("C200".to_string()));
        assert!(err.to_string().contains("C200"));
    }

    #[test]
    fn test_writes_are_not_retried_on_server_errors() {
        use RetryPolicy::{Idempotent, RejectedOnly};

        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS, Idempotent));
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS, RejectedOnly));
        assert!(is_retryable(StatusCode::SERVICE_UNAVAILABLE, Idempotent));
        assert!(!is_retryable(StatusCode::SERVICE_UNAVAILABLE, RejectedOnly));
        assert!(!is_retryable(StatusCode::INTERNAL_SERVER_ERROR, RejectedOnly));
        assert!(!is_retryable(StatusCode::BAD_REQUEST, Idempotent));
    }

    #[test]
    fn test_next_delay_grows_and_caps() {
        let max = Duration::from_secs(60);

        assert_eq!(
            next_delay(Duration::from_secs(1), 2.0, max),
            Duration::from_secs(2)
        );
        assert_eq!(next_delay(Duration::from_secs(40), 2.0, max), max);
        assert_eq!(
            next_delay(Duration::from_secs(1), 0.5, max),
            Duration::from_secs(1)
        );
    }

    #[rstest]
    #[case(1e300)]
    #[case(f64::MAX)]
    #[case(f64::INFINITY)]
    fn test_next_delay_survives_huge_base(#[case] base: f64) {
        let max = Duration::from_millis(60_000);
        assert_eq!(next_delay(Duration::from_secs(1), base, max), max);
    }

    #[test]
    fn test_next_delay_nan_base_holds_delay() {
        let max = Duration::from_secs(60);
        assert_eq!(
            next_delay(Duration::from_secs(3), f64::NAN, max),
            Duration::from_secs(3)
        );
    }
}
