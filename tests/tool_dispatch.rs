mod common;

use common::{api, handler_for, json_response, text_of};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use wiremock::matchers::body_string_contains;
use wiremock::{MockServer, ResponseTemplate};

/// Byte offsets of each key in rendered output, asserting they appear in order
fn assert_key_order(text: &str, keys: &[&str]) {
    let positions: Vec<usize> = keys
        .iter()
        .map(|key| {
            text.find(&format!("\"{}\"", key))
                .unwrap_or_else(|| panic!("missing key {} in {}", key, text))
        })
        .collect();
    let mut sorted = positions.clone();
    sorted.sort_unstable();
    assert_eq!(positions, sorted, "keys out of order in {}", text);
}

#[tokio::test]
async fn list_channels_renders_summaries_across_pages() {
    let server = MockServer::start().await;

    api("conversations.list")
        .and(body_string_contains("cursor=page2"))
        .respond_with(json_response(json!({
            "ok": true,
            "channels": [{"id": "C2", "name": "random", "is_private": true, "is_archived": false}]
        })))
        .with_priority(1)
        .mount(&server)
        .await;

    api("conversations.list")
        .respond_with(json_response(json!({
            "ok": true,
            "channels": [{"id": "C1", "name": "general", "is_private": false, "is_archived": false}],
            "response_metadata": {"next_cursor": "page2"}
        })))
        .mount(&server)
        .await;

    let result = handler_for(&server, None)
        .call_tool("slack_list_channels", json!({}))
        .await;
    let text = text_of(&result);

    let parsed: Value = serde_json::from_str(text).unwrap();
    assert_eq!(
        parsed,
        json!([
            {"id": "C1", "name": "general", "is_private": false, "is_archived": false},
            {"id": "C2", "name": "random", "is_private": true, "is_archived": false}
        ])
    );
    assert_key_order(text, &["id", "name", "is_private", "is_archived"]);
}

#[tokio::test]
async fn get_channel_info_renders_detail() {
    let server = MockServer::start().await;

    api("conversations.info")
        .and(body_string_contains("channel=C123"))
        .respond_with(json_response(json!({
            "ok": true,
            "channel": {
                "id": "C123",
                "name": "general",
                "is_private": false,
                "is_archived": false,
                "created": 1234567890,
                "num_members": 10
            }
        })))
        .mount(&server)
        .await;

    let result = handler_for(&server, None)
        .call_tool("slack_get_channel_info", json!({"channel_id": "C123"}))
        .await;
    let text = text_of(&result);

    let parsed: Value = serde_json::from_str(text).unwrap();
    assert_eq!(parsed["created"], 1234567890);
    assert_eq!(parsed["num_members"], 10);
    assert_key_order(
        text,
        &["id", "name", "is_private", "is_archived", "created", "num_members"],
    );
}

#[tokio::test]
async fn get_channel_info_not_found_is_plain_text() {
    let server = MockServer::start().await;

    api("conversations.info")
        .respond_with(json_response(json!({"ok": false, "error": "channel_not_found"})))
        .mount(&server)
        .await;

    let result = handler_for(&server, None)
        .call_tool("slack_get_channel_info", json!({"channel_id": "C404"}))
        .await;

    assert_eq!(text_of(&result), "Channel C404 not found");
}

#[tokio::test]
async fn send_message_renders_post_result() {
    let server = MockServer::start().await;

    api("chat.postMessage")
        .respond_with(json_response(json!({
            "ok": true,
            "channel": "C100",
            "ts": "1234567890.123456",
            "message": {"text": "hi"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = handler_for(&server, Some(&["C100"]))
        .call_tool("slack_send_message", json!({"channel": "C100", "text": "hi"}))
        .await;
    let text = text_of(&result);

    let parsed: Value = serde_json::from_str(text).unwrap();
    assert_eq!(
        parsed,
        json!({
            "ok": true,
            "channel": "C100",
            "ts": "1234567890.123456",
            "message": {"text": "hi"}
        })
    );
    assert_key_order(text, &["ok", "channel", "ts", "message"]);
}

#[tokio::test]
async fn send_message_to_disallowed_channel_skips_network() {
    let server = MockServer::start().await;

    api("chat.postMessage")
        .respond_with(json_response(json!({"ok": true})))
        .expect(0)
        .mount(&server)
        .await;

    let result = handler_for(&server, Some(&["C100"]))
        .call_tool("slack_send_message", json!({"channel": "C200", "text": "hi"}))
        .await;

    assert_eq!(
        text_of(&result),
        "Slack error: Channel C200 is not in SLACK_ALLOWED_CHANNELS. Add it to allow posting."
    );
}

#[tokio::test]
async fn get_messages_passes_explicit_limit() {
    let server = MockServer::start().await;

    api("conversations.history")
        .and(body_string_contains("channel=C1"))
        .and(body_string_contains("limit=10"))
        .respond_with(json_response(json!({
            "ok": true,
            "messages": [
                {"type": "message", "user": "U1", "text": "second", "ts": "2.0"},
                {"type": "message", "user": "U2", "text": "first", "ts": "1.0"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = handler_for(&server, None)
        .call_tool("slack_get_messages", json!({"channel": "C1", "limit": 10}))
        .await;
    let text = text_of(&result);

    let parsed: Value = serde_json::from_str(text).unwrap();
    assert_eq!(
        parsed,
        json!([
            {"ts": "2.0", "user": "U1", "text": "second", "type": "message"},
            {"ts": "1.0", "user": "U2", "text": "first", "type": "message"}
        ])
    );
    assert_key_order(text, &["ts", "user", "text", "type"]);
}

#[tokio::test]
async fn get_messages_defaults_limit() {
    let server = MockServer::start().await;

    api("conversations.history")
        .and(body_string_contains("limit=100"))
        .respond_with(json_response(json!({"ok": true, "messages": []})))
        .expect(1)
        .mount(&server)
        .await;

    let result = handler_for(&server, None)
        .call_tool("slack_get_messages", json!({"channel": "C1"}))
        .await;

    assert_eq!(text_of(&result), "[]");
}

#[tokio::test]
async fn get_messages_upstream_refusal_is_empty_list() {
    let server = MockServer::start().await;

    api("conversations.history")
        .respond_with(json_response(json!({"ok": false, "error": "not_in_channel"})))
        .mount(&server)
        .await;

    let result = handler_for(&server, None)
        .call_tool("slack_get_messages", json!({"channel": "C1"}))
        .await;

    assert_eq!(text_of(&result), "[]");
}

#[tokio::test]
async fn list_users_renders_summaries() {
    let server = MockServer::start().await;

    api("users.list")
        .respond_with(json_response(json!({
            "ok": true,
            "members": [
                {"id": "U1", "name": "alice", "real_name": "Alice A", "is_bot": false, "deleted": false},
                {"id": "U2", "name": "helper", "profile": {"real_name": "Helper Bot"}, "is_bot": true, "deleted": false}
            ]
        })))
        .mount(&server)
        .await;

    let result = handler_for(&server, None)
        .call_tool("slack_list_users", Value::Null)
        .await;
    let text = text_of(&result);

    let parsed: Value = serde_json::from_str(text).unwrap();
    assert_eq!(
        parsed,
        json!([
            {"id": "U1", "name": "alice", "real_name": "Alice A", "is_bot": false, "deleted": false},
            {"id": "U2", "name": "helper", "real_name": null, "is_bot": true, "deleted": false}
        ])
    );
    assert_key_order(text, &["id", "name", "real_name", "is_bot", "deleted"]);
}

#[tokio::test]
async fn get_user_info_renders_profile_fields() {
    let server = MockServer::start().await;

    api("users.info")
        .and(body_string_contains("user=U123"))
        .respond_with(json_response(json!({
            "ok": true,
            "user": {
                "id": "U123",
                "name": "testuser",
                "real_name": "Test User",
                "profile": {"display_name": "tester", "email": "test@example.com"},
                "is_bot": false,
                "deleted": false
            }
        })))
        .mount(&server)
        .await;

    let result = handler_for(&server, None)
        .call_tool("slack_get_user_info", json!({"user_id": "U123"}))
        .await;
    let text = text_of(&result);

    let parsed: Value = serde_json::from_str(text).unwrap();
    assert_eq!(
        parsed,
        json!({
            "id": "U123",
            "name": "testuser",
            "real_name": "Test User",
            "display_name": "tester",
            "email": "test@example.com",
            "is_bot": false,
            "deleted": false
        })
    );
    assert_key_order(
        text,
        &["id", "name", "real_name", "display_name", "email", "is_bot", "deleted"],
    );
}

#[tokio::test]
async fn get_user_info_not_found_is_plain_text() {
    let server = MockServer::start().await;

    api("users.info")
        .respond_with(json_response(json!({"ok": false, "error": "user_not_found"})))
        .mount(&server)
        .await;

    let result = handler_for(&server, None)
        .call_tool("slack_get_user_info", json!({"user_id": "U404"}))
        .await;

    assert_eq!(text_of(&result), "User U404 not found");
}

#[tokio::test]
async fn upstream_failure_is_reported_as_text() {
    let server = MockServer::start().await;

    api("conversations.list")
        .respond_with(json_response(json!({"ok": false, "error": "invalid_auth"})))
        .mount(&server)
        .await;

    let result = handler_for(&server, None)
        .call_tool("slack_list_channels", json!({}))
        .await;

    assert_eq!(
        text_of(&result),
        "Slack error: Slack API error (list_channels): invalid_auth"
    );
}

#[tokio::test]
async fn http_failure_is_reported_as_text() {
    let server = MockServer::start().await;

    api("users.info")
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let result = handler_for(&server, None)
        .call_tool("slack_get_user_info", json!({"user_id": "U1"}))
        .await;

    assert!(
        text_of(&result).starts_with("Slack error: Slack API error (get_user_info): HTTP 502")
    );
}
