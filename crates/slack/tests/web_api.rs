use std::time::Duration;

use huddle_slack::{SlackError, SlackService, WebApiClient, WebApiConfig};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> WebApiClient {
    let cfg = WebApiConfig { base_url: server.uri(), timeout: Duration::from_secs(5) };
    WebApiClient::new("xoxb-test", cfg).unwrap()
}

#[tokio::test]
async fn create_returns_channel_id_and_sends_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/conversations.create"))
        .and(header("authorization", "Bearer xoxb-test"))
        .and(body_string_contains("name=proj"))
        .and(body_string_contains("is_private=false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "channel": { "id": "C0EAQDV4Z", "name": "proj", "is_private": false }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let id = client(&server).create_channel("proj", false).await.unwrap();
    assert_eq!(id, "C0EAQDV4Z");
}

#[tokio::test]
async fn name_taken_is_distinguishable() {
    let server = MockServer::start().await;
    Mock::given(path("/conversations.create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": false, "error": "name_taken" })))
        .mount(&server)
        .await;

    assert_eq!(client(&server).create_channel("name-taken", false).await, Err(SlackError::NameTaken));
}

#[tokio::test]
async fn archive_maps_not_found_and_already_archived() {
    let server = MockServer::start().await;
    Mock::given(path("/conversations.archive"))
        .and(body_string_contains("channel=GONE"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": false, "error": "channel_not_found" })))
        .mount(&server)
        .await;
    Mock::given(path("/conversations.archive"))
        .and(body_string_contains("channel=OLD"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": false, "error": "already_archived" })))
        .mount(&server)
        .await;

    let c = client(&server);
    assert_eq!(c.archive("GONE").await, Err(SlackError::ChannelNotFound));
    assert_eq!(c.archive("OLD").await, Err(SlackError::AlreadyArchived));
}

#[tokio::test]
async fn info_decodes_topic_and_purpose() {
    let server = MockServer::start().await;
    Mock::given(path("/conversations.info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "channel": {
                "id": "C1", "name": "proj", "is_private": true, "is_archived": true,
                "topic": { "value": "Q&amp;A", "creator": "U1", "last_set": 0 },
                "purpose": { "value": "My channel Description", "creator": "U1", "last_set": 0 }
            }
        })))
        .mount(&server)
        .await;

    let info = client(&server).channel_info("C1").await.unwrap();
    assert_eq!(info.name, "proj");
    assert_eq!(info.topic, "Q&amp;A");
    assert_eq!(info.description, "My channel Description");
    assert!(info.is_private);
    assert!(info.is_archived);
}

#[tokio::test]
async fn members_follow_cursors() {
    let server = MockServer::start().await;
    Mock::given(path("/conversations.members"))
        .and(body_string_contains("cursor=page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true, "members": ["W012A3CDE"], "response_metadata": { "next_cursor": "" }
        })))
        .mount(&server)
        .await;
    Mock::given(path("/conversations.members"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true, "members": ["U023BECGF", "U061F7AUR"], "response_metadata": { "next_cursor": "page2" }
        })))
        .mount(&server)
        .await;

    let members = client(&server).list_members("C1").await.unwrap();
    assert_eq!(members, vec!["U023BECGF", "U061F7AUR", "W012A3CDE"]);
}

#[tokio::test]
async fn user_lookup_failure_names_the_email() {
    let server = MockServer::start().await;
    Mock::given(path("/users.lookupByEmail"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": false, "error": "users_not_found" })))
        .mount(&server)
        .await;

    let err = client(&server).lookup_user_by_email("nonexistent@slack.com").await.unwrap_err();
    assert_eq!(err, SlackError::UserNotFound("nonexistent@slack.com".into()));
}

#[tokio::test]
async fn already_in_channel_counts_as_invited() {
    let server = MockServer::start().await;
    Mock::given(path("/conversations.invite"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": false, "error": "already_in_channel" })))
        .mount(&server)
        .await;
    Mock::given(path("/conversations.kick"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": false, "error": "cant_kick_self" })))
        .mount(&server)
        .await;

    let c = client(&server);
    assert_eq!(c.invite("C1", "W012A3CDE").await, Ok(()));
    assert_eq!(c.remove("C1", "U023BECGF").await, Err(SlackError::Api("cant_kick_self".into())));
}

#[tokio::test]
async fn rate_limit_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(path("/conversations.setTopic"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
        .mount(&server)
        .await;

    let err = client(&server).set_topic("C1", "t").await.unwrap_err();
    assert_eq!(err, SlackError::RateLimited { retry_after: Some(Duration::from_secs(30)) });
    assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
}

#[tokio::test]
async fn find_by_name_scans_archived_pages() {
    let server = MockServer::start().await;
    Mock::given(path("/conversations.list"))
        .and(body_string_contains("cursor=next"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "channels": [ { "id": "C9", "name": "name-taken", "is_archived": true } ],
            "response_metadata": { "next_cursor": "" }
        })))
        .mount(&server)
        .await;
    Mock::given(path("/conversations.list"))
        .and(body_string_contains("exclude_archived=false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "channels": [ { "id": "C1", "name": "general" } ],
            "response_metadata": { "next_cursor": "next" }
        })))
        .mount(&server)
        .await;

    let c = client(&server);
    let found = c.find_channel_by_name("name-taken").await.unwrap().unwrap();
    assert_eq!(found.id, "C9");
    assert!(found.is_archived);
}

#[tokio::test]
async fn server_errors_are_transport_failures() {
    let server = MockServer::start().await;
    Mock::given(path("/conversations.rename"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = client(&server).rename_channel("C1", "x").await.unwrap_err();
    assert!(matches!(err, SlackError::Transport(_)), "err={:?}", err);
}
