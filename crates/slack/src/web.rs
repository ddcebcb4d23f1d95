//! Slack Web API client over reqwest.
//!
//! Every method is a form-encoded POST to `{base_url}/{method}` with a bearer
//! token. Slack answers `200 {"ok": false, "error": code}` for API errors and
//! `429` with `Retry-After` when throttling.

use std::time::{Duration, Instant};

use huddle_core::membership::Member;
use huddle_core::normalize::observed_matches;
use huddle_core::{ChannelId, MemberId};
use metrics::{counter, histogram};
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value as Json;
use tracing::{debug, warn};

use crate::{ChannelInfo, SlackError, SlackResult, SlackService};

pub const DEFAULT_BASE_URL: &str = "https://slack.com/api";

/// Page size for cursor-paginated methods.
const PAGE_LIMIT: &str = "200";
/// Hard stop for pagination in case Slack keeps handing back cursors.
const MAX_PAGES: usize = 500;
/// Slackbot is a built-in user that does not carry `is_bot`.
const SLACKBOT_ID: &str = "USLACKBOT";

#[derive(Debug, Clone)]
pub struct WebApiConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for WebApiConfig {
    fn default() -> Self {
        Self { base_url: DEFAULT_BASE_URL.to_string(), timeout: Duration::from_secs(30) }
    }
}

#[derive(Debug, Clone)]
pub struct WebApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl WebApiClient {
    pub fn new(token: impl Into<String>, config: WebApiConfig) -> SlackResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SlackError::Transport(format!("building http client: {}", e)))?;
        Ok(Self { http, base_url: config.base_url.trim_end_matches('/').to_string(), token: token.into() })
    }

    async fn call<T: DeserializeOwned>(&self, method: &'static str, params: &[(&str, &str)], subject: &str) -> SlackResult<T> {
        let t0 = Instant::now();
        counter!("slack_calls_total", 1, "method" => method);
        let res = self.call_inner(method, params, subject).await;
        histogram!("slack_call_latency_ms", t0.elapsed().as_secs_f64() * 1000.0, "method" => method);
        if let Err(e) = &res {
            counter!("slack_errors_total", 1, "method" => method, "code" => e.code().to_string());
            debug!(method, error = %e, "slack call failed");
        }
        res
    }

    async fn call_inner<T: DeserializeOwned>(&self, method: &'static str, params: &[(&str, &str)], subject: &str) -> SlackResult<T> {
        let url = format!("{}/{}", self.base_url, method);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .form(params)
            .send()
            .await
            .map_err(|e| SlackError::Transport(format!("{}: {}", method, e)))?;

        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            warn!(method, ?retry_after, "slack rate limit hit");
            return Err(SlackError::RateLimited { retry_after });
        }
        if !resp.status().is_success() {
            return Err(SlackError::Transport(format!("{}: http {}", method, resp.status())));
        }

        let body: Json = resp.json().await.map_err(|e| SlackError::Transport(format!("{}: decoding body: {}", method, e)))?;
        if body.get("ok").and_then(Json::as_bool) != Some(true) {
            let code = body.get("error").and_then(Json::as_str).unwrap_or("unknown_error");
            return Err(SlackError::from_code(code, subject));
        }
        serde_json::from_value(body).map_err(|e| SlackError::Transport(format!("{}: unexpected response shape: {}", method, e)))
    }

    /// Run a write whose "already done" code should count as success.
    async fn call_tolerating(&self, method: &'static str, params: &[(&str, &str)], subject: &str, done_code: &str) -> SlackResult<()> {
        match self.call::<Ack>(method, params, subject).await {
            Ok(_) => Ok(()),
            Err(SlackError::Api(code)) if code == done_code => {
                debug!(method, code = %code, "already in desired state");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[derive(Deserialize)]
struct Ack {}

#[derive(Deserialize)]
struct ChannelEnvelope {
    channel: RawChannel,
}

#[derive(Deserialize)]
struct RawChannel {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    is_private: bool,
    #[serde(default)]
    is_archived: bool,
    #[serde(default)]
    topic: Option<RawText>,
    #[serde(default)]
    purpose: Option<RawText>,
}

#[derive(Deserialize)]
struct RawText {
    #[serde(default)]
    value: String,
}

impl From<RawChannel> for ChannelInfo {
    fn from(c: RawChannel) -> Self {
        ChannelInfo {
            id: c.id,
            name: c.name,
            is_private: c.is_private,
            is_archived: c.is_archived,
            topic: c.topic.map(|t| t.value).unwrap_or_default(),
            description: c.purpose.map(|t| t.value).unwrap_or_default(),
        }
    }
}

#[derive(Deserialize, Default)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Deserialize)]
struct MembersPage {
    #[serde(default)]
    members: Vec<String>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Deserialize)]
struct ChannelsPage {
    #[serde(default)]
    channels: Vec<RawChannel>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Deserialize)]
struct UserEnvelope {
    user: RawUser,
}

#[derive(Deserialize)]
struct RawUser {
    id: String,
    #[serde(default)]
    is_bot: bool,
    #[serde(default)]
    profile: Option<RawProfile>,
}

#[derive(Deserialize)]
struct RawProfile {
    #[serde(default)]
    email: Option<String>,
}

impl From<RawUser> for Member {
    fn from(u: RawUser) -> Self {
        let is_bot = u.is_bot || u.id == SLACKBOT_ID;
        Member { email: u.profile.and_then(|p| p.email), id: u.id, is_bot }
    }
}

fn next_cursor(meta: Option<ResponseMetadata>) -> Option<String> {
    meta.map(|m| m.next_cursor).filter(|c| !c.is_empty())
}

#[async_trait::async_trait]
impl SlackService for WebApiClient {
    async fn create_channel(&self, name: &str, is_private: bool) -> SlackResult<ChannelId> {
        let private = if is_private { "true" } else { "false" };
        let env: ChannelEnvelope = self.call("conversations.create", &[("name", name), ("is_private", private)], name).await?;
        debug!(name, id = %env.channel.id, "created channel");
        Ok(env.channel.id)
    }

    async fn channel_info(&self, channel: &str) -> SlackResult<ChannelInfo> {
        let env: ChannelEnvelope = self.call("conversations.info", &[("channel", channel)], channel).await?;
        Ok(env.channel.into())
    }

    async fn find_channel_by_name(&self, name: &str) -> SlackResult<Option<ChannelInfo>> {
        let mut cursor = String::new();
        for _ in 0..MAX_PAGES {
            let mut params = vec![
                ("types", "public_channel,private_channel"),
                ("exclude_archived", "false"),
                ("limit", PAGE_LIMIT),
            ];
            if !cursor.is_empty() {
                params.push(("cursor", cursor.as_str()));
            }
            let page: ChannelsPage = self.call("conversations.list", &params, name).await?;
            if let Some(found) = page.channels.into_iter().find(|c| observed_matches(&c.name, name)) {
                return Ok(Some(found.into()));
            }
            match next_cursor(page.response_metadata) {
                Some(next) => cursor = next,
                None => return Ok(None),
            }
        }
        warn!(name, "conversations.list pagination limit reached");
        Ok(None)
    }

    async fn rename_channel(&self, channel: &str, name: &str) -> SlackResult<()> {
        self.call::<Ack>("conversations.rename", &[("channel", channel), ("name", name)], name).await.map(|_| ())
    }

    async fn set_topic(&self, channel: &str, topic: &str) -> SlackResult<()> {
        self.call::<Ack>("conversations.setTopic", &[("channel", channel), ("topic", topic)], channel).await.map(|_| ())
    }

    async fn set_description(&self, channel: &str, description: &str) -> SlackResult<()> {
        self.call::<Ack>("conversations.setPurpose", &[("channel", channel), ("purpose", description)], channel).await.map(|_| ())
    }

    async fn list_members(&self, channel: &str) -> SlackResult<Vec<MemberId>> {
        let mut out = Vec::new();
        let mut cursor = String::new();
        for _ in 0..MAX_PAGES {
            let mut params = vec![("channel", channel), ("limit", PAGE_LIMIT)];
            if !cursor.is_empty() {
                params.push(("cursor", cursor.as_str()));
            }
            let page: MembersPage = self.call("conversations.members", &params, channel).await?;
            out.extend(page.members);
            match next_cursor(page.response_metadata) {
                Some(next) => cursor = next,
                None => return Ok(out),
            }
        }
        warn!(channel, "conversations.members pagination limit reached");
        Ok(out)
    }

    async fn lookup_user_by_email(&self, email: &str) -> SlackResult<Member> {
        let env: UserEnvelope = self.call("users.lookupByEmail", &[("email", email)], email).await?;
        Ok(env.user.into())
    }

    async fn user_info(&self, user: &str) -> SlackResult<Member> {
        let env: UserEnvelope = self.call("users.info", &[("user", user)], user).await?;
        Ok(env.user.into())
    }

    async fn invite(&self, channel: &str, user: &str) -> SlackResult<()> {
        self.call_tolerating("conversations.invite", &[("channel", channel), ("users", user)], user, "already_in_channel").await
    }

    async fn remove(&self, channel: &str, user: &str) -> SlackResult<()> {
        self.call_tolerating("conversations.kick", &[("channel", channel), ("user", user)], user, "not_in_channel").await
    }

    async fn archive(&self, channel: &str) -> SlackResult<()> {
        self.call::<Ack>("conversations.archive", &[("channel", channel)], channel).await.map(|_| ())
    }

    async fn unarchive(&self, channel: &str) -> SlackResult<()> {
        self.call_tolerating("conversations.unarchive", &[("channel", channel)], channel, "not_archived").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_user_maps_bot_flags() {
        let u: RawUser = serde_json::from_value(serde_json::json!({"id": "USLACKBOT"})).unwrap();
        assert!(Member::from(u).is_bot);
        let u: RawUser = serde_json::from_value(serde_json::json!({
            "id": "W012A3CDE", "is_bot": false, "profile": {"email": "iamuser@slack.com"}
        }))
        .unwrap();
        let m = Member::from(u);
        assert!(!m.is_bot);
        assert_eq!(m.email.as_deref(), Some("iamuser@slack.com"));
    }

    #[test]
    fn raw_channel_flattens_topic_and_purpose() {
        let c: RawChannel = serde_json::from_value(serde_json::json!({
            "id": "C1", "name": "proj", "is_private": true,
            "topic": {"value": "t", "creator": "U1", "last_set": 0},
            "purpose": {"value": "d", "creator": "U1", "last_set": 0}
        }))
        .unwrap();
        let info = ChannelInfo::from(c);
        assert_eq!(info.topic, "t");
        assert_eq!(info.description, "d");
        assert!(info.is_private);
        assert!(!info.is_archived);
    }

    #[test]
    fn empty_cursor_ends_pagination() {
        assert_eq!(next_cursor(Some(ResponseMetadata { next_cursor: String::new() })), None);
        assert_eq!(next_cursor(None), None);
        assert_eq!(next_cursor(Some(ResponseMetadata { next_cursor: "abc".into() })), Some("abc".into()));
    }
}
