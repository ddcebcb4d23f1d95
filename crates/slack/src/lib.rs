//! Huddle Slack: the channel capability the controller drives.
//!
//! `SlackService` is the single seam between reconciliation and Slack. Calls
//! are plain request/response with no retry of their own; the controller
//! decides what a failure means.

#![forbid(unsafe_code)]

use std::time::Duration;

use huddle_core::drift::ChannelFields;
use huddle_core::membership::Member;
use huddle_core::{ChannelId, MemberId};
use serde::{Deserialize, Serialize};

pub mod mock;
mod web;

pub use web::{WebApiClient, WebApiConfig, DEFAULT_BASE_URL};

/// A conversation as Slack reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub name: String,
    pub is_private: bool,
    pub is_archived: bool,
    pub topic: String,
    /// Slack calls this the channel "purpose".
    pub description: String,
}

impl ChannelInfo {
    pub fn fields(&self) -> ChannelFields {
        ChannelFields {
            name: self.name.clone(),
            is_private: self.is_private,
            topic: self.topic.clone(),
            description: self.description.clone(),
        }
    }
}

/// Failure kinds the controller distinguishes. `Display` starts with the
/// Slack error code, which is what ends up in condition messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlackError {
    #[error("name_taken")]
    NameTaken,
    #[error("channel_not_found")]
    ChannelNotFound,
    #[error("already_archived")]
    AlreadyArchived,
    #[error("users_not_found: {0}")]
    UserNotFound(String),
    #[error("ratelimited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("{0}")]
    Api(String),
    #[error("transport: {0}")]
    Transport(String),
}

impl SlackError {
    /// Map a Slack `error` code; `subject` names the user for lookup failures.
    pub fn from_code(code: &str, subject: &str) -> Self {
        match code {
            "name_taken" => Self::NameTaken,
            "channel_not_found" => Self::ChannelNotFound,
            "already_archived" => Self::AlreadyArchived,
            "users_not_found" | "user_not_found" => Self::UserNotFound(subject.to_string()),
            "ratelimited" => Self::RateLimited { retry_after: None },
            other => Self::Api(other.to_string()),
        }
    }

    /// Short machine token for metrics labels.
    pub fn code(&self) -> &str {
        match self {
            Self::NameTaken => "name_taken",
            Self::ChannelNotFound => "channel_not_found",
            Self::AlreadyArchived => "already_archived",
            Self::UserNotFound(_) => "users_not_found",
            Self::RateLimited { .. } => "ratelimited",
            Self::Api(code) => code.as_str(),
            Self::Transport(_) => "transport",
        }
    }

    /// The channel no longer exists in a usable form; archive treats this as done.
    pub fn is_gone(&self) -> bool {
        matches!(self, Self::ChannelNotFound | Self::AlreadyArchived)
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

pub type SlackResult<T> = Result<T, SlackError>;

/// Everything reconciliation needs from Slack.
#[async_trait::async_trait]
pub trait SlackService: Send + Sync {
    /// Create a conversation; `NameTaken` when the name is in use (archived or not).
    async fn create_channel(&self, name: &str, is_private: bool) -> SlackResult<ChannelId>;

    async fn channel_info(&self, channel: &str) -> SlackResult<ChannelInfo>;

    /// Look a conversation up by name, archived ones included.
    async fn find_channel_by_name(&self, name: &str) -> SlackResult<Option<ChannelInfo>>;

    async fn rename_channel(&self, channel: &str, name: &str) -> SlackResult<()>;
    async fn set_topic(&self, channel: &str, topic: &str) -> SlackResult<()>;
    async fn set_description(&self, channel: &str, description: &str) -> SlackResult<()>;

    async fn list_members(&self, channel: &str) -> SlackResult<Vec<MemberId>>;

    /// Email -> identity; `UserNotFound` when nobody has that email.
    async fn lookup_user_by_email(&self, email: &str) -> SlackResult<Member>;

    /// Id -> identity, used to tell bots apart from people.
    async fn user_info(&self, user: &str) -> SlackResult<Member>;

    /// Already being a member is success.
    async fn invite(&self, channel: &str, user: &str) -> SlackResult<()>;

    /// Not being a member is success.
    async fn remove(&self, channel: &str, user: &str) -> SlackResult<()>;

    async fn archive(&self, channel: &str) -> SlackResult<()>;

    /// Unarchiving a live channel is success.
    async fn unarchive(&self, channel: &str) -> SlackResult<()>;
}
