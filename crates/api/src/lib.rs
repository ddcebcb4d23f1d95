//! Huddle API: the `Channel` custom resource (`slack.huddle.io/v1alpha1`).
//!
//! The record is owned by the API server. The controller only reads it and
//! patches `status` and `metadata.finalizers`.

#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use huddle_core::condition::Condition;
use huddle_core::drift::ChannelFields;
use huddle_core::finalizer::FinalizerSet;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

mod validate;

pub use validate::SpecError;

pub const GROUP: &str = "slack.huddle.io";
pub const VERSION: &str = "v1alpha1";

/// Default finalizer token guarding channel cleanup.
pub const CHANNEL_FINALIZER: &str = "slack.huddle.io/channel";

/// Desired state of a Slack channel.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "slack.huddle.io",
    version = "v1alpha1",
    kind = "Channel",
    plural = "channels",
    shortname = "slackch",
    namespaced,
    status = "ChannelStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Channel","type":"string","jsonPath":".spec.name"}"#,
    printcolumn = r#"{"name":"Private","type":"boolean","jsonPath":".spec.private"}"#,
    printcolumn = r#"{"name":"ID","type":"string","jsonPath":".status.id"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSpec {
    /// Slack channel name.
    pub name: String,
    /// Private channels cannot become public later, and vice versa.
    #[serde(default)]
    pub private: bool,
    /// Emails of users that should be members.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<String>,
    /// Channel description (Slack "purpose").
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub topic: String,
}

/// Observed state of a Slack channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStatus {
    /// Slack conversation id, empty until the channel exists.
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl ChannelSpec {
    pub fn fields(&self) -> ChannelFields {
        ChannelFields {
            name: self.name.clone(),
            is_private: self.private,
            topic: self.topic.clone(),
            description: self.description.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), SpecError> {
        validate::spec(self)
    }

    /// Users normalized for comparison.
    pub fn user_emails(&self) -> std::collections::BTreeSet<String> {
        huddle_core::membership::desired_emails(&self.users)
    }
}

impl Channel {
    pub fn key(&self) -> ObjectKey {
        ObjectKey { namespace: self.namespace().unwrap_or_default(), name: self.name_any() }
    }

    /// Slack id recorded in status; empty when not created yet.
    pub fn external_id(&self) -> &str {
        self.status.as_ref().map(|s| s.id.as_str()).unwrap_or("")
    }

    pub fn conditions(&self) -> &[Condition] {
        self.status.as_ref().map(|s| s.conditions.as_slice()).unwrap_or(&[])
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn finalizer_set(&self) -> FinalizerSet {
        FinalizerSet::from(self.metadata.finalizers.as_ref())
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.metadata.resource_version.as_deref()
    }
}

/// Namespace/name identity of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), name: name.into() }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for ObjectKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => Ok(Self::new(ns, name)),
            _ => Err(format!("invalid key: {} (expect namespace/name)", s)),
        }
    }
}

/// Build a record the way an external actor would submit it.
pub fn new_channel(namespace: &str, name: &str, spec: ChannelSpec) -> Channel {
    let mut ch = Channel::new(name, spec);
    ch.metadata.namespace = Some(namespace.to_string());
    ch
}
