//! Status conditions. A record carries exactly one: the outcome of the last
//! reconcile.

use chrono::{SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const RECONCILE_SUCCESS: &str = "ReconcileSuccess";
pub const RECONCILE_ERROR: &str = "ReconcileError";
pub const REASON_SUCCESSFUL: &str = "Successful";
pub const REASON_FAILED: &str = "Failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub r#type: String,
    pub status: ConditionStatus,
    /// Short machine token, e.g. `Successful` or `Failed`.
    pub reason: String,
    #[serde(default)]
    pub message: String,
    /// RFC 3339, second precision.
    pub last_transition_time: String,
}

impl Condition {
    pub fn success() -> Self {
        Self {
            r#type: RECONCILE_SUCCESS.to_string(),
            status: ConditionStatus::True,
            reason: REASON_SUCCESSFUL.to_string(),
            message: String::new(),
            last_transition_time: now_rfc3339(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            r#type: RECONCILE_ERROR.to_string(),
            status: ConditionStatus::True,
            reason: REASON_FAILED.to_string(),
            message: message.into(),
            last_transition_time: now_rfc3339(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.r#type == RECONCILE_SUCCESS && self.status == ConditionStatus::True
    }

    /// Same outcome, ignoring when it happened.
    pub fn same_state(&self, other: &Condition) -> bool {
        self.r#type == other.r#type
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// Replace the whole set with `next`. If the single current condition already
/// describes the same outcome its timestamp is kept, so callers can compare
/// the result with `current` to decide whether a write is needed.
pub fn replace(current: &[Condition], next: Condition) -> Vec<Condition> {
    match current {
        [only] if only.same_state(&next) => vec![only.clone()],
        _ => vec![next],
    }
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
