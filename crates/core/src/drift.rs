//! Drift detection between what Slack reports and what the record asks for.

use serde::{Deserialize, Serialize};

use crate::membership::{Member, MembershipPlan};
use crate::normalize::observed_matches;

/// The comparable scalar fields of a channel, on either side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelFields {
    pub name: String,
    pub is_private: bool,
    pub topic: String,
    pub description: String,
}

/// Channel as last read from Slack, members already resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedState {
    pub fields: ChannelFields,
    pub members: Vec<Member>,
}

/// Channel as the record wants it, members already resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredState {
    pub fields: ChannelFields,
    pub members: Vec<Member>,
}

/// Per-field drift report. Privacy is deliberately absent: it is immutable
/// and checked with [`privacy_changed`] instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Drift {
    pub name: bool,
    pub topic: bool,
    pub description: bool,
    pub membership: MembershipPlan,
}

impl Drift {
    pub fn is_none(&self) -> bool {
        !self.name && !self.topic && !self.description && self.membership.is_converged()
    }

    /// Names of drifted fields, in correction order.
    pub fn fields(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.name { out.push("name"); }
        if self.topic { out.push("topic"); }
        if self.description { out.push("description"); }
        if !self.membership.to_invite.is_empty() { out.push("invite"); }
        if !self.membership.to_remove.is_empty() { out.push("remove"); }
        out
    }
}

pub fn detect(observed: &ObservedState, desired: &DesiredState) -> Drift {
    Drift {
        name: !observed_matches(&observed.fields.name, &desired.fields.name),
        topic: !observed_matches(&observed.fields.topic, &desired.fields.topic),
        description: !observed_matches(&observed.fields.description, &desired.fields.description),
        membership: MembershipPlan::compute(&desired.members, &observed.members),
    }
}

pub fn has_drift(observed: &ObservedState, desired: &DesiredState) -> bool {
    !detect(observed, desired).is_none()
}

pub fn privacy_changed(observed: &ChannelFields, desired: &ChannelFields) -> bool {
    observed.is_private != desired.is_private
}
