//! Huddle core: the pure half of channel reconciliation.
//!
//! Nothing in here talks to Slack or Kubernetes. The controller feeds observed
//! and desired state in and gets plans, drift reports and conditions back.

#![forbid(unsafe_code)]

pub mod condition;
pub mod drift;
pub mod finalizer;
pub mod membership;
pub mod normalize;

/// Opaque Slack conversation identifier (e.g. `C0EAQDV4Z`).
pub type ChannelId = String;

/// Opaque Slack user identifier (e.g. `W012A3CDE`).
pub type MemberId = String;

pub mod prelude {
    pub use super::condition::{Condition, ConditionStatus};
    pub use super::drift::{has_drift, ChannelFields, DesiredState, Drift, ObservedState};
    pub use super::finalizer::FinalizerSet;
    pub use super::membership::{reconcile_membership, IdentityResolver, Member, MembershipPlan, ResolveError, ResolvedMembership};
    pub use super::{ChannelId, MemberId};
}
