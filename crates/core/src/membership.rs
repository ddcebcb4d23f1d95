//! Membership planning: which users to invite and which to remove so a
//! channel's member list matches the desired set of emails.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::normalize::normalize_email;
use crate::MemberId;

/// A resolved Slack identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub email: Option<String>,
    pub is_bot: bool,
}

impl Member {
    pub fn user(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self { id: id.into(), email: Some(email.into()), is_bot: false }
    }

    pub fn bot(id: impl Into<String>) -> Self {
        Self { id: id.into(), email: None, is_bot: true }
    }
}

/// Errors raised while turning emails or ids into [`Member`]s.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// No user with this email exists in the workspace.
    #[error("users_not_found: {0}")]
    UserNotFound(String),
    /// No user with this id exists in the workspace.
    #[error("user_not_found: {0}")]
    MemberNotFound(MemberId),
    /// The directory asked us to back off.
    #[error("ratelimited")]
    RateLimited { retry_after: Option<Duration> },
    /// Resolution could not be attempted (transport failure, cancellation).
    #[error("{0}")]
    Unavailable(String),
}

/// Email -> member and id -> member lookups.
#[async_trait::async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve_email(&self, email: &str) -> Result<Member, ResolveError>;
    async fn resolve_id(&self, id: &str) -> Result<Member, ResolveError>;
}

/// Symmetric difference between desired and observed membership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipPlan {
    /// Desired members that are not in the channel yet, ordered by id.
    pub to_invite: Vec<Member>,
    /// Non-bot members that are not desired, ordered by id.
    pub to_remove: Vec<Member>,
}

impl MembershipPlan {
    /// Pure planning step. Bots are never scheduled for removal.
    pub fn compute(desired: &[Member], observed: &[Member]) -> Self {
        let desired_ids: BTreeSet<&str> = desired.iter().map(|m| m.id.as_str()).collect();
        let observed_ids: BTreeSet<&str> = observed.iter().map(|m| m.id.as_str()).collect();

        let mut to_invite: BTreeMap<&str, &Member> = BTreeMap::new();
        for m in desired {
            if !observed_ids.contains(m.id.as_str()) {
                to_invite.insert(m.id.as_str(), m);
            }
        }
        let mut to_remove: BTreeMap<&str, &Member> = BTreeMap::new();
        for m in observed {
            if !m.is_bot && !desired_ids.contains(m.id.as_str()) {
                to_remove.insert(m.id.as_str(), m);
            }
        }
        Self {
            to_invite: to_invite.into_values().cloned().collect(),
            to_remove: to_remove.into_values().cloned().collect(),
        }
    }

    pub fn is_converged(&self) -> bool {
        self.to_invite.is_empty() && self.to_remove.is_empty()
    }
}

/// Desired emails, normalized and de-duplicated, in stable order.
pub fn desired_emails<'a>(emails: impl IntoIterator<Item = &'a String>) -> BTreeSet<String> {
    emails
        .into_iter()
        .map(|e| normalize_email(e))
        .filter(|e| !e.is_empty())
        .collect()
}

/// Both sides of a membership comparison after resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedMembership {
    pub desired: Vec<Member>,
    pub observed: Vec<Member>,
    pub plan: MembershipPlan,
}

/// Resolve both sides and plan. The first failed lookup aborts the whole plan:
/// a missing user must fail the reconcile rather than be skipped.
pub async fn reconcile_membership<R>(
    resolver: &R,
    desired: &BTreeSet<String>,
    observed_ids: &[MemberId],
) -> Result<ResolvedMembership, ResolveError>
where
    R: IdentityResolver + ?Sized,
{
    let mut desired_members = Vec::with_capacity(desired.len());
    for email in desired {
        desired_members.push(resolver.resolve_email(email).await?);
    }
    let unique_observed: BTreeSet<&str> = observed_ids.iter().map(String::as_str).collect();
    let mut observed_members = Vec::with_capacity(unique_observed.len());
    for id in unique_observed {
        observed_members.push(resolver.resolve_id(id).await?);
    }
    let plan = MembershipPlan::compute(&desired_members, &observed_members);
    Ok(ResolvedMembership { desired: desired_members, observed: observed_members, plan })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn ids(members: &[Member]) -> Vec<&str> {
        members.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn symmetric_difference() {
        let desired = vec![Member::user("A", "a@x.com"), Member::user("B", "b@x.com")];
        let observed = vec![Member::user("B", "b@x.com"), Member::user("C", "c@x.com")];
        let plan = MembershipPlan::compute(&desired, &observed);
        assert_eq!(ids(&plan.to_invite), vec!["A"]);
        assert_eq!(ids(&plan.to_remove), vec!["C"]);
        assert!(!plan.is_converged());
    }

    #[test]
    fn bots_are_never_removed() {
        let desired = vec![Member::user("B", "b@x.com")];
        let observed = vec![Member::user("B", "b@x.com"), Member::bot("C")];
        let plan = MembershipPlan::compute(&desired, &observed);
        assert!(plan.to_remove.is_empty());
        assert!(plan.is_converged());
    }

    #[test]
    fn order_does_not_matter() {
        let a = vec![Member::user("A", "a@x.com"), Member::user("B", "b@x.com")];
        let b = vec![Member::user("B", "b@x.com"), Member::user("A", "a@x.com")];
        assert!(MembershipPlan::compute(&a, &b).is_converged());
    }

    #[test]
    fn desired_emails_collapse_case_and_duplicates() {
        let raw = vec!["U1@x.com".to_string(), "u1@x.com ".to_string(), "".to_string()];
        let set = desired_emails(&raw);
        assert_eq!(set.into_iter().collect::<Vec<_>>(), vec!["u1@x.com".to_string()]);
    }

    struct Directory(HashMap<String, Member>);

    #[async_trait::async_trait]
    impl IdentityResolver for Directory {
        async fn resolve_email(&self, email: &str) -> Result<Member, ResolveError> {
            self.0
                .values()
                .find(|m| m.email.as_deref() == Some(email))
                .cloned()
                .ok_or_else(|| ResolveError::UserNotFound(email.to_string()))
        }
        async fn resolve_id(&self, id: &str) -> Result<Member, ResolveError> {
            self.0.get(id).cloned().ok_or_else(|| ResolveError::MemberNotFound(id.to_string()))
        }
    }

    fn directory() -> Directory {
        let mut m = HashMap::new();
        for member in [Member::user("A", "a@x.com"), Member::user("B", "b@x.com"), Member::user("C", "c@x.com"), Member::bot("BOT")] {
            m.insert(member.id.clone(), member);
        }
        Directory(m)
    }

    #[tokio::test]
    async fn resolves_and_plans() {
        let desired: BTreeSet<String> = ["a@x.com", "b@x.com"].iter().map(|s| s.to_string()).collect();
        let observed = vec!["B".to_string(), "C".to_string(), "BOT".to_string(), "C".to_string()];
        let resolved = reconcile_membership(&directory(), &desired, &observed).await.unwrap();
        assert_eq!(resolved.observed.len(), 3);
        assert_eq!(ids(&resolved.plan.to_invite), vec!["A"]);
        assert_eq!(ids(&resolved.plan.to_remove), vec!["C"]);
    }

    #[tokio::test]
    async fn unknown_email_is_an_error() {
        let desired: BTreeSet<String> = ["ghost@x.com".to_string()].into_iter().collect();
        let err = reconcile_membership(&directory(), &desired, &[]).await.unwrap_err();
        assert_eq!(err, ResolveError::UserNotFound("ghost@x.com".into()));
        assert_eq!(err.to_string(), "users_not_found: ghost@x.com");
    }
}
