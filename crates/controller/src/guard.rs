//! Cancellation for external calls.
//!
//! Every Slack or store future is raced against the invocation's token. Once
//! the token fires the pending future is dropped and no new call starts.

use std::future::Future;

use huddle_core::membership::{IdentityResolver, Member, ResolveError};
use huddle_slack::{SlackError, SlackService};
use tokio_util::sync::CancellationToken;

use crate::ReconcileError;

#[derive(Clone, Copy)]
pub(crate) struct Guard<'a> {
    cancel: &'a CancellationToken,
}

impl<'a> Guard<'a> {
    pub(crate) fn new(cancel: &'a CancellationToken) -> Self {
        Self { cancel }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) async fn call<T, E, F>(&self, fut: F) -> Result<T, ReconcileError>
    where
        F: Future<Output = Result<T, E>>,
        ReconcileError: From<E>,
    {
        if self.cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ReconcileError::Cancelled),
            res = fut => res.map_err(ReconcileError::from),
        }
    }

    /// Resolution errors lose their cause on cancellation; recover it here.
    pub(crate) fn resolve_error(&self, e: ResolveError) -> ReconcileError {
        if self.is_cancelled() {
            ReconcileError::Cancelled
        } else {
            ReconcileError::Resolve(e)
        }
    }
}

/// Identity lookups through Slack, under the same cancellation.
pub(crate) struct SlackResolver<'a> {
    slack: &'a dyn SlackService,
    guard: Guard<'a>,
}

impl<'a> SlackResolver<'a> {
    pub(crate) fn new(slack: &'a dyn SlackService, guard: Guard<'a>) -> Self {
        Self { slack, guard }
    }
}

fn lookup_error(e: ReconcileError, not_found: impl FnOnce(String) -> ResolveError) -> ResolveError {
    match e {
        ReconcileError::Slack(SlackError::UserNotFound(who)) => not_found(who),
        ReconcileError::Slack(SlackError::RateLimited { retry_after }) => ResolveError::RateLimited { retry_after },
        other => ResolveError::Unavailable(other.to_string()),
    }
}

#[async_trait::async_trait]
impl<'a> IdentityResolver for SlackResolver<'a> {
    async fn resolve_email(&self, email: &str) -> Result<Member, ResolveError> {
        self.guard
            .call(self.slack.lookup_user_by_email(email))
            .await
            .map_err(|e| lookup_error(e, ResolveError::UserNotFound))
    }

    async fn resolve_id(&self, id: &str) -> Result<Member, ResolveError> {
        self.guard
            .call(self.slack.user_info(id))
            .await
            .map_err(|e| lookup_error(e, ResolveError::MemberNotFound))
    }
}
