use std::time::Duration;

use huddle_api::SpecError;
use huddle_core::membership::ResolveError;
use huddle_kubehub::StoreError;
use huddle_slack::SlackError;

use crate::Settings;

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Slack(#[from] SlackError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Spec(#[from] SpecError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("immutable_field: {field} cannot change after the channel is created (is {observed}, wants {desired})")]
    ImmutableField { field: &'static str, observed: String, desired: String },
    #[error("cancelled")]
    Cancelled,
}

impl ReconcileError {
    /// Failures recorded as a condition on the record. Store errors and
    /// cancellation go back to the runtime instead.
    pub fn is_reportable(&self) -> bool {
        !matches!(self, Self::Store(_) | Self::Cancelled)
    }

    /// Delay before the next attempt after a reported failure; `None` when
    /// only a spec change can help.
    pub fn requeue_after(&self, settings: &Settings) -> Option<Duration> {
        match self {
            Self::ImmutableField { .. } => None,
            Self::Slack(e) => Some(e.retry_after().unwrap_or(settings.error_requeue)),
            Self::Resolve(ResolveError::RateLimited { retry_after }) => Some(retry_after.unwrap_or(settings.error_requeue)),
            Self::Store(_) => Some(settings.conflict_requeue),
            _ => Some(settings.error_requeue),
        }
    }
}
