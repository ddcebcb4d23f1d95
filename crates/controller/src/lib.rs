//! Huddle controller: drives Slack channels toward their `Channel` records.
//!
//! `Reconciler::reconcile` is one level-triggered pass over a single record.
//! `runtime::run` feeds it from the kube-runtime `Controller`, which keeps a
//! key from being reconciled concurrently with itself.

#![forbid(unsafe_code)]

use std::fmt;
use std::time::Duration;

use huddle_api::CHANNEL_FINALIZER;

mod error;
mod guard;
mod reconcile;
pub mod runtime;
mod status;

pub use error::ReconcileError;
pub use reconcile::Reconciler;
pub use runtime::{run, RunOptions};

/// Tunables for a reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Finalizer token this controller owns.
    pub finalizer: String,
    /// Requeue delay after a reported failure.
    pub error_requeue: Duration,
    /// Requeue delay after a store conflict.
    pub conflict_requeue: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            finalizer: CHANNEL_FINALIZER.to_string(),
            error_requeue: Duration::from_secs(15 * 60),
            conflict_requeue: Duration::from_secs(5),
        }
    }
}

/// Where a record stands after a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Record exists, channel not created yet.
    Absent,
    /// Channel exists but does not match the record yet.
    Provisioning,
    Synced,
    /// Deletion requested, cleanup not finished.
    Deleting,
    /// Record gone or released.
    Gone,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Absent => "absent",
            Phase::Provisioning => "provisioning",
            Phase::Synced => "synced",
            Phase::Deleting => "deleting",
            Phase::Gone => "gone",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a pass that did not have to bail out to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub phase: Phase,
    pub requeue_after: Option<Duration>,
    /// Message of the failure condition reported in this pass.
    pub failure: Option<String>,
}

impl Outcome {
    pub fn done(phase: Phase) -> Self {
        Self { phase, requeue_after: None, failure: None }
    }

    pub fn failed(phase: Phase, message: String, requeue_after: Option<Duration>) -> Self {
        Self { phase, requeue_after, failure: Some(message) }
    }

    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}
