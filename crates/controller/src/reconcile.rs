//! The per-record state machine: Absent -> Provisioning -> Synced ->
//! Deleting -> Gone.
//!
//! A pass re-reads the record by key, so stale or duplicate triggers are
//! harmless. Each external write is preceded by a fresh read made in the same
//! pass; a converged channel costs reads only.

use std::sync::Arc;

use huddle_api::{Channel, ObjectKey};
use huddle_core::drift::{self, DesiredState, ObservedState};
use huddle_core::membership::reconcile_membership;
use huddle_kubehub::ChannelStore;
use huddle_slack::{SlackError, SlackService};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::guard::{Guard, SlackResolver};
use crate::{status, Outcome, Phase, ReconcileError, Settings};

#[derive(Clone)]
pub struct Reconciler {
    slack: Arc<dyn SlackService>,
    store: Arc<dyn ChannelStore>,
    settings: Settings,
}

impl Reconciler {
    pub fn new(slack: Arc<dyn SlackService>, store: Arc<dyn ChannelStore>, settings: Settings) -> Self {
        Self { slack, store, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// One pass over the record at `key`.
    ///
    /// Domain failures are written to the record as a `ReconcileError`
    /// condition and come back as an `Outcome` with a requeue delay. Store
    /// errors and cancellation are returned as `Err` for the runtime to handle.
    pub async fn reconcile(&self, key: &ObjectKey, cancel: &CancellationToken) -> Result<Outcome, ReconcileError> {
        let guard = Guard::new(cancel);
        let Some(mut record) = guard.call(self.store.get(key)).await? else {
            debug!(key = %key, "record not found");
            return Ok(Outcome::done(Phase::Gone));
        };

        if record.is_deleting() {
            return self.finalize(&mut record, &guard).await;
        }

        self.ensure_finalizer(&mut record, &guard).await?;

        let phase = if record.external_id().is_empty() { Phase::Absent } else { Phase::Provisioning };
        match self.sync(&mut record, &guard).await {
            Ok(()) => {
                status::report_success(self.store.as_ref(), &guard, &mut record).await?;
                info!(key = %key, id = %record.external_id(), "channel in sync");
                Ok(Outcome::done(Phase::Synced))
            }
            Err(e) => {
                // creation may have succeeded before the failure
                let phase = if phase == Phase::Absent && !record.external_id().is_empty() { Phase::Provisioning } else { phase };
                self.fail(&mut record, &guard, phase, e).await
            }
        }
    }

    async fn fail(&self, record: &mut Channel, guard: &Guard<'_>, phase: Phase, e: ReconcileError) -> Result<Outcome, ReconcileError> {
        if !e.is_reportable() {
            return Err(e);
        }
        let message = e.to_string();
        let requeue_after = e.requeue_after(&self.settings);
        warn!(key = %record.key(), phase = %phase, error = %message, requeue_after = ?requeue_after, "reconcile failed");
        status::report_failure(self.store.as_ref(), guard, record, &message).await?;
        Ok(Outcome::failed(phase, message, requeue_after))
    }

    async fn ensure_finalizer(&self, record: &mut Channel, guard: &Guard<'_>) -> Result<(), ReconcileError> {
        let mut finalizers = record.finalizer_set();
        if !finalizers.ensure_present(&self.settings.finalizer) {
            return Ok(());
        }
        debug!(key = %record.key(), finalizer = %self.settings.finalizer, "adding finalizer");
        let stored = guard.call(self.store.patch_finalizers(record, finalizers.to_vec())).await?;
        *record = stored;
        Ok(())
    }

    async fn finalize(&self, record: &mut Channel, guard: &Guard<'_>) -> Result<Outcome, ReconcileError> {
        let mut finalizers = record.finalizer_set();
        if !finalizers.contains(&self.settings.finalizer) {
            debug!(key = %record.key(), "deleting without our finalizer");
            return Ok(Outcome::done(Phase::Gone));
        }

        let id = record.external_id().to_string();
        if id.is_empty() {
            debug!(key = %record.key(), "channel never created; nothing to archive");
        } else {
            match guard.call(self.slack.archive(&id)).await {
                Ok(()) => info!(key = %record.key(), id = %id, "channel archived"),
                Err(ReconcileError::Slack(e)) if e.is_gone() => {
                    debug!(key = %record.key(), id = %id, reason = %e, "channel already gone")
                }
                Err(e) => return self.fail(record, guard, Phase::Deleting, e).await,
            }
        }

        finalizers.ensure_absent(&self.settings.finalizer);
        guard.call(self.store.patch_finalizers(record, finalizers.to_vec())).await?;
        info!(key = %record.key(), "finalizer released");
        Ok(Outcome::done(Phase::Gone))
    }

    async fn sync(&self, record: &mut Channel, guard: &Guard<'_>) -> Result<(), ReconcileError> {
        record.spec.validate()?;
        if record.external_id().is_empty() {
            let id = self.provision(record, guard).await?;
            status::record_id(self.store.as_ref(), guard, record, &id).await?;
        }
        let id = record.external_id().to_string();
        self.converge(record, &id, guard).await
    }

    /// Create the channel, or adopt the one already holding its name.
    async fn provision(&self, record: &Channel, guard: &Guard<'_>) -> Result<String, ReconcileError> {
        let spec = &record.spec;
        match guard.call(self.slack.create_channel(&spec.name, spec.private)).await {
            Ok(id) => {
                info!(key = %record.key(), name = %spec.name, id = %id, "channel created");
                Ok(id)
            }
            Err(ReconcileError::Slack(SlackError::NameTaken)) => {
                let Some(existing) = guard.call(self.slack.find_channel_by_name(&spec.name)).await? else {
                    return Err(SlackError::NameTaken.into());
                };
                if existing.is_archived {
                    guard.call(self.slack.unarchive(&existing.id)).await?;
                }
                info!(key = %record.key(), name = %spec.name, id = %existing.id, was_archived = existing.is_archived, "adopted existing channel");
                Ok(existing.id)
            }
            Err(e) => Err(e),
        }
    }

    async fn converge(&self, record: &Channel, id: &str, guard: &Guard<'_>) -> Result<(), ReconcileError> {
        let info = guard.call(self.slack.channel_info(id)).await?;
        let desired_fields = record.spec.fields();
        if drift::privacy_changed(&info.fields(), &desired_fields) {
            return Err(ReconcileError::ImmutableField {
                field: "private",
                observed: info.is_private.to_string(),
                desired: desired_fields.is_private.to_string(),
            });
        }
        if info.is_archived {
            info!(key = %record.key(), id = %id, "unarchiving channel");
            guard.call(self.slack.unarchive(id)).await?;
        }

        let member_ids = guard.call(self.slack.list_members(id)).await?;
        let resolver = SlackResolver::new(self.slack.as_ref(), *guard);
        let resolved = reconcile_membership(&resolver, &record.spec.user_emails(), &member_ids)
            .await
            .map_err(|e| guard.resolve_error(e))?;

        let observed = ObservedState { fields: info.fields(), members: resolved.observed };
        let desired = DesiredState { fields: desired_fields, members: resolved.desired };
        let drift = drift::detect(&observed, &desired);
        if drift.is_none() {
            return Ok(());
        }
        info!(key = %record.key(), id = %id, fields = ?drift.fields(), "correcting drift");

        if drift.name {
            guard.call(self.slack.rename_channel(id, &desired.fields.name)).await?;
        }
        if drift.topic {
            guard.call(self.slack.set_topic(id, &desired.fields.topic)).await?;
        }
        if drift.description {
            guard.call(self.slack.set_description(id, &desired.fields.description)).await?;
        }
        for m in &drift.membership.to_invite {
            debug!(id = %id, member = %m.id, "inviting");
            guard.call(self.slack.invite(id, &m.id)).await?;
        }
        for m in &drift.membership.to_remove {
            debug!(id = %id, member = %m.id, "removing");
            guard.call(self.slack.remove(id, &m.id)).await?;
        }
        Ok(())
    }
}
