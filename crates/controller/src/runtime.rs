//! kube-runtime wiring: watch `Channel` records and drive the reconciler.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context as _, Result};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use huddle_api::Channel;
use huddle_kubehub::{StoreError, WatchScope};
use kube::api::{Api, ListParams};
use kube::runtime::controller::{self, Action, Controller};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher;
use kube::{Client, ResourceExt};
use metrics::{counter, histogram};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{Outcome, ReconcileError, Reconciler};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub scope: WatchScope,
    /// Distinct records reconciled in parallel, per watched namespace.
    pub concurrency: u16,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { scope: WatchScope::All, concurrency: 4 }
    }
}

struct Context {
    reconciler: Reconciler,
    shutdown: CancellationToken,
}

/// Requeue decision for a pass that returned normally.
pub fn action_for(outcome: &Outcome) -> Action {
    match outcome.requeue_after {
        Some(delay) => Action::requeue(delay),
        None => Action::await_change(),
    }
}

/// Requeue decision for a pass that bailed out.
pub fn error_action(err: &ReconcileError, reconciler: &Reconciler) -> Action {
    let settings = reconciler.settings();
    match err {
        ReconcileError::Cancelled => Action::await_change(),
        ReconcileError::Store(_) => Action::requeue(settings.conflict_requeue),
        _ => Action::requeue(settings.error_requeue),
    }
}

async fn reconcile(obj: Arc<Channel>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let key = obj.key();
    let t0 = Instant::now();
    let cancel = ctx.shutdown.child_token();
    let res = ctx.reconciler.reconcile(&key, &cancel).await;
    histogram!("reconcile_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
    match &res {
        Ok(outcome) => {
            counter!("reconcile_total", 1, "phase" => outcome.phase.as_str());
            if outcome.is_failure() {
                counter!("reconcile_failed_total", 1, "phase" => outcome.phase.as_str());
            }
            debug!(key = %key, phase = %outcome.phase, requeue_after = ?outcome.requeue_after, "reconciled");
        }
        Err(e) => {
            counter!("reconcile_total", 1, "phase" => "error");
            counter!("reconcile_failed_total", 1, "phase" => "error");
            debug!(key = %key, error = %e, "reconcile returned error");
        }
    }
    res.map(|outcome| action_for(&outcome))
}

fn error_policy(obj: Arc<Channel>, err: &ReconcileError, ctx: Arc<Context>) -> Action {
    match err {
        ReconcileError::Cancelled => debug!(name = %obj.name_any(), "reconcile cancelled"),
        ReconcileError::Store(StoreError::Conflict(_)) => {
            debug!(name = %obj.name_any(), error = %err, "conflict; retrying shortly")
        }
        _ => warn!(name = %obj.name_any(), ns = ?obj.namespace(), error = %err, "reconcile error"),
    }
    error_action(err, &ctx.reconciler)
}

fn apis(client: &Client, scope: &WatchScope) -> Vec<Api<Channel>> {
    match scope {
        WatchScope::All => vec![Api::all(client.clone())],
        WatchScope::Namespaces(ns) => ns.iter().map(|n| Api::namespaced(client.clone(), n)).collect(),
    }
}

/// Run until `shutdown` fires and in-flight passes drain.
pub async fn run(reconciler: Reconciler, client: Client, opts: RunOptions, shutdown: CancellationToken) -> Result<()> {
    let apis = apis(&client, &opts.scope);
    for api in &apis {
        api.list(&ListParams::default().limit(1))
            .await
            .context("listing channels.slack.huddle.io; is the CRD installed? (huddlectl crd | kubectl apply -f -)")?;
    }

    let ctx = Arc::new(Context { reconciler, shutdown: shutdown.clone() });
    let cfg = controller::Config::default().concurrency(opts.concurrency);
    type Item = Result<(ObjectRef<Channel>, Action), controller::Error<ReconcileError, watcher::Error>>;
    let streams: Vec<BoxStream<'static, Item>> = apis
        .into_iter()
        .map(|api| {
            Controller::new(api, watcher::Config::default().any_semantic())
                .with_config(cfg.clone())
                .graceful_shutdown_on(shutdown.clone().cancelled_owned())
                .run(reconcile, error_policy, ctx.clone())
                .boxed()
        })
        .collect();

    info!(scope = %opts.scope.describe(), concurrency = opts.concurrency, "channel controller started");
    let mut merged = stream::select_all(streams);
    while let Some(item) = merged.next().await {
        match item {
            Ok((obj, action)) => debug!(object = %obj, ?action, "pass complete"),
            Err(controller::Error::ReconcilerFailed(_, _)) => {}
            Err(e) => warn!(error = %e, "controller stream error"),
        }
    }
    info!("channel controller stopped");
    Ok(())
}
