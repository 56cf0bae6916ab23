//! Host loop driving reconciliation of `FlyteRegistration` objects

use flyte_registration_core::{DownloadStrategy, FlyteRegistration};
use flyte_registration_service::{ReconcileOutcome, Reconciler, ServiceError, ServiceResult};
use futures::StreamExt;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Api, Client, ResourceExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::metrics;
use crate::probes::ProbeState;

/// State shared by every reconciliation pass
pub struct Context {
    reconciler: Reconciler,
    strategy: DownloadStrategy,
    requeue_after: Duration,
    cancel: CancellationToken,
}

impl Context {
    pub fn new(reconciler: Reconciler, requeue_after: Duration, cancel: CancellationToken) -> Self {
        let strategy = reconciler.fetcher().strategy();
        Self {
            reconciler,
            strategy,
            requeue_after,
            cancel,
        }
    }
}

/// Metric label for the result of a pass
fn result_label(result: &ServiceResult<ReconcileOutcome>) -> &'static str {
    match result {
        Ok(ReconcileOutcome::Registered { .. }) => "registered",
        Ok(ReconcileOutcome::NotFound) => "not_found",
        Err(ServiceError::DownloadFailed(_)) => "download_failed",
        Err(ServiceError::RegistrationFailed { .. }) => "registration_failed",
        Err(ServiceError::Cancelled) => "cancelled",
        Err(ServiceError::Kube(_)) => "api_error",
    }
}

/// Whether the pass got as far as a download, and whether it succeeded
fn download_outcome(result: &ServiceResult<ReconcileOutcome>) -> Option<bool> {
    match result {
        Ok(ReconcileOutcome::Registered { .. }) | Err(ServiceError::RegistrationFailed { .. }) => {
            Some(true)
        }
        Err(ServiceError::DownloadFailed(_)) => Some(false),
        _ => None,
    }
}

async fn reconcile(
    declaration: Arc<FlyteRegistration>,
    ctx: Arc<Context>,
) -> Result<Action, ServiceError> {
    let Some(key) = declaration.key() else {
        warn!(name = %declaration.name_any(), "declaration without namespace, ignoring");
        return Ok(Action::await_change());
    };

    let started = Instant::now();
    let result = ctx.reconciler.reconcile(&key, &ctx.cancel).await;

    metrics::record_reconcile(result_label(&result), started.elapsed().as_secs_f64());
    if let Some(success) = download_outcome(&result) {
        metrics::record_download(ctx.strategy.as_str(), success);
    }

    match result {
        Ok(_) => Ok(Action::await_change()),
        Err(e) if e.is_cancelled() => {
            debug!(%key, "reconciliation cancelled");
            Ok(Action::await_change())
        }
        Err(e) => Err(e),
    }
}

fn error_policy(declaration: Arc<FlyteRegistration>, err: &ServiceError, ctx: Arc<Context>) -> Action {
    error!(
        name = %declaration.name_any(),
        namespace = ?declaration.namespace(),
        error = %err,
        "reconciliation failed"
    );
    Action::requeue(ctx.requeue_after)
}

/// Watch every `FlyteRegistration` in the cluster until `cancel` fires
pub async fn run(client: Client, ctx: Arc<Context>, probes: ProbeState, cancel: CancellationToken) {
    let declarations: Api<FlyteRegistration> = Api::all(client);

    probes.mark_ready();

    Controller::new(declarations, watcher::Config::default())
        .graceful_shutdown_on(cancel.cancelled_owned())
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => debug!(%object, "reconciled"),
                Err(e) => debug!(error = %e, "reconcile loop error"),
            }
        })
        .await;
}
