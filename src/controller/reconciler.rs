//! Main reconciler for Application resources
//!
//! Implements the controller pattern using kube-rs runtime: workers are
//! parallel across Applications but serial per Application, so a single sync
//! operation never races with itself.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use kube::{
    api::{Api, Patch, PatchParams},
    client::Client,
    runtime::{
        controller::{Action, Controller},
        finalizer::{finalizer, Event},
        watcher::Config,
    },
    ResourceExt,
};
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use super::autosync::auto_sync;
use super::compare::AppStateManager;
use super::conditions;
use super::finalizers::{finalize_application_deletion, APPLICATION_FINALIZER};
use crate::cluster::ClusterConnector;
use crate::crd::{
    AppProject, Application, ApplicationCondition, ApplicationConditionType, ComparisonStatus,
    OperationPhase, OperationState,
};
use crate::error::{Error, Result};
use crate::manifest::ManifestService;

/// Most recent deployments kept in `status.history`.
const MAX_HISTORY_LENGTH: usize = 10;

/// How long to wait before re-entering an in-flight sync operation.
const OPERATION_REQUEUE: Duration = Duration::from_secs(5);

/// Shared state for the controller
pub struct ControllerState {
    pub client: Client,
    pub state_manager: Arc<AppStateManager>,
    pub clusters: Arc<dyn ClusterConnector>,
    /// Interval between steady-state comparisons.
    pub refresh_interval: Duration,
}

impl ControllerState {
    pub fn new(
        client: Client,
        manifests: Arc<dyn ManifestService>,
        clusters: Arc<dyn ClusterConnector>,
        refresh_interval: Duration,
    ) -> Self {
        ControllerState {
            client,
            state_manager: Arc::new(AppStateManager::new(manifests, Arc::clone(&clusters))),
            clusters,
            refresh_interval,
        }
    }
}

/// Main entry point to start the controller
pub async fn run_controller(state: Arc<ControllerState>) -> Result<()> {
    let client = state.client.clone();
    let applications: Api<Application> = Api::all(client.clone());

    info!("Starting Application controller");

    // Verify CRD exists
    match applications.list(&Default::default()).await {
        Ok(_) => info!("Application CRD is available"),
        Err(e) => {
            error!(
                "Application CRD not found. Please install the CRD first: {:?}",
                e
            );
            return Err(Error::ConfigError(
                "Application CRD not installed".to_string(),
            ));
        }
    }

    Controller::new(applications, Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok(obj) => debug!("Reconciled: {:?}", obj),
                Err(e) => error!("Reconcile error: {:?}", e),
            }
        })
        .await;

    Ok(())
}

/// The main reconciliation function
///
/// This function is called whenever:
/// - An Application is created, updated, or deleted
/// - The requeue timer expires
#[instrument(skip(ctx), fields(name = %app.name_any(), namespace = app.namespace()))]
async fn reconcile(app: Arc<Application>, ctx: Arc<ControllerState>) -> Result<Action> {
    let namespace = app.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<Application> = Api::namespaced(ctx.client.clone(), &namespace);

    #[cfg(feature = "metrics")]
    super::metrics::RECONCILE_TOTAL
        .get_or_create(&super::metrics::AppLabels {
            namespace: namespace.clone(),
            name: app.name_any(),
        })
        .inc();

    finalizer(&api, APPLICATION_FINALIZER, app, |event| async {
        match event {
            Event::Apply(app) => reconcile_application(&ctx, &app).await,
            Event::Cleanup(app) => cleanup_application(&ctx, &app).await,
        }
    })
    .await
    .map_err(Error::from)
}

fn error_policy(app: Arc<Application>, err: &Error, _ctx: Arc<ControllerState>) -> Action {
    warn!(app = %app.name_any(), error = %err, "reconcile failed");
    #[cfg(feature = "metrics")]
    super::metrics::RECONCILE_ERRORS_TOTAL
        .get_or_create(&super::metrics::AppLabels {
            namespace: app.namespace().unwrap_or_default(),
            name: app.name_any(),
        })
        .inc();
    Action::requeue(Duration::from_secs(15))
}

/// Reconcile one Application: execute any pending or in-flight operation,
/// refresh the comparison, and evaluate auto-sync.
async fn reconcile_application(ctx: &ControllerState, app: &Application) -> Result<Action> {
    let namespace = app.namespace().unwrap_or_else(|| "default".to_string());
    let name = app.name_any();
    let api: Api<Application> = Api::namespaced(ctx.client.clone(), &namespace);

    if let Err(errors) = app.spec.validate() {
        let message = errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        warn!(app = %name, "spec validation failed: {message}");
        patch_conditions(
            &api,
            &name,
            app,
            ApplicationCondition::new(ApplicationConditionType::ComparisonError, message),
        )
        .await?;
        return Ok(Action::requeue(ctx.refresh_interval));
    }

    let proj = get_app_project(ctx, app, &namespace).await?;

    // 1. Drive any requested or in-flight operation to completion before
    // comparing: a sync observes a stable snapshot for its duration.
    if let Some(mut op_state) = pending_operation_state(&api, app).await? {
        let deployment = ctx
            .state_manager
            .sync_app_state(app, &proj, &mut op_state)
            .await;
        if op_state.phase.completed() && op_state.finished_at.is_none() {
            op_state.finished_at = Some(Utc::now().to_rfc3339());
            #[cfg(feature = "metrics")]
            super::metrics::SYNC_OPERATIONS_TOTAL
                .get_or_create(&super::metrics::SyncLabels {
                    namespace: namespace.clone(),
                    name: name.clone(),
                    phase: op_state.phase.to_string(),
                })
                .inc();
        }
        let still_running = !op_state.phase.completed();

        let mut status_patch = json!({"operationState": op_state});
        if let Some(info) = deployment {
            let mut history = app
                .status
                .as_ref()
                .map(|s| s.history.clone())
                .unwrap_or_default();
            history.push(info);
            if history.len() > MAX_HISTORY_LENGTH {
                let drop = history.len() - MAX_HISTORY_LENGTH;
                history.drain(..drop);
            }
            status_patch["history"] = serde_json::to_value(&history)?;
            // force a fresh comparison now that the cluster changed
            status_patch["comparisonResult"] = json!({"comparedAt": null});
        }
        api.patch_status(
            &name,
            &PatchParams::default(),
            &Patch::Merge(json!({"status": status_patch})),
        )
        .await?;

        if still_running {
            return Ok(Action::requeue(OPERATION_REQUEUE));
        }
    }

    // 2. Refresh the comparison.
    let compared = match ctx.state_manager.compare_app_state(app, None, None).await {
        Ok(compared) => compared,
        Err(e) if e.is_transient() => {
            warn!(app = %name, error = %e, "comparison failed transiently");
            return Ok(Action::requeue(Duration::from_secs(10)));
        }
        Err(e) => {
            patch_conditions(
                &api,
                &name,
                app,
                ApplicationCondition::new(ApplicationConditionType::ComparisonError, e.to_string()),
            )
            .await?;
            return Err(e);
        }
    };

    let out_of_sync = compared.comparison.status == ComparisonStatus::OutOfSync;
    debug!(app = %name, out_of_sync, "comparison complete");
    #[cfg(feature = "metrics")]
    super::metrics::OUT_OF_SYNC
        .get_or_create(&super::metrics::AppLabels {
            namespace: namespace.clone(),
            name: name.clone(),
        })
        .set(out_of_sync as i64);

    // 3. Evaluate the automated sync policy against the fresh comparison.
    let mut desired_app = app.clone();
    let auto_sync_condition = auto_sync(&mut desired_app, &compared.comparison);

    let mut new_conditions = app
        .status
        .as_ref()
        .map(|s| s.conditions.clone())
        .unwrap_or_default();
    new_conditions.retain(|c| c.condition_type != ApplicationConditionType::ManifestError);
    for condition in &compared.conditions {
        conditions::set_condition(&mut new_conditions, condition.clone());
    }
    match auto_sync_condition {
        Some(condition) => conditions::set_condition(&mut new_conditions, condition),
        None => conditions::remove_condition(&mut new_conditions, ApplicationConditionType::SyncError),
    }

    api.patch_status(
        &name,
        &PatchParams::default(),
        &Patch::Merge(json!({"status": {
            "comparisonResult": compared.comparison,
            "conditions": new_conditions,
        }})),
    )
    .await?;

    if desired_app.spec.operation != app.spec.operation {
        debug!(app = %name, "enqueueing automated sync operation");
        api.patch(
            &name,
            &PatchParams::default(),
            &Patch::Merge(json!({"spec": {"operation": desired_app.spec.operation}})),
        )
        .await?;
        return Ok(Action::requeue(OPERATION_REQUEUE));
    }

    Ok(Action::requeue(ctx.refresh_interval))
}

/// Resolve the operation to execute this tick: resume a non-terminal
/// operation state, or start one from a pending `spec.operation` request
/// (consuming the request).
async fn pending_operation_state(
    api: &Api<Application>,
    app: &Application,
) -> Result<Option<OperationState>> {
    let name = app.name_any();
    let current = app.status.as_ref().and_then(|s| s.operation_state.clone());

    if let Some(op_state) = &current {
        if !op_state.phase.completed() {
            return Ok(Some(op_state.clone()));
        }
    }

    let Some(operation) = app.spec.operation.clone() else {
        return Ok(None);
    };
    info!(app = %name, "starting operation");
    let op_state = OperationState {
        operation,
        phase: OperationPhase::Running,
        message: String::new(),
        sync_result: None,
        started_at: Some(Utc::now().to_rfc3339()),
        finished_at: None,
    };
    // consume the request so a finished operation is not restarted
    api.patch(
        &name,
        &PatchParams::default(),
        &Patch::Merge(json!({"spec": {"operation": null}})),
    )
    .await?;
    Ok(Some(op_state))
}

/// Load the Application's project, falling back to the permissive implicit
/// project when `default` is not materialized as an object.
async fn get_app_project(
    ctx: &ControllerState,
    app: &Application,
    namespace: &str,
) -> Result<AppProject> {
    let api: Api<AppProject> = Api::namespaced(ctx.client.clone(), namespace);
    match api.get_opt(&app.spec.project).await? {
        Some(proj) => Ok(proj),
        None if app.spec.project == "default" => Ok(AppProject::default_project(namespace)),
        None => Err(Error::ConfigError(format!(
            "application references project {} which does not exist",
            app.spec.project
        ))),
    }
}

async fn patch_conditions(
    api: &Api<Application>,
    name: &str,
    app: &Application,
    condition: ApplicationCondition,
) -> Result<()> {
    let mut new_conditions = app
        .status
        .as_ref()
        .map(|s| s.conditions.clone())
        .unwrap_or_default();
    conditions::set_condition(&mut new_conditions, condition);
    api.patch_status(
        name,
        &PatchParams::default(),
        &Patch::Merge(json!({"status": {"conditions": new_conditions}})),
    )
    .await?;
    Ok(())
}

/// Cleanup on deletion: remove every deployed resource, then release the
/// finalizer. Errors propagate so the finalizer retries.
async fn cleanup_application(ctx: &ControllerState, app: &Application) -> Result<Action> {
    let cluster = ctx.clusters.connect(&app.spec.destination.server).await?;
    finalize_application_deletion(cluster, app, &app.spec.destination.namespace).await?;
    info!(app = %app.name_any(), "application finalized");
    Ok(Action::await_change())
}
