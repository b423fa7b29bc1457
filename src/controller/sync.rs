//! Sync orchestration
//!
//! `AppStateManager::sync_app_state` advances an `OperationState` toward a
//! terminal phase, possibly across several reconciliation ticks. Progress is
//! inferred from what is already recorded in the sync result rather than a
//! separate cursor, which makes the operation crash-safe: after a controller
//! restart the engine reconstitutes where it was from the persisted state
//! alone.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::compare::{format_conditions, AppStateManager, ResourcePair};
use super::hooks::{hook_delete_policies, hook_types, infer_hook_phase, is_hook};
use super::resource_meta::{
    api_version_of, gvk_of, group_version_of, has_crd_of_group_kind, kind_of, name_of,
    namespace_of, set_label, APP_NAME_LABEL,
};
use crate::cluster::ClusterOps;
use crate::crd::{
    AppProject, Application, DeploymentInfo, HookDeletePolicy, HookStatus, HookType,
    OperationPhase, OperationState, ResourceDetails, ResourceSyncStatus, SyncOperation,
    SyncOperationResult, SyncStrategy, SyncStrategyHook,
};
use crate::error::Error;

/// Canonical apply order. Kinds not listed sort after all listed kinds.
pub const SYNC_ORDER: [&str; 26] = [
    "Namespace",
    "ResourceQuota",
    "LimitRange",
    "PodSecurityPolicy",
    "Secret",
    "ConfigMap",
    "StorageClass",
    "PersistentVolume",
    "PersistentVolumeClaim",
    "ServiceAccount",
    "CustomResourceDefinition",
    "ClusterRole",
    "ClusterRoleBinding",
    "Role",
    "RoleBinding",
    "Service",
    "DaemonSet",
    "Pod",
    "ReplicationController",
    "ReplicaSet",
    "Deployment",
    "StatefulSet",
    "Job",
    "CronJob",
    "Ingress",
    "APIService",
];

/// An in-memory work item. At least one side is present: no target means the
/// live object is to be pruned, no live object means a creation.
#[derive(Clone, Debug, Default)]
pub struct SyncTask {
    pub live_obj: Option<Value>,
    pub target_obj: Option<Value>,
}

impl SyncTask {
    fn obj(&self) -> Option<&Value> {
        self.target_obj.as_ref().or(self.live_obj.as_ref())
    }

    fn kind(&self) -> &str {
        self.obj().map(kind_of).unwrap_or_default()
    }

    fn name(&self) -> &str {
        self.obj().map(name_of).unwrap_or_default()
    }
}

/// Sort tasks by the canonical kind order, then alphabetically by name.
/// Unknown kinds sort after known kinds, ordered by kind name then name.
/// Prune tasks sort after everything else.
pub fn sort_sync_tasks(tasks: &mut [SyncTask]) {
    let ordering: HashMap<&str, usize> = SYNC_ORDER
        .iter()
        .enumerate()
        .map(|(i, kind)| (*kind, i))
        .collect();
    tasks.sort_by(|a, b| {
        use std::cmp::Ordering;
        match (&a.target_obj, &b.target_obj) {
            (None, None) => a.name().cmp(b.name()),
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(_), Some(_)) => {
                let (ka, kb) = (a.kind(), b.kind());
                match (ordering.get(ka), ordering.get(kb)) {
                    (Some(x), Some(y)) if x != y => x.cmp(y),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    _ => ka.cmp(kb).then_with(|| a.name().cmp(b.name())),
                }
            }
        }
    });
}

enum HookPhaseOutcome {
    /// Every hook of the phase completed successfully (or none exist).
    Completed,
    /// Hooks are still running; revisit on the next tick.
    Pending,
    Failed(String),
}

struct SyncContext {
    app_name: String,
    namespace: String,
    proj: AppProject,
    cluster: Arc<dyn ClusterOps>,
    sync_op: SyncOperation,
    /// Desired manifests including hook objects, for hook launch and CRD
    /// lookup.
    manifests: Vec<Value>,
    tasks: Vec<SyncTask>,
    phase: OperationPhase,
    message: String,
    sync_res: SyncOperationResult,
}

impl AppStateManager {
    /// Advance a sync operation one step. The caller re-invokes while the
    /// phase is non-terminal; every step is safe to re-enter.
    ///
    /// Returns the deployment record to append to history when a complete,
    /// non-dry-run sync succeeded.
    #[instrument(skip(self, app, proj, state), fields(app = %app.metadata.name.as_deref().unwrap_or("")))]
    pub async fn sync_app_state(
        &self,
        app: &Application,
        proj: &AppProject,
        state: &mut OperationState,
    ) -> Option<DeploymentInfo> {
        let Some(sync_op) = state.operation.sync.clone() else {
            state.phase = OperationPhase::Failed;
            state.message = "Invalid operation request: no operation specified".to_string();
            return None;
        };
        let mut sync_res = state.sync_result.clone().unwrap_or_default();
        if state.sync_result.is_none() {
            state.sync_result = Some(sync_res.clone());
        }

        // Sync requests may name ambiguous revisions (master, HEAD, v1.2.3),
        // which change meaning if the operation resumes after a restart. The
        // first comparison resolves a concrete commit identifier which is
        // pinned in the sync result; resumed invocations re-fetch manifests
        // at exactly that revision.
        let revision = if sync_res.revision.is_empty() {
            sync_op.revision.clone()
        } else {
            sync_res.revision.clone()
        };

        let compare = self
            .compare_app_state(
                app,
                if revision.is_empty() {
                    None
                } else {
                    Some(revision.as_str())
                },
                sync_op.parameter_overrides.as_deref(),
            )
            .await;
        let compared = match compare {
            Ok(compared) => compared,
            Err(e) => {
                state.phase = OperationPhase::Error;
                state.message = e.to_string();
                return None;
            }
        };
        let error_conditions = compared.error_conditions();
        if !error_conditions.is_empty() {
            state.phase = OperationPhase::Error;
            state.message = format_conditions(&error_conditions);
            return None;
        }
        if sync_res.revision.is_empty() {
            sync_res.revision = compared.manifest_info.revision.clone();
        }

        let connect = self.clusters.connect(&app.spec.destination.server).await;
        let cluster = match connect {
            Ok(cluster) => cluster,
            Err(e) => {
                state.phase = OperationPhase::Error;
                state.message = e.to_string();
                state.sync_result = Some(sync_res);
                return None;
            }
        };

        let app_name = app.metadata.name.clone().unwrap_or_default();
        let mut manifests: Vec<Value> = Vec::new();
        for raw in &compared.manifest_info.manifests {
            if let Ok(mut obj) = serde_json::from_str::<Value>(raw) {
                if obj.is_object() {
                    set_label(&mut obj, APP_NAME_LABEL, &app_name);
                    manifests.push(obj);
                }
            }
        }

        let mut ctx = SyncContext {
            app_name,
            namespace: app.spec.destination.namespace.clone(),
            proj: proj.clone(),
            cluster,
            tasks: generate_sync_tasks(&compared.resources, &sync_op),
            sync_op: sync_op.clone(),
            manifests,
            phase: state.phase,
            message: state.message.clone(),
            sync_res,
        };

        if state.phase == OperationPhase::Terminating {
            ctx.terminate().await;
        } else {
            ctx.sync().await;
        }

        state.phase = ctx.phase;
        state.message = ctx.message;
        state.sync_result = Some(ctx.sync_res);

        if state.phase.successful()
            && !sync_op.dry_run
            && sync_op.resources.as_deref().map_or(true, |r| r.is_empty())
        {
            Some(DeploymentInfo {
                revision: compared.manifest_info.revision.clone(),
                params: compared.manifest_info.params.clone(),
                deployed_at: Utc::now().to_rfc3339(),
            })
        } else {
            None
        }
    }
}

/// Build the ordered task list for this operation, honoring a selective-sync
/// resource list.
fn generate_sync_tasks(resources: &[ResourcePair], sync_op: &SyncOperation) -> Vec<SyncTask> {
    let selection = sync_op.resources.as_deref().unwrap_or_default();
    let selected = |obj: &Value| -> bool {
        let (group, _) = group_version_of(obj);
        selection
            .iter()
            .any(|s| s.matches(group, kind_of(obj), name_of(obj)))
    };
    let mut tasks: Vec<SyncTask> = resources
        .iter()
        .filter(|pair| {
            selection.is_empty()
                || pair.live.as_ref().map_or(false, |o| selected(o))
                || pair.target.as_ref().map_or(false, |o| selected(o))
        })
        .map(|pair| SyncTask {
            live_obj: pair.live.clone(),
            target_obj: pair.target.clone(),
        })
        .collect();
    sort_sync_tasks(&mut tasks);
    tasks
}

impl SyncContext {
    async fn sync(&mut self) {
        // All application manifests removed and nothing live remains.
        if self.tasks.is_empty() {
            self.set_operation_phase(
                OperationPhase::Succeeded,
                "successfully synced (no manifests)",
            );
            return;
        }

        // Dry-run every apply task first, so the user sees all validation
        // problems at once. Whether the dry-run already happened is detected
        // by the resource and hook lists being non-empty; repeating it on
        // resume is harmless but redundant.
        if !self.started_pre_sync_phase() {
            let dry_run_update = self.sync_op.dry_run;
            if !self.do_apply_sync(true, false, dry_run_update).await {
                self.set_operation_phase(
                    OperationPhase::Failed,
                    "one or more objects failed to apply (dry run)",
                );
                return;
            }
            if self.sync_op.dry_run {
                self.set_operation_phase(
                    OperationPhase::Succeeded,
                    "successfully synced (dry run)",
                );
                return;
            }
        }

        let strategy = self.sync_op.sync_strategy.clone().unwrap_or(SyncStrategy {
            apply: None,
            hook: Some(SyncStrategyHook {}),
        });

        if let Some(apply) = &strategy.apply {
            if !self.started_sync_phase() {
                if !self.do_apply_sync(false, apply.force, true).await {
                    self.set_operation_phase(
                        OperationPhase::Failed,
                        "one or more objects failed to apply",
                    );
                }
                // On success, stay Running: the next reconciliation refreshes
                // the comparison and marks the operation Succeeded.
                return;
            }
            self.set_operation_phase(OperationPhase::Succeeded, "successfully synced");
        } else if strategy.hook.is_some() {
            self.do_hook_sync().await;
        } else {
            self.set_operation_phase(OperationPhase::Failed, "Unknown sync strategy");
        }
    }

    /// Best-effort cleanup after external cancellation: delete in-flight hook
    /// resources and fail the operation.
    async fn terminate(&mut self) {
        for hook_status in self.sync_res.hooks.clone() {
            if hook_status.phase.completed() {
                continue;
            }
            let Some(hook) = self.find_hook_object(&hook_status.name, &hook_status.kind) else {
                continue;
            };
            let namespace = namespace_of(&hook).unwrap_or(&self.namespace).to_string();
            let deleted = self.cluster.delete_resource(&hook, &namespace).await;
            if let Err(e) = deleted {
                warn!(hook = %hook_status.name, error = %e, "failed to delete hook during termination");
            }
            self.set_hook_status(HookStatus {
                phase: OperationPhase::Failed,
                message: "terminated".to_string(),
                ..hook_status
            });
        }
        self.set_operation_phase(OperationPhase::Failed, "terminated");
    }

    fn started_pre_sync_phase(&self) -> bool {
        !self.sync_res.resources.is_empty() || !self.sync_res.hooks.is_empty()
    }

    fn started_sync_phase(&self) -> bool {
        !self.sync_res.resources.is_empty()
            || self
                .sync_res
                .hooks
                .iter()
                .any(|h| matches!(h.hook_type, HookType::Sync | HookType::PostSync))
    }

    #[allow(dead_code)]
    fn started_post_sync_phase(&self) -> bool {
        self.sync_res
            .hooks
            .iter()
            .any(|h| h.hook_type == HookType::PostSync)
    }

    /// No-op when phase and message are unchanged, so repeated reconciliation
    /// ticks are idle.
    fn set_operation_phase(&mut self, phase: OperationPhase, message: &str) {
        if self.phase != phase || self.message != message {
            info!(
                app = %self.app_name,
                "updating operation state. phase: {} -> {}, message: '{}' -> '{}'",
                self.phase, phase, self.message, message
            );
            self.phase = phase;
            self.message = message.to_string();
        }
    }

    /// Apply-based sync of the task list, pruning first. Returns overall
    /// success. When `update` is false, only failures are recorded.
    async fn do_apply_sync(&mut self, dry_run: bool, force: bool, update: bool) -> bool {
        let mut successful = true;

        let prune_tasks: Vec<SyncTask> = self
            .tasks
            .iter()
            .filter(|t| t.target_obj.is_none())
            .cloned()
            .collect();
        let create_tasks: Vec<SyncTask> = self
            .tasks
            .iter()
            .filter(|t| t.target_obj.is_some())
            .cloned()
            .collect();

        // Prunes run as one parallel wave ahead of any applies.
        let cluster = Arc::clone(&self.cluster);
        let namespace = self.namespace.clone();
        let prune = self.sync_op.prune;
        let prune_wave: Vec<_> = prune_tasks
            .into_iter()
            .filter_map(|t| t.live_obj)
            .map(|live| {
                let cluster = Arc::clone(&cluster);
                let namespace = namespace.clone();
                async move { prune_object(cluster, live, prune, dry_run, &namespace).await }
            })
            .collect();
        let prune_results = join_all(prune_wave).await;
        for details in prune_results {
            if !details.status.successful() {
                successful = false;
            }
            if update || !details.status.successful() {
                self.set_resource_details(details);
            }
        }

        // Contiguous tasks of the same kind form one parallel wave; waves run
        // sequentially in canonical order. The task list is pre-sorted, so
        // grouping by adjacency is grouping by kind.
        let mut index = 0;
        while index < create_tasks.len() {
            let kind = create_tasks[index].kind().to_string();
            let mut end = index;
            while end < create_tasks.len() && create_tasks[end].kind() == kind {
                end += 1;
            }
            let ok = self
                .process_create_group(&create_tasks[index..end], &create_tasks, dry_run, force, update)
                .await;
            if !ok {
                successful = false;
            }
            index = end;
        }
        successful
    }

    /// Validate and apply one kind-group. Applies within the group run in
    /// parallel.
    async fn process_create_group(
        &mut self,
        group: &[SyncTask],
        all_create_tasks: &[SyncTask],
        dry_run: bool,
        force: bool,
        update: bool,
    ) -> bool {
        let Some(first) = group.first().and_then(|t| t.target_obj.as_ref()) else {
            return true;
        };
        let gvk = gvk_of(first);

        let discovered = self.cluster.server_resource_for(&gvk).await;
        let scope = match discovered {
            Ok(scope) => scope,
            Err(Error::KindNotFound(_)) if dry_run => {
                // A custom resource whose definition is applied in this same
                // operation cannot be validated yet; the CRD sorts earlier,
                // so the kind exists by real-apply time.
                let targets: Vec<&Value> = all_create_tasks
                    .iter()
                    .filter_map(|t| t.target_obj.as_ref())
                    .collect();
                if has_crd_of_group_kind(&targets, &gvk.group, &gvk.kind) {
                    debug!(kind = %gvk.kind, "skipping dry-run for kind defined by CRD in this sync");
                    return true;
                }
                self.fail_group(
                    group,
                    &format!(
                        "the server could not find the requested resource ({}/{})",
                        gvk.group, gvk.kind
                    ),
                );
                return false;
            }
            Err(e) => {
                self.fail_group(group, &e.to_string());
                return false;
            }
        };

        if !self
            .proj
            .is_resource_permitted(&gvk.group, &gvk.kind, scope.namespaced)
        {
            let proj_name = self.proj.metadata.name.clone().unwrap_or_default();
            self.fail_group(
                group,
                &format!(
                    "Resource {}:{} is not permitted in project {}.",
                    gvk.group, gvk.kind, proj_name
                ),
            );
            return false;
        }

        let cluster = Arc::clone(&self.cluster);
        let namespace = self.namespace.clone();
        let wave: Vec<_> = group
            .iter()
            .filter_map(|t| t.target_obj.clone())
            .filter(|target| !is_hook(target))
            .map(|target| {
                let cluster = Arc::clone(&cluster);
                let namespace = namespace.clone();
                async move { apply_object(cluster, target, &namespace, dry_run, force).await }
            })
            .collect();

        let mut successful = true;
        let results = join_all(wave).await;
        for details in results {
            if !details.status.successful() {
                successful = false;
            }
            if update || !details.status.successful() {
                self.set_resource_details(details);
            }
        }
        successful
    }

    fn fail_group(&mut self, group: &[SyncTask], message: &str) {
        for task in group {
            let Some(target) = task.target_obj.as_ref() else {
                continue;
            };
            self.set_resource_details(ResourceDetails {
                name: name_of(target).to_string(),
                kind: kind_of(target).to_string(),
                namespace: self.namespace.clone(),
                message: message.to_string(),
                status: ResourceSyncStatus::SyncFailed,
            });
        }
    }

    /// Hook-based sync: PreSync hooks, then the ordinary apply plus Sync
    /// hooks, then PostSync hooks. A hook failure at any point triggers the
    /// SyncFail hooks and fails the operation.
    async fn do_hook_sync(&mut self) {
        match self.run_hook_phase(HookType::PreSync).await {
            HookPhaseOutcome::Pending => return,
            HookPhaseOutcome::Failed(message) => {
                self.fail_with_sync_fail_hooks(&message).await;
                return;
            }
            HookPhaseOutcome::Completed => {}
        }

        if !self.started_sync_phase() {
            if !self.do_apply_sync(false, false, true).await {
                self.fail_with_sync_fail_hooks("one or more objects failed to apply")
                    .await;
                return;
            }
        }
        match self.run_hook_phase(HookType::Sync).await {
            HookPhaseOutcome::Pending => return,
            HookPhaseOutcome::Failed(message) => {
                self.fail_with_sync_fail_hooks(&message).await;
                return;
            }
            HookPhaseOutcome::Completed => {}
        }

        match self.run_hook_phase(HookType::PostSync).await {
            HookPhaseOutcome::Pending => {}
            HookPhaseOutcome::Failed(message) => {
                self.fail_with_sync_fail_hooks(&message).await;
            }
            HookPhaseOutcome::Completed => {
                self.set_operation_phase(OperationPhase::Succeeded, "successfully synced");
            }
        }
    }

    /// Launch hooks of one phase that have not run yet and poll the ones in
    /// flight.
    async fn run_hook_phase(&mut self, hook_type: HookType) -> HookPhaseOutcome {
        let phase_hooks: Vec<Value> = self
            .manifests
            .iter()
            .filter(|obj| hook_types(obj).contains(&hook_type))
            .cloned()
            .collect();
        if phase_hooks.is_empty() {
            return HookPhaseOutcome::Completed;
        }

        let mut any_running = false;
        let mut failure: Option<String> = None;

        for hook in phase_hooks {
            let name = name_of(&hook).to_string();
            let kind = kind_of(&hook).to_string();
            let namespace = namespace_of(&hook).unwrap_or(&self.namespace).to_string();
            let existing = self.find_hook_status(&name, &kind, hook_type).cloned();

            match existing {
                None => {
                    let policies = hook_delete_policies(&hook);
                    if policies.contains(&HookDeletePolicy::BeforeHookCreation) {
                        let deleted = self.cluster.delete_resource(&hook, &namespace).await;
                        if let Err(e) = deleted {
                            debug!(hook = %name, error = %e, "pre-creation delete of hook");
                        }
                    }
                    let applied = self
                        .cluster
                        .apply_resource(&hook, &namespace, false, false)
                        .await;
                    match applied {
                        Ok(_) => {
                            // kinds without an observable completion signal
                            // succeed at creation
                            let phase = match kind.as_str() {
                                "Job" | "Pod" => OperationPhase::Running,
                                _ => OperationPhase::Succeeded,
                            };
                            if phase == OperationPhase::Running {
                                any_running = true;
                            } else if policies.contains(&HookDeletePolicy::HookSucceeded) {
                                self.delete_hook_resource(&hook, &namespace).await;
                            }
                            self.set_hook_status(HookStatus {
                                name,
                                kind,
                                api_version: api_version_of(&hook).to_string(),
                                hook_type,
                                phase,
                                message: String::new(),
                            });
                        }
                        Err(e) => {
                            let message = e.to_string();
                            self.set_hook_status(HookStatus {
                                name: name.clone(),
                                kind,
                                api_version: api_version_of(&hook).to_string(),
                                hook_type,
                                phase: OperationPhase::Failed,
                                message: message.clone(),
                            });
                            failure
                                .get_or_insert(format!("hook {name} failed to launch: {message}"));
                        }
                    }
                }
                Some(status) if status.phase.completed() => {
                    if !status.phase.successful() {
                        failure.get_or_insert(format!(
                            "hook {} failed: {}",
                            status.name, status.message
                        ));
                    }
                }
                Some(status) => {
                    let polled = self
                        .cluster
                        .get_resource(&gvk_of(&hook), &name, &namespace)
                        .await;
                    match polled {
                        Ok(Some(live)) => {
                            let (phase, message) = infer_hook_phase(&live);
                            match phase {
                                OperationPhase::Running => any_running = true,
                                OperationPhase::Failed => {
                                    failure
                                        .get_or_insert(format!("hook {name} failed: {message}"));
                                    if hook_delete_policies(&hook)
                                        .contains(&HookDeletePolicy::HookFailed)
                                    {
                                        self.delete_hook_resource(&hook, &namespace).await;
                                    }
                                }
                                _ => {
                                    if hook_delete_policies(&hook)
                                        .contains(&HookDeletePolicy::HookSucceeded)
                                    {
                                        self.delete_hook_resource(&hook, &namespace).await;
                                    }
                                }
                            }
                            self.set_hook_status(HookStatus {
                                phase,
                                message,
                                ..status
                            });
                        }
                        Ok(None) => {
                            failure.get_or_insert(format!("hook {name} resource disappeared"));
                            self.set_hook_status(HookStatus {
                                phase: OperationPhase::Failed,
                                message: "hook resource disappeared".to_string(),
                                ..status
                            });
                        }
                        Err(e) => {
                            // leave the status untouched; transient lookup
                            // failures resolve on a later tick
                            warn!(hook = %name, error = %e, "failed to poll hook");
                            any_running = true;
                        }
                    }
                }
            }
        }

        if let Some(message) = failure {
            HookPhaseOutcome::Failed(message)
        } else if any_running {
            HookPhaseOutcome::Pending
        } else {
            HookPhaseOutcome::Completed
        }
    }

    /// Fire SyncFail hooks best-effort, then fail the operation.
    async fn fail_with_sync_fail_hooks(&mut self, message: &str) {
        let sync_fail_hooks: Vec<Value> = self
            .manifests
            .iter()
            .filter(|obj| hook_types(obj).contains(&HookType::SyncFail))
            .cloned()
            .collect();
        for hook in sync_fail_hooks {
            let name = name_of(&hook).to_string();
            let kind = kind_of(&hook).to_string();
            if self
                .find_hook_status(&name, &kind, HookType::SyncFail)
                .is_some()
            {
                continue;
            }
            let namespace = namespace_of(&hook).unwrap_or(&self.namespace).to_string();
            let applied = self
                .cluster
                .apply_resource(&hook, &namespace, false, false)
                .await;
            let (phase, hook_message) = match applied {
                Ok(_) => (OperationPhase::Running, String::new()),
                Err(e) => (OperationPhase::Failed, e.to_string()),
            };
            self.set_hook_status(HookStatus {
                name,
                kind,
                api_version: api_version_of(&hook).to_string(),
                hook_type: HookType::SyncFail,
                phase,
                message: hook_message,
            });
        }
        self.set_operation_phase(OperationPhase::Failed, message);
    }

    async fn delete_hook_resource(&self, hook: &Value, namespace: &str) {
        if let Err(e) = self.cluster.delete_resource(hook, namespace).await {
            warn!(hook = %name_of(hook), error = %e, "failed to delete hook resource");
        }
    }

    fn find_hook_object(&self, name: &str, kind: &str) -> Option<Value> {
        self.manifests
            .iter()
            .find(|obj| is_hook(obj) && name_of(obj) == name && kind_of(obj) == kind)
            .cloned()
    }

    fn find_hook_status(&self, name: &str, kind: &str, hook_type: HookType) -> Option<&HookStatus> {
        self.sync_res
            .hooks
            .iter()
            .find(|h| h.name == name && h.kind == kind && h.hook_type == hook_type)
    }

    fn set_hook_status(&mut self, status: HookStatus) {
        if let Some(existing) = self.sync_res.hooks.iter_mut().find(|h| {
            h.name == status.name && h.kind == status.kind && h.hook_type == status.hook_type
        }) {
            *existing = status;
        } else {
            self.sync_res.hooks.push(status);
        }
    }

    /// Fold a task outcome into the result list, unique by (kind, name).
    fn set_resource_details(&mut self, details: ResourceDetails) {
        if let Some(existing) = self
            .sync_res
            .resources
            .iter_mut()
            .find(|r| r.kind == details.kind && r.name == details.name)
        {
            if existing.status != details.status {
                info!(
                    app = %self.app_name,
                    "updated resource {}/{} status: {:?} -> {:?}",
                    existing.kind, existing.name, existing.status, details.status
                );
            }
            *existing = details;
        } else {
            info!(
                app = %self.app_name,
                "added resource {}/{} status: {:?}",
                details.kind, details.name, details.status
            );
            self.sync_res.resources.push(details);
        }
    }
}

/// Apply a single object, translating failure into a SyncFailed detail.
async fn apply_object(
    cluster: Arc<dyn ClusterOps>,
    target: Value,
    namespace: &str,
    dry_run: bool,
    force: bool,
) -> ResourceDetails {
    let mut details = ResourceDetails {
        name: name_of(&target).to_string(),
        kind: kind_of(&target).to_string(),
        namespace: namespace_of(&target).unwrap_or(namespace).to_string(),
        ..ResourceDetails::default()
    };
    match cluster
        .apply_resource(&target, namespace, dry_run, force)
        .await
    {
        Ok(message) => {
            details.message = message;
            details.status = ResourceSyncStatus::Synced;
        }
        Err(e) => {
            details.message = e.to_string();
            details.status = ResourceSyncStatus::SyncFailed;
        }
    }
    details
}

/// Delete a live object if pruning is enabled and this is not a dry run;
/// otherwise record what would happen.
async fn prune_object(
    cluster: Arc<dyn ClusterOps>,
    live: Value,
    prune: bool,
    dry_run: bool,
    namespace: &str,
) -> ResourceDetails {
    let mut details = ResourceDetails {
        name: name_of(&live).to_string(),
        kind: kind_of(&live).to_string(),
        namespace: namespace_of(&live).unwrap_or(namespace).to_string(),
        ..ResourceDetails::default()
    };
    if prune {
        if dry_run {
            details.message = "pruned (dry run)".to_string();
            details.status = ResourceSyncStatus::SyncedAndPruned;
        } else {
            match cluster.delete_resource(&live, namespace).await {
                Ok(()) => {
                    details.message = "pruned".to_string();
                    details.status = ResourceSyncStatus::SyncedAndPruned;
                }
                Err(e) => {
                    details.message = e.to_string();
                    details.status = ResourceSyncStatus::SyncFailed;
                }
            }
        }
    } else {
        details.message = "ignored (requires pruning)".to_string();
        details.status = ResourceSyncStatus::PruningRequired;
    }
    details
}
