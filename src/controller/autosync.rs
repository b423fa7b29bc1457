//! Automated sync policy
//!
//! A stateless decision on (Application, ComparisonResult): either enqueue a
//! new sync operation on the Application or surface a degraded condition.
//! The caller persists whatever was decided.

use tracing::{debug, info};

use crate::crd::{
    parameter_overrides_equal, Application, ApplicationCondition, ApplicationConditionType,
    ComparisonResult, ComparisonStatus, Operation, SyncOperation,
};

/// Decide whether to start an automated sync. Returns a condition when the
/// Application is degraded (the previous sync to this exact state failed) and
/// `None` otherwise; when a sync is warranted, `app.spec.operation` is set.
pub fn auto_sync(app: &mut Application, comparison: &ComparisonResult) -> Option<ApplicationCondition> {
    let app_name = app.metadata.name.clone().unwrap_or_default();

    let Some(policy) = app.spec.sync_policy.as_ref().and_then(|p| p.automated.as_ref())
    else {
        return None;
    };
    let prune = policy.prune;

    if comparison.status != ComparisonStatus::OutOfSync {
        debug!(app = %app_name, status = %comparison.status, "skipping auto-sync: application is not out of sync");
        return None;
    }
    // an operation is already pending or executing
    if app.operation_in_progress() {
        debug!(app = %app_name, "skipping auto-sync: another operation is in progress");
        return None;
    }

    let overrides = app.spec.source.component_parameter_overrides.clone();

    // Already attempted this exact (revision, overrides)? Skip either way:
    // re-syncing after success is pointless, and retrying after failure
    // would thrash. The failure case additionally surfaces a condition.
    if let Some(op_state) = app.status.as_ref().and_then(|s| s.operation_state.as_ref()) {
        let attempted = op_state.sync_result.as_ref().is_some_and(|sync_res| {
            sync_res.revision == comparison.revision
                && parameter_overrides_equal(
                    op_state
                        .operation
                        .sync
                        .as_ref()
                        .and_then(|s| s.parameter_overrides.as_deref()),
                    overrides.as_deref(),
                )
        });
        if attempted {
            if op_state.phase.successful() {
                debug!(app = %app_name, revision = %comparison.revision, "skipping auto-sync: already synced to this revision");
                return None;
            }
            return Some(ApplicationCondition::new(
                ApplicationConditionType::SyncError,
                format!(
                    "previous sync to {} with the same parameters failed: {}",
                    comparison.revision, op_state.message
                ),
            ));
        }
    }

    info!(app = %app_name, revision = %comparison.revision, "auto-syncing");
    app.spec.operation = Some(Operation {
        sync: Some(SyncOperation {
            revision: comparison.revision.clone(),
            prune,
            parameter_overrides: overrides,
            ..SyncOperation::default()
        }),
    });
    None
}
