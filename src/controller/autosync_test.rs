//! Tests for the automated sync policy
//!
//! These verify the decision table: when to enqueue a sync operation, when to
//! stay quiet, and when to surface a degraded condition instead of thrashing
//! on a known-bad revision.

#[cfg(test)]
mod tests {
    use crate::controller::auto_sync;
    use crate::crd::{
        Application, ComparisonResult, ComparisonStatus, ComponentParameter, OperationPhase,
        OperationState, SyncOperationResult,
    };

    const FAKE_APP: &str = r#"
apiVersion: windlass.io/v1alpha1
kind: Application
metadata:
  name: my-app
  namespace: windlass
spec:
  destination:
    namespace: dummy-namespace
    server: https://localhost:6443
  project: default
  source:
    path: some/path
    repoURL: https://github.com/windlass-io/example-apps.git
  syncPolicy:
    automated: {}
status:
  operationState:
    finishedAt: "2025-06-21T23:50:29Z"
    message: successfully synced
    operation:
      sync:
        revision: HEAD
    phase: Succeeded
    startedAt: "2025-06-21T23:50:25Z"
    syncResult:
      resources:
      - kind: RoleBinding
        message: rolebinding reconciled
        name: always-outofsync
        namespace: default
        status: Synced
      revision: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa
"#;

    fn fake_app() -> Application {
        serde_yaml::from_str(FAKE_APP).unwrap()
    }

    fn out_of_sync(revision: &str) -> ComparisonResult {
        ComparisonResult {
            status: ComparisonStatus::OutOfSync,
            revision: revision.to_string(),
            ..ComparisonResult::default()
        }
    }

    #[test]
    fn test_auto_sync_enqueues_operation() {
        let mut app = fake_app();
        let comparison = out_of_sync("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");
        let cond = auto_sync(&mut app, &comparison);
        assert!(cond.is_none());
        let sync = app
            .spec
            .operation
            .as_ref()
            .and_then(|op| op.sync.as_ref())
            .expect("sync operation enqueued");
        assert_eq!(sync.revision, "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");
        assert!(!sync.prune);
    }

    #[test]
    fn test_skip_when_already_attempted() {
        // most recent sync went to the same revision; skip regardless of the
        // comparison status
        let mut app = fake_app();
        let comparison = out_of_sync("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
        let cond = auto_sync(&mut app, &comparison);
        assert!(cond.is_none());
        assert!(app.spec.operation.is_none());
    }

    #[test]
    fn test_skip_when_synced() {
        let mut app = fake_app();
        let comparison = ComparisonResult {
            status: ComparisonStatus::Synced,
            revision: "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb".to_string(),
            ..ComparisonResult::default()
        };
        let cond = auto_sync(&mut app, &comparison);
        assert!(cond.is_none());
        assert!(app.spec.operation.is_none());
    }

    #[test]
    fn test_skip_when_policy_absent() {
        let mut app = fake_app();
        app.spec.sync_policy = None;
        let comparison = out_of_sync("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");
        let cond = auto_sync(&mut app, &comparison);
        assert!(cond.is_none());
        assert!(app.spec.operation.is_none());
    }

    #[test]
    fn test_degraded_condition_after_failed_attempt() {
        // previous sync to this exact revision failed: surface a condition
        // instead of retrying forever
        let mut app = fake_app();
        let status = app.status.as_mut().unwrap();
        let op_state = status.operation_state.as_mut().unwrap();
        op_state.phase = OperationPhase::Failed;
        op_state.sync_result = Some(SyncOperationResult {
            revision: "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb".to_string(),
            ..SyncOperationResult::default()
        });

        let comparison = out_of_sync("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");
        let cond = auto_sync(&mut app, &comparison);
        assert!(cond.is_some());
        assert!(app.spec.operation.is_none());
    }

    #[test]
    fn test_parameter_override_change_triggers_sync_at_same_revision() {
        let mut app = fake_app();
        app.spec.source.component_parameter_overrides = Some(vec![ComponentParameter {
            component: String::new(),
            name: "a".to_string(),
            value: "2".to_string(),
        }]);
        let status = app.status.as_mut().unwrap();
        let op_state = status.operation_state.as_mut().unwrap();
        op_state.phase = OperationPhase::Failed;
        if let Some(sync) = op_state.operation.sync.as_mut() {
            sync.parameter_overrides = Some(vec![ComponentParameter {
                component: String::new(),
                name: "a".to_string(),
                value: "1".to_string(),
            }]);
        }
        op_state.sync_result = Some(SyncOperationResult {
            revision: "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_string(),
            ..SyncOperationResult::default()
        });

        // same revision as the failed attempt, but the override set changed
        let comparison = out_of_sync("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
        let cond = auto_sync(&mut app, &comparison);
        assert!(cond.is_none());
        assert!(app.spec.operation.is_some());
    }

    #[test]
    fn test_degraded_when_failed_with_same_overrides() {
        let mut app = fake_app();
        app.spec.source.component_parameter_overrides = Some(vec![ComponentParameter {
            component: String::new(),
            name: "a".to_string(),
            value: "1".to_string(),
        }]);
        let status = app.status.as_mut().unwrap();
        let op_state = status.operation_state.as_mut().unwrap();
        op_state.phase = OperationPhase::Failed;
        if let Some(sync) = op_state.operation.sync.as_mut() {
            sync.parameter_overrides = Some(vec![ComponentParameter {
                component: String::new(),
                name: "a".to_string(),
                value: "1".to_string(),
            }]);
        }
        op_state.sync_result = Some(SyncOperationResult {
            revision: "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_string(),
            ..SyncOperationResult::default()
        });

        let comparison = out_of_sync("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
        let cond = auto_sync(&mut app, &comparison);
        assert!(cond.is_some());
        assert!(app.spec.operation.is_none());
    }

    #[test]
    fn test_skip_while_operation_in_progress() {
        let mut app = fake_app();
        app.status.as_mut().unwrap().operation_state.as_mut().unwrap().phase =
            OperationPhase::Running;
        let comparison = out_of_sync("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");
        let cond = auto_sync(&mut app, &comparison);
        assert!(cond.is_none());
        assert!(app.spec.operation.is_none());
    }
}
