//! Full operation lifecycle through the public API
//!
//! Drives an Application from OutOfSync through an automated sync to a
//! terminal Succeeded operation against in-memory collaborators, asserting
//! the contract between the comparator, the auto-sync policy, and the sync
//! engine.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kube::core::GroupVersionKind;
use serde_json::{json, Value};

use windlass::cluster::{ClusterConnector, ClusterOps, ResourceScope};
use windlass::controller::{auto_sync, AppStateManager};
use windlass::crd::{
    AppProject, Application, ApplicationDestination, ApplicationSource, ApplicationSpec,
    AutomatedSyncPolicy, ComparisonStatus, OperationPhase, OperationState, SyncPolicy,
};
use windlass::error::Result;
use windlass::manifest::{ManifestRequest, ManifestResponse, ManifestService};

struct RepoAtRevision {
    resolved: String,
    manifests: Vec<Value>,
}

#[async_trait]
impl ManifestService for RepoAtRevision {
    async fn generate_manifests(&self, req: &ManifestRequest) -> Result<ManifestResponse> {
        let revision = if req.revision.is_empty() || req.revision == "HEAD" {
            self.resolved.clone()
        } else {
            req.revision.clone()
        };
        Ok(ManifestResponse {
            revision,
            manifests: self.manifests.iter().map(Value::to_string).collect(),
            params: Vec::new(),
        })
    }
}

#[derive(Default)]
struct InMemoryCluster {
    objects: Mutex<HashMap<(String, String, String, String), Value>>,
}

fn key_of(obj: &Value, fallback_namespace: &str) -> (String, String, String, String) {
    let api_version = obj["apiVersion"].as_str().unwrap_or_default();
    let group = api_version.split_once('/').map(|(g, _)| g).unwrap_or("");
    (
        group.to_string(),
        obj["kind"].as_str().unwrap_or_default().to_string(),
        obj.pointer("/metadata/namespace")
            .and_then(Value::as_str)
            .unwrap_or(fallback_namespace)
            .to_string(),
        obj.pointer("/metadata/name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    )
}

#[async_trait]
impl ClusterOps for InMemoryCluster {
    async fn apply_resource(
        &self,
        obj: &Value,
        namespace: &str,
        dry_run: bool,
        _force: bool,
    ) -> Result<String> {
        if !dry_run {
            self.objects
                .lock()
                .unwrap()
                .insert(key_of(obj, namespace), obj.clone());
        }
        Ok(format!(
            "{}/{} configured",
            obj["kind"].as_str().unwrap_or_default(),
            obj.pointer("/metadata/name").and_then(Value::as_str).unwrap_or_default()
        ))
    }

    async fn delete_resource(&self, obj: &Value, namespace: &str) -> Result<()> {
        self.objects.lock().unwrap().remove(&key_of(obj, namespace));
        Ok(())
    }

    async fn get_resource(
        &self,
        gvk: &GroupVersionKind,
        name: &str,
        namespace: &str,
    ) -> Result<Option<Value>> {
        let key = (
            gvk.group.clone(),
            gvk.kind.clone(),
            namespace.to_string(),
            name.to_string(),
        );
        Ok(self.objects.lock().unwrap().get(&key).cloned())
    }

    async fn list_resources_with_label(&self, key: &str, value: &str) -> Result<Vec<Value>> {
        let pointer = format!("/metadata/labels/{}", key.replace('/', "~1"));
        Ok(self
            .objects
            .lock()
            .unwrap()
            .values()
            .filter(|obj| obj.pointer(&pointer).and_then(Value::as_str) == Some(value))
            .cloned()
            .collect())
    }

    async fn server_resource_for(&self, _gvk: &GroupVersionKind) -> Result<ResourceScope> {
        Ok(ResourceScope { namespaced: true })
    }
}

struct SingleCluster(Arc<InMemoryCluster>);

#[async_trait]
impl ClusterConnector for SingleCluster {
    async fn connect(&self, _server: &str) -> Result<Arc<dyn ClusterOps>> {
        Ok(self.0.clone())
    }
}

fn guestbook_app() -> Application {
    Application::new(
        "guestbook",
        ApplicationSpec {
            source: ApplicationSource {
                repo_url: "https://github.com/windlass-io/example-apps.git".to_string(),
                path: "guestbook".to_string(),
                target_revision: String::new(),
                component_parameter_overrides: None,
            },
            destination: ApplicationDestination {
                server: "https://kubernetes.default.svc".to_string(),
                namespace: "default".to_string(),
            },
            project: "default".to_string(),
            sync_policy: Some(SyncPolicy {
                automated: Some(AutomatedSyncPolicy { prune: false }),
            }),
            operation: None,
        },
    )
}

fn guestbook_manifests() -> Vec<Value> {
    vec![
        json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": {"name": "guestbook-ui"},
            "spec": {"ports": [{"port": 80, "targetPort": 8080}], "selector": {"app": "guestbook-ui"}}
        }),
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "guestbook-ui"},
            "spec": {
                "replicas": 1,
                "selector": {"matchLabels": {"app": "guestbook-ui"}},
                "template": {
                    "metadata": {"labels": {"app": "guestbook-ui"}},
                    "spec": {"containers": [{"name": "guestbook-ui", "image": "guestbook:v2"}]}
                }
            }
        }),
    ]
}

const REVISION: &str = "1d1a1e1f1d1a1e1f1d1a1e1f1d1a1e1f1d1a1e1f";

#[tokio::test]
async fn full_automated_sync_lifecycle() {
    let cluster = Arc::new(InMemoryCluster::default());
    let manager = AppStateManager::new(
        Arc::new(RepoAtRevision {
            resolved: REVISION.to_string(),
            manifests: guestbook_manifests(),
        }),
        Arc::new(SingleCluster(Arc::clone(&cluster))),
    );
    let mut app = guestbook_app();
    let proj = AppProject::default_project("windlass");

    // 1. Nothing deployed yet: the comparison reports OutOfSync at the
    // resolved revision.
    let compared = manager.compare_app_state(&app, None, None).await.unwrap();
    assert_eq!(compared.comparison.status, ComparisonStatus::OutOfSync);
    assert_eq!(compared.comparison.revision, REVISION);
    assert_eq!(compared.comparison.resources.len(), 2);

    // 2. The automated policy requests a sync at that revision.
    let condition = auto_sync(&mut app, &compared.comparison);
    assert!(condition.is_none());
    let operation = app.spec.operation.clone().expect("operation enqueued");
    assert_eq!(operation.sync.as_ref().unwrap().revision, REVISION);

    // 3. Execute the operation to a terminal phase, re-entering like the
    // reconciler does.
    let mut op_state = OperationState {
        operation,
        phase: OperationPhase::Running,
        ..OperationState::default()
    };
    app.spec.operation = None;

    let mut deployment = None;
    for _ in 0..5 {
        deployment = manager.sync_app_state(&app, &proj, &mut op_state).await;
        if op_state.phase.completed() {
            break;
        }
    }
    assert_eq!(op_state.phase, OperationPhase::Succeeded);
    let sync_res = op_state.sync_result.as_ref().unwrap();
    assert_eq!(sync_res.revision, REVISION);
    assert_eq!(sync_res.resources.len(), 2);
    let deployment = deployment.expect("history entry for a successful sync");
    assert_eq!(deployment.revision, REVISION);

    // 4. The cluster now matches the desired state.
    let compared = manager.compare_app_state(&app, None, None).await.unwrap();
    assert_eq!(compared.comparison.status, ComparisonStatus::Synced);

    // 5. Auto-sync goes quiet: already synced.
    let mut app_after = app.clone();
    app_after.status = Some(windlass::crd::ApplicationStatus {
        comparison_result: Some(compared.comparison.clone()),
        operation_state: Some(op_state),
        history: vec![deployment],
        conditions: Vec::new(),
    });
    let condition = auto_sync(&mut app_after, &compared.comparison);
    assert!(condition.is_none());
    assert!(app_after.spec.operation.is_none());
}
