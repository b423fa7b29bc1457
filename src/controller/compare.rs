//! Application state comparison
//!
//! `AppStateManager::compare_app_state` fetches the desired manifests from
//! the manifest service and the live objects from the target cluster, pairs
//! them by group/kind/namespace/name, and classifies the Application as
//! Synced or OutOfSync.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::diff;
use super::hooks::is_hook;
use super::resource_meta::{
    gvk_of, name_of, namespace_of, resource_key, set_label, APP_NAME_LABEL,
};
use crate::cluster::ClusterConnector;
use crate::crd::{
    Application, ApplicationCondition, ApplicationConditionType, ComparisonResult,
    ComparisonStatus, ComponentParameter, ResourceState,
};
use crate::error::Result;
use crate::manifest::{ManifestRequest, ManifestResponse, ManifestService};

/// Orchestrates comparison and sync for Applications. Shared by the
/// reconciler across all Applications; holds no per-Application state.
pub struct AppStateManager {
    pub(crate) manifests: Arc<dyn ManifestService>,
    pub(crate) clusters: Arc<dyn ClusterConnector>,
}

/// A paired desired/live object, in memory.
#[derive(Clone, Debug, Default)]
pub struct ResourcePair {
    pub target: Option<Value>,
    pub live: Option<Value>,
}

/// Everything `compare_app_state` produces. The serialized form lives in
/// `comparison`; `resources` carries the same pairs as parsed objects for the
/// sync engine.
pub struct AppComparison {
    pub comparison: ComparisonResult,
    pub manifest_info: ManifestResponse,
    pub resources: Vec<ResourcePair>,
    pub conditions: Vec<ApplicationCondition>,
}

impl AppStateManager {
    pub fn new(manifests: Arc<dyn ManifestService>, clusters: Arc<dyn ClusterConnector>) -> Self {
        AppStateManager {
            manifests,
            clusters,
        }
    }

    /// Compare desired and live state at a revision.
    ///
    /// `revision` overrides the Application's target revision (used by the
    /// sync engine to pin resumed operations). Per-resource problems surface
    /// as non-fatal conditions; a fatal failure (manifest service or cluster
    /// unreachable) returns `Err`.
    #[instrument(skip(self, app, overrides), fields(app = %app.metadata.name.as_deref().unwrap_or("")))]
    pub async fn compare_app_state(
        &self,
        app: &Application,
        revision: Option<&str>,
        overrides: Option<&[ComponentParameter]>,
    ) -> Result<AppComparison> {
        let app_name = app.metadata.name.clone().unwrap_or_default();
        let dest_namespace = app.spec.destination.namespace.clone();

        let request = ManifestRequest {
            repo_url: app.spec.source.repo_url.clone(),
            path: app.spec.source.path.clone(),
            revision: revision
                .map(str::to_string)
                .unwrap_or_else(|| app.spec.source.target_revision.clone()),
            parameter_overrides: overrides
                .map(<[ComponentParameter]>::to_vec)
                .or_else(|| app.spec.source.component_parameter_overrides.clone())
                .unwrap_or_default(),
        };
        let manifest_info = self.manifests.generate_manifests(&request).await?;
        debug!(revision = %manifest_info.revision, manifests = manifest_info.manifests.len(), "rendered manifests");

        let mut conditions: Vec<ApplicationCondition> = Vec::new();
        let mut targets: Vec<Value> = Vec::new();
        for raw in &manifest_info.manifests {
            match serde_json::from_str::<Value>(raw) {
                Ok(mut obj) => {
                    if !obj.is_object() {
                        conditions.push(ApplicationCondition::new(
                            ApplicationConditionType::ManifestError,
                            "manifest is not an object",
                        ));
                        continue;
                    }
                    // hook objects are managed by the sync engine, not part
                    // of the steady-state desired set
                    if is_hook(&obj) {
                        continue;
                    }
                    set_label(&mut obj, APP_NAME_LABEL, &app_name);
                    targets.push(obj);
                }
                Err(e) => {
                    conditions.push(ApplicationCondition::new(
                        ApplicationConditionType::ManifestError,
                        format!("manifest is unparseable: {e}"),
                    ));
                }
            }
        }

        let cluster = self.clusters.connect(&app.spec.destination.server).await?;
        let labeled = cluster
            .list_resources_with_label(APP_NAME_LABEL, &app_name)
            .await?;

        let mut live_by_key: HashMap<(String, String, String, String), Value> = HashMap::new();
        for obj in labeled {
            // live hook resources are tracked through the operation state,
            // never as prune candidates
            if is_hook(&obj) {
                continue;
            }
            live_by_key.insert(resource_key(&obj, &dest_namespace), obj);
        }
        // objects from the desired set that exist but are not labeled yet
        for target in &targets {
            let key = resource_key(target, &dest_namespace);
            if live_by_key.contains_key(&key) {
                continue;
            }
            let namespace = namespace_of(target).unwrap_or(&dest_namespace);
            match cluster
                .get_resource(&gvk_of(target), name_of(target), namespace)
                .await
            {
                Ok(Some(obj)) => {
                    live_by_key.insert(key, obj);
                }
                Ok(None) => {}
                Err(e) if e.is_transient() => return Err(e),
                Err(e) => {
                    warn!(error = %e, "failed to look up live object");
                    conditions.push(ApplicationCondition::new(
                        ApplicationConditionType::ComparisonError,
                        e.to_string(),
                    ));
                }
            }
        }

        let mut pairs: Vec<ResourcePair> = Vec::new();
        for target in targets {
            let live = live_by_key.remove(&resource_key(&target, &dest_namespace));
            pairs.push(ResourcePair {
                target: Some(target),
                live,
            });
        }
        // remaining live objects carry our label but are no longer desired:
        // candidates for pruning
        for (_, live) in live_by_key {
            pairs.push(ResourcePair {
                target: None,
                live: Some(live),
            });
        }

        let target_list: Vec<Option<Value>> = pairs.iter().map(|p| p.target.clone()).collect();
        let live_list: Vec<Option<Value>> = pairs.iter().map(|p| p.live.clone()).collect();
        let batch = diff::diff_array(&target_list, &live_list)?;

        let mut resource_states = Vec::with_capacity(pairs.len());
        let mut any_out_of_sync = false;
        for (pair, diff_res) in pairs.iter().zip(batch.diffs.iter()) {
            let orphaned = pair.target.is_none() && pair.live.is_some();
            let out_of_sync = diff_res.modified || orphaned;
            any_out_of_sync |= out_of_sync;
            if let Some(diag) = &diff_res.diagnostic {
                conditions.push(ApplicationCondition::new(
                    ApplicationConditionType::ManifestError,
                    diag.clone(),
                ));
            }
            resource_states.push(ResourceState::new(
                pair.target.as_ref(),
                pair.live.as_ref(),
                if out_of_sync {
                    ComparisonStatus::OutOfSync
                } else {
                    ComparisonStatus::Synced
                },
            ));
        }

        let comparison = ComparisonResult {
            status: if any_out_of_sync {
                ComparisonStatus::OutOfSync
            } else {
                ComparisonStatus::Synced
            },
            revision: manifest_info.revision.clone(),
            resources: resource_states,
            compared_at: Some(Utc::now().to_rfc3339()),
        };

        Ok(AppComparison {
            comparison,
            manifest_info,
            resources: pairs,
            conditions,
        })
    }
}

impl AppComparison {
    pub fn error_conditions(&self) -> Vec<&ApplicationCondition> {
        self.conditions.iter().filter(|c| c.is_error()).collect()
    }
}

pub(crate) fn format_conditions(conditions: &[&ApplicationCondition]) -> String {
    conditions
        .iter()
        .map(|c| c.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}
