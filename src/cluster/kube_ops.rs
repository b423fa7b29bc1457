//! kube-rs backed implementation of the cluster contracts

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams};
use kube::core::GroupVersionKind;
use kube::discovery::{verbs, ApiResource, Discovery, Scope};
use kube::Client;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{ClusterConnector, ClusterOps, ResourceScope};
use crate::controller::resource_meta::{gvk_of, kind_of, name_of, namespace_of};
use crate::error::{Error, Result};

/// Field manager used for server-side apply.
const FIELD_MANAGER: &str = "windlass-operator";

pub struct KubeClusterOps {
    client: Client,
}

impl KubeClusterOps {
    pub fn new(client: Client) -> Self {
        KubeClusterOps { client }
    }

    async fn api_for(&self, gvk: &GroupVersionKind, namespace: &str) -> Result<Api<DynamicObject>> {
        let (ar, caps) = self.discover(gvk).await?;
        let api = match caps.scope {
            Scope::Namespaced => Api::namespaced_with(self.client.clone(), namespace, &ar),
            Scope::Cluster => Api::all_with(self.client.clone(), &ar),
        };
        Ok(api)
    }

    async fn discover(
        &self,
        gvk: &GroupVersionKind,
    ) -> Result<(ApiResource, kube::discovery::ApiCapabilities)> {
        match kube::discovery::oneshot::pinned_kind(&self.client, gvk).await {
            Ok(found) => Ok(found),
            Err(kube::Error::Api(e)) if e.code == 404 => Err(Error::KindNotFound(format!(
                "{}/{} {}",
                gvk.group, gvk.version, gvk.kind
            ))),
            Err(e) => Err(Error::KubeError(e)),
        }
    }
}

#[async_trait]
impl ClusterOps for KubeClusterOps {
    async fn apply_resource(
        &self,
        obj: &Value,
        namespace: &str,
        dry_run: bool,
        force: bool,
    ) -> Result<String> {
        let gvk = gvk_of(obj);
        let namespace = namespace_of(obj).unwrap_or(namespace);
        let api = self.api_for(&gvk, namespace).await?;
        let name = name_of(obj);
        let mut params = PatchParams::apply(FIELD_MANAGER);
        params.force = force;
        params.dry_run = dry_run;
        api.patch(name, &params, &Patch::Apply(obj)).await?;
        let suffix = if dry_run { " (dry run)" } else { "" };
        Ok(format!("{}/{} configured{}", kind_of(obj), name, suffix))
    }

    async fn delete_resource(&self, obj: &Value, namespace: &str) -> Result<()> {
        let gvk = gvk_of(obj);
        let namespace = namespace_of(obj).unwrap_or(namespace);
        let api = self.api_for(&gvk, namespace).await?;
        api.delete(name_of(obj), &DeleteParams::default()).await?;
        Ok(())
    }

    async fn get_resource(
        &self,
        gvk: &GroupVersionKind,
        name: &str,
        namespace: &str,
    ) -> Result<Option<Value>> {
        let api = match self.api_for(gvk, namespace).await {
            Ok(api) => api,
            Err(Error::KindNotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let Some(obj) = api.get_opt(name).await? else {
            return Ok(None);
        };
        let mut value = serde_json::to_value(&obj)?;
        ensure_type_meta(&mut value, &ApiResource::from_gvk(gvk));
        Ok(Some(value))
    }

    async fn list_resources_with_label(&self, key: &str, value: &str) -> Result<Vec<Value>> {
        let discovery = Discovery::new(self.client.clone()).run().await?;
        let params = ListParams::default().labels(&format!("{key}={value}"));
        let mut found = Vec::new();
        for group in discovery.groups() {
            for (ar, caps) in group.recommended_resources() {
                if !caps.supports_operation(verbs::LIST) {
                    continue;
                }
                let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &ar);
                let list = match api.list(&params).await {
                    Ok(list) => list,
                    Err(e) => {
                        debug!(kind = %ar.kind, error = %e, "skipping unlistable kind");
                        continue;
                    }
                };
                for item in list.items {
                    let mut obj = serde_json::to_value(&item)?;
                    ensure_type_meta(&mut obj, &ar);
                    found.push(obj);
                }
            }
        }
        // the same object can surface through multiple served versions
        let mut seen = std::collections::HashSet::new();
        found.retain(|obj| {
            let uid = obj
                .pointer("/metadata/uid")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            uid.is_empty() || seen.insert(uid)
        });
        Ok(found)
    }

    async fn server_resource_for(&self, gvk: &GroupVersionKind) -> Result<ResourceScope> {
        let (_, caps) = self.discover(gvk).await?;
        Ok(ResourceScope {
            namespaced: matches!(caps.scope, Scope::Namespaced),
        })
    }
}

/// List items come back without apiVersion/kind; restore them so downstream
/// pairing by group/kind works.
fn ensure_type_meta(obj: &mut Value, ar: &ApiResource) {
    let Some(map) = obj.as_object_mut() else {
        return;
    };
    if !map.contains_key("apiVersion") {
        map.insert("apiVersion".to_string(), Value::String(ar.api_version.clone()));
    }
    if !map.contains_key("kind") {
        map.insert("kind".to_string(), Value::String(ar.kind.clone()));
    }
}

/// Connector for the cluster this controller runs in. Resolving foreign
/// server URLs requires an external credential store; this connector rejects
/// them rather than silently targeting the wrong cluster.
pub struct LocalClusterConnector {
    client: Client,
    server: String,
}

impl LocalClusterConnector {
    pub fn new(client: Client, server: impl Into<String>) -> Self {
        LocalClusterConnector {
            client,
            server: server.into(),
        }
    }
}

#[async_trait]
impl ClusterConnector for LocalClusterConnector {
    async fn connect(&self, server: &str) -> Result<Arc<dyn ClusterOps>> {
        if server != self.server {
            warn!(server, "no credentials for destination cluster");
            return Err(Error::ConfigError(format!(
                "no credentials registered for cluster {server}"
            )));
        }
        Ok(Arc::new(KubeClusterOps::new(self.client.clone())))
    }
}
