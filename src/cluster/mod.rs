//! Cluster access contracts
//!
//! The engine never speaks the API server's wire protocol directly: it works
//! against `ClusterOps`, a thin resource-apply primitive, and resolves a
//! destination server URL to an implementation through `ClusterConnector`.
//! Credential storage itself is external.

mod kube_ops;

use async_trait::async_trait;
use kube::core::GroupVersionKind;
use serde_json::Value;
use std::sync::Arc;

use crate::error::Result;

pub use kube_ops::{KubeClusterOps, LocalClusterConnector};

/// Whether a kind is namespaced or cluster-scoped, per discovery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceScope {
    pub namespaced: bool,
}

/// Resource-level operations against one cluster.
///
/// Implementations must distinguish an unknown kind (`Error::KindNotFound`
/// from `server_resource_for`) from other failures: the sync engine
/// special-cases kinds whose CRD is introduced within the same operation.
#[async_trait]
pub trait ClusterOps: Send + Sync {
    /// Server-side apply of a single object. Returns a human-readable
    /// outcome message.
    async fn apply_resource(
        &self,
        obj: &Value,
        namespace: &str,
        dry_run: bool,
        force: bool,
    ) -> Result<String>;

    async fn delete_resource(&self, obj: &Value, namespace: &str) -> Result<()>;

    async fn get_resource(
        &self,
        gvk: &GroupVersionKind,
        name: &str,
        namespace: &str,
    ) -> Result<Option<Value>>;

    /// Enumerate objects across all listable kinds carrying the given label.
    async fn list_resources_with_label(&self, key: &str, value: &str) -> Result<Vec<Value>>;

    /// Discovery lookup for a kind. `Error::KindNotFound` when the cluster
    /// does not serve it.
    async fn server_resource_for(&self, gvk: &GroupVersionKind) -> Result<ResourceScope>;
}

/// Resolves an Application's destination server URL to a `ClusterOps`.
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    async fn connect(&self, server: &str) -> Result<Arc<dyn ClusterOps>>;
}
