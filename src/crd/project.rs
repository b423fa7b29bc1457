//! AppProject Custom Resource Definition
//!
//! Projects scope what Applications may deploy: which repositories they may
//! source from, which destinations they may target, and which resource kinds
//! they may touch.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A (group, kind) pair; `*` matches any value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupKind {
    #[serde(default)]
    pub group: String,
    pub kind: String,
}

impl GroupKind {
    fn matches(&self, group: &str, kind: &str) -> bool {
        (self.group == "*" || self.group == group) && (self.kind == "*" || self.kind == kind)
    }
}

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "windlass.io",
    version = "v1alpha1",
    kind = "AppProject",
    namespaced,
    shortname = "appproj"
)]
#[serde(rename_all = "camelCase")]
pub struct AppProjectSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Repository URLs Applications in this project may source from.
    /// `*` permits any repository.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_repos: Vec<String>,

    /// Destinations Applications in this project may deploy to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub destinations: Vec<ProjectDestination>,

    /// Cluster-scoped kinds that may be applied. Empty denies all
    /// cluster-scoped resources.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cluster_resource_whitelist: Vec<GroupKind>,

    /// Namespaced kinds that may not be applied.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespace_resource_blacklist: Vec<GroupKind>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDestination {
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub namespace: String,
}

impl AppProject {
    /// The implicit project used when an Application names none. Permits
    /// everything.
    pub fn default_project(namespace: &str) -> AppProject {
        let mut proj = AppProject::new(
            "default",
            AppProjectSpec {
                source_repos: vec!["*".to_string()],
                destinations: vec![ProjectDestination {
                    server: "*".to_string(),
                    namespace: "*".to_string(),
                }],
                cluster_resource_whitelist: vec![GroupKind {
                    group: "*".to_string(),
                    kind: "*".to_string(),
                }],
                ..AppProjectSpec::default()
            },
        );
        proj.metadata.namespace = Some(namespace.to_string());
        proj
    }

    /// Admission check applied per kind-group during sync. Namespaced kinds
    /// are permitted unless blacklisted; cluster-scoped kinds are denied
    /// unless whitelisted.
    pub fn is_resource_permitted(&self, group: &str, kind: &str, namespaced: bool) -> bool {
        if namespaced {
            !self
                .spec
                .namespace_resource_blacklist
                .iter()
                .any(|gk| gk.matches(group, kind))
        } else {
            self.spec
                .cluster_resource_whitelist
                .iter()
                .any(|gk| gk.matches(group, kind))
        }
    }

    pub fn is_source_permitted(&self, repo_url: &str) -> bool {
        self.spec
            .source_repos
            .iter()
            .any(|r| r == "*" || r == repo_url)
    }

    pub fn is_destination_permitted(&self, server: &str, namespace: &str) -> bool {
        self.spec.destinations.iter().any(|d| {
            (d.server == "*" || d.server == server)
                && (d.namespace == "*" || d.namespace == namespace)
        })
    }
}
