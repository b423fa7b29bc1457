//! Shared types for Application specifications
//!
//! These types are used across the CRD definitions and controller logic. They
//! define where manifests come from, which cluster they target, and how sync
//! behavior is parameterized.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to the version-controlled source of desired manifests.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSource {
    /// URL of the repository the manifest service renders from.
    #[serde(rename = "repoURL")]
    pub repo_url: String,

    /// Path within the repository.
    #[serde(default)]
    pub path: String,

    /// Symbolic or concrete revision. Empty means the repository default.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_revision: String,

    /// Per-component parameter overrides forwarded to the manifest service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_parameter_overrides: Option<Vec<ComponentParameter>>,
}

/// The downstream cluster and namespace an Application deploys into.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationDestination {
    /// Server URL, resolved to connection parameters by the credential store.
    pub server: String,

    /// Namespace for namespaced resources that do not declare their own.
    #[serde(default)]
    pub namespace: String,
}

/// A single name/value parameter override.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentParameter {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub component: String,
    pub name: String,
    pub value: String,
}

/// Controls whether the controller syncs on its own.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncPolicy {
    /// Present (possibly empty) to enable automated sync.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub automated: Option<AutomatedSyncPolicy>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AutomatedSyncPolicy {
    /// Allow automated syncs to prune obsolete resources.
    #[serde(default)]
    pub prune: bool,
}

/// Order-insensitive set equality on (name, value) pairs.
pub fn parameter_overrides_equal(
    left: Option<&[ComponentParameter]>,
    right: Option<&[ComponentParameter]>,
) -> bool {
    use std::collections::HashSet;
    fn to_set(params: Option<&[ComponentParameter]>) -> HashSet<&ComponentParameter> {
        params.unwrap_or_default().iter().collect()
    }
    to_set(left) == to_set(right)
}
