//! Sync operation types: the request (`Operation`) and the mutable execution
//! record (`OperationState`) persisted under `status.operationState`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::ComponentParameter;

/// A request to perform an operation against an Application. Currently the
/// only operation is a sync.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncOperation>,
}

/// Parameters of a single sync attempt.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperation {
    /// Revision to sync to. May be symbolic (branch, tag, HEAD); the engine
    /// resolves it to a concrete commit identifier on first entry.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub revision: String,

    /// Delete live objects that are no longer in the desired set.
    #[serde(default)]
    pub prune: bool,

    /// Validate only; do not mutate the cluster.
    #[serde(default)]
    pub dry_run: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_strategy: Option<SyncStrategy>,

    /// When non-empty, restricts the sync to the listed resources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<SyncOperationResource>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_overrides: Option<Vec<ComponentParameter>>,
}

/// Selects a resource out of the desired set for a selective sync.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperationResource {
    #[serde(default)]
    pub group: String,
    pub kind: String,
    pub name: String,
}

impl SyncOperationResource {
    pub fn matches(&self, group: &str, kind: &str, name: &str) -> bool {
        self.group == group && self.kind == kind && self.name == name
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncStrategy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apply: Option<SyncStrategyApply>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook: Option<SyncStrategyHook>,
}

/// Apply the manifests in order and let the next reconciliation assess health.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncStrategyApply {
    /// Pass force to the server-side apply, replacing conflicting fields.
    #[serde(default)]
    pub force: bool,
}

/// Drive the sync through hook phases (PreSync, Sync, PostSync).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SyncStrategyHook {}

/// Phase of an operation or of an individual hook.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum OperationPhase {
    #[default]
    Running,
    Terminating,
    Failed,
    Error,
    Succeeded,
}

impl OperationPhase {
    /// Terminal phases are never mutated except by a new operation.
    pub fn completed(&self) -> bool {
        matches!(
            self,
            OperationPhase::Failed | OperationPhase::Error | OperationPhase::Succeeded
        )
    }

    pub fn successful(&self) -> bool {
        matches!(self, OperationPhase::Succeeded)
    }
}

impl std::fmt::Display for OperationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationPhase::Running => write!(f, "Running"),
            OperationPhase::Terminating => write!(f, "Terminating"),
            OperationPhase::Failed => write!(f, "Failed"),
            OperationPhase::Error => write!(f, "Error"),
            OperationPhase::Succeeded => write!(f, "Succeeded"),
        }
    }
}

/// The record of an in-flight or most recent operation.
///
/// Once `phase` is terminal the state is immutable until a new operation
/// replaces it. `sync_result.revision`, once resolved, is write-once for the
/// lifetime of this state so that resumed operations are deterministic.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OperationState {
    pub operation: Operation,

    #[serde(default)]
    pub phase: OperationPhase,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_result: Option<SyncOperationResult>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
}

/// Outcome of a sync attempt, keyed by the resolved revision.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperationResult {
    /// Concrete commit identifier the operation is pinned to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub revision: String,

    /// Per-resource outcomes, unique by (kind, name).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceDetails>,

    /// Per-hook outcomes, unique by (name, kind, type).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hooks: Vec<HookStatus>,
}

/// Per-object outcome of an apply or prune.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDetails {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default)]
    pub status: ResourceSyncStatus,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ResourceSyncStatus {
    #[default]
    Synced,
    SyncFailed,
    SyncedAndPruned,
    PruningRequired,
}

impl ResourceSyncStatus {
    pub fn successful(&self) -> bool {
        !matches!(self, ResourceSyncStatus::SyncFailed)
    }
}

/// Lifecycle phase a hook resource is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum HookType {
    PreSync,
    Sync,
    PostSync,
    SyncFail,
    /// The object is excluded from sync entirely.
    Skip,
}

impl std::fmt::Display for HookType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookType::PreSync => write!(f, "PreSync"),
            HookType::Sync => write!(f, "Sync"),
            HookType::PostSync => write!(f, "PostSync"),
            HookType::SyncFail => write!(f, "SyncFail"),
            HookType::Skip => write!(f, "Skip"),
        }
    }
}

impl std::str::FromStr for HookType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PreSync" => Ok(HookType::PreSync),
            "Sync" => Ok(HookType::Sync),
            "PostSync" => Ok(HookType::PostSync),
            "SyncFail" => Ok(HookType::SyncFail),
            "Skip" => Ok(HookType::Skip),
            other => Err(format!("unrecognized hook type: {other}")),
        }
    }
}

/// When the engine deletes a hook resource it created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum HookDeletePolicy {
    /// Delete any existing hook resource before creating a fresh one.
    BeforeHookCreation,
    HookSucceeded,
    HookFailed,
}

impl std::str::FromStr for HookDeletePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BeforeHookCreation" => Ok(HookDeletePolicy::BeforeHookCreation),
            "HookSucceeded" => Ok(HookDeletePolicy::HookSucceeded),
            "HookFailed" => Ok(HookDeletePolicy::HookFailed),
            other => Err(format!("unrecognized hook delete policy: {other}")),
        }
    }
}

/// Tracked status of a single hook resource within an operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HookStatus {
    pub name: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(rename = "type")]
    pub hook_type: HookType,
    #[serde(default)]
    pub phase: OperationPhase,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}
