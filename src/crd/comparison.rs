//! Comparison outcome types persisted under `status.comparisonResult`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::ComponentParameter;
use crate::error::Result;

/// Overall sync classification of an Application.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ComparisonStatus {
    #[default]
    Unknown,
    Synced,
    OutOfSync,
}

impl std::fmt::Display for ComparisonStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComparisonStatus::Unknown => write!(f, "Unknown"),
            ComparisonStatus::Synced => write!(f, "Synced"),
            ComparisonStatus::OutOfSync => write!(f, "OutOfSync"),
        }
    }
}

/// The last observed diff outcome for an Application.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    #[serde(default)]
    pub status: ComparisonStatus,

    /// Concrete revision the desired manifests were rendered from.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub revision: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceState>,

    /// Clearing this forces a fresh comparison on the next reconciliation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compared_at: Option<String>,
}

/// A (desired, live) pair keyed by group/version/kind/namespace/name.
///
/// Either side may be absent: an empty `target_state` marks a candidate for
/// pruning, an empty `live_state` marks a pending creation. Objects are stored
/// serialized so the comparison survives the round-trip through the status
/// subresource.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceState {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_state: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub live_state: String,

    #[serde(default)]
    pub status: ComparisonStatus,
}

impl ResourceState {
    pub fn new(target: Option<&Value>, live: Option<&Value>, status: ComparisonStatus) -> Self {
        ResourceState {
            target_state: target.map(|v| v.to_string()).unwrap_or_default(),
            live_state: live.map(|v| v.to_string()).unwrap_or_default(),
            status,
        }
    }

    pub fn target_object(&self) -> Result<Option<Value>> {
        Self::parse(&self.target_state)
    }

    pub fn live_object(&self) -> Result<Option<Value>> {
        Self::parse(&self.live_state)
    }

    fn parse(state: &str) -> Result<Option<Value>> {
        if state.is_empty() || state == "null" {
            return Ok(None);
        }
        let obj: Value = serde_json::from_str(state)?;
        Ok(Some(obj))
    }
}

/// Condition types surfaced on the Application.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ApplicationConditionType {
    /// The comparison could not be completed.
    ComparisonError,
    /// A desired manifest is unparseable or malformed.
    ManifestError,
    /// A sync attempt failed; also used by auto-sync to report suppression.
    SyncError,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationCondition {
    #[serde(rename = "type")]
    pub condition_type: ApplicationConditionType,
    pub message: String,
}

impl ApplicationCondition {
    pub fn new(condition_type: ApplicationConditionType, message: impl Into<String>) -> Self {
        ApplicationCondition {
            condition_type,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self.condition_type,
            ApplicationConditionType::ComparisonError | ApplicationConditionType::ManifestError
        )
    }
}

/// A successfully deployed revision recorded in `status.history`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentInfo {
    pub revision: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<ComponentParameter>,
    pub deployed_at: String,
}
