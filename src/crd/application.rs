//! Application Custom Resource Definition
//!
//! An Application binds a source of rendered manifests to a target cluster
//! and namespace. The controller compares the rendered manifests against the
//! live cluster state and reports or reconciles the difference.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::comparison::{ApplicationCondition, ComparisonResult, DeploymentInfo};
use super::operation::{Operation, OperationState};
use super::types::{ApplicationDestination, ApplicationSource, SyncPolicy};

/// Structured validation error for `ApplicationSpec`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpecValidationError {
    pub field: String,
    pub message: String,
}

impl SpecValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "windlass.io",
    version = "v1alpha1",
    kind = "Application",
    namespaced,
    status = "ApplicationStatus",
    shortname = "app",
    printcolumn = r#"{"name":"Sync","type":"string","jsonPath":".status.comparisonResult.status"}"#,
    printcolumn = r#"{"name":"Revision","type":"string","jsonPath":".status.comparisonResult.revision"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.operationState.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    pub source: ApplicationSource,
    pub destination: ApplicationDestination,

    /// Name of the AppProject scoping what this Application may deploy.
    #[serde(default = "default_project")]
    pub project: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_policy: Option<SyncPolicy>,

    /// Pending operation request. Written by auto-sync or an external actor,
    /// consumed by the controller when it starts executing the operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
}

fn default_project() -> String {
    "default".to_string()
}

impl ApplicationSpec {
    /// Validate the spec before reconciling it.
    ///
    /// # Errors
    ///
    /// Returns every problem found, not just the first.
    pub fn validate(&self) -> Result<(), Vec<SpecValidationError>> {
        let mut errors: Vec<SpecValidationError> = Vec::new();

        if self.source.repo_url.trim().is_empty() {
            errors.push(SpecValidationError::new(
                "spec.source.repoURL",
                "source.repoURL must not be empty",
            ));
        }
        if self.destination.server.trim().is_empty() {
            errors.push(SpecValidationError::new(
                "spec.destination.server",
                "destination.server must not be empty",
            ));
        }
        if self.project.trim().is_empty() {
            errors.push(SpecValidationError::new(
                "spec.project",
                "project must not be empty",
            ));
        }
        if let Some(overrides) = &self.source.component_parameter_overrides {
            for (i, p) in overrides.iter().enumerate() {
                if p.name.trim().is_empty() {
                    errors.push(SpecValidationError::new(
                        format!("spec.source.componentParameterOverrides[{i}].name"),
                        "parameter override name must not be empty",
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn automated_sync_enabled(&self) -> bool {
        self.sync_policy
            .as_ref()
            .map(|p| p.automated.is_some())
            .unwrap_or(false)
    }
}

/// Status written back by the controller. This is the only durable surface
/// the core mutates.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison_result: Option<ComparisonResult>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_state: Option<OperationState>,

    /// Most recent successful deployments, newest last, bounded length.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<DeploymentInfo>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ApplicationCondition>,
}

impl Application {
    /// True while a sync operation is executing or requested.
    pub fn operation_in_progress(&self) -> bool {
        if self.spec.operation.is_some() {
            return true;
        }
        self.status
            .as_ref()
            .and_then(|s| s.operation_state.as_ref())
            .map(|op| !op.phase.completed())
            .unwrap_or(false)
    }
}
