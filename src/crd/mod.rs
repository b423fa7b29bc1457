//! Custom Resource Definitions for Windlass
//!
//! This module defines the Application and AppProject CRDs plus the status
//! types the controller writes back.

mod application;
mod comparison;
mod operation;
mod project;
pub mod types;


pub use application::{Application, ApplicationSpec, ApplicationStatus, SpecValidationError};
pub use comparison::{
    ApplicationCondition, ApplicationConditionType, ComparisonResult, ComparisonStatus,
    DeploymentInfo, ResourceState,
};
pub use operation::{
    HookDeletePolicy, HookStatus, HookType, Operation, OperationPhase, OperationState,
    ResourceDetails, ResourceSyncStatus, SyncOperation, SyncOperationResource,
    SyncOperationResult, SyncStrategy, SyncStrategyApply, SyncStrategyHook,
};
pub use project::{AppProject, AppProjectSpec, GroupKind, ProjectDestination};
pub use types::*;
