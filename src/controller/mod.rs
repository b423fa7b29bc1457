//! Controller module for Application reconciliation
//! This module contains the main controller loop, the state comparison
//! pipeline (normalize, diff, compare), and the sync engine.

pub mod resource_meta;

pub mod autosync;
#[cfg(test)]
mod autosync_test;
mod compare;
pub mod conditions;
pub mod diff;
mod finalizers;
pub mod hooks;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod normalize;
mod reconciler;
mod sync;

pub use autosync::auto_sync;
pub use compare::{AppComparison, AppStateManager, ResourcePair};
pub use finalizers::{finalize_application_deletion, is_being_deleted, APPLICATION_FINALIZER};
pub use reconciler::{run_controller, ControllerState};
pub use sync::{sort_sync_tasks, SyncTask, SYNC_ORDER};
