//! Prometheus metrics for the Windlass operator
//!
//! # Exported metrics
//! The `/metrics` endpoint (when built with `--features metrics`) exports:
//! - `windlass_reconcile_total` (counter): reconciliations labeled by namespace/name.
//! - `windlass_reconcile_errors_total` (counter): reconcile errors labeled by namespace/name.
//! - `windlass_sync_operations_total` (counter): completed sync operations labeled by phase.
//! - `windlass_out_of_sync` (gauge): 1 when the application's last comparison was OutOfSync.

use std::sync::atomic::{AtomicI64, AtomicU64};

use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

/// Labels identifying one Application
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct AppLabels {
    pub namespace: String,
    pub name: String,
}

/// Labels for completed sync operations
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct SyncLabels {
    pub namespace: String,
    pub name: String,
    pub phase: String,
}

/// Counter tracking reconciliations per Application
pub static RECONCILE_TOTAL: Lazy<Family<AppLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

/// Counter tracking reconcile errors per Application
pub static RECONCILE_ERRORS_TOTAL: Lazy<Family<AppLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

/// Counter tracking completed sync operations by terminal phase
pub static SYNC_OPERATIONS_TOTAL: Lazy<Family<SyncLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

/// Gauge set to 1 while an Application compares OutOfSync
pub static OUT_OF_SYNC: Lazy<Family<AppLabels, Gauge<i64, AtomicI64>>> =
    Lazy::new(Family::default);

/// Register all metric families into a registry.
pub fn register(registry: &mut Registry) {
    registry.register(
        "windlass_reconcile",
        "Reconciliations per application",
        RECONCILE_TOTAL.clone(),
    );
    registry.register(
        "windlass_reconcile_errors",
        "Reconcile errors per application",
        RECONCILE_ERRORS_TOTAL.clone(),
    );
    registry.register(
        "windlass_sync_operations",
        "Completed sync operations by terminal phase",
        SYNC_OPERATIONS_TOTAL.clone(),
    );
    registry.register(
        "windlass_out_of_sync",
        "Whether the application's last comparison was OutOfSync",
        OUT_OF_SYNC.clone(),
    );
}
