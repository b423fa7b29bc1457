//! Finalizer handling for Application teardown
//!
//! The finalizer keeps an Application object alive until the resources it
//! deployed are removed from the target cluster. Cleanup is best-effort per
//! object; errors are aggregated so one stuck resource does not hide the
//! rest.

use std::sync::Arc;

use tracing::{info, warn};

use crate::cluster::ClusterOps;
use crate::controller::resource_meta::{kind_of, name_of, namespace_of, APP_NAME_LABEL};
use crate::crd::Application;
use crate::error::{Error, Result};

/// Finalizer protecting Application resources until cleanup completes.
pub const APPLICATION_FINALIZER: &str = "application.windlass.io/finalizer";

/// Check if the application is being deleted
///
/// A deletion timestamp indicates the user has requested deletion, but
/// finalizers are preventing the actual removal.
pub fn is_being_deleted(app: &Application) -> bool {
    app.metadata.deletion_timestamp.is_some()
}

/// Delete every live object carrying the Application's ownership label.
///
/// Called from the cleanup path of the finalizer. Deletion is fired for all
/// objects even when some fail; the first error is returned after the sweep
/// so the finalizer retries.
pub async fn finalize_application_deletion(
    cluster: Arc<dyn ClusterOps>,
    app: &Application,
    namespace: &str,
) -> Result<()> {
    let app_name = app.metadata.name.clone().unwrap_or_default();
    let live = cluster
        .list_resources_with_label(APP_NAME_LABEL, &app_name)
        .await?;
    info!(app = %app_name, resources = live.len(), "finalizing application deletion");

    let mut first_error: Option<Error> = None;
    for obj in live {
        let target_namespace = namespace_of(&obj).unwrap_or(namespace);
        if let Err(e) = cluster.delete_resource(&obj, target_namespace).await {
            warn!(
                app = %app_name,
                kind = kind_of(&obj),
                name = name_of(&obj),
                error = %e,
                "failed to delete resource during finalization"
            );
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
