//! # Error Policy
//!
//! Handling for errors that escape the reconcile engine and for errors
//! reported by the controller streams.
//!
//! The engine folds kind failures into a [`ReconcileOutcome`]; only
//! platform failures while reading or seeding an object reach the error
//! policy. Those are retried after a fixed delay and do not count against
//! the failure budget.
//!
//! [`ReconcileOutcome`]: crate::controller::ReconcileOutcome

use crate::constants;
use crate::controller::{Engine, ReconcilerError};
use crate::observability;
use kube::ResourceExt;
use kube_runtime::controller::{self, Action};
use kube_runtime::watcher;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Requeue an object whose reconcile failed before the engine could classify the error
pub fn handle_reconciliation_error<K>(obj: Arc<K>, error: &ReconcilerError, engine: Arc<Engine<K>>) -> Action
where
    K: kube::Resource,
{
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.kind = engine.kind(),
        resource.name = %name,
        resource.namespace = %namespace,
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for {} {}/{}: {}", engine.kind(), namespace, name, error);
    observability::metrics::increment_reconciliation_errors(engine.kind(), error.class().as_str());

    let delay = if error.is_conflict() {
        Duration::from_secs(constants::CONFLICT_REQUEUE_SECS)
    } else {
        Duration::from_secs(constants::DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS)
    };
    info!("🔄 Retrying {} {}/{} in {:?}", engine.kind(), namespace, name, delay);
    observability::metrics::increment_requeues_total("error");
    Action::requeue(delay)
}

/// Log an error reported by a controller stream
///
/// Reconciler failures were already handled by [`handle_reconciliation_error`];
/// watcher failures are retried by the watcher's own backoff.
pub fn handle_watch_stream_error(kind: &str, error: &controller::Error<ReconcilerError, watcher::Error>) {
    match error {
        controller::Error::ObjectNotFound(obj_ref) => {
            debug!("{} {} no longer exists, skipping", kind, obj_ref.name);
        }
        controller::Error::ReconcilerFailed(e, obj_ref) => {
            debug!("{} {} reconcile failed: {}", kind, obj_ref.name, e);
        }
        controller::Error::QueueError(watcher::Error::WatchError(status)) if status.code == 410 => {
            warn!("{} watch resource version expired (410), the watch will restart", kind);
        }
        controller::Error::QueueError(watcher::Error::WatchError(status)) if status.code == 401 || status.code == 403 => {
            error!(
                "❌ {} watch was denied ({}): check the operator's RBAC permissions",
                kind, status.code
            );
        }
        controller::Error::QueueError(e) => {
            warn!("{} watch error: {}", kind, e);
        }
        other => {
            error!("{} controller stream error: {}", kind, other);
        }
    }
}
