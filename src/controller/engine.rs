//! # Reconcile Engine
//!
//! Generic control loop shared by every kind:
//!
//! 1. Fetch the latest object; a deleted object is a clean stop.
//! 2. Seed the lifecycle conditions on objects that have none.
//! 3. Delegate to the kind's [`KindReconciler`].
//! 4. Record success, or classify the failure and decide on requeue.
//!
//! Repeated identical failures are counted by the [`FailureTracker`]; at
//! the limit the engine gives up, notifies once and waits for the object
//! to change.

use crate::constants::CONFLICT_REQUEUE_SECS;
use crate::controller::error::{ErrorClass, ReconcilerError};
use crate::controller::failure_tracker::FailureTracker;
use crate::controller::store::ObjectStore;
use crate::crd::condition::{AVAILABLE, DEGRADED, PROGRESSING, UPGRADEABLE};
use crate::crd::{Condition, ConditionStatus, Conditioned};
use crate::notifications::{Event, Level, Notifier, Reason, ReasonKind, Source};
use crate::observability;
use async_trait::async_trait;
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn, Instrument};

const REASON_INIT: &str = "Init";
const MESSAGE_INIT: &str = "Initializing Jenkins operator";
const REASON_COMPLETED: &str = "ReconciliationCompleted";
const MESSAGE_COMPLETED: &str = "Reconciliation completed successfully";
const REASON_PENDING: &str = "ReconciliationPending";
const MESSAGE_FAILED: &str = "Failed reconciliation";

/// Result of a kind-specific reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindOutcome {
    /// Desired state reached
    Converged,
    /// Still converging, check again after the delay
    Pending(Duration),
    /// Nothing to do, status is left untouched
    Skipped,
}

/// Kind-specific reconciliation logic driven by the engine
#[async_trait]
pub trait KindReconciler<K>: Send + Sync {
    /// Bring the world in line with `obj`
    ///
    /// Status changes made on `obj` are persisted by the engine.
    async fn reconcile(&self, obj: &mut K) -> Result<KindOutcome, ReconcilerError>;

    /// Notification reason used when this kind fails permanently
    fn failure_reason(&self, _error: &ReconcilerError) -> ReasonKind {
        ReasonKind::ReconcileLoopFailed
    }
}

/// What the engine decided after one reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Success,
    InProgress(Duration),
    TransientFailure(Duration),
    PermanentFailure,
    GiveUp { count: u32 },
}

impl ReconcileOutcome {
    pub fn requeue_after(&self) -> Option<Duration> {
        match self {
            ReconcileOutcome::InProgress(delay) | ReconcileOutcome::TransientFailure(delay) => {
                Some(*delay)
            }
            ReconcileOutcome::Success
            | ReconcileOutcome::PermanentFailure
            | ReconcileOutcome::GiveUp { .. } => None,
        }
    }

    pub fn into_action(self) -> Action {
        match self.requeue_after() {
            Some(delay) => Action::requeue(delay),
            None => Action::await_change(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Kind name used in logs, metrics and notifications
    pub kind: &'static str,
    /// Requeue delay after a transient failure
    pub requeue_delay: Duration,
}

pub struct Engine<K> {
    settings: EngineSettings,
    store: Arc<dyn ObjectStore<K>>,
    reconciler: Arc<dyn KindReconciler<K>>,
    tracker: Arc<FailureTracker>,
    notifier: Arc<dyn Notifier>,
}

impl<K> std::fmt::Debug for Engine<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("settings", &self.settings)
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

impl<K> Engine<K> {
    pub fn kind(&self) -> &'static str {
        self.settings.kind
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn tracker(&self) -> &FailureTracker {
        &self.tracker
    }
}

impl<K> Engine<K>
where
    K: Conditioned + Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    pub fn new(
        settings: EngineSettings,
        store: Arc<dyn ObjectStore<K>>,
        reconciler: Arc<dyn KindReconciler<K>>,
        tracker: Arc<FailureTracker>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            settings,
            store,
            reconciler,
            tracker,
            notifier,
        }
    }

    /// Reconcile the object identified by `namespace/name`
    ///
    /// Errors returned here are platform failures while reading or seeding
    /// the object; everything after that is folded into the outcome.
    pub async fn reconcile(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let kind = self.settings.kind;
        let span = tracing::span!(
            tracing::Level::INFO,
            "controller.reconcile",
            resource.kind = kind,
            resource.name = name,
            resource.namespace = namespace,
        );
        async {
            let started = Instant::now();
            observability::metrics::increment_reconciliations(kind);

            let outcome = self.run(namespace, name).await;
            observability::metrics::observe_reconciliation_duration(started.elapsed().as_secs_f64());

            match &outcome {
                Ok(ReconcileOutcome::InProgress(delay)) => {
                    debug!("⏳ {} {}/{} in progress, checking again in {:?}", kind, namespace, name, delay);
                    observability::metrics::increment_requeues_total("in-progress");
                }
                Ok(ReconcileOutcome::TransientFailure(delay)) => {
                    info!("🔄 Retrying {} {}/{} in {:?}", kind, namespace, name, delay);
                    observability::metrics::increment_requeues_total("error");
                }
                _ => {}
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run(&self, namespace: &str, name: &str) -> Result<ReconcileOutcome, ReconcilerError> {
        let key = format!("{namespace}/{name}");

        let Some(mut obj) = self.store.get(namespace, name).await? else {
            debug!("{} {} not found, assuming it was deleted", self.settings.kind, key);
            self.tracker.clear(&key);
            return Ok(ReconcileOutcome::Success);
        };

        if obj.conditions().is_empty() {
            seed_conditions(&mut obj);
            match self.store.update_status(&obj).await {
                Ok(stored) => obj = stored,
                Err(e) if e.is_conflict() => return Ok(conflict_outcome()),
                Err(e) if e.is_not_found() => return Ok(ReconcileOutcome::Success),
                Err(e) => return Err(e),
            }
        }

        let generation = obj.meta().generation.unwrap_or_default();
        if self.tracker.is_permanent(&key, generation) {
            debug!("{} {} failed permanently at generation {}, waiting for a spec change", self.settings.kind, key, generation);
            return Ok(ReconcileOutcome::PermanentFailure);
        }

        match self.reconciler.reconcile(&mut obj).await {
            Ok(KindOutcome::Converged) => {
                self.tracker.clear(&key);
                mark_converged(&mut obj);
                match self.persist(&obj, &key).await {
                    Ok(()) => Ok(ReconcileOutcome::Success),
                    Err(e) => self.persist_failure(e),
                }
            }
            Ok(KindOutcome::Pending(delay)) => {
                self.tracker.clear(&key);
                obj.set_condition(Condition::new(
                    PROGRESSING,
                    ConditionStatus::True,
                    REASON_PENDING,
                    "Waiting for resources to become ready",
                ));
                match self.persist(&obj, &key).await {
                    Ok(()) => Ok(ReconcileOutcome::InProgress(delay)),
                    Err(e) => self.persist_failure(e),
                }
            }
            Ok(KindOutcome::Skipped) => {
                self.tracker.clear(&key);
                Ok(ReconcileOutcome::Success)
            }
            Err(e) => Ok(self.handle_failure(&key, obj, e).await),
        }
    }

    async fn persist(&self, obj: &K, key: &str) -> Result<(), ReconcilerError> {
        match self.store.update_status(obj).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!("{} deleted before its status could be written", key);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// A status write after a successful reconcile failed
    fn persist_failure(&self, e: ReconcilerError) -> Result<ReconcileOutcome, ReconcilerError> {
        if e.is_conflict() {
            return Ok(conflict_outcome());
        }
        Err(e)
    }

    async fn handle_failure(&self, key: &str, mut obj: K, e: ReconcilerError) -> ReconcileOutcome {
        let kind = self.settings.kind;
        let class = e.class();
        observability::metrics::increment_reconciliation_errors(kind, class.as_str());

        if class == ErrorClass::Conflict {
            debug!("Conflict while reconciling {} {}, retrying now", kind, key);
            return conflict_outcome();
        }
        if class == ErrorClass::NotFound {
            debug!("{} {} vanished during reconcile: {}", kind, key, e);
            return ReconcileOutcome::Success;
        }

        error!("❌ Reconciliation of {} {} failed: {}", kind, key, e);
        let changed = obj.set_condition(Condition::new(
            DEGRADED,
            ConditionStatus::True,
            e.to_string(),
            MESSAGE_FAILED,
        ));
        if changed {
            if let Err(persist_err) = self.store.update_status(&obj).await {
                warn!("Failed to record Degraded condition on {} {}: {}", kind, key, persist_err);
            }
        }

        match class {
            ErrorClass::ScriptExecution | ErrorClass::Permanent => {
                // remembered until the spec generation changes
                self.tracker
                    .mark_permanent(key, &e, obj.meta().generation.unwrap_or_default());
                let reason_kind = match &e {
                    ReconcilerError::ScriptExecution(_) => ReasonKind::ScriptExecutionFailed,
                    other => self.reconciler.failure_reason(other),
                };
                let mut reason = Reason::new(reason_kind, Source::Operator, e.to_string());
                if let ReconcilerError::ScriptExecution(failed) = &e {
                    reason = reason.with_verbose(vec![
                        format!("{} {}/{} failed", failed.configuration_type, failed.script_source, failed.name),
                        failed.logs.clone(),
                    ]);
                }
                self.notify(&obj, Level::Warning, reason).await;
                ReconcileOutcome::PermanentFailure
            }
            _ => {
                let count = self.tracker.record(key, &e);
                if !self.tracker.exceeded(count) {
                    return ReconcileOutcome::TransientFailure(self.settings.requeue_delay);
                }

                if count == self.tracker.limit() {
                    warn!("🛑 Giving up on {} {} after {} identical failures", kind, key, count);
                    observability::metrics::increment_give_ups();
                    let reason = Reason::new(
                        ReasonKind::ReconcileLoopFailed,
                        Source::Operator,
                        format!(
                            "Reconcile loop failed {count} times with the same error, giving up: {e}"
                        ),
                    );
                    self.notify(&obj, Level::Warning, reason).await;
                }
                ReconcileOutcome::GiveUp { count }
            }
        }
    }

    async fn notify(&self, obj: &K, level: Level, reason: Reason) {
        let event = Event {
            object: obj.object_ref(&()),
            controller: self.settings.kind,
            level,
            reason,
        };
        if let Err(e) = self.notifier.send(event).await {
            warn!("Failed to send notification for {}: {}", obj.name_any(), e);
        }
    }
}

fn conflict_outcome() -> ReconcileOutcome {
    ReconcileOutcome::TransientFailure(Duration::from_secs(CONFLICT_REQUEUE_SECS))
}

/// Lifecycle conditions of an object nothing has been done for yet
pub fn seed_conditions<K: Conditioned>(obj: &mut K) {
    for (r#type, status) in [
        (PROGRESSING, ConditionStatus::True),
        (AVAILABLE, ConditionStatus::False),
        (DEGRADED, ConditionStatus::False),
        (UPGRADEABLE, ConditionStatus::Unknown),
    ] {
        obj.set_condition(Condition::new(r#type, status, REASON_INIT, MESSAGE_INIT));
    }
}

/// Lifecycle conditions of an object that reached its desired state
pub fn mark_converged<K: Conditioned>(obj: &mut K) {
    for (r#type, status) in [
        (AVAILABLE, ConditionStatus::True),
        (PROGRESSING, ConditionStatus::False),
        (DEGRADED, ConditionStatus::False),
        (UPGRADEABLE, ConditionStatus::True),
    ] {
        obj.set_condition(Condition::new(
            r#type,
            status,
            REASON_COMPLETED,
            MESSAGE_COMPLETED,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{find_condition, Backup, BackupSpec};

    #[test]
    fn test_outcome_actions() {
        assert_eq!(ReconcileOutcome::Success.requeue_after(), None);
        assert_eq!(ReconcileOutcome::PermanentFailure.requeue_after(), None);
        assert_eq!(ReconcileOutcome::GiveUp { count: 10 }.requeue_after(), None);
        assert_eq!(
            ReconcileOutcome::TransientFailure(Duration::from_secs(5)).requeue_after(),
            Some(Duration::from_secs(5))
        );
        assert_eq!(
            ReconcileOutcome::InProgress(Duration::from_secs(3)).into_action(),
            Action::requeue(Duration::from_secs(3))
        );
        assert_eq!(ReconcileOutcome::Success.into_action(), Action::await_change());
    }

    #[test]
    fn test_seed_then_converge() {
        let mut backup = Backup::new("nightly", BackupSpec::default());
        seed_conditions(&mut backup);
        assert_eq!(backup.conditions().len(), 4);
        assert_eq!(
            find_condition(backup.conditions(), UPGRADEABLE).map(|c| c.status),
            Some(ConditionStatus::Unknown)
        );

        mark_converged(&mut backup);
        assert_eq!(backup.conditions().len(), 4);
        assert!(find_condition(backup.conditions(), AVAILABLE).is_some_and(Condition::is_true));
        assert_eq!(
            find_condition(backup.conditions(), DEGRADED).map(|c| c.status),
            Some(ConditionStatus::False)
        );
    }
}
