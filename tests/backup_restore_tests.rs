//! # Backup and Restore Tests
//!
//! Backup and restore requests driven through the reconcile engine with
//! an in-memory store and a recording remote executor.

mod common;

use common::{
    backup, backup_config, engine, restore, FakeResolver, MemoryStore, RecordingExecutor,
    RecordingNotifier,
};
use jenkins_operator::config::ControllerConfig;
use jenkins_operator::controller::reconciler::{
    BackupLayout, BackupReconciler, RestoreReconciler, BACKUP_COMPLETED, INITIALIZED,
    QUIET_DOWN_CANCELLED, QUIET_DOWN_STARTED, RESTART_STARTED, RESTORE_COMPLETED,
    SAFE_RESTART_STARTED,
};
use jenkins_operator::controller::engine::seed_conditions;
use jenkins_operator::controller::ReconcileOutcome;
use jenkins_operator::crd::{
    find_condition, Backup, BackupOptions, Condition, ConditionStatus, Conditioned, RestartPolicy,
    Restore,
};
use jenkins_operator::crd::condition::{AVAILABLE, DEGRADED};
use std::sync::Arc;

const NS: &str = common::NAMESPACE;

fn layout() -> BackupLayout {
    BackupLayout::from_config(&ControllerConfig::default())
}

fn status_of(obj: &impl Conditioned, r#type: &str) -> Option<ConditionStatus> {
    find_condition(obj.conditions(), r#type).map(|c| c.status)
}

/// Object as left behind by an operator that stopped after `passed` stages
fn interrupted<K: Conditioned>(mut obj: K, passed: &[&str]) -> K {
    seed_conditions(&mut obj);
    for stage in passed {
        obj.set_condition(Condition::new(*stage, ConditionStatus::True, "Succeeded", ""));
    }
    obj
}

struct BackupHarness {
    store: Arc<MemoryStore<Backup>>,
    executor: Arc<RecordingExecutor>,
    notifier: Arc<RecordingNotifier>,
    engine: jenkins_operator::controller::Engine<Backup>,
}

fn backup_harness(resolver: Arc<FakeResolver>) -> BackupHarness {
    let store = MemoryStore::with(backup("nightly"));
    let executor = RecordingExecutor::new();
    let notifier = RecordingNotifier::new();
    let reconciler = BackupReconciler::new(
        store.clone(),
        resolver,
        executor.clone(),
        notifier.clone(),
        layout(),
    );
    let engine = engine::<Backup>("backup", store.clone(), Arc::new(reconciler), notifier.clone(), 10);
    BackupHarness {
        store,
        executor,
        notifier,
        engine,
    }
}

#[tokio::test]
async fn test_backup_of_config_and_jobs() {
    let options = BackupOptions {
        config: true,
        jobs: true,
        plugins: false,
    };
    let resolver = FakeResolver::with_target(backup_config(
        "example",
        false,
        options,
        RestartPolicy::default(),
    ));
    let h = backup_harness(resolver);

    let outcome = h.engine.reconcile(NS, "nightly").await.expect("reconcile");
    assert_eq!(outcome, ReconcileOutcome::Success);

    assert_eq!(h.executor.request_names(), vec!["backup-config", "backup-jobs"]);
    let commands = h.executor.commands();
    assert_eq!(
        commands[0],
        "mkdir -p /jenkins-backups/nightly && cp /var/lib/jenkins/*.xml /jenkins-backups/nightly/"
    );
    assert_eq!(
        commands[1],
        "mkdir -p /jenkins-backups/nightly && cp -r /var/lib/jenkins/jobs /jenkins-backups/nightly/jobs"
    );

    let stored = h.store.current("nightly");
    assert_eq!(status_of(&stored, INITIALIZED), Some(ConditionStatus::True));
    assert_eq!(status_of(&stored, BACKUP_COMPLETED), Some(ConditionStatus::True));
    assert_eq!(status_of(&stored, QUIET_DOWN_STARTED), None);
    assert_eq!(status_of(&stored, AVAILABLE), Some(ConditionStatus::True));

    let status = stored.status.expect("status");
    assert_eq!(status.backup_path.as_deref(), Some("/jenkins-backups/nightly"));
    assert!(status.started_at.is_some());
    assert!(status.completed_at.is_some());

    assert_eq!(h.notifier.reasons(), vec!["BackupCompleted"]);
}

#[tokio::test]
async fn test_backup_replay_runs_nothing() {
    let resolver = FakeResolver::with_target(backup_config(
        "example",
        true,
        BackupOptions::default(),
        RestartPolicy::default(),
    ));
    let h = backup_harness(resolver);

    h.engine.reconcile(NS, "nightly").await.expect("first reconcile");
    let requests = h.executor.request_names();
    let writes = h.store.writes();

    let outcome = h.engine.reconcile(NS, "nightly").await.expect("second reconcile");
    assert_eq!(outcome, ReconcileOutcome::Success);
    assert_eq!(h.executor.request_names(), requests);
    assert_eq!(h.store.writes(), writes);
    assert_eq!(h.notifier.reasons().len(), 1);
}

#[tokio::test]
async fn test_failed_copy_stops_backup_and_cancels_quiet_down() {
    let resolver = FakeResolver::with_target(backup_config(
        "example",
        true,
        BackupOptions::default(),
        RestartPolicy::default(),
    ));
    let h = backup_harness(resolver);
    h.executor.fail_on("/jobs");

    let outcome = h.engine.reconcile(NS, "nightly").await.expect("reconcile");
    assert_eq!(outcome, ReconcileOutcome::PermanentFailure);

    // plugins are never copied once jobs failed
    assert_eq!(
        h.executor.request_names(),
        vec!["quiet-down", "backup-config", "backup-jobs", "cancel-quiet-down"]
    );

    let stored = h.store.current("nightly");
    assert_eq!(status_of(&stored, QUIET_DOWN_STARTED), Some(ConditionStatus::True));
    assert_eq!(status_of(&stored, BACKUP_COMPLETED), Some(ConditionStatus::False));
    assert_eq!(status_of(&stored, QUIET_DOWN_CANCELLED), Some(ConditionStatus::True));
    assert_eq!(status_of(&stored, DEGRADED), Some(ConditionStatus::True));
    assert_ne!(status_of(&stored, AVAILABLE), Some(ConditionStatus::True));
    assert_eq!(h.notifier.reasons(), vec!["ReconcileLoopFailed"]);

    // a failed backup is not retried
    let outcome = h.engine.reconcile(NS, "nightly").await.expect("replay");
    assert_eq!(outcome, ReconcileOutcome::PermanentFailure);
    assert_eq!(h.notifier.reasons().len(), 1);
    assert_eq!(h.executor.request_names().len(), 4);
}

#[tokio::test]
async fn test_interrupted_backup_resumes_and_leaves_quiet_down() {
    let resolver = FakeResolver::with_target(backup_config(
        "example",
        true,
        BackupOptions::default(),
        RestartPolicy::default(),
    ));
    let h = backup_harness(resolver);
    h.store
        .insert(interrupted(backup("nightly"), &[INITIALIZED, QUIET_DOWN_STARTED]));

    let outcome = h.engine.reconcile(NS, "nightly").await.expect("reconcile");
    assert_eq!(outcome, ReconcileOutcome::Success);
    assert_eq!(
        h.executor.request_names(),
        vec![
            "backup-config",
            "backup-jobs",
            "backup-plugins",
            "cancel-quiet-down"
        ]
    );

    let stored = h.store.current("nightly");
    assert_eq!(status_of(&stored, BACKUP_COMPLETED), Some(ConditionStatus::True));
    assert_eq!(status_of(&stored, QUIET_DOWN_CANCELLED), Some(ConditionStatus::True));
    assert!(stored.status.and_then(|s| s.completed_at).is_some());
    assert_eq!(h.notifier.reasons(), vec!["BackupCompleted"]);
}

#[tokio::test]
async fn test_interrupted_failed_backup_only_cancels_quiet_down() {
    let resolver = FakeResolver::with_target(backup_config(
        "example",
        true,
        BackupOptions::default(),
        RestartPolicy::default(),
    ));
    let h = backup_harness(resolver);
    let mut stopped = interrupted(backup("nightly"), &[INITIALIZED, QUIET_DOWN_STARTED]);
    stopped.set_condition(Condition::new(
        BACKUP_COMPLETED,
        ConditionStatus::False,
        "Failed",
        "cp: cannot stat",
    ));
    h.store.insert(stopped);

    let outcome = h.engine.reconcile(NS, "nightly").await.expect("reconcile");
    assert_eq!(outcome, ReconcileOutcome::Success);
    assert_eq!(h.executor.request_names(), vec!["cancel-quiet-down"]);
    let stored = h.store.current("nightly");
    assert_eq!(status_of(&stored, QUIET_DOWN_CANCELLED), Some(ConditionStatus::True));
    assert!(h.notifier.reasons().is_empty());

    // quiet-down is closed now, nothing left to do
    h.engine.reconcile(NS, "nightly").await.expect("replay");
    assert_eq!(h.executor.request_names().len(), 1);
}

#[tokio::test]
async fn test_failed_quiet_down_still_backs_up() {
    let resolver = FakeResolver::with_target(backup_config(
        "example",
        true,
        BackupOptions::default(),
        RestartPolicy::default(),
    ));
    let h = backup_harness(resolver);
    h.executor.fail_on("/quietdown.sh");

    let outcome = h.engine.reconcile(NS, "nightly").await.expect("reconcile");
    assert_eq!(outcome, ReconcileOutcome::Success);

    assert_eq!(
        h.executor.request_names(),
        vec![
            "quiet-down",
            "backup-config",
            "backup-jobs",
            "backup-plugins",
            "cancel-quiet-down"
        ]
    );
    let stored = h.store.current("nightly");
    assert_eq!(status_of(&stored, QUIET_DOWN_STARTED), Some(ConditionStatus::False));
    assert_eq!(status_of(&stored, BACKUP_COMPLETED), Some(ConditionStatus::True));
    assert_eq!(status_of(&stored, QUIET_DOWN_CANCELLED), Some(ConditionStatus::True));
}

#[tokio::test]
async fn test_unreachable_executor_fails_initialization() {
    let resolver = FakeResolver::with_target(backup_config(
        "example",
        false,
        BackupOptions::default(),
        RestartPolicy::default(),
    ));
    let h = backup_harness(resolver);
    h.executor
        .init_fails
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let outcome = h.engine.reconcile(NS, "nightly").await.expect("reconcile");
    assert_eq!(outcome, ReconcileOutcome::PermanentFailure);
    assert!(h.executor.request_names().is_empty());

    let stored = h.store.current("nightly");
    assert_eq!(status_of(&stored, INITIALIZED), Some(ConditionStatus::False));
    assert_eq!(status_of(&stored, BACKUP_COMPLETED), None);
}

#[tokio::test]
async fn test_backup_without_jenkins_pod_is_skipped() {
    let resolver = FakeResolver::with_target(backup_config(
        "example",
        false,
        BackupOptions::default(),
        RestartPolicy::default(),
    ));
    *resolver.pod.lock().expect("lock") = None;
    let h = backup_harness(resolver);

    let outcome = h.engine.reconcile(NS, "nightly").await.expect("reconcile");
    assert_eq!(outcome, ReconcileOutcome::Success);
    assert!(h.executor.request_names().is_empty());

    // only the seeded lifecycle conditions were written
    let stored = h.store.current("nightly");
    assert_eq!(stored.conditions().len(), 4);
    assert_eq!(status_of(&stored, INITIALIZED), None);
}

struct RestoreHarness {
    store: Arc<MemoryStore<Restore>>,
    executor: Arc<RecordingExecutor>,
    notifier: Arc<RecordingNotifier>,
    engine: jenkins_operator::controller::Engine<Restore>,
}

fn restore_harness(restart: RestartPolicy) -> RestoreHarness {
    let resolver = FakeResolver::with_target(backup_config(
        "example",
        false,
        BackupOptions::default(),
        restart,
    ));
    resolver.add_backup(backup("nightly"));

    let store = MemoryStore::with(restore("rollback", "nightly"));
    let executor = RecordingExecutor::new();
    let notifier = RecordingNotifier::new();
    let reconciler = RestoreReconciler::new(
        store.clone(),
        resolver,
        executor.clone(),
        notifier.clone(),
        layout(),
    );
    let engine = engine::<Restore>("restore", store.clone(), Arc::new(reconciler), notifier.clone(), 10);
    RestoreHarness {
        store,
        executor,
        notifier,
        engine,
    }
}

#[tokio::test]
async fn test_restore_with_safe_restart() {
    let h = restore_harness(RestartPolicy {
        enabled: true,
        safe: true,
    });

    let outcome = h.engine.reconcile(NS, "rollback").await.expect("reconcile");
    assert_eq!(outcome, ReconcileOutcome::Success);

    assert_eq!(
        h.executor.request_names(),
        vec!["restore-config", "restore-jobs", "restore-plugins", "safe-restart"]
    );
    let commands = h.executor.commands();
    assert_eq!(commands[0], "cp /jenkins-backups/nightly/*.xml /var/lib/jenkins/");
    assert_eq!(
        commands[1],
        "mkdir -p /var/lib/jenkins/jobs && cp -r /jenkins-backups/nightly/jobs/. /var/lib/jenkins/jobs/"
    );
    assert_eq!(commands[3], "sh /jenkins-operator-scripts/saferestart.sh");

    let stored = h.store.current("rollback");
    assert_eq!(status_of(&stored, RESTORE_COMPLETED), Some(ConditionStatus::True));
    assert_eq!(status_of(&stored, SAFE_RESTART_STARTED), Some(ConditionStatus::True));
    assert_eq!(status_of(&stored, RESTART_STARTED), None);
    assert!(stored.status.and_then(|s| s.completed_at).is_some());
    assert_eq!(h.notifier.reasons(), vec!["RestoreCompleted"]);

    // replay is a no-op
    h.engine.reconcile(NS, "rollback").await.expect("replay");
    assert_eq!(h.executor.request_names().len(), 4);
}

#[tokio::test]
async fn test_restore_without_restart() {
    let h = restore_harness(RestartPolicy::default());

    h.engine.reconcile(NS, "rollback").await.expect("reconcile");
    assert_eq!(
        h.executor.request_names(),
        vec!["restore-config", "restore-jobs", "restore-plugins"]
    );
    let stored = h.store.current("rollback");
    assert_eq!(status_of(&stored, SAFE_RESTART_STARTED), None);
    assert_eq!(status_of(&stored, RESTART_STARTED), None);
}

#[tokio::test]
async fn test_failed_restart_does_not_fail_restore() {
    let h = restore_harness(RestartPolicy {
        enabled: true,
        safe: false,
    });
    h.executor.fail_on("restart.sh");

    let outcome = h.engine.reconcile(NS, "rollback").await.expect("reconcile");
    assert_eq!(outcome, ReconcileOutcome::Success);

    let stored = h.store.current("rollback");
    assert_eq!(status_of(&stored, RESTORE_COMPLETED), Some(ConditionStatus::True));
    assert_eq!(status_of(&stored, RESTART_STARTED), Some(ConditionStatus::False));
    assert_eq!(
        h.executor.requests.lock().expect("lock").last().map(|(_, c)| c.clone()),
        Some("sh /jenkins-operator-scripts/restart.sh".to_string())
    );
}

#[tokio::test]
async fn test_interrupted_restore_resumes_after_initialization() {
    let h = restore_harness(RestartPolicy {
        enabled: true,
        safe: true,
    });
    h.store
        .insert(interrupted(restore("rollback", "nightly"), &[INITIALIZED]));

    let outcome = h.engine.reconcile(NS, "rollback").await.expect("reconcile");
    assert_eq!(outcome, ReconcileOutcome::Success);
    assert_eq!(
        h.executor.request_names(),
        vec!["restore-config", "restore-jobs", "restore-plugins", "safe-restart"]
    );

    let stored = h.store.current("rollback");
    assert_eq!(status_of(&stored, RESTORE_COMPLETED), Some(ConditionStatus::True));
    assert_eq!(status_of(&stored, SAFE_RESTART_STARTED), Some(ConditionStatus::True));
    assert!(stored.status.and_then(|s| s.completed_at).is_some());
    assert_eq!(h.notifier.reasons(), vec!["RestoreCompleted"]);
}
