//! # Backup Reconciler
//!
//! Copies Jenkins home content into a directory named after the Backup on
//! the backup volume. Each Backup runs once:
//!
//! 1. `Initialized` - the executor session works
//! 2. `QuietDownStarted` - optional, failure does not stop the backup
//! 3. `BackupCompleted` - config, jobs and plugins copies
//! 4. `QuietDownCancelled` - whenever quiet-down was attempted
//!
//! A Backup interrupted between stages resumes at the first stage without
//! a condition. It is finished once `completedAt` is set, or once a
//! fail-stop stage failed and quiet-down is no longer left open.

use super::{
    copy_stage, fail_stop_failed, helper_script_stage, initialized_stage, resolve_target,
    BackupLayout, BACKUP_COMPLETED, INITIALIZED, QUIET_DOWN_CANCELLED, QUIET_DOWN_STARTED,
};
use crate::constants::{CANCEL_QUIET_DOWN_SCRIPT, QUIET_DOWN_SCRIPT};
use crate::controller::engine::{KindOutcome, KindReconciler};
use crate::controller::error::ReconcilerError;
use crate::controller::exec::RemoteExecutor;
use crate::controller::pipeline::Pipeline;
use crate::controller::resolver::ReferenceResolver;
use crate::controller::store::ObjectStore;
use crate::crd::{Backup, Conditioned};
use crate::notifications::{Event, Level, Notifier, Reason, ReasonKind, Source};
use async_trait::async_trait;
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct BackupReconciler {
    store: Arc<dyn ObjectStore<Backup>>,
    resolver: Arc<dyn ReferenceResolver>,
    executor: Arc<dyn RemoteExecutor>,
    notifier: Arc<dyn Notifier>,
    layout: BackupLayout,
}

impl std::fmt::Debug for BackupReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupReconciler")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl BackupReconciler {
    pub fn new(
        store: Arc<dyn ObjectStore<Backup>>,
        resolver: Arc<dyn ReferenceResolver>,
        executor: Arc<dyn RemoteExecutor>,
        notifier: Arc<dyn Notifier>,
        layout: BackupLayout,
    ) -> Self {
        Self {
            store,
            resolver,
            executor,
            notifier,
            layout,
        }
    }
}

#[async_trait]
impl KindReconciler<Backup> for BackupReconciler {
    async fn reconcile(&self, backup: &mut Backup) -> Result<KindOutcome, ReconcilerError> {
        let name = backup.name_any();
        if is_finished(backup) {
            debug!("Backup {} already processed", name);
            return Ok(KindOutcome::Skipped);
        }

        let namespace = backup.namespace().unwrap_or_else(|| "default".to_string());
        let Some(target) = resolve_target(
            self.resolver.as_ref(),
            &namespace,
            backup.spec.config_name(),
            &self.layout.container,
        )
        .await?
        else {
            info!("Backup {}/{} has nothing to back up yet", namespace, name);
            return Ok(KindOutcome::Skipped);
        };

        info!(
            "💾 Backing up Jenkins {} from pod {} as {}",
            target.jenkins.name_any(),
            target.pod,
            name
        );
        let status = backup.status.get_or_insert_with(Default::default);
        status.backup_path = Some(self.layout.backup_dir(&name));
        status
            .started_at
            .get_or_insert_with(|| chrono::Utc::now().to_rfc3339());

        let executor = self.executor.as_ref();
        let quiet_down = target.config.spec.quiet_down_during_backup;
        let mut stages = vec![initialized_stage(executor)];
        if quiet_down {
            stages.push(
                helper_script_stage(
                    executor,
                    &target.pod,
                    "quiet-down",
                    QUIET_DOWN_STARTED,
                    QUIET_DOWN_SCRIPT,
                )
                .continue_on_failure(),
            );
        }
        stages.push(copy_stage(
            executor,
            &target.pod,
            "backup",
            BACKUP_COMPLETED,
            self.layout
                .backup_commands(&name, target.config.spec.options),
        ));

        let pipeline = Pipeline::new(Arc::clone(&self.store));
        let result = pipeline.run(backup, stages).await;

        // Jenkins must leave quiet-down mode even when the copy failed
        if backup.has_condition(QUIET_DOWN_STARTED) {
            let cancel = vec![helper_script_stage(
                executor,
                &target.pod,
                "cancel-quiet-down",
                QUIET_DOWN_CANCELLED,
                CANCEL_QUIET_DOWN_SCRIPT,
            )
            .continue_on_failure()];
            if let Err(e) = pipeline.run(backup, cancel).await {
                warn!("Failed to cancel quiet-down after backup {}: {}", name, e);
            }
        }

        let report = result?;
        debug!("Backup {} pipeline report: {:?}", name, report);
        if let Some(stage) = report.halted {
            debug!("Backup {} stopped at failed stage {}", name, stage);
            return Ok(KindOutcome::Skipped);
        }

        backup.status.get_or_insert_with(Default::default).completed_at =
            Some(chrono::Utc::now().to_rfc3339());
        info!("✅ Backup {} completed", name);

        let event = Event {
            object: backup.object_ref(&()),
            controller: "backup",
            level: Level::Info,
            reason: Reason::new(
                ReasonKind::BackupCompleted,
                Source::Operator,
                format!("Backup {name} completed"),
            ),
        };
        if let Err(e) = self.notifier.send(event).await {
            warn!("Failed to send backup notification: {}", e);
        }

        Ok(KindOutcome::Converged)
    }
}

/// Nothing is left to do for `backup`
fn is_finished(backup: &Backup) -> bool {
    let completed = backup
        .status
        .as_ref()
        .is_some_and(|status| status.completed_at.is_some());
    let quiet_down_open =
        backup.has_condition(QUIET_DOWN_STARTED) && !backup.has_condition(QUIET_DOWN_CANCELLED);
    completed
        || (fail_stop_failed(backup.conditions(), &[INITIALIZED, BACKUP_COMPLETED]) && !quiet_down_open)
}
