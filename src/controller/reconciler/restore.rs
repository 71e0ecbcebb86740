//! # Restore Reconciler
//!
//! Copies the data of a Backup back into the Jenkins home directory, then
//! restarts Jenkins when the BackupConfig asks for it.
//!
//! An interrupted Restore resumes at the first stage without a condition.
//! It is finished once `completedAt` is set or a fail-stop stage failed.

use super::{
    copy_stage, fail_stop_failed, helper_script_stage, initialized_stage, resolve_target,
    BackupLayout, INITIALIZED, RESTART_STARTED, RESTORE_COMPLETED, SAFE_RESTART_STARTED,
};
use crate::constants::{RESTART_SCRIPT, SAFE_RESTART_SCRIPT};
use crate::controller::engine::{KindOutcome, KindReconciler};
use crate::controller::error::ReconcilerError;
use crate::controller::exec::RemoteExecutor;
use crate::controller::pipeline::Pipeline;
use crate::controller::resolver::ReferenceResolver;
use crate::controller::store::ObjectStore;
use crate::crd::{Conditioned, Restore};
use crate::notifications::{Event, Level, Notifier, Reason, ReasonKind, Source};
use async_trait::async_trait;
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct RestoreReconciler {
    store: Arc<dyn ObjectStore<Restore>>,
    resolver: Arc<dyn ReferenceResolver>,
    executor: Arc<dyn RemoteExecutor>,
    notifier: Arc<dyn Notifier>,
    layout: BackupLayout,
}

impl std::fmt::Debug for RestoreReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestoreReconciler")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl RestoreReconciler {
    pub fn new(
        store: Arc<dyn ObjectStore<Restore>>,
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
impl KindReconciler<Restore> for RestoreReconciler {
    async fn reconcile(&self, restore: &mut Restore) -> Result<KindOutcome, ReconcilerError> {
        let name = restore.name_any();
        let completed = restore
            .status
            .as_ref()
            .is_some_and(|status| status.completed_at.is_some());
        if completed || fail_stop_failed(restore.conditions(), &[INITIALIZED, RESTORE_COMPLETED]) {
            debug!("Restore {} already processed", name);
            return Ok(KindOutcome::Skipped);
        }

        let namespace = restore.namespace().unwrap_or_else(|| "default".to_string());
        let backup_name = restore.spec.backup_ref.clone();
        let Some(backup) = self.resolver.backup(&namespace, &backup_name).await? else {
            info!("Backup {}/{} for restore {} not found", namespace, backup_name, name);
            return Ok(KindOutcome::Skipped);
        };
        let Some(target) = resolve_target(
            self.resolver.as_ref(),
            &namespace,
            backup.spec.config_name(),
            &self.layout.container,
        )
        .await?
        else {
            info!("Restore {}/{} has no Jenkins to restore into yet", namespace, name);
            return Ok(KindOutcome::Skipped);
        };

        info!(
            "♻️  Restoring backup {} into Jenkins {} ({})",
            backup_name,
            target.jenkins.name_any(),
            target.pod
        );

        let executor = self.executor.as_ref();
        let mut stages = vec![
            initialized_stage(executor),
            copy_stage(
                executor,
                &target.pod,
                "restore",
                RESTORE_COMPLETED,
                self.layout
                    .restore_commands(&backup_name, target.config.spec.options),
            ),
        ];

        let restart = target.config.spec.restart_after_restore;
        if restart.enabled && restart.safe {
            stages.push(
                helper_script_stage(
                    executor,
                    &target.pod,
                    "safe-restart",
                    SAFE_RESTART_STARTED,
                    SAFE_RESTART_SCRIPT,
                )
                .continue_on_failure(),
            );
        } else if restart.enabled {
            stages.push(
                helper_script_stage(
                    executor,
                    &target.pod,
                    "restart",
                    RESTART_STARTED,
                    RESTART_SCRIPT,
                )
                .continue_on_failure(),
            );
        }

        let report = Pipeline::new(Arc::clone(&self.store))
            .run(restore, stages)
            .await?;
        if let Some(stage) = report.halted {
            debug!("Restore {} stopped at failed stage {}", name, stage);
            return Ok(KindOutcome::Skipped);
        }
        for (stage, error) in &report.failed {
            warn!("⚠️  Restore {} stage {} failed: {}", name, stage, error);
        }

        restore.status.get_or_insert_with(Default::default).completed_at =
            Some(chrono::Utc::now().to_rfc3339());
        info!("✅ Restore {} from backup {} completed", name, backup_name);

        let event = Event {
            object: restore.object_ref(&()),
            controller: "restore",
            level: Level::Info,
            reason: Reason::new(
                ReasonKind::RestoreCompleted,
                Source::Operator,
                format!("Restore {name} from backup {backup_name} completed"),
            ),
        };
        if let Err(e) = self.notifier.send(event).await {
            warn!("Failed to send restore notification: {}", e);
        }

        Ok(KindOutcome::Converged)
    }
}
