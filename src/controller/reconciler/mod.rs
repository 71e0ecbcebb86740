//! # Kind Reconcilers
//!
//! One [`KindReconciler`](crate::controller::engine::KindReconciler) per
//! custom resource kind. `Jenkins` converges continuously; `Backup`,
//! `Restore` and `JenkinsImage` run a pipeline of stages once.
//!
//! ## Modules
//!
//! - `jenkins` - Base reconciler for Jenkins instances
//! - `backup` - Copies Jenkins home content to the backup volume
//! - `restore` - Copies a backup back and restarts Jenkins
//! - `image` - Builds custom Jenkins images

pub mod backup;
pub mod image;
pub mod jenkins;
pub mod restore;

pub use backup::BackupReconciler;
pub use image::ImageReconciler;
pub use jenkins::JenkinsReconciler;
pub use restore::RestoreReconciler;

use crate::config::ControllerConfig;
use crate::controller::error::ReconcilerError;
use crate::controller::exec::{PodTarget, RemoteExecutor};
use crate::controller::pipeline::PipelineStage;
use crate::controller::resolver::ReferenceResolver;
use crate::crd::{find_condition, BackupConfig, BackupOptions, Condition, ConditionStatus, Jenkins};
use kube::ResourceExt;
use tracing::debug;

// Stage condition types
pub const INITIALIZED: &str = "Initialized";
pub const QUIET_DOWN_STARTED: &str = "QuietDownStarted";
pub const BACKUP_COMPLETED: &str = "BackupCompleted";
pub const QUIET_DOWN_CANCELLED: &str = "QuietDownCancelled";
pub const RESTORE_COMPLETED: &str = "RestoreCompleted";
pub const SAFE_RESTART_STARTED: &str = "SafeRestartStarted";
pub const RESTART_STARTED: &str = "RestartStarted";
pub const DOCKERFILE_CREATED: &str = "DockerfileCreated";
pub const BUILDER_POD_CREATED: &str = "BuilderPodCreated";
pub const IMAGE_BUILT: &str = "ImageBuilt";

/// Where Jenkins data lives inside the pod and on the backup volume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupLayout {
    pub jenkins_home: String,
    pub backup_root: String,
    /// Container remote commands run in
    pub container: String,
}

impl BackupLayout {
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            jenkins_home: config.jenkins_home.clone(),
            backup_root: config.backup_root.clone(),
            container: config.backup_container.clone(),
        }
    }

    /// Directory holding the data of backup `name`
    pub fn backup_dir(&self, name: &str) -> String {
        format!("{}/{}", self.backup_root, name)
    }

    /// Copy commands for a backup, in config, jobs, plugins order
    pub fn backup_commands(&self, name: &str, options: BackupOptions) -> Vec<(&'static str, String)> {
        let home = &self.jenkins_home;
        let dir = self.backup_dir(name);
        let mut commands = Vec::new();
        if options.config {
            commands.push((
                "backup-config",
                format!("mkdir -p {dir} && cp {home}/*.xml {dir}/"),
            ));
        }
        if options.jobs {
            commands.push((
                "backup-jobs",
                format!("mkdir -p {dir} && cp -r {home}/jobs {dir}/jobs"),
            ));
        }
        if options.plugins {
            commands.push((
                "backup-plugins",
                format!("mkdir -p {dir} && cp -r {home}/plugins {dir}/plugins"),
            ));
        }
        commands
    }

    /// Copy commands restoring backup `name`, in config, jobs, plugins order
    pub fn restore_commands(&self, name: &str, options: BackupOptions) -> Vec<(&'static str, String)> {
        let home = &self.jenkins_home;
        let dir = self.backup_dir(name);
        let mut commands = Vec::new();
        if options.config {
            commands.push(("restore-config", format!("cp {dir}/*.xml {home}/")));
        }
        if options.jobs {
            commands.push((
                "restore-jobs",
                format!("mkdir -p {home}/jobs && cp -r {dir}/jobs/. {home}/jobs/"),
            ));
        }
        if options.plugins {
            commands.push((
                "restore-plugins",
                format!("mkdir -p {home}/plugins && cp -r {dir}/plugins/. {home}/plugins/"),
            ));
        }
        commands
    }
}

/// Everything a backup or restore acts on
#[derive(Debug, Clone)]
pub struct BackupTarget {
    pub config: BackupConfig,
    pub jenkins: Jenkins,
    pub pod: PodTarget,
}

/// Follow BackupConfig → Jenkins → running pod
///
/// `Ok(None)` when any link of the chain is missing.
pub async fn resolve_target(
    resolver: &dyn ReferenceResolver,
    namespace: &str,
    config_name: &str,
    container: &str,
) -> Result<Option<BackupTarget>, ReconcilerError> {
    let Some(config) = resolver.backup_config(namespace, config_name).await? else {
        debug!("BackupConfig {}/{} not found", namespace, config_name);
        return Ok(None);
    };
    let Some(jenkins) = resolver.jenkins(namespace, &config.spec.jenkins_ref).await? else {
        debug!("Jenkins {}/{} not found", namespace, config.spec.jenkins_ref);
        return Ok(None);
    };
    let Some(pod) = resolver.jenkins_pod(&jenkins).await? else {
        debug!("No running pod for Jenkins {}/{}", namespace, jenkins.name_any());
        return Ok(None);
    };

    Ok(Some(BackupTarget {
        config,
        jenkins,
        pod: PodTarget {
            namespace: namespace.to_string(),
            pod,
            container: container.to_string(),
        },
    }))
}

/// Whether one of the fail-stop `stages` already recorded a failure
pub fn fail_stop_failed(conditions: &[Condition], stages: &[&str]) -> bool {
    stages.iter().any(|stage| {
        find_condition(conditions, stage).is_some_and(|c| c.status == ConditionStatus::False)
    })
}

/// Stage checking the executor can reach the platform
pub fn initialized_stage<'a>(executor: &'a dyn RemoteExecutor) -> PipelineStage<'a> {
    PipelineStage::new("initialize", INITIALIZED, move || executor.init_session())
}

/// Stage running one helper script in the target pod
pub fn helper_script_stage<'a>(
    executor: &'a dyn RemoteExecutor,
    pod: &'a PodTarget,
    name: &'static str,
    condition_type: &'static str,
    script: &'static str,
) -> PipelineStage<'a> {
    PipelineStage::new(name, condition_type, move || async move {
        executor
            .make_request(pod, name, &format!("sh {script}"))
            .await
            .map(|_| ())
    })
}

/// Stage running `commands` in order, stopping at the first failure
pub fn copy_stage<'a>(
    executor: &'a dyn RemoteExecutor,
    pod: &'a PodTarget,
    name: &'static str,
    condition_type: &'static str,
    commands: Vec<(&'static str, String)>,
) -> PipelineStage<'a> {
    PipelineStage::new(name, condition_type, move || async move {
        for (request, command) in &commands {
            executor.make_request(pod, request, command).await?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> BackupLayout {
        BackupLayout::from_config(&ControllerConfig::default())
    }

    #[test]
    fn test_backup_commands_follow_options() {
        let options = BackupOptions {
            config: true,
            jobs: true,
            plugins: false,
        };
        let commands = layout().backup_commands("nightly", options);
        assert_eq!(
            commands,
            vec![
                (
                    "backup-config",
                    "mkdir -p /jenkins-backups/nightly && cp /var/lib/jenkins/*.xml /jenkins-backups/nightly/".to_string()
                ),
                (
                    "backup-jobs",
                    "mkdir -p /jenkins-backups/nightly && cp -r /var/lib/jenkins/jobs /jenkins-backups/nightly/jobs".to_string()
                ),
            ]
        );
    }

    #[test]
    fn test_restore_commands_target_home() {
        let commands = layout().restore_commands("nightly", BackupOptions::default());
        assert_eq!(commands.len(), 3);
        assert_eq!(
            commands[0].1,
            "cp /jenkins-backups/nightly/*.xml /var/lib/jenkins/"
        );
        assert!(commands[2].1.ends_with("/var/lib/jenkins/plugins/"));
    }
}
