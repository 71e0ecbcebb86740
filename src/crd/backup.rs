//! # Backup
//!
//! One-shot backup requests and the BackupConfig they are driven by.

use super::condition::{impl_conditioned, Condition};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Backup Custom Resource Definition
///
/// Each Backup is processed exactly once. Its data lands in a directory
/// named after the Backup on the backup volume.
///
/// ```yaml
/// apiVersion: jenkins.io/v1alpha2
/// kind: Backup
/// metadata:
///   name: nightly-2024-05-01
/// spec:
///   configRef: default
/// ```
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Backup",
    group = "jenkins.io",
    version = "v1alpha2",
    namespaced,
    status = "BackupStatus",
    printcolumn = r#"{"name":"Completed", "type":"string", "jsonPath":".status.conditions[?(@.type==\"BackupCompleted\")].status"}, {"name":"Path", "type":"string", "jsonPath":".status.backupPath"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BackupSpec {
    /// BackupConfig to use, defaults to "default"
    #[serde(default)]
    pub config_ref: Option<String>,
}

impl BackupSpec {
    pub fn config_name(&self) -> &str {
        self.config_ref
            .as_deref()
            .unwrap_or(crate::constants::DEFAULT_BACKUP_CONFIG_NAME)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackupStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Directory on the backup volume holding this backup
    #[serde(default)]
    pub backup_path: Option<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
}

impl_conditioned!(Backup);

/// BackupConfig Custom Resource Definition
///
/// Ties backups and restores to a Jenkins instance and selects what gets copied.
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "BackupConfig",
    group = "jenkins.io",
    version = "v1alpha2",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct BackupConfigSpec {
    /// Jenkins instance backups are taken from
    pub jenkins_ref: String,
    /// Put Jenkins into quiet-down mode while the backup runs
    #[serde(default)]
    pub quiet_down_during_backup: bool,
    #[serde(default)]
    pub options: BackupOptions,
    #[serde(default)]
    pub restart_after_restore: RestartPolicy,
}

/// Content categories included in a backup or restore
#[derive(Debug, Clone, Copy, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackupOptions {
    /// `*.xml` files in the Jenkins home directory
    #[serde(default = "default_true")]
    pub config: bool,
    #[serde(default = "default_true")]
    pub jobs: bool,
    #[serde(default = "default_true")]
    pub plugins: bool,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            config: true,
            jobs: true,
            plugins: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RestartPolicy {
    #[serde(default)]
    pub enabled: bool,
    /// Wait for running builds to finish before restarting
    #[serde(default)]
    pub safe: bool,
}

fn default_true() -> bool {
    true
}
