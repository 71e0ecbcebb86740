//! # Controller Configuration
//!
//! Reconciliation settings: retry budget, requeue delays, remote command
//! paths and worker concurrency.

use super::env_var_or_default;
use std::time::Duration;

/// Controller configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Identical consecutive failures tolerated before giving up
    pub reconcile_fail_limit: u32,
    /// Requeue delay after a transient failure (seconds)
    pub requeue_delay_secs: u64,
    /// Requeue delay while the Jenkins deployment is not ready (seconds)
    pub readiness_requeue_secs: u64,
    /// Polling interval for image builder pods (seconds)
    pub image_build_poll_secs: u64,
    /// Remote command timeout, 0 disables it (seconds)
    pub exec_timeout_secs: u64,
    /// Concurrent reconciles per controller
    pub worker_concurrency: u16,
    /// Namespace to watch, empty watches all namespaces
    pub watch_namespace: Option<String>,
    /// Jenkins home directory inside the backup container
    pub jenkins_home: String,
    /// Backup volume mount path inside the backup container
    pub backup_root: String,
    /// Container remote commands are executed in
    pub backup_container: String,
    /// Image used when no other source supplies one
    pub default_jenkins_image: String,
    /// Image used by JenkinsImage builder pods
    pub image_builder_image: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            reconcile_fail_limit: DEFAULT_RECONCILE_FAIL_LIMIT,
            requeue_delay_secs: DEFAULT_REQUEUE_DELAY_SECS,
            readiness_requeue_secs: DEFAULT_READINESS_REQUEUE_SECS,
            image_build_poll_secs: DEFAULT_IMAGE_BUILD_POLL_SECS,
            exec_timeout_secs: DEFAULT_EXEC_TIMEOUT_SECS,
            worker_concurrency: DEFAULT_WORKER_CONCURRENCY,
            watch_namespace: None,
            jenkins_home: DEFAULT_JENKINS_HOME.to_string(),
            backup_root: DEFAULT_BACKUP_ROOT.to_string(),
            backup_container: DEFAULT_BACKUP_CONTAINER.to_string(),
            default_jenkins_image: DEFAULT_JENKINS_IMAGE.to_string(),
            image_builder_image: DEFAULT_IMAGE_BUILDER_IMAGE.to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        let watch_namespace = std::env::var("WATCH_NAMESPACE")
            .ok()
            .filter(|ns| !ns.trim().is_empty());
        Self {
            reconcile_fail_limit: env_var_or_default(
                "RECONCILE_FAIL_LIMIT",
                DEFAULT_RECONCILE_FAIL_LIMIT,
            ),
            requeue_delay_secs: env_var_or_default("REQUEUE_DELAY_SECS", DEFAULT_REQUEUE_DELAY_SECS),
            readiness_requeue_secs: env_var_or_default(
                "READINESS_REQUEUE_SECS",
                DEFAULT_READINESS_REQUEUE_SECS,
            ),
            image_build_poll_secs: env_var_or_default(
                "IMAGE_BUILD_POLL_SECS",
                DEFAULT_IMAGE_BUILD_POLL_SECS,
            ),
            exec_timeout_secs: env_var_or_default("EXEC_TIMEOUT_SECS", DEFAULT_EXEC_TIMEOUT_SECS),
            worker_concurrency: env_var_or_default(
                "WORKER_CONCURRENCY",
                DEFAULT_WORKER_CONCURRENCY,
            ),
            watch_namespace,
            jenkins_home: env_var_or_default("JENKINS_HOME", DEFAULT_JENKINS_HOME.to_string()),
            backup_root: env_var_or_default("BACKUP_ROOT", DEFAULT_BACKUP_ROOT.to_string()),
            backup_container: env_var_or_default(
                "BACKUP_CONTAINER",
                DEFAULT_BACKUP_CONTAINER.to_string(),
            ),
            default_jenkins_image: env_var_or_default(
                "DEFAULT_JENKINS_IMAGE",
                DEFAULT_JENKINS_IMAGE.to_string(),
            ),
            image_builder_image: env_var_or_default(
                "IMAGE_BUILDER_IMAGE",
                DEFAULT_IMAGE_BUILDER_IMAGE.to_string(),
            ),
        }
    }

    pub fn requeue_delay(&self) -> Duration {
        Duration::from_secs(self.requeue_delay_secs)
    }

    pub fn readiness_requeue(&self) -> Duration {
        Duration::from_secs(self.readiness_requeue_secs)
    }

    pub fn image_build_poll(&self) -> Duration {
        Duration::from_secs(self.image_build_poll_secs)
    }

    /// Remote command timeout, `None` when disabled
    pub fn exec_timeout(&self) -> Option<Duration> {
        (self.exec_timeout_secs > 0).then(|| Duration::from_secs(self.exec_timeout_secs))
    }
}
