//! # Constants
//!
//! Default values and well-known names shared across the operator.

/// Field manager used for status patches and server-side apply
pub const FIELD_MANAGER: &str = "jenkins-operator";

/// Reporter name used for Kubernetes events
pub const EVENT_REPORTER: &str = "jenkins-operator";

/// Default number of identical consecutive failures before giving up
pub const DEFAULT_RECONCILE_FAIL_LIMIT: u32 = 10;

/// Default requeue delay after a transient reconciliation failure (seconds)
pub const DEFAULT_REQUEUE_DELAY_SECS: u64 = 5;

/// Default requeue delay while waiting for the Jenkins deployment (seconds)
pub const DEFAULT_READINESS_REQUEUE_SECS: u64 = 5;

/// Default polling interval for image builder pods (seconds)
pub const DEFAULT_IMAGE_BUILD_POLL_SECS: u64 = 10;

/// Remote command timeout, 0 disables it (seconds)
pub const DEFAULT_EXEC_TIMEOUT_SECS: u64 = 0;

/// Default worker concurrency per controller
pub const DEFAULT_WORKER_CONCURRENCY: u16 = 4;

/// Jenkins home directory inside the master and backup containers
pub const DEFAULT_JENKINS_HOME: &str = "/var/lib/jenkins";

/// Mount path of the backup volume inside the backup container
pub const DEFAULT_BACKUP_ROOT: &str = "/jenkins-backups";

/// Name of the sidecar container remote commands run in
pub const DEFAULT_BACKUP_CONTAINER: &str = "backup";

/// Image used when neither the spec nor a JenkinsImage supplies one
pub const DEFAULT_JENKINS_IMAGE: &str = "jenkins/jenkins:lts";

/// Image used by builder pods for JenkinsImage resources
pub const DEFAULT_IMAGE_BUILDER_IMAGE: &str = "gcr.io/kaniko-project/executor:latest";

/// Name of the BackupConfig created for Jenkins instances with backups enabled
pub const DEFAULT_BACKUP_CONFIG_NAME: &str = "default";

/// Default size of the backup volume claim
pub const DEFAULT_BACKUP_VOLUME_SIZE: &str = "2Gi";

/// Default Jenkins HTTP port
pub const DEFAULT_JENKINS_HTTP_PORT: i32 = 8080;

/// Helper scripts written by the backup init container
pub const SCRIPTS_VOLUME_PATH: &str = "/jenkins-operator-scripts";
pub const QUIET_DOWN_SCRIPT: &str = "/jenkins-operator-scripts/quietdown.sh";
pub const CANCEL_QUIET_DOWN_SCRIPT: &str = "/jenkins-operator-scripts/cancelquietdown.sh";
pub const RESTART_SCRIPT: &str = "/jenkins-operator-scripts/restart.sh";
pub const SAFE_RESTART_SCRIPT: &str = "/jenkins-operator-scripts/saferestart.sh";

/// Default HTTP server port for metrics and probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Server startup timeout (seconds)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Server readiness poll interval (milliseconds)
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Requeue delay when a status write conflicts with a concurrent update
pub const CONFLICT_REQUEUE_SECS: u64 = 0;

/// Requeue delay for errors that escape the engine (seconds)
pub const DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS: u64 = 30;
