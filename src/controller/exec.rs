//! # Remote Executor
//!
//! Runs shell commands inside the backup sidecar of a Jenkins pod. Backup,
//! restore, quiet-down and restart all go through [`RemoteExecutor`].

use crate::controller::error::ReconcilerError;
use crate::observability;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, AttachParams};
use kube::Client;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

/// Pod and container a command is executed in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodTarget {
    pub namespace: String,
    pub pod: String,
    pub container: String,
}

impl std::fmt::Display for PodTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}[{}]", self.namespace, self.pod, self.container)
    }
}

#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Verify the executor can reach the platform
    async fn init_session(&self) -> Result<(), ReconcilerError>;

    /// Run `command` with `sh -c` in `target` and return its stdout
    ///
    /// Success means the command exited with status 0. `request_name` only
    /// labels logs and errors.
    async fn make_request(
        &self,
        target: &PodTarget,
        request_name: &str,
        command: &str,
    ) -> Result<String, ReconcilerError>;
}

/// [`RemoteExecutor`] using the pod exec subresource
#[derive(Clone)]
pub struct KubeExecutor {
    client: Client,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for KubeExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeExecutor")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl KubeExecutor {
    pub fn new(client: Client, timeout: Option<Duration>) -> Self {
        Self { client, timeout }
    }

    async fn exec(&self, target: &PodTarget, request_name: &str, command: &str) -> Result<String, ReconcilerError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &target.namespace);
        let params = AttachParams::default()
            .container(target.container.clone())
            .stdin(false)
            .stdout(true)
            .stderr(true);

        let mut attached = pods
            .exec(&target.pod, vec!["sh", "-c", command], &params)
            .await?;

        let mut stdout = String::new();
        let mut stderr = String::new();
        let stdout_reader = attached.stdout();
        let stderr_reader = attached.stderr();
        let (out, err) = tokio::join!(
            async {
                match stdout_reader {
                    Some(mut reader) => reader.read_to_string(&mut stdout).await.map(|_| ()),
                    None => Ok(()),
                }
            },
            async {
                match stderr_reader {
                    Some(mut reader) => reader.read_to_string(&mut stderr).await.map(|_| ()),
                    None => Ok(()),
                }
            }
        );
        if let Err(e) = out.and(err) {
            warn!("Failed to read output of '{}' in {}: {}", request_name, target, e);
        }

        let status = match attached.take_status() {
            Some(status) => status.await,
            None => None,
        };
        if let Err(e) = attached.join().await {
            debug!("Exec session for '{}' ended with: {}", request_name, e);
        }

        match status {
            Some(status) if status.status.as_deref() == Some("Success") => Ok(stdout),
            Some(status) => Err(ReconcilerError::RemoteCommand {
                pod: target.to_string(),
                request: request_name.to_string(),
                message: format!(
                    "{}{}",
                    status.message.unwrap_or_else(|| "command failed".to_string()),
                    if stderr.trim().is_empty() {
                        String::new()
                    } else {
                        format!(": {}", stderr.trim())
                    }
                ),
            }),
            None => Err(ReconcilerError::RemoteCommand {
                pod: target.to_string(),
                request: request_name.to_string(),
                message: "no exit status received".to_string(),
            }),
        }
    }
}

#[async_trait]
impl RemoteExecutor for KubeExecutor {
    async fn init_session(&self) -> Result<(), ReconcilerError> {
        self.client.apiserver_version().await?;
        Ok(())
    }

    async fn make_request(
        &self,
        target: &PodTarget,
        request_name: &str,
        command: &str,
    ) -> Result<String, ReconcilerError> {
        debug!("Executing '{}' in {}: {}", request_name, target, command);
        let result = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.exec(target, request_name, command))
                .await
                .unwrap_or_else(|_| {
                    Err(ReconcilerError::RemoteCommandTimeout {
                        request: request_name.to_string(),
                        timeout,
                    })
                }),
            None => self.exec(target, request_name, command).await,
        };

        observability::metrics::increment_remote_commands(if result.is_ok() {
            "success"
        } else {
            "failure"
        });
        result
    }
}
