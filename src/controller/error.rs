//! # Reconciler Errors
//!
//! Error type returned by reconcilers and the classification the reconcile
//! engine uses to decide between retrying, stopping and giving up.

use std::time::Duration;
use thiserror::Error;

/// A groovy script did not run to completion on the Jenkins instance
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("script execution failed: {configuration_type} {script_source}/{name}")]
pub struct ScriptExecutionFailed {
    pub configuration_type: String,
    /// ConfigMap or other object the script came from
    pub script_source: String,
    pub name: String,
    /// Output captured from the script console
    pub logs: String,
}

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("remote command '{request}' failed in {pod}: {message}")]
    RemoteCommand {
        pod: String,
        request: String,
        message: String,
    },

    #[error("remote command '{request}' timed out after {timeout:?}")]
    RemoteCommandTimeout { request: String, timeout: Duration },

    #[error(transparent)]
    ScriptExecution(#[from] ScriptExecutionFailed),

    #[error("Jenkins API request failed: {0}")]
    ControlApi(String),

    #[error("stage {stage} failed: {message}")]
    StageFailed { stage: String, message: String },

    #[error("invalid spec: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("no running Jenkins pod found for {0}")]
    PodNotFound(String),

    #[error("Reconciliation failed: {0}")]
    ReconciliationFailed(#[from] anyhow::Error),
}

/// How the reconcile engine treats an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Optimistic-concurrency mismatch, retried immediately at no cost
    Conflict,
    /// The object or a dependency vanished
    NotFound,
    /// A groovy script failed, never retried
    ScriptExecution,
    /// Retrying cannot help without a spec change
    Permanent,
    /// Counted against the failure budget and retried
    Transient,
}

impl ErrorClass {
    /// Label used for metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Conflict => "conflict",
            ErrorClass::NotFound => "not_found",
            ErrorClass::ScriptExecution => "script_execution",
            ErrorClass::Permanent => "permanent",
            ErrorClass::Transient => "transient",
        }
    }
}

impl ReconcilerError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ReconcilerError::Kube(kube::Error::Api(api_err)) if api_err.code == 409 => {
                ErrorClass::Conflict
            }
            ReconcilerError::Kube(kube::Error::Api(api_err)) if api_err.code == 404 => {
                ErrorClass::NotFound
            }
            ReconcilerError::ScriptExecution(_) => ErrorClass::ScriptExecution,
            ReconcilerError::Validation(_) | ReconcilerError::StageFailed { .. } => {
                ErrorClass::Permanent
            }
            _ => ErrorClass::Transient,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.class() == ErrorClass::Conflict
    }

    pub fn is_not_found(&self) -> bool {
        self.class() == ErrorClass::NotFound
    }
}
