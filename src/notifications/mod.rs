//! # Notifications
//!
//! Human-facing events about reconciliation results: completed backups,
//! failed scripts, instances the operator gave up on.
//!
//! Reconcilers hand [`Event`]s to a [`Notifier`]. The shipped notifier
//! queues them on a channel drained by [`listener::listen`], which publishes
//! Kubernetes events on the affected object.

pub mod listener;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use thiserror::Error;

pub use listener::{listen, ChannelNotifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "info",
            Level::Warning => "warning",
        }
    }
}

/// Who or what caused the event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Operator,
    Kubernetes,
    Human,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonKind {
    ReconcileLoopFailed,
    ScriptExecutionFailed,
    BaseConfigurationFailed,
    BackupCompleted,
    RestoreCompleted,
    ImageBuildCompleted,
    ImageBuildFailed,
}

impl ReasonKind {
    /// CamelCase reason recorded on Kubernetes events
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonKind::ReconcileLoopFailed => "ReconcileLoopFailed",
            ReasonKind::ScriptExecutionFailed => "GroovyScriptExecutionFailed",
            ReasonKind::BaseConfigurationFailed => "BaseConfigurationFailed",
            ReasonKind::BackupCompleted => "BackupCompleted",
            ReasonKind::RestoreCompleted => "RestoreCompleted",
            ReasonKind::ImageBuildCompleted => "ImageBuildCompleted",
            ReasonKind::ImageBuildFailed => "ImageBuildFailed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reason {
    pub kind: ReasonKind,
    pub source: Source,
    /// One-line summaries
    pub short: Vec<String>,
    /// Full detail, falls back to `short` when empty
    pub verbose: Vec<String>,
}

impl Reason {
    pub fn new(kind: ReasonKind, source: Source, short: impl Into<String>) -> Self {
        Self {
            kind,
            source,
            short: vec![short.into()],
            verbose: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_verbose(mut self, verbose: impl IntoIterator<Item = String>) -> Self {
        self.verbose = verbose.into_iter().collect();
        self
    }

    pub fn short_message(&self) -> String {
        self.short.join("; ")
    }

    pub fn verbose_message(&self) -> String {
        if self.verbose.is_empty() {
            self.short_message()
        } else {
            self.verbose.join("\n")
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub object: ObjectReference,
    /// Kind of the reconciler that raised the event
    pub controller: &'static str,
    pub level: Level,
    pub reason: Reason,
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification channel closed")]
    ChannelClosed,
    #[error("failed to publish event: {0}")]
    Publish(#[from] kube::Error),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, event: Event) -> Result<(), NotificationError>;
}
