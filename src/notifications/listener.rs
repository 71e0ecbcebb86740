//! # Notification Listener
//!
//! Channel-backed [`Notifier`] and the task that turns queued events into
//! Kubernetes events.

use super::{Event, Level, NotificationError, Notifier};
use crate::observability;
use async_trait::async_trait;
use kube::runtime::events::{Event as KubeEvent, EventType, Recorder};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Queues events for [`listen`]
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Event>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn send(&self, event: Event) -> Result<(), NotificationError> {
        observability::metrics::increment_notifications(event.level.as_str());
        self.tx
            .send(event)
            .map_err(|_closed| NotificationError::ChannelClosed)
    }
}

fn event_type(level: Level) -> EventType {
    match level {
        Level::Info => EventType::Normal,
        Level::Warning => EventType::Warning,
    }
}

/// Publish queued events until every sender is dropped
pub async fn listen(mut rx: mpsc::UnboundedReceiver<Event>, recorder: Recorder) {
    while let Some(event) = rx.recv().await {
        let kube_event = KubeEvent {
            type_: event_type(event.level),
            reason: event.reason.kind.as_str().to_string(),
            note: Some(event.reason.verbose_message()),
            action: event.controller.to_string(),
            secondary: None,
        };
        match recorder.publish(&kube_event, &event.object).await {
            Ok(()) => debug!(
                "Published {} event for {}",
                kube_event.reason,
                event.object.name.as_deref().unwrap_or("unknown")
            ),
            Err(e) => warn!("Failed to publish {} event: {}", kube_event.reason, e),
        }
    }
    debug!("Notification channel closed, listener exiting");
}
