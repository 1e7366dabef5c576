use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::domain::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    QuizCompleted,
    SubmissionGraded,
    SubmissionReturned,
    CourseCompleted,
    CertificateIssued,
    CertificateRevoked,
}

/// "Notify user X of event Y" message handed to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: UserId,
    pub event: NotificationEvent,
    pub details: BTreeMap<String, String>,
}

impl Notification {
    pub fn new(recipient: UserId, event: NotificationEvent) -> Self {
        Self {
            recipient,
            event,
            details: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Outbound hook to the notification dispatcher.
pub trait Notifier: Send + Sync {
    fn publish(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Fire-and-forget: a failed dispatch is logged and never fails the action.
pub(crate) fn dispatch<N: Notifier + ?Sized>(notifier: &N, notification: Notification) {
    let event = notification.event;
    let recipient = notification.recipient.clone();
    if let Err(err) = notifier.publish(notification) {
        warn!(?event, %recipient, error = %err, "notification dispatch failed");
    }
}

/// Records notifications in memory; backs tests and the demo run.
#[derive(Debug, Default, Clone)]
pub struct MemoryNotifier {
    events: Arc<Mutex<Vec<Notification>>>,
}

impl MemoryNotifier {
    pub fn events(&self) -> Vec<Notification> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }
}

impl Notifier for MemoryNotifier {
    fn publish(&self, notification: Notification) -> Result<(), NotifyError> {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification);
        Ok(())
    }
}

/// Writes each notification to the log and keeps nothing; the server's default sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn publish(&self, notification: Notification) -> Result<(), NotifyError> {
        info!(
            recipient = %notification.recipient,
            event = ?notification.event,
            details = ?notification.details,
            "notification"
        );
        Ok(())
    }
}
