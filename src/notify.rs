use serde::Serialize;

/// Event pushed to a single user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub event: String,
    pub payload: serde_json::Value,
}

impl Notification {
    pub fn new(event: &str, payload: serde_json::Value) -> Self {
        Notification {
            event: event.to_string(),
            payload,
        }
    }
}

/// Delivery channel for user-facing events. Implementations must not fail
/// the request that produced the event; delivery is best-effort.
pub trait Notifier: Send + Sync {
    fn publish(&self, user_id: &str, notification: Notification);
}

/// Writes notifications to the log. Used when no live transport is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn publish(&self, user_id: &str, notification: Notification) {
        tracing::info!(
            user = user_id,
            event = %notification.event,
            payload = %notification.payload,
            "notification"
        );
    }
}
