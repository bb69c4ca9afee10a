//! Notification sink.
//!
//! Consumes delivered notification payloads. Delivery is fire-and-forget:
//! one call per radio-level notify indication, no buffering, no backpressure.

use bytes::Bytes;
use tracing::info;

use crate::gatt::types::Handle;

/// One delivered notification.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Value handle of the source characteristic.
    pub handle: Handle,
    /// The raw payload.
    pub value: Bytes,
}

impl Notification {
    /// Best-effort text interpretation of the payload.
    pub fn as_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }
}

/// Consumer of delivered notifications.
pub trait NotificationSink: Send + Sync {
    /// Handle one notification.
    fn on_notification(&self, notification: &Notification);
}

/// Default sink that logs each payload as hex plus its text interpretation.
#[derive(Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn on_notification(&self, notification: &Notification) {
        info!(
            handle = %notification.handle,
            data = ?notification.value.as_ref(),
            text = %notification.as_text(),
            "notification received"
        );
    }
}
