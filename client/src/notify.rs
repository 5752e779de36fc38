//! Notification sink seam.
//!
//! Terminal failures can be surfaced to an external notification service.
//! This crate defines the contract and a delivery-free implementation; real
//! transports (email, chat, pager) live with the collaborator that owns them.

use serde_json::Value;
use tether_types::AlertPriority;

/// Receiver for informational notices and structured alerts.
pub trait NotificationSink: Send + Sync {
    /// Informational notice, optionally addressed to specific recipients.
    fn notify(&self, message: &str, recipients: Option<&[String]>);

    /// Structured alert with a severity on the 1-5 scale.
    fn alert(&self, alert_type: &str, details: &Value, priority: AlertPriority);
}

/// Sink that records notices and alerts through `tracing` and delivers
/// nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, message: &str, recipients: Option<&[String]>) {
        match recipients {
            Some(recipients) => {
                tracing::info!(note = message, ?recipients, "notification");
            }
            None => tracing::info!(note = message, "notification"),
        }
    }

    fn alert(&self, alert_type: &str, details: &Value, priority: AlertPriority) {
        if priority >= AlertPriority::HIGH {
            tracing::warn!(alert_type, priority = priority.value(), %details, "alert");
        } else {
            tracing::info!(alert_type, priority = priority.value(), %details, "alert");
        }
    }
}
