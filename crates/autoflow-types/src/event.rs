//! Event types for the Autoflow store event bus.
//!
//! `StoreEvent` is broadcast by the editing store. All variants are
//! Clone + Send + Sync for use with tokio broadcast channels.

use serde::{Deserialize, Serialize};

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

/// Events emitted by the automation store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    /// A message for the user (e.g. a failed save).
    Notification {
        level: NotificationLevel,
        message: String,
    },

    /// An automation was persisted with a new revision.
    AutomationSaved { automation_id: String, revision: String },

    AutomationDeleted { automation_id: String },

    /// The selected automation changed (or was cleared).
    SelectionChanged { automation_id: Option<String> },
}

impl StoreEvent {
    pub fn error(message: impl Into<String>) -> Self {
        StoreEvent::Notification {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        StoreEvent::Notification {
            level: NotificationLevel::Success,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        StoreEvent::Notification {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_serialization() {
        let event = StoreEvent::error("Error saving automation");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "notification");
        assert_eq!(json["level"], "error");
        assert_eq!(json["message"], "Error saving automation");
    }

    #[test]
    fn test_saved_roundtrip() {
        let event = StoreEvent::AutomationSaved {
            automation_id: "au_1".to_string(),
            revision: "2-ab".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: StoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }
}
