//! # Realtime Events
//!
//! The closed event vocabulary, the event envelope, and channel naming.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::{RealtimeError, RealtimeResult};

/// Type of realtime event (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// New comment published
    #[serde(rename = "comment.created")]
    CommentCreated,
    /// Existing comment edited
    #[serde(rename = "comment.updated")]
    CommentUpdated,
    /// Comment soft-deleted (tombstoned)
    #[serde(rename = "comment.deleted")]
    CommentDeleted,
    /// A participant is typing
    #[serde(rename = "user.typing")]
    UserTyping,
    /// New notification for a user
    #[serde(rename = "notification.new")]
    NotificationNew,
    /// Notification(s) marked read
    #[serde(rename = "notification.read")]
    NotificationRead,
}

impl EventType {
    /// Wire name of the event type
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::CommentCreated => "comment.created",
            EventType::CommentUpdated => "comment.updated",
            EventType::CommentDeleted => "comment.deleted",
            EventType::UserTyping => "user.typing",
            EventType::NotificationNew => "notification.new",
            EventType::NotificationRead => "notification.read",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A published event, immutable once created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeEvent {
    /// Channel the event was published on
    pub channel: String,

    /// Event type
    pub event_type: EventType,

    /// Payload
    pub payload: Value,

    /// Session that published the event, used for self-suppression
    pub origin_id: Uuid,

    /// Publish timestamp
    pub timestamp: DateTime<Utc>,
}

impl RealtimeEvent {
    /// Create a new event stamped with the publishing session and now
    pub fn new(channel: String, event_type: EventType, payload: Value, origin_id: Uuid) -> Self {
        Self {
            channel,
            event_type,
            payload,
            origin_id,
            timestamp: Utc::now(),
        }
    }

    /// Whether this event originated from the given session
    pub fn is_from(&self, origin_id: Uuid) -> bool {
        self.origin_id == origin_id
    }
}

/// Channel naming conventions
pub mod channels {
    use super::*;

    /// Reserved channel for site-wide presence
    pub const PRESENCE: &str = "presence";

    /// Maximum channel name length in bytes
    pub const MAX_NAME_LEN: usize = 128;

    /// Channel carrying comment and typing traffic for one piece of content
    pub fn comments(content_id: &str) -> String {
        format!("comments:{}", content_id)
    }

    /// Per-user notification channel
    pub fn notifications(user_id: Uuid) -> String {
        format!("notifications:{}", user_id)
    }

    /// Validate a channel name
    ///
    /// Valid names are non-empty, at most [`MAX_NAME_LEN`] bytes, and free
    /// of whitespace and control characters.
    pub fn validate(name: &str) -> RealtimeResult<()> {
        if name.is_empty() {
            return Err(RealtimeError::InvalidChannel("empty name".into()));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(RealtimeError::InvalidChannel(format!(
                "name exceeds {} bytes",
                MAX_NAME_LEN
            )));
        }
        if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(RealtimeError::InvalidChannel(name.to_string()));
        }
        Ok(())
    }
}
