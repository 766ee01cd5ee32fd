//! # Notification Center
//!
//! Per-user notification delivery and read-state bookkeeping. Each incoming
//! notification moves `unseen → delivered → read`; delivery fans out to the
//! bounded in-app list, a single transient toast, and the host's native
//! notification facility, each independently best-effort. The unread count
//! is always recomputed from the list, never incremented, so missed events
//! cannot make it drift.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::bus::{EventBus, SubscriptionUpdate};
use crate::config::RealtimeConfig;
use crate::errors::RealtimeResult;
use crate::event::{channels, EventType, RealtimeEvent};

/// What a notification is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Comment,
    Like,
    Bookmark,
    System,
}

/// A notification owned by the backend store; this layer only ferries
/// "new" and "read" events about it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Notification ID
    pub id: Uuid,

    /// Recipient
    pub user_id: Uuid,

    /// Kind
    pub kind: NotificationKind,

    /// Title
    pub title: String,

    /// Body text
    pub message: String,

    /// Optional link target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,

    /// Read flag
    #[serde(default)]
    pub read: bool,

    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

/// Backend notification endpoints (external collaborator)
#[async_trait]
pub trait NotificationApi: Send + Sync {
    /// Fetch a user's notifications, most recent first
    async fn fetch(&self, user_id: Uuid) -> RealtimeResult<Vec<Notification>>;

    /// Mark one notification read; returns the updated entity
    async fn mark_read(&self, id: Uuid) -> RealtimeResult<Notification>;

    /// Mark all of a user's notifications read
    async fn mark_all_read(&self, user_id: Uuid) -> RealtimeResult<()>;

    /// Delete a notification
    async fn delete(&self, id: Uuid) -> RealtimeResult<()>;
}

/// Native notification permission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

/// Capability-gated native side effects: permission-gated notifications and
/// a notification chime
///
/// Every method is infallible at the seam; implementations swallow their
/// own failures (a blocked chime or denied popup must never surface).
pub trait HostNotifier: Send + Sync {
    /// Ask the host for notification permission
    fn request_permission(&self) -> Permission;

    /// Show a native notification
    fn notify(&self, title: &str, body: &str, icon: Option<&str>);

    /// Play the notification chime
    fn play_chime(&self);
}

/// Notifier for hosts without a native notification facility
#[derive(Debug, Default)]
pub struct NoopNotifier;

impl HostNotifier for NoopNotifier {
    fn request_permission(&self) -> Permission {
        Permission::Denied
    }

    fn notify(&self, _title: &str, _body: &str, _icon: Option<&str>) {}

    fn play_chime(&self) {}
}

/// The toast currently on screen
#[derive(Debug, Clone)]
pub struct Toast {
    /// Notification being shown
    pub notification: Notification,
    /// When it appeared
    pub shown_at: DateTime<Utc>,
}

/// Per-user notification center
pub struct NotificationCenter {
    bus: EventBus,
    api: Arc<dyn NotificationApi>,
    notifier: Arc<dyn HostNotifier>,
    user_id: Uuid,
    channel: String,
    config: RealtimeConfig,
    list: RwLock<VecDeque<Notification>>,
    toast: RwLock<Option<Toast>>,
    permission: RwLock<Option<Permission>>,
}

impl NotificationCenter {
    /// Create a center for one user
    pub fn new(
        bus: EventBus,
        api: Arc<dyn NotificationApi>,
        notifier: Arc<dyn HostNotifier>,
        user_id: Uuid,
    ) -> Self {
        Self::with_config(bus, api, notifier, user_id, RealtimeConfig::default())
    }

    /// Create with custom bounds and toast timing
    pub fn with_config(
        bus: EventBus,
        api: Arc<dyn NotificationApi>,
        notifier: Arc<dyn HostNotifier>,
        user_id: Uuid,
        config: RealtimeConfig,
    ) -> Self {
        Self {
            bus,
            api,
            notifier,
            user_id,
            channel: channels::notifications(user_id),
            config,
            list: RwLock::new(VecDeque::new()),
            toast: RwLock::new(None),
            permission: RwLock::new(None),
        }
    }

    /// Replace the list from the backend (bounded)
    pub async fn load(&self) -> RealtimeResult<()> {
        let fetched = self.api.fetch(self.user_id).await?;
        if let Ok(mut list) = self.list.write() {
            *list = fetched.into_iter().take(self.config.max_notifications).collect();
        }
        Ok(())
    }

    /// Snapshot of the list, most recent first
    pub fn notifications(&self) -> Vec<Notification> {
        self.list
            .read()
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Unread count, always recomputed from the current list
    pub fn unread_count(&self) -> usize {
        self.list
            .read()
            .map(|l| l.iter().filter(|n| !n.read).count())
            .unwrap_or(0)
    }

    /// The toast iff it was shown less than the toast duration ago
    ///
    /// Auto-dismiss is a read-time filter; only one toast exists at a time.
    pub fn active_toast_at(&self, now: DateTime<Utc>) -> Option<Toast> {
        self.toast
            .read()
            .ok()
            .and_then(|t| t.clone())
            .filter(|t| now - t.shown_at < self.config.toast_duration)
    }

    /// The toast currently visible
    pub fn active_toast(&self) -> Option<Toast> {
        self.active_toast_at(Utc::now())
    }

    /// Fold one incoming event into local state
    pub fn apply_event(&self, event: &RealtimeEvent) {
        self.apply_event_at(event, Utc::now());
    }

    /// Fold one incoming event, with an explicit toast timestamp
    pub fn apply_event_at(&self, event: &RealtimeEvent, now: DateTime<Utc>) {
        match event.event_type {
            EventType::NotificationNew => {
                let Ok(notification) =
                    serde_json::from_value::<Notification>(event.payload.clone())
                else {
                    tracing::debug!(channel = %self.channel, "malformed notification.new payload");
                    return;
                };
                if notification.user_id != self.user_id {
                    return;
                }
                self.deliver_at(notification, now);
            }
            EventType::NotificationRead => {
                // Another session of the same user converging; our own
                // publishes already applied locally.
                if event.is_from(self.bus.origin_id()) {
                    return;
                }
                if event.payload.get("all").and_then(|v| v.as_bool()) == Some(true) {
                    self.set_all_read();
                } else if let Some(id) = event
                    .payload
                    .get("id")
                    .and_then(|v| v.as_str())
                    .and_then(|s| Uuid::parse_str(s).ok())
                {
                    self.set_read(id);
                }
            }
            _ => {}
        }
    }

    /// `unseen → delivered`: list prepend, toast replace, native fan-out
    fn deliver_at(&self, notification: Notification, now: DateTime<Utc>) {
        // (a) bounded list, oldest evicted
        if let Ok(mut list) = self.list.write() {
            if list.iter().any(|n| n.id == notification.id) {
                return; // duplicate delivery, already merged
            }
            list.push_front(notification.clone());
            while list.len() > self.config.max_notifications {
                list.pop_back();
            }
        }

        // (b) transient toast, replacing any current one
        if let Ok(mut toast) = self.toast.write() {
            *toast = Some(Toast {
                notification: notification.clone(),
                shown_at: now,
            });
        }

        // (c) native facility, permission asked exactly once
        if self.permission() == Permission::Granted {
            self.notifier
                .notify(&notification.title, &notification.message, None);
            self.notifier.play_chime();
        } else {
            tracing::debug!("native notification skipped, permission denied");
        }
    }

    /// Cached permission, requesting it on first use
    fn permission(&self) -> Permission {
        if let Ok(cached) = self.permission.read() {
            if let Some(permission) = *cached {
                return permission;
            }
        }
        let permission = self.notifier.request_permission();
        if let Ok(mut cached) = self.permission.write() {
            cached.get_or_insert(permission);
        }
        permission
    }

    /// Mark one notification read and tell sibling sessions
    pub async fn mark_read(&self, id: Uuid) -> RealtimeResult<()> {
        self.api.mark_read(id).await?;
        self.set_read(id);
        self.publish_read(json!({"id": id})).await;
        Ok(())
    }

    /// Mark everything read and tell sibling sessions
    pub async fn mark_all_read(&self) -> RealtimeResult<()> {
        self.api.mark_all_read(self.user_id).await?;
        self.set_all_read();
        self.publish_read(json!({"all": true})).await;
        Ok(())
    }

    /// Delete a notification regardless of its state
    pub async fn delete(&self, id: Uuid) -> RealtimeResult<()> {
        self.api.delete(id).await?;
        if let Ok(mut list) = self.list.write() {
            list.retain(|n| n.id != id);
        }
        if let Ok(mut toast) = self.toast.write() {
            if toast.as_ref().is_some_and(|t| t.notification.id == id) {
                *toast = None;
            }
        }
        Ok(())
    }

    /// Drive the per-user channel until it closes
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let center = self;
        tokio::spawn(async move {
            let mut sub = match center.bus.subscribe(&center.channel) {
                Ok(sub) => sub,
                Err(err) => {
                    tracing::warn!(channel = %center.channel, error = %err, "notification subscribe rejected");
                    return;
                }
            };
            while let Some(update) = sub.recv().await {
                match update {
                    SubscriptionUpdate::Event(event) => center.apply_event(&event),
                    SubscriptionUpdate::Connected => {
                        tracing::trace!(channel = %center.channel, "notification center connected");
                    }
                    SubscriptionUpdate::Error(err) => {
                        tracing::warn!(channel = %center.channel, error = %err, "notification transport error");
                    }
                }
            }
        })
    }

    fn set_read(&self, id: Uuid) {
        if let Ok(mut list) = self.list.write() {
            if let Some(notification) = list.iter_mut().find(|n| n.id == id) {
                notification.read = true;
            }
        }
    }

    fn set_all_read(&self) {
        if let Ok(mut list) = self.list.write() {
            for notification in list.iter_mut() {
                notification.read = true;
            }
        }
    }

    async fn publish_read(&self, payload: serde_json::Value) {
        if let Err(err) = self
            .bus
            .publish(&self.channel, EventType::NotificationRead, payload)
            .await
        {
            tracing::warn!(channel = %self.channel, error = %err, "read-state broadcast failed");
        }
    }
}

impl std::fmt::Debug for NotificationCenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationCenter")
            .field("user_id", &self.user_id)
            .field("unread", &self.unread_count())
            .finish()
    }
}
