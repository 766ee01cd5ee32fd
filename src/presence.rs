//! # Presence Tracking
//!
//! "Who is here" per channel. Presence is eventually consistent: continuous
//! heartbeats plus a pollable snapshot, with the snapshot as the source of
//! truth because events can be missed during a disconnect window. Staleness
//! is a read-time filter; records are never purged by another client.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::bus::{EventBus, SubscriptionUpdate};
use crate::config::RealtimeConfig;

/// Participant status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Away,
}

/// One participant's liveness record, refreshed only by its owning user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceRecord {
    /// User ID
    pub user_id: Uuid,

    /// Display name
    pub username: String,

    /// Avatar URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,

    /// Status
    pub status: PresenceStatus,

    /// Page the user is currently viewing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_page: Option<String>,

    /// Last heartbeat
    pub last_seen: DateTime<Utc>,
}

impl PresenceRecord {
    /// Create an online record seen now
    pub fn new(user_id: Uuid, username: String) -> Self {
        Self {
            user_id,
            username,
            avatar: None,
            status: PresenceStatus::Online,
            current_page: None,
            last_seen: Utc::now(),
        }
    }

    /// Set the avatar URL
    pub fn with_avatar(mut self, avatar: String) -> Self {
        self.avatar = Some(avatar);
        self
    }

    /// Set the current page
    pub fn with_page(mut self, page: String) -> Self {
        self.current_page = Some(page);
        self
    }

    /// Refresh the heartbeat timestamp
    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
    }

    /// Active iff `now - last_seen` is strictly inside the liveness window
    pub fn is_active_at(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now - self.last_seen < window
    }
}

/// Shared state behind the store's background loops
struct StoreInner {
    bus: EventBus,
    channel: String,
    config: RealtimeConfig,
    local: RwLock<PresenceRecord>,
    snapshot: RwLock<HashMap<Uuid, PresenceRecord>>,
    connected: AtomicBool,
}

impl StoreInner {
    /// Republish the local record with a fresh `last_seen`
    async fn heartbeat(&self) {
        let record = {
            match self.local.write() {
                Ok(mut local) => {
                    local.touch();
                    local.clone()
                }
                Err(_) => return,
            }
        };

        if let Err(err) = self.bus.track(&self.channel, record).await {
            tracing::warn!(channel = %self.channel, error = %err, "heartbeat failed");
            self.connected.store(false, Ordering::Relaxed);
        }
    }

    /// Replace the snapshot from the transport's point-in-time view
    async fn poll(&self) {
        match self.bus.presence_snapshot(&self.channel).await {
            Ok(records) => {
                if let Ok(mut snapshot) = self.snapshot.write() {
                    *snapshot = records.into_iter().map(|r| (r.user_id, r)).collect();
                }
                self.connected.store(true, Ordering::Relaxed);
            }
            Err(err) => {
                tracing::warn!(channel = %self.channel, error = %err, "presence poll failed");
                self.connected.store(false, Ordering::Relaxed);
            }
        }
    }
}

/// Per-channel presence store
///
/// On `start`: subscribes, heartbeats as soon as the subscription connects,
/// then keeps a poll loop and a heartbeat loop running until `shutdown`.
/// Decorative by design: zero or one active user is a normal state, not an
/// error, and a transport failure shows as a disconnected (empty) view.
pub struct PresenceStore {
    inner: Arc<StoreInner>,
    tasks: Vec<JoinHandle<()>>,
}

impl PresenceStore {
    /// Create a store for one channel; call [`start`](Self::start) to go live
    pub fn new(bus: EventBus, channel: String, local: PresenceRecord) -> Self {
        Self::with_config(bus, channel, local, RealtimeConfig::default())
    }

    /// Create with custom timing
    pub fn with_config(
        bus: EventBus,
        channel: String,
        local: PresenceRecord,
        config: RealtimeConfig,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                bus,
                channel,
                config,
                local: RwLock::new(local),
                snapshot: RwLock::new(HashMap::new()),
                connected: AtomicBool::new(false),
            }),
            tasks: Vec::new(),
        }
    }

    /// Subscribe and start the heartbeat and poll loops
    ///
    /// Calling `start` twice is a no-op.
    pub fn start(&mut self) {
        if !self.tasks.is_empty() {
            return;
        }

        // Driver: waits for Connected, heartbeats immediately, then treats
        // every presence-channel event as a hint to refresh early.
        let inner = self.inner.clone();
        self.tasks.push(tokio::spawn(async move {
            let mut sub = match inner.bus.subscribe(&inner.channel) {
                Ok(sub) => sub,
                Err(err) => {
                    tracing::warn!(channel = %inner.channel, error = %err, "presence subscribe rejected");
                    return;
                }
            };

            while let Some(update) = sub.recv().await {
                match update {
                    SubscriptionUpdate::Connected => {
                        inner.connected.store(true, Ordering::Relaxed);
                        inner.heartbeat().await;
                        inner.poll().await;
                    }
                    SubscriptionUpdate::Event(_) => {
                        // Events are a low-latency hint; the snapshot stays
                        // the source of truth.
                        inner.poll().await;
                    }
                    SubscriptionUpdate::Error(err) => {
                        tracing::warn!(channel = %inner.channel, error = %err, "presence transport error");
                        inner.connected.store(false, Ordering::Relaxed);
                    }
                }
            }
        }));

        let inner = self.inner.clone();
        let period = self.inner.config.heartbeat_period();
        self.tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await; // immediate first tick, heartbeat already sent
            loop {
                ticker.tick().await;
                inner.heartbeat().await;
            }
        }));

        let inner = self.inner.clone();
        let period = self.inner.config.poll_period();
        self.tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                inner.poll().await;
            }
        }));
    }

    /// Immediate heartbeat + poll; the host calls this when the tab regains
    /// visibility
    pub async fn refresh(&self) {
        self.inner.heartbeat().await;
        self.inner.poll().await;
    }

    /// Update the page the local user is viewing and republish right away
    pub async fn set_current_page(&self, page: Option<String>) {
        if let Ok(mut local) = self.inner.local.write() {
            local.current_page = page;
        }
        self.inner.heartbeat().await;
    }

    /// Whether the last transport interaction succeeded
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Relaxed)
    }

    /// Active participants as of now
    pub fn active(&self) -> Vec<PresenceRecord> {
        self.active_at(Utc::now())
    }

    /// Active participants as of an explicit instant
    ///
    /// Empty while disconnected: the widget is decorative, so it fails
    /// closed rather than showing a stale count.
    pub fn active_at(&self, now: DateTime<Utc>) -> Vec<PresenceRecord> {
        if !self.is_connected() {
            return Vec::new();
        }
        let window = self.inner.config.liveness_window;
        self.inner
            .snapshot
            .read()
            .map(|snapshot| {
                snapshot
                    .values()
                    .filter(|r| r.is_active_at(now, window))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of active participants
    pub fn online_count(&self) -> usize {
        self.active().len()
    }

    /// Stop both loops and release the subscription; idempotent
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.inner.connected.store(false, Ordering::Relaxed);
    }
}

impl Drop for PresenceStore {
    fn drop(&mut self) {
        // Mount/unmount symmetry on every exit path.
        self.shutdown();
    }
}

impl std::fmt::Debug for PresenceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceStore")
            .field("channel", &self.inner.channel)
            .field("connected", &self.is_connected())
            .finish()
    }
}
