//! # Typing Indicators
//!
//! Ephemeral "user X is typing" broadcast scoped to one piece of content.
//! Publishes are debounced by timestamp comparison (no timer cancellation),
//! received entries expire after a short window, and a client never shows
//! its own typing state. Nothing here is ever persisted.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::bus::EventBus;
use crate::config::RealtimeConfig;
use crate::event::{channels, EventType, RealtimeEvent};

/// Transient typing entry for one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingState {
    /// User ID
    pub user_id: Uuid,
    /// Display name
    pub username: String,
    /// When the typing signal arrived
    pub timestamp: DateTime<Utc>,
}

/// Typing signal publisher + receiver for one content id
pub struct TypingIndicatorTracker {
    bus: EventBus,
    channel: String,
    local_user: Uuid,
    local_username: String,
    config: RealtimeConfig,
    last_publish: RwLock<Option<DateTime<Utc>>>,
    typers: RwLock<HashMap<Uuid, TypingState>>,
}

impl TypingIndicatorTracker {
    /// Create a tracker on the content's comment channel
    pub fn new(bus: EventBus, content_id: &str, local_user: Uuid, local_username: String) -> Self {
        Self::with_config(
            bus,
            content_id,
            local_user,
            local_username,
            RealtimeConfig::default(),
        )
    }

    /// Create with custom timing
    pub fn with_config(
        bus: EventBus,
        content_id: &str,
        local_user: Uuid,
        local_username: String,
        config: RealtimeConfig,
    ) -> Self {
        Self {
            bus,
            channel: channels::comments(content_id),
            local_user,
            local_username,
            config,
            last_publish: RwLock::new(None),
            typers: RwLock::new(HashMap::new()),
        }
    }

    /// Record a keystroke and publish at most once per rate-limit window
    ///
    /// Publish failure is swallowed with a debug log: a missed typing hint
    /// is invisible by design.
    pub async fn keystroke(&self) {
        if !self.note_keystroke_at(Utc::now()) {
            return;
        }

        let payload = json!({
            "user_id": self.local_user,
            "username": self.local_username,
        });
        if let Err(err) = self
            .bus
            .publish(&self.channel, EventType::UserTyping, payload)
            .await
        {
            tracing::debug!(channel = %self.channel, error = %err, "typing publish failed");
        }
    }

    /// Debounce decision: true iff a publish is due at `now`
    ///
    /// Compares timestamps against the last publish rather than scheduling
    /// or cancelling timers, so keystroke frequency never matters.
    pub fn note_keystroke_at(&self, now: DateTime<Utc>) -> bool {
        let Ok(mut last) = self.last_publish.write() else {
            return false;
        };
        match *last {
            Some(at) if now - at < self.config.typing_rate_limit => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// Fold an incoming event into the typer map
    ///
    /// Ignores everything but `user.typing`, and suppresses the local
    /// session's own signal.
    pub fn observe(&self, event: &RealtimeEvent) {
        if event.event_type != EventType::UserTyping {
            return;
        }
        if event.is_from(self.bus.origin_id()) {
            return;
        }
        let Some(user_id) = event
            .payload
            .get("user_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
        else {
            return;
        };
        if user_id == self.local_user {
            return;
        }
        let username = event
            .payload
            .get("username")
            .and_then(|v| v.as_str())
            .unwrap_or("someone")
            .to_string();

        if let Ok(mut typers) = self.typers.write() {
            typers.insert(
                user_id,
                TypingState {
                    user_id,
                    username,
                    timestamp: event.timestamp,
                },
            );
        }
    }

    /// Drop a user's entry; called when their comment lands (the keystrokes
    /// became a submission)
    pub fn clear_user(&self, user_id: Uuid) {
        if let Ok(mut typers) = self.typers.write() {
            typers.remove(&user_id);
        }
    }

    /// Remove entries older than the expiry window as of `now`
    pub fn sweep_at(&self, now: DateTime<Utc>) {
        let expiry = self.config.typing_expiry;
        if let Ok(mut typers) = self.typers.write() {
            typers.retain(|_, state| now - state.timestamp < expiry);
        }
    }

    /// Remove entries older than the expiry window
    pub fn sweep(&self) {
        self.sweep_at(Utc::now());
    }

    /// Run the sweep once per sweep interval until the handle is aborted
    pub fn spawn_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        let tracker = self;
        let period = tracker.config.sweep_period();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                tracker.sweep();
            }
        })
    }

    /// Number of entries held, expired or not (diagnostic)
    pub fn tracked_count(&self) -> usize {
        self.typers.read().map(|t| t.len()).unwrap_or(0)
    }

    /// Unexpired typers as of `now`, oldest first for a stable label
    pub fn typers_at(&self, now: DateTime<Utc>) -> Vec<TypingState> {
        let expiry = self.config.typing_expiry;
        let mut typers: Vec<TypingState> = self
            .typers
            .read()
            .map(|map| {
                map.values()
                    .filter(|state| now - state.timestamp < expiry)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        typers.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.username.cmp(&b.username)));
        typers
    }

    /// Indicator text as of `now`; `None` when nobody is typing
    pub fn label_at(&self, now: DateTime<Utc>) -> Option<String> {
        let typers = self.typers_at(now);
        match typers.len() {
            0 => None,
            1 => Some(format!("{} is typing…", typers[0].username)),
            2 => Some(format!(
                "{} and {} are typing…",
                typers[0].username, typers[1].username
            )),
            n => Some(format!(
                "{} and {} others are typing…",
                typers[0].username,
                n - 1
            )),
        }
    }

    /// Indicator text as of now
    pub fn label(&self) -> Option<String> {
        self.label_at(Utc::now())
    }
}

impl std::fmt::Debug for TypingIndicatorTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypingIndicatorTracker")
            .field("channel", &self.channel)
            .finish()
    }
}
