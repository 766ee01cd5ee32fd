//! # Live Comment Sync
//!
//! Keeps a per-content comment list consistent across the author's own
//! action and other participants' broadcasts. Two input streams (local
//! submits, remote events) feed one idempotent merge-by-id reducer, so an
//! echo of our own just-published event is harmless. Deleted comments are
//! tombstoned in place to preserve thread structure.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::bus::{EventBus, SubscriptionUpdate};
use crate::config::RealtimeConfig;
use crate::errors::RealtimeResult;
use crate::event::{channels, EventType, RealtimeEvent};
use crate::typing::TypingIndicatorTracker;

/// Body shown in place of a deleted comment
pub const TOMBSTONE: &str = "[deleted]";

/// A comment on one piece of content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    /// Comment ID
    pub id: Uuid,

    /// Content the comment belongs to
    pub content_id: String,

    /// Parent comment for replies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,

    /// Author
    pub author_id: Uuid,

    /// Author display name
    pub author_name: String,

    /// Body text; [`TOMBSTONE`] once deleted
    pub body: String,

    /// Soft-delete flag
    #[serde(default)]
    pub deleted: bool,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    /// Tombstone this comment in place, keeping id and parent links
    pub fn tombstone(&mut self) {
        self.body = TOMBSTONE.to_string();
        self.deleted = true;
        self.updated_at = Utc::now();
    }
}

/// Draft for a new comment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComment {
    pub content_id: String,
    pub parent_id: Option<Uuid>,
    pub author_id: Uuid,
    pub author_name: String,
    pub body: String,
}

/// Backend comment endpoints (external collaborator)
///
/// Mutations return the full updated entity so the realtime layer can
/// re-publish it verbatim.
#[async_trait]
pub trait CommentApi: Send + Sync {
    /// Fetch a page of comments for a content id, most recent first
    async fn list(&self, content_id: &str, page: u32, per_page: u32)
        -> RealtimeResult<Vec<Comment>>;

    /// Create a comment
    async fn create(&self, draft: NewComment) -> RealtimeResult<Comment>;

    /// Update a comment's body
    async fn update(&self, id: Uuid, body: &str) -> RealtimeResult<Comment>;

    /// Soft-delete a comment; returns the tombstoned entity
    async fn delete(&self, id: Uuid) -> RealtimeResult<Comment>;
}

/// Live-synced comment list for one piece of content
pub struct CommentLiveSync {
    bus: EventBus,
    api: Arc<dyn CommentApi>,
    content_id: String,
    channel: String,
    comments: RwLock<Vec<Comment>>,
    typing: Arc<TypingIndicatorTracker>,
}

impl CommentLiveSync {
    /// Create a sync for one content id
    pub fn new(
        bus: EventBus,
        api: Arc<dyn CommentApi>,
        content_id: &str,
        local_user: Uuid,
        local_username: String,
    ) -> Self {
        Self::with_config(
            bus,
            api,
            content_id,
            local_user,
            local_username,
            RealtimeConfig::default(),
        )
    }

    /// Create with custom timing for the embedded typing tracker
    pub fn with_config(
        bus: EventBus,
        api: Arc<dyn CommentApi>,
        content_id: &str,
        local_user: Uuid,
        local_username: String,
        config: RealtimeConfig,
    ) -> Self {
        let typing = Arc::new(TypingIndicatorTracker::with_config(
            bus.clone(),
            content_id,
            local_user,
            local_username,
            config,
        ));
        Self {
            bus,
            api,
            content_id: content_id.to_string(),
            channel: channels::comments(content_id),
            comments: RwLock::new(Vec::new()),
            typing,
        }
    }

    /// The embedded typing tracker (shared with the host UI)
    pub fn typing(&self) -> &Arc<TypingIndicatorTracker> {
        &self.typing
    }

    /// Current typing indicator text
    pub fn typing_label(&self) -> Option<String> {
        self.typing.label()
    }

    /// Snapshot of the list, most recent first
    pub fn comments(&self) -> Vec<Comment> {
        self.comments.read().map(|c| c.clone()).unwrap_or_default()
    }

    /// Replace the list from the backend
    pub async fn load(&self, page: u32, per_page: u32) -> RealtimeResult<()> {
        let fetched = self.api.list(&self.content_id, page, per_page).await?;
        if let Ok(mut comments) = self.comments.write() {
            *comments = fetched;
        }
        Ok(())
    }

    /// Create a comment: backend first, then local merge, then broadcast
    ///
    /// On backend failure the list is untouched and the error is returned;
    /// no rollback is needed because nothing was applied optimistically.
    pub async fn submit(&self, draft: NewComment) -> RealtimeResult<Comment> {
        let comment = self.api.create(draft).await?;
        self.merge_created(&comment);
        self.broadcast(EventType::CommentCreated, &comment).await;
        Ok(comment)
    }

    /// Edit a comment's body
    pub async fn edit(&self, id: Uuid, body: &str) -> RealtimeResult<Comment> {
        let comment = self.api.update(id, body).await?;
        self.merge_updated(&comment);
        self.broadcast(EventType::CommentUpdated, &comment).await;
        Ok(comment)
    }

    /// Delete a comment; it stays in the list as a tombstone
    pub async fn remove(&self, id: Uuid) -> RealtimeResult<Comment> {
        let comment = self.api.delete(id).await?;
        self.merge_deleted(comment.id);
        self.broadcast(EventType::CommentDeleted, &comment).await;
        Ok(comment)
    }

    /// Fold one incoming event into the list
    ///
    /// Idempotent: duplicate `comment.created` events (including echoes of
    /// our own publish) leave exactly one entry per id.
    pub fn apply_event(&self, event: &RealtimeEvent) {
        match event.event_type {
            EventType::CommentCreated => {
                let Ok(comment) = serde_json::from_value::<Comment>(event.payload.clone()) else {
                    tracing::debug!(channel = %self.channel, "malformed comment.created payload");
                    return;
                };
                // Their keystrokes became a submission.
                self.typing.clear_user(comment.author_id);
                self.merge_created(&comment);
            }
            EventType::CommentUpdated => {
                let Ok(comment) = serde_json::from_value::<Comment>(event.payload.clone()) else {
                    return;
                };
                self.merge_updated(&comment);
            }
            EventType::CommentDeleted => {
                let Some(id) = event
                    .payload
                    .get("id")
                    .and_then(|v| v.as_str())
                    .and_then(|s| Uuid::parse_str(s).ok())
                else {
                    return;
                };
                self.merge_deleted(id);
            }
            EventType::UserTyping => self.typing.observe(event),
            _ => {}
        }
    }

    /// Drive a channel subscription until it closes
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let sync = self;
        tokio::spawn(async move {
            let mut sub = match sync.bus.subscribe(&sync.channel) {
                Ok(sub) => sub,
                Err(err) => {
                    tracing::warn!(channel = %sync.channel, error = %err, "comment subscribe rejected");
                    return;
                }
            };
            while let Some(update) = sub.recv().await {
                match update {
                    SubscriptionUpdate::Event(event) => sync.apply_event(&event),
                    SubscriptionUpdate::Connected => {
                        tracing::trace!(channel = %sync.channel, "comment sync connected");
                    }
                    SubscriptionUpdate::Error(err) => {
                        tracing::warn!(channel = %sync.channel, error = %err, "comment sync transport error");
                    }
                }
            }
        })
    }

    /// Prepend iff the id is not already present
    fn merge_created(&self, comment: &Comment) {
        if let Ok(mut comments) = self.comments.write() {
            if comments.iter().any(|c| c.id == comment.id) {
                return;
            }
            comments.insert(0, comment.clone());
        }
    }

    /// Replace by id, keeping list position; unknown ids are ignored
    fn merge_updated(&self, comment: &Comment) {
        if let Ok(mut comments) = self.comments.write() {
            if let Some(existing) = comments.iter_mut().find(|c| c.id == comment.id) {
                *existing = comment.clone();
            }
        }
    }

    /// Tombstone in place; replies keep their parent link
    fn merge_deleted(&self, id: Uuid) {
        if let Ok(mut comments) = self.comments.write() {
            if let Some(existing) = comments.iter_mut().find(|c| c.id == id) {
                existing.tombstone();
            }
        }
    }

    /// Best-effort broadcast of a confirmed mutation
    async fn broadcast(&self, event_type: EventType, comment: &Comment) {
        let payload = match serde_json::to_value(comment) {
            Ok(payload) => payload,
            Err(_) => return,
        };
        if let Err(err) = self.bus.publish(&self.channel, event_type, payload).await {
            // Other clients fall back to their own fetches; the mutation
            // itself already succeeded.
            tracing::warn!(channel = %self.channel, error = %err, "comment broadcast failed");
        }
    }
}

impl std::fmt::Debug for CommentLiveSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommentLiveSync")
            .field("content_id", &self.content_id)
            .finish()
    }
}
