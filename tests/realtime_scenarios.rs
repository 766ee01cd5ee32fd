//! Realtime Coordination Scenarios
//!
//! End-to-end properties over the in-memory transport:
//! - Echoed comment.created events merge to one entry
//! - Liveness window excludes a client that stopped heartbeating
//! - Read-state convergence across two sessions of one user
//! - Typing indicators travel between clients and clear on submission

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use ripple::{
    channels, Comment, CommentApi, CommentLiveSync, EventBus, HostNotifier, InMemoryTransport,
    NewComment, Notification, NotificationApi, NotificationCenter, NotificationKind, Permission,
    PresenceRecord, RealtimeError, RealtimeResult, Subscription, SubscriptionUpdate, Transport,
    TOMBSTONE,
};

// =============================================================================
// Test Fixtures
// =============================================================================

#[derive(Default)]
struct FakeCommentApi {
    store: RwLock<HashMap<Uuid, Comment>>,
}

#[async_trait]
impl CommentApi for FakeCommentApi {
    async fn list(
        &self,
        content_id: &str,
        _page: u32,
        _per_page: u32,
    ) -> RealtimeResult<Vec<Comment>> {
        let mut comments: Vec<Comment> = self
            .store
            .read()
            .unwrap()
            .values()
            .filter(|c| c.content_id == content_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(comments)
    }

    async fn create(&self, draft: NewComment) -> RealtimeResult<Comment> {
        let now = Utc::now();
        let comment = Comment {
            id: Uuid::new_v4(),
            content_id: draft.content_id,
            parent_id: draft.parent_id,
            author_id: draft.author_id,
            author_name: draft.author_name,
            body: draft.body,
            deleted: false,
            created_at: now,
            updated_at: now,
        };
        self.store
            .write()
            .unwrap()
            .insert(comment.id, comment.clone());
        Ok(comment)
    }

    async fn update(&self, id: Uuid, body: &str) -> RealtimeResult<Comment> {
        let mut store = self.store.write().unwrap();
        let comment = store
            .get_mut(&id)
            .ok_or_else(|| RealtimeError::Backend("not found".into()))?;
        comment.body = body.to_string();
        comment.updated_at = Utc::now();
        Ok(comment.clone())
    }

    async fn delete(&self, id: Uuid) -> RealtimeResult<Comment> {
        let mut store = self.store.write().unwrap();
        let comment = store
            .get_mut(&id)
            .ok_or_else(|| RealtimeError::Backend("not found".into()))?;
        comment.tombstone();
        Ok(comment.clone())
    }
}

#[derive(Default)]
struct FakeNotificationApi {
    store: RwLock<HashMap<Uuid, Notification>>,
}

#[async_trait]
impl NotificationApi for FakeNotificationApi {
    async fn fetch(&self, user_id: Uuid) -> RealtimeResult<Vec<Notification>> {
        Ok(self
            .store
            .read()
            .unwrap()
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn mark_read(&self, id: Uuid) -> RealtimeResult<Notification> {
        let mut store = self.store.write().unwrap();
        let notification = store
            .get_mut(&id)
            .ok_or_else(|| RealtimeError::Backend("not found".into()))?;
        notification.read = true;
        Ok(notification.clone())
    }

    async fn mark_all_read(&self, user_id: Uuid) -> RealtimeResult<()> {
        for notification in self.store.write().unwrap().values_mut() {
            if notification.user_id == user_id {
                notification.read = true;
            }
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> RealtimeResult<()> {
        self.store.write().unwrap().remove(&id);
        Ok(())
    }
}

struct SilentNotifier;

impl HostNotifier for SilentNotifier {
    fn request_permission(&self) -> Permission {
        Permission::Denied
    }
    fn notify(&self, _title: &str, _body: &str, _icon: Option<&str>) {}
    fn play_chime(&self) {}
}

/// Drain everything currently queued on a subscription into a consumer
fn drain(sub: &mut Subscription, mut consume: impl FnMut(ripple::RealtimeEvent)) {
    while let Some(update) = sub.try_recv() {
        if let SubscriptionUpdate::Event(event) = update {
            consume(event);
        }
    }
}

fn client(
    transport: &Arc<InMemoryTransport>,
    api: &Arc<FakeCommentApi>,
    username: &str,
) -> (CommentLiveSync, Subscription) {
    let bus = EventBus::new(transport.clone() as Arc<dyn Transport>);
    let sub = bus.subscribe(&channels::comments("post-1")).unwrap();
    let sync = CommentLiveSync::new(
        bus,
        api.clone() as Arc<dyn CommentApi>,
        "post-1",
        Uuid::new_v4(),
        username.to_string(),
    );
    (sync, sub)
}

// =============================================================================
// Idempotent Merge
// =============================================================================

/// An echoed comment.created grows the subscriber's list by exactly one.
#[tokio::test]
async fn test_echoed_comment_created_is_deduplicated() {
    let transport = InMemoryTransport::shared();
    let api = Arc::new(FakeCommentApi::default());

    let (alice, _alice_sub) = client(&transport, &api, "alice");
    let (bob, mut bob_sub) = client(&transport, &api, "bob");

    let comment = alice
        .submit(NewComment {
            content_id: "post-1".to_string(),
            parent_id: None,
            author_id: Uuid::new_v4(),
            author_name: "alice".to_string(),
            body: "hello".to_string(),
        })
        .await
        .unwrap();

    // Simulate the transport echoing the publish a second time.
    transport
        .publish(ripple::RealtimeEvent::new(
            channels::comments("post-1"),
            ripple::EventType::CommentCreated,
            serde_json::to_value(&comment).unwrap(),
            Uuid::new_v4(),
        ))
        .await
        .unwrap();

    let before = bob.comments().len();
    drain(&mut bob_sub, |event| bob.apply_event(&event));
    let after = bob.comments().len();

    assert_eq!(after - before, 1, "duplicate delivery merged to one entry");
    assert_eq!(bob.comments()[0].id, comment.id);
}

/// Deleting a comment with replies tombstones it without breaking the thread.
#[tokio::test]
async fn test_delete_propagates_as_tombstone() {
    let transport = InMemoryTransport::shared();
    let api = Arc::new(FakeCommentApi::default());

    let (alice, _alice_sub) = client(&transport, &api, "alice");
    let (bob, mut bob_sub) = client(&transport, &api, "bob");

    let parent = alice
        .submit(NewComment {
            content_id: "post-1".to_string(),
            parent_id: None,
            author_id: Uuid::new_v4(),
            author_name: "alice".to_string(),
            body: "parent".to_string(),
        })
        .await
        .unwrap();
    let reply = alice
        .submit(NewComment {
            content_id: "post-1".to_string(),
            parent_id: Some(parent.id),
            author_id: Uuid::new_v4(),
            author_name: "alice".to_string(),
            body: "reply".to_string(),
        })
        .await
        .unwrap();
    alice.remove(parent.id).await.unwrap();

    drain(&mut bob_sub, |event| bob.apply_event(&event));

    let comments = bob.comments();
    assert_eq!(comments.len(), 2);
    let dead = comments.iter().find(|c| c.id == parent.id).unwrap();
    assert!(dead.deleted);
    assert_eq!(dead.body, TOMBSTONE);
    let kept = comments.iter().find(|c| c.id == reply.id).unwrap();
    assert_eq!(kept.parent_id, Some(parent.id));
}

// =============================================================================
// Liveness Window
// =============================================================================

/// Heartbeats at t=0 and t=45s, polled at t=65s: only the second is active.
#[tokio::test]
async fn test_liveness_window_excludes_silent_client() {
    let transport = InMemoryTransport::shared();
    let t0 = Utc::now() - Duration::seconds(65);

    let early = Uuid::new_v4();
    let mut record = PresenceRecord::new(early, "early".to_string());
    record.last_seen = t0;
    transport.track(channels::PRESENCE, record).await.unwrap();

    let late = Uuid::new_v4();
    let mut record = PresenceRecord::new(late, "late".to_string());
    record.last_seen = t0 + Duration::seconds(45);
    transport.track(channels::PRESENCE, record).await.unwrap();

    // Third client polls at t=65s.
    let snapshot = transport
        .presence_snapshot(channels::PRESENCE)
        .await
        .unwrap();
    let now = t0 + Duration::seconds(65);
    let window = Duration::seconds(60);

    let active: Vec<Uuid> = snapshot
        .iter()
        .filter(|r| r.is_active_at(now, window))
        .map(|r| r.user_id)
        .collect();

    assert_eq!(active, vec![late]);
}

// =============================================================================
// Cross-Session Convergence
// =============================================================================

/// mark-all-read in one session zeroes the unread count in a sibling session.
#[tokio::test]
async fn test_read_state_converges_across_sessions() {
    let transport = InMemoryTransport::shared();
    let api = Arc::new(FakeNotificationApi::default());
    let user_id = Uuid::new_v4();

    let session = |transport: &Arc<InMemoryTransport>| {
        let bus = EventBus::new(transport.clone() as Arc<dyn Transport>);
        let sub = bus.subscribe(&channels::notifications(user_id)).unwrap();
        let center = NotificationCenter::new(
            bus,
            api.clone() as Arc<dyn NotificationApi>,
            Arc::new(SilentNotifier),
            user_id,
        );
        (center, sub)
    };
    let (phone, mut phone_sub) = session(&transport);
    let (laptop, _laptop_sub) = session(&transport);

    // Both sessions receive the same notifications.
    for title in ["a", "b"] {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id,
            kind: NotificationKind::Comment,
            title: title.to_string(),
            message: "m".to_string(),
            link: None,
            read: false,
            created_at: Utc::now(),
        };
        let event = ripple::RealtimeEvent::new(
            channels::notifications(user_id),
            ripple::EventType::NotificationNew,
            serde_json::to_value(&notification).unwrap(),
            Uuid::new_v4(),
        );
        phone.apply_event(&event);
        laptop.apply_event(&event);
    }
    assert_eq!(phone.unread_count(), 2);
    assert_eq!(laptop.unread_count(), 2);

    laptop.mark_all_read().await.unwrap();

    drain(&mut phone_sub, |event| phone.apply_event(&event));
    assert_eq!(phone.unread_count(), 0);
    assert!(phone.notifications().iter().all(|n| n.read));
}

// =============================================================================
// Typing Integration
// =============================================================================

/// A typing signal reaches the peer and clears when the comment lands.
#[tokio::test]
async fn test_typing_travels_and_clears_on_submission() {
    let transport = InMemoryTransport::shared();
    let api = Arc::new(FakeCommentApi::default());

    let alice_author = Uuid::new_v4();
    let bus = EventBus::new(transport.clone() as Arc<dyn Transport>);
    let alice = CommentLiveSync::new(
        bus,
        api.clone() as Arc<dyn CommentApi>,
        "post-1",
        alice_author,
        "alice".to_string(),
    );

    let (bob, mut bob_sub) = client(&transport, &api, "bob");

    alice.typing().keystroke().await;
    drain(&mut bob_sub, |event| bob.apply_event(&event));
    assert_eq!(bob.typing_label().unwrap(), "alice is typing…");

    alice
        .submit(NewComment {
            content_id: "post-1".to_string(),
            parent_id: None,
            author_id: alice_author,
            author_name: "alice".to_string(),
            body: "sent".to_string(),
        })
        .await
        .unwrap();

    drain(&mut bob_sub, |event| bob.apply_event(&event));
    assert!(bob.typing_label().is_none(), "keystrokes became a submission");
    assert_eq!(bob.comments().len(), 1);
}

// =============================================================================
// Background Consumers
// =============================================================================

/// Spawned consumers stay in sync without manual draining.
#[tokio::test]
async fn test_spawned_consumer_receives_broadcasts() {
    let transport = InMemoryTransport::shared();
    let api = Arc::new(FakeCommentApi::default());

    let bus = EventBus::new(transport.clone() as Arc<dyn Transport>);
    let bob = Arc::new(CommentLiveSync::new(
        bus,
        api.clone() as Arc<dyn CommentApi>,
        "post-1",
        Uuid::new_v4(),
        "bob".to_string(),
    ));
    let consumer = bob.clone().spawn();
    // Let the consumer task subscribe before anyone publishes.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let (alice, _alice_sub) = client(&transport, &api, "alice");
    alice
        .submit(NewComment {
            content_id: "post-1".to_string(),
            parent_id: None,
            author_id: Uuid::new_v4(),
            author_name: "alice".to_string(),
            body: "hi bob".to_string(),
        })
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(bob.comments().len(), 1);
    assert_eq!(bob.comments()[0].body, "hi bob");

    consumer.abort();
}
