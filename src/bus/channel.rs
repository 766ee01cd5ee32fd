//! # Channel Registry
//!
//! Per-channel subscriber bookkeeping and presence state for the in-memory
//! transport. Channels are created implicitly on first subscribe and removed
//! when the last subscriber leaves.

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::errors::{RealtimeError, RealtimeResult};
use crate::event::RealtimeEvent;
use crate::presence::PresenceRecord;

/// Event sender for one subscriber
pub type EventSender = mpsc::UnboundedSender<RealtimeEvent>;

/// Event receiver for one subscriber
pub type EventReceiver = mpsc::UnboundedReceiver<RealtimeEvent>;

/// State held for one channel
#[derive(Debug, Default)]
struct ChannelState {
    /// Subscriber senders by subscriber id
    subscribers: HashMap<Uuid, EventSender>,

    /// Presence records by user id, refreshed by `track`
    presence: HashMap<Uuid, PresenceRecord>,
}

/// Registry of live channels
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: RwLock<HashMap<String, ChannelState>>,
}

impl ChannelRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a channel, creating it on first use
    ///
    /// Returns the subscriber id and the receiving end of an unbounded FIFO,
    /// which preserves publish order for this subscriber.
    pub fn subscribe(&self, channel: &str) -> RealtimeResult<(Uuid, EventReceiver)> {
        let mut channels = self
            .channels
            .write()
            .map_err(|_| RealtimeError::Internal("Lock poisoned".into()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let subscriber_id = Uuid::new_v4();

        channels
            .entry(channel.to_string())
            .or_default()
            .subscribers
            .insert(subscriber_id, tx);

        Ok((subscriber_id, rx))
    }

    /// Remove a subscriber; tears down the channel when it was the last one
    ///
    /// Idempotent: unknown channels and unknown subscriber ids are no-ops.
    pub fn unsubscribe(&self, channel: &str, subscriber_id: Uuid) {
        if let Ok(mut channels) = self.channels.write() {
            let empty = if let Some(state) = channels.get_mut(channel) {
                state.subscribers.remove(&subscriber_id);
                state.subscribers.is_empty()
            } else {
                false
            };

            if empty {
                channels.remove(channel);
            }
        }
    }

    /// Fan an event out to every subscriber of its channel
    ///
    /// Delivery is non-blocking; a subscriber whose receiver is gone is
    /// counted as failed, not an error. Publishing to a channel nobody
    /// subscribes to succeeds and delivers to zero subscribers.
    pub fn publish(&self, event: &RealtimeEvent) -> RealtimeResult<DeliveryStats> {
        let channels = self
            .channels
            .read()
            .map_err(|_| RealtimeError::Internal("Lock poisoned".into()))?;

        let mut stats = DeliveryStats::default();

        if let Some(state) = channels.get(&event.channel) {
            for sender in state.subscribers.values() {
                match sender.send(event.clone()) {
                    Ok(_) => stats.delivered += 1,
                    Err(_) => stats.failed += 1,
                }
            }
        }

        Ok(stats)
    }

    /// Upsert a presence record for its owning user
    pub fn track(&self, channel: &str, record: PresenceRecord) -> RealtimeResult<()> {
        let mut channels = self
            .channels
            .write()
            .map_err(|_| RealtimeError::Internal("Lock poisoned".into()))?;

        channels
            .entry(channel.to_string())
            .or_default()
            .presence
            .insert(record.user_id, record);

        Ok(())
    }

    /// Point-in-time presence snapshot for a channel
    ///
    /// Returns records verbatim; staleness filtering is the reader's
    /// concern, records are never purged here.
    pub fn presence_snapshot(&self, channel: &str) -> RealtimeResult<Vec<PresenceRecord>> {
        let channels = self
            .channels
            .read()
            .map_err(|_| RealtimeError::Internal("Lock poisoned".into()))?;

        Ok(channels
            .get(channel)
            .map(|state| state.presence.values().cloned().collect())
            .unwrap_or_default())
    }

    /// Number of subscribers on a channel
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .read()
            .ok()
            .and_then(|c| c.get(channel).map(|s| s.subscribers.len()))
            .unwrap_or(0)
    }

    /// Number of live channels
    pub fn channel_count(&self) -> usize {
        self.channels.read().map(|c| c.len()).unwrap_or(0)
    }
}

/// Result of one fan-out
#[derive(Debug, Default)]
pub struct DeliveryStats {
    /// Subscribers the event was handed to
    pub delivered: usize,
    /// Subscribers whose receiver was already gone
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;
    use serde_json::json;

    fn event_on(channel: &str) -> RealtimeEvent {
        RealtimeEvent::new(
            channel.to_string(),
            EventType::CommentCreated,
            json!({"id": "c1"}),
            Uuid::new_v4(),
        )
    }

    #[test]
    fn test_implicit_create_and_gc() {
        let registry = ChannelRegistry::new();
        assert_eq!(registry.channel_count(), 0);

        let (id1, _rx1) = registry.subscribe("comments:post-1").unwrap();
        let (id2, _rx2) = registry.subscribe("comments:post-1").unwrap();
        assert_eq!(registry.channel_count(), 1);
        assert_eq!(registry.subscriber_count("comments:post-1"), 2);

        registry.unsubscribe("comments:post-1", id1);
        assert_eq!(registry.channel_count(), 1);

        registry.unsubscribe("comments:post-1", id2);
        assert_eq!(registry.channel_count(), 0);
    }

    #[test]
    fn test_unsubscribe_idempotent() {
        let registry = ChannelRegistry::new();
        let (id, _rx) = registry.subscribe("presence").unwrap();

        registry.unsubscribe("presence", id);
        registry.unsubscribe("presence", id);
        registry.unsubscribe("never-existed", id);

        assert_eq!(registry.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_fan_out() {
        let registry = ChannelRegistry::new();
        let (_id1, mut rx1) = registry.subscribe("comments:post-1").unwrap();
        let (_id2, mut rx2) = registry.subscribe("comments:post-1").unwrap();

        let stats = registry.publish(&event_on("comments:post-1")).unwrap();
        assert_eq!(stats.delivered, 2);
        assert_eq!(stats.failed, 0);

        assert!(rx1.recv().await.is_some());
        assert!(rx2.recv().await.is_some());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let registry = ChannelRegistry::new();
        let stats = registry.publish(&event_on("comments:ghost")).unwrap();
        assert_eq!(stats.delivered, 0);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn test_publish_order_preserved() {
        let registry = ChannelRegistry::new();
        let (_id, mut rx) = registry.subscribe("comments:post-1").unwrap();

        for i in 0..5 {
            let mut event = event_on("comments:post-1");
            event.payload = json!({"seq": i});
            registry.publish(&event).unwrap();
        }

        for i in 0..5 {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.payload["seq"], i);
        }
    }

    #[test]
    fn test_track_upserts_by_user() {
        let registry = ChannelRegistry::new();
        let user = Uuid::new_v4();

        registry
            .track("presence", PresenceRecord::new(user, "ana".to_string()))
            .unwrap();
        registry
            .track("presence", PresenceRecord::new(user, "ana".to_string()))
            .unwrap();

        let snapshot = registry.presence_snapshot("presence").unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].user_id, user);
    }

    #[test]
    fn test_snapshot_of_unknown_channel_is_empty() {
        let registry = ChannelRegistry::new();
        assert!(registry.presence_snapshot("presence").unwrap().is_empty());
    }
}
