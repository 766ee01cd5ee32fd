//! # Transport Seam
//!
//! The pub/sub transport behind the event bus. Real deployments plug in a
//! managed channel service; the in-memory implementation backs tests and
//! single-process hosts.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use super::channel::{ChannelRegistry, EventReceiver};
use crate::errors::RealtimeResult;
use crate::event::RealtimeEvent;
use crate::presence::PresenceRecord;

/// Raw subscription handed back by a transport
#[derive(Debug)]
pub struct TransportHandle {
    /// Subscriber id within the transport
    pub subscriber_id: Uuid,
    /// Ordered event stream for this subscriber
    pub receiver: EventReceiver,
}

/// Underlying publish/subscribe transport
///
/// Presence (`track`/`presence_snapshot`) is a transport facility separate
/// from the event stream: snapshots are the source of truth across
/// reconnects, events are only a low-latency hint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Subscribe to a channel
    fn subscribe(&self, channel: &str) -> RealtimeResult<TransportHandle>;

    /// Release a subscription; idempotent
    fn unsubscribe(&self, channel: &str, subscriber_id: Uuid);

    /// Hand an event to the transport
    ///
    /// Resolves once accepted, not once subscribers have received it.
    async fn publish(&self, event: RealtimeEvent) -> RealtimeResult<()>;

    /// Refresh the caller's presence record on a channel
    async fn track(&self, channel: &str, record: PresenceRecord) -> RealtimeResult<()>;

    /// Point-in-time presence snapshot for a channel
    async fn presence_snapshot(&self, channel: &str) -> RealtimeResult<Vec<PresenceRecord>>;
}

/// In-process transport over a [`ChannelRegistry`]
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    registry: ChannelRegistry,
}

impl InMemoryTransport {
    /// Create an empty transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle, ready for injection into an `EventBus`
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of live channels (test/diagnostic use)
    pub fn channel_count(&self) -> usize {
        self.registry.channel_count()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    fn subscribe(&self, channel: &str) -> RealtimeResult<TransportHandle> {
        let (subscriber_id, receiver) = self.registry.subscribe(channel)?;
        Ok(TransportHandle {
            subscriber_id,
            receiver,
        })
    }

    fn unsubscribe(&self, channel: &str, subscriber_id: Uuid) {
        self.registry.unsubscribe(channel, subscriber_id);
    }

    async fn publish(&self, event: RealtimeEvent) -> RealtimeResult<()> {
        // Per-subscriber failures are the transport's concern, not the
        // publisher's; the publish itself succeeded once accepted.
        let stats = self.registry.publish(&event)?;
        if stats.failed > 0 {
            tracing::debug!(
                channel = %event.channel,
                failed = stats.failed,
                "dropped delivery to closed subscribers"
            );
        }
        Ok(())
    }

    async fn track(&self, channel: &str, record: PresenceRecord) -> RealtimeResult<()> {
        self.registry.track(channel, record)
    }

    async fn presence_snapshot(&self, channel: &str) -> RealtimeResult<Vec<PresenceRecord>> {
        self.registry.presence_snapshot(channel)
    }
}
