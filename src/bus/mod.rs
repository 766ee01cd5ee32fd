//! # Event Bus
//!
//! Thin abstraction over channel subscribe/unsubscribe/publish. Every other
//! component is an independent consumer of this bus; coordination happens
//! only through published events.

pub mod channel;
pub mod subscription;
pub mod transport;

pub use channel::ChannelRegistry;
pub use subscription::{Subscription, SubscriptionUpdate};
pub use transport::{InMemoryTransport, Transport, TransportHandle};

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::errors::RealtimeResult;
use crate::event::{channels, EventType, RealtimeEvent};
use crate::presence::PresenceRecord;

/// Dependency-injected facade over a [`Transport`]
///
/// One instance per client session; its `origin_id` stamps every publish so
/// consumers can suppress their own echoes. Construct it explicitly and pass
/// it to each component — there is no ambient global instance.
#[derive(Clone)]
pub struct EventBus {
    transport: Arc<dyn Transport>,
    origin_id: Uuid,
}

impl EventBus {
    /// Create a bus with a fresh session id
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            origin_id: Uuid::new_v4(),
        }
    }

    /// Create a bus with an explicit session id (tests, session resume)
    pub fn with_origin(transport: Arc<dyn Transport>, origin_id: Uuid) -> Self {
        Self {
            transport,
            origin_id,
        }
    }

    /// Session id stamped on every publish
    pub fn origin_id(&self) -> Uuid {
        self.origin_id
    }

    /// Subscribe to a channel
    ///
    /// Fails synchronously only on an invalid channel name. A transport
    /// refusal is folded into the returned subscription as one
    /// [`SubscriptionUpdate::Error`] so the consumer degrades instead of
    /// propagating the failure.
    pub fn subscribe(&self, channel: &str) -> RealtimeResult<Subscription> {
        channels::validate(channel)?;

        match self.transport.subscribe(channel) {
            Ok(handle) => Ok(Subscription::live(
                channel.to_string(),
                self.transport.clone(),
                handle.subscriber_id,
                handle.receiver,
            )),
            Err(err) => {
                tracing::warn!(channel, error = %err, "subscribe failed, degrading");
                Ok(Subscription::degraded(
                    channel.to_string(),
                    self.transport.clone(),
                    err,
                ))
            }
        }
    }

    /// Publish an event; resolves once handed to the transport
    ///
    /// Fire-and-forget beyond that: no retry, failure is visible only to
    /// this caller.
    pub async fn publish(
        &self,
        channel: &str,
        event_type: EventType,
        payload: Value,
    ) -> RealtimeResult<()> {
        channels::validate(channel)?;

        let event = RealtimeEvent::new(
            channel.to_string(),
            event_type,
            payload,
            self.origin_id,
        );
        self.transport.publish(event).await
    }

    /// Refresh the local user's presence record on a channel
    pub async fn track(&self, channel: &str, record: PresenceRecord) -> RealtimeResult<()> {
        channels::validate(channel)?;
        self.transport.track(channel, record).await
    }

    /// Point-in-time presence snapshot, independent of the event stream
    pub async fn presence_snapshot(&self, channel: &str) -> RealtimeResult<Vec<PresenceRecord>> {
        channels::validate(channel)?;
        self.transport.presence_snapshot(channel).await
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("origin_id", &self.origin_id)
            .finish()
    }
}
