//! # Subscription Handle
//!
//! Exclusively-owned handle for one (channel, subscriber) pair. Closing the
//! handle is the only way to stop delivery; dropping it closes it.

use std::collections::VecDeque;
use std::sync::Arc;

use uuid::Uuid;

use super::channel::EventReceiver;
use super::transport::Transport;
use crate::errors::RealtimeError;
use crate::event::RealtimeEvent;

/// Lifecycle and event updates delivered through a subscription
#[derive(Debug)]
pub enum SubscriptionUpdate {
    /// The subscription is live; yielded once, before any event
    Connected,
    /// An event published on the channel
    Event(RealtimeEvent),
    /// Transport failure; the stream ends after this
    Error(RealtimeError),
}

/// A live (or degraded) subscription to one channel
pub struct Subscription {
    channel: String,
    transport: Arc<dyn Transport>,
    subscriber_id: Option<Uuid>,
    receiver: Option<EventReceiver>,
    pending: VecDeque<SubscriptionUpdate>,
    closed: bool,
}

impl Subscription {
    /// A live subscription; yields `Connected` first
    pub(crate) fn live(
        channel: String,
        transport: Arc<dyn Transport>,
        subscriber_id: Uuid,
        receiver: EventReceiver,
    ) -> Self {
        let mut pending = VecDeque::new();
        pending.push_back(SubscriptionUpdate::Connected);
        Self {
            channel,
            transport,
            subscriber_id: Some(subscriber_id),
            receiver: Some(receiver),
            pending,
            closed: false,
        }
    }

    /// A degraded subscription: yields one `Error`, then ends
    ///
    /// Used when the transport refuses the subscribe; the consumer renders
    /// its disconnected state instead of failing.
    pub(crate) fn degraded(
        channel: String,
        transport: Arc<dyn Transport>,
        error: RealtimeError,
    ) -> Self {
        let mut pending = VecDeque::new();
        pending.push_back(SubscriptionUpdate::Error(error));
        Self {
            channel,
            transport,
            subscriber_id: None,
            receiver: None,
            pending,
            closed: false,
        }
    }

    /// The channel this subscription is bound to
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Whether delivery is still possible
    pub fn is_live(&self) -> bool {
        !self.closed && self.receiver.is_some()
    }

    /// Next update, or `None` once the subscription is closed or ended
    pub async fn recv(&mut self) -> Option<SubscriptionUpdate> {
        if let Some(update) = self.pending.pop_front() {
            return Some(update);
        }
        if self.closed {
            return None;
        }
        match self.receiver.as_mut() {
            Some(rx) => rx.recv().await.map(SubscriptionUpdate::Event),
            None => None,
        }
    }

    /// Next update without waiting; `None` when nothing is queued
    pub fn try_recv(&mut self) -> Option<SubscriptionUpdate> {
        if let Some(update) = self.pending.pop_front() {
            return Some(update);
        }
        if self.closed {
            return None;
        }
        self.receiver
            .as_mut()
            .and_then(|rx| rx.try_recv().ok())
            .map(SubscriptionUpdate::Event)
    }

    /// Stop delivery and release the transport resource; idempotent
    ///
    /// Cancellation is client-side immediate: after `close` no further
    /// update is yielded, even if the transport still has publishes in
    /// flight.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.receiver = None;
        self.pending.clear();
        if let Some(id) = self.subscriber_id.take() {
            self.transport.unsubscribe(&self.channel, id);
        }
        tracing::trace!(channel = %self.channel, "subscription closed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("closed", &self.closed)
            .field("live", &self.is_live())
            .finish()
    }
}
