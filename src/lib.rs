//! ripple - channel-based realtime coordination
//!
//! A coordination layer for content-site social features, built on a
//! publish/subscribe transport:
//!
//! - **Event bus**: channel subscribe/unsubscribe/publish over an injected
//!   transport
//! - **Presence**: per-channel liveness with heartbeat + snapshot dual path
//! - **Typing indicators**: debounced, self-suppressed, swept per second
//! - **Comment live sync**: idempotent merge-by-id with tombstone deletes
//! - **Notification center**: bounded list, single toast, capability-gated
//!   native notifications
//!
//! Components never talk to each other directly; all coordination happens
//! through published events.

pub mod bus;
pub mod comments;
pub mod config;
pub mod errors;
pub mod event;
pub mod notify;
pub mod presence;
pub mod typing;

pub use bus::{EventBus, InMemoryTransport, Subscription, SubscriptionUpdate, Transport};
pub use comments::{Comment, CommentApi, CommentLiveSync, NewComment, TOMBSTONE};
pub use config::RealtimeConfig;
pub use errors::{RealtimeError, RealtimeResult};
pub use event::{channels, EventType, RealtimeEvent};
pub use notify::{
    HostNotifier, NoopNotifier, Notification, NotificationApi, NotificationCenter,
    NotificationKind, Permission, Toast,
};
pub use presence::{PresenceRecord, PresenceStatus, PresenceStore};
pub use typing::{TypingIndicatorTracker, TypingState};
