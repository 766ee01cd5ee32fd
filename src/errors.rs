//! # Realtime Errors
//!
//! Error types for the coordination layer.

use thiserror::Error;

/// Result type for realtime operations
pub type RealtimeResult<T> = Result<T, RealtimeError>;

/// Realtime errors
#[derive(Debug, Clone, Error)]
pub enum RealtimeError {
    // ==================
    // Channel Errors
    // ==================
    /// Invalid channel name
    ///
    /// The only error `subscribe`/`publish` return synchronously.
    #[error("Invalid channel name: {0}")]
    InvalidChannel(String),

    /// Channel not found
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    // ==================
    // Transport Errors
    // ==================
    /// Transport-level failure (connect, subscribe, publish hop)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Subscription already closed
    #[error("Subscription closed")]
    SubscriptionClosed,

    // ==================
    // Collaborator Errors
    // ==================
    /// Backend CRUD endpoint failure; local state is left unchanged
    #[error("Backend error: {0}")]
    Backend(String),

    // ==================
    // Internal Errors
    // ==================
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RealtimeError {
    /// Whether the error comes from the pub/sub transport rather than a
    /// collaborator endpoint. Transport errors degrade the feature
    /// (disconnected state); backend errors surface to the caller.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RealtimeError::Transport(_) | RealtimeError::SubscriptionClosed
        )
    }
}
