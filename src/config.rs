//! # Realtime Configuration
//!
//! Timing constants for presence, typing and notifications. All values are
//! independent knobs, not derived from transport RTT.

use chrono::Duration;

/// Configuration for the coordination layer
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Interval between presence heartbeats
    pub heartbeat_interval: Duration,

    /// Interval between presence snapshot polls
    pub poll_interval: Duration,

    /// Window after which an unrefreshed presence record is treated offline
    pub liveness_window: Duration,

    /// Age after which a typing entry is swept
    pub typing_expiry: Duration,

    /// Minimum spacing between typing publishes
    pub typing_rate_limit: Duration,

    /// Interval between typing sweeps
    pub typing_sweep_interval: Duration,

    /// How long a notification toast stays visible
    pub toast_duration: Duration,

    /// Maximum notifications kept in the in-memory list
    pub max_notifications: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        // poll < heartbeat < liveness window: at least 6 polls per heartbeat
        // period and 2 heartbeats per window, so one missed tick does not
        // drop a user from the active view.
        Self {
            heartbeat_interval: Duration::seconds(30),
            poll_interval: Duration::seconds(5),
            liveness_window: Duration::seconds(60),
            typing_expiry: Duration::seconds(3),
            typing_rate_limit: Duration::seconds(1),
            typing_sweep_interval: Duration::seconds(1),
            toast_duration: Duration::seconds(5),
            max_notifications: 50,
        }
    }
}

impl RealtimeConfig {
    /// Poll interval as a std duration for tokio timers
    pub fn poll_period(&self) -> std::time::Duration {
        self.poll_interval.to_std().unwrap_or_default()
    }

    /// Heartbeat interval as a std duration for tokio timers
    pub fn heartbeat_period(&self) -> std::time::Duration {
        self.heartbeat_interval.to_std().unwrap_or_default()
    }

    /// Typing sweep interval as a std duration for tokio timers
    pub fn sweep_period(&self) -> std::time::Duration {
        self.typing_sweep_interval.to_std().unwrap_or_default()
    }
}
