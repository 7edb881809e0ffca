//! Realtime subscription states and the fixed retry policy between them.

use std::fmt;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionState {
    Disconnected,
    Subscribing,
    Active,
    Error,
    Closed,
}

impl SubscriptionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Subscribing => "subscribing",
            Self::Active => "active",
            Self::Error => "error",
            Self::Closed => "closed",
        }
    }

    /// Applies a status signal. Returns the state the manager should move to.
    pub fn on_status(self, status: &ChannelStatus) -> Self {
        match (self, status) {
            (Self::Disconnected, ChannelStatus::Subscribing) => Self::Subscribing,
            (Self::Subscribing | Self::Active, ChannelStatus::Subscribed) => Self::Active,
            (Self::Subscribing | Self::Active, ChannelStatus::ChannelError(_))
            | (Self::Subscribing | Self::Active, ChannelStatus::TimedOut) => Self::Error,
            (Self::Subscribing | Self::Active, ChannelStatus::Closed) => Self::Closed,
            (state, _) => state,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Error | Self::Closed)
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status signals reported by the change feed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelStatus {
    Subscribing,
    Subscribed,
    ChannelError(String),
    TimedOut,
    Closed,
}

impl ChannelStatus {
    pub fn disconnect_cause(&self) -> Option<DisconnectCause> {
        match self {
            Self::ChannelError(_) => Some(DisconnectCause::ChannelError),
            Self::TimedOut => Some(DisconnectCause::TimedOut),
            Self::Closed => Some(DisconnectCause::Closed),
            Self::Subscribing | Self::Subscribed => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectCause {
    ChannelError,
    TimedOut,
    Closed,
    Fault,
}

impl DisconnectCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChannelError => "channel_error",
            Self::TimedOut => "timed_out",
            Self::Closed => "closed",
            Self::Fault => "fault",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub channel_error_backoff: Duration,
    pub fault_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            channel_error_backoff: Duration::from_secs(1),
            fault_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Fixed delays. A status-level failure uses the short backoff and a
    /// fault in the loop body the long one.
    pub fn delay_for(&self, cause: DisconnectCause) -> Duration {
        match cause {
            DisconnectCause::ChannelError | DisconnectCause::TimedOut | DisconnectCause::Closed => {
                self.channel_error_backoff
            }
            DisconnectCause::Fault => self.fault_backoff,
        }
    }
}
