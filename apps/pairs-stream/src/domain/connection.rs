//! Connection State Machine
//!
//! States and retry bookkeeping for one symbol's feed connection:
//!
//! ```text
//! Idle → Connecting → Streaming → Backoff → Connecting ...
//!            │            │          │
//!            └────────────┴──────────┴──► Stopped | Failed
//! ```
//!
//! `RetryTracker` holds the pure backoff logic so it can be exercised
//! without any network I/O.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle state of one stream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Created, not yet started.
    #[default]
    Idle,
    /// Opening the feed connection.
    Connecting,
    /// Connected and receiving messages.
    Streaming,
    /// Waiting before the next reconnect attempt.
    Backoff,
    /// Stopped cooperatively.
    Stopped,
    /// Gave up after exhausting reconnect attempts.
    Failed,
}

impl ConnectionState {
    /// Get the state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Backoff => "backoff",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }

    /// Whether the connection will make no further progress.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }

    /// Whether `next` is a legal successor of this state.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Connecting | Self::Stopped)
                | (
                    Self::Connecting,
                    Self::Streaming | Self::Backoff | Self::Stopped | Self::Failed
                )
                | (
                    Self::Streaming,
                    Self::Backoff | Self::Stopped | Self::Failed
                )
                | (Self::Backoff, Self::Connecting | Self::Stopped)
        )
    }

    /// Numeric code used for the connection-state gauge.
    #[must_use]
    pub const fn gauge_value(self) -> f64 {
        match self {
            Self::Idle => 0.0,
            Self::Connecting => 1.0,
            Self::Streaming => 2.0,
            Self::Backoff => 3.0,
            Self::Stopped => 4.0,
            Self::Failed => 5.0,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Retry Tracker
// =============================================================================

/// What to do after a connection-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for `delay`, then reconnect.
    Backoff {
        /// Retry counter after this failure.
        attempt: u32,
        /// Delay before the next attempt.
        delay: Duration,
    },
    /// Retry ceiling reached; the connection is failed.
    GiveUp {
        /// Retry counter after this failure.
        attempts: u32,
    },
}

/// Per-connection retry counter with exponential backoff.
///
/// The delay after the n-th consecutive failure is `2^n` seconds. There is
/// no cap on the delay other than the retry ceiling itself.
///
/// # Example
///
/// ```rust
/// use pairs_stream::{RetryDecision, RetryTracker};
/// use std::time::Duration;
///
/// let mut retries = RetryTracker::new(3);
/// assert_eq!(
///     retries.on_failure(),
///     RetryDecision::Backoff { attempt: 1, delay: Duration::from_secs(2) }
/// );
///
/// // A successful connection clears the counter.
/// retries.on_connected();
/// assert_eq!(retries.retry_count(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct RetryTracker {
    max_retries: u32,
    retry_count: u32,
}

impl RetryTracker {
    /// Create a tracker that gives up once `max_retries` consecutive
    /// failures have been counted.
    #[must_use]
    pub const fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            retry_count: 0,
        }
    }

    /// Record a connection-level failure and decide what happens next.
    #[must_use]
    pub fn on_failure(&mut self) -> RetryDecision {
        self.retry_count = self.retry_count.saturating_add(1);

        if self.retry_count < self.max_retries {
            RetryDecision::Backoff {
                attempt: self.retry_count,
                delay: Self::backoff_delay(self.retry_count),
            }
        } else {
            RetryDecision::GiveUp {
                attempts: self.retry_count,
            }
        }
    }

    /// Reset after a successful connection.
    pub const fn on_connected(&mut self) {
        self.retry_count = 0;
    }

    /// Current consecutive failure count.
    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Configured retry ceiling.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Backoff delay after `retry_count` consecutive failures.
    #[must_use]
    pub const fn backoff_delay(retry_count: u32) -> Duration {
        Duration::from_secs(2u64.saturating_pow(retry_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_each_failure() {
        let mut retries = RetryTracker::new(5);
        let delays: Vec<Duration> = (0..4)
            .map(|_| match retries.on_failure() {
                RetryDecision::Backoff { delay, .. } => delay,
                RetryDecision::GiveUp { .. } => panic!("gave up too early"),
            })
            .collect();

        assert_eq!(
            delays,
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(16),
            ]
        );
    }

    #[test]
    fn gives_up_at_ceiling() {
        let mut retries = RetryTracker::new(3);
        assert!(matches!(
            retries.on_failure(),
            RetryDecision::Backoff { attempt: 1, .. }
        ));
        assert!(matches!(
            retries.on_failure(),
            RetryDecision::Backoff { attempt: 2, .. }
        ));
        assert_eq!(retries.on_failure(), RetryDecision::GiveUp { attempts: 3 });
    }

    #[test]
    fn zero_ceiling_gives_up_on_first_failure() {
        let mut retries = RetryTracker::new(0);
        assert_eq!(retries.on_failure(), RetryDecision::GiveUp { attempts: 1 });
    }

    #[test]
    fn success_resets_counter() {
        let mut retries = RetryTracker::new(3);
        let _ = retries.on_failure();
        let _ = retries.on_failure();
        retries.on_connected();
        assert_eq!(retries.retry_count(), 0);
        assert_eq!(
            retries.on_failure(),
            RetryDecision::Backoff {
                attempt: 1,
                delay: Duration::from_secs(2)
            }
        );
    }

    #[test]
    fn delay_saturates_instead_of_overflowing() {
        assert_eq!(
            RetryTracker::backoff_delay(200),
            Duration::from_secs(u64::MAX)
        );
    }

    #[test]
    fn legal_transitions() {
        use ConnectionState::{Backoff, Connecting, Failed, Idle, Stopped, Streaming};

        assert!(Idle.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Streaming));
        assert!(Streaming.can_transition_to(Backoff));
        assert!(Backoff.can_transition_to(Connecting));
        assert!(Streaming.can_transition_to(Stopped));
        assert!(Connecting.can_transition_to(Failed));

        assert!(!Stopped.can_transition_to(Connecting));
        assert!(!Failed.can_transition_to(Connecting));
        assert!(!Idle.can_transition_to(Streaming));
        assert!(!Backoff.can_transition_to(Streaming));
    }

    #[test]
    fn terminal_states() {
        assert!(ConnectionState::Stopped.is_terminal());
        assert!(ConnectionState::Failed.is_terminal());
        assert!(!ConnectionState::Backoff.is_terminal());
        assert_eq!(ConnectionState::Streaming.to_string(), "streaming");
    }
}
