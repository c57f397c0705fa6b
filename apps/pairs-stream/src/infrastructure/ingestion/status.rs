//! Connection Status
//!
//! Shared, lock-light view of one stream connection. The connection task
//! writes it; the manager, health server and service read it.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::domain::connection::ConnectionState;
use crate::domain::tick::Symbol;
use crate::infrastructure::metrics;

/// Live status of one symbol's connection.
#[derive(Debug)]
pub struct ConnectionStatus {
    symbol: Symbol,
    state: RwLock<ConnectionState>,
    last_connected_at: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
    retry_count: AtomicU32,
    connects: AtomicU32,
    ticks_received: AtomicU64,
    ticks_stored: AtomicU64,
    decode_errors: AtomicU64,
}

impl ConnectionStatus {
    /// Create an idle status for `symbol`.
    #[must_use]
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            state: RwLock::new(ConnectionState::Idle),
            last_connected_at: RwLock::new(None),
            last_error: RwLock::new(None),
            retry_count: AtomicU32::new(0),
            connects: AtomicU32::new(0),
            ticks_received: AtomicU64::new(0),
            ticks_stored: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
        }
    }

    /// Symbol this status belongs to.
    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Move to `next`.
    pub fn set_state(&self, next: ConnectionState) {
        let previous = std::mem::replace(&mut *self.state.write(), next);
        if previous != next {
            if !previous.can_transition_to(next) {
                tracing::warn!(symbol = %self.symbol, from = %previous, to = %next, "Unexpected state transition");
            }
            tracing::debug!(symbol = %self.symbol, from = %previous, to = %next, "Connection state changed");
        }
        metrics::set_connection_state(self.symbol.as_str(), next);
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Record a successful connect; clears the retry counter and error.
    pub fn mark_connected(&self) {
        *self.last_connected_at.write() = Some(Utc::now());
        *self.last_error.write() = None;
        self.retry_count.store(0, Ordering::Relaxed);
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection-level failure.
    pub fn record_failure(&self, retry_count: u32, error: String) {
        self.retry_count.store(retry_count, Ordering::Relaxed);
        *self.last_error.write() = Some(error);
    }

    /// Consecutive failure count.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::Relaxed)
    }

    /// Count a decoded tick.
    pub fn record_tick_received(&self) -> u64 {
        self.ticks_received.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Count a stored tick.
    pub fn record_tick_stored(&self) {
        self.ticks_stored.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a dropped message.
    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy.
    #[must_use]
    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            symbol: self.symbol.to_string(),
            state: self.state(),
            retry_count: self.retry_count(),
            connects: self.connects.load(Ordering::Relaxed),
            ticks_received: self.ticks_received.load(Ordering::Relaxed),
            ticks_stored: self.ticks_stored.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            last_connected_at: *self.last_connected_at.read(),
            last_error: self.last_error.read().clone(),
        }
    }
}

/// Serializable copy of a `ConnectionStatus`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionSnapshot {
    /// Symbol.
    pub symbol: String,
    /// Lifecycle state.
    pub state: ConnectionState,
    /// Consecutive failures.
    pub retry_count: u32,
    /// Successful connects since start.
    pub connects: u32,
    /// Ticks decoded.
    pub ticks_received: u64,
    /// Ticks persisted.
    pub ticks_stored: u64,
    /// Messages dropped by the codec.
    pub decode_errors: u64,
    /// Time of the last successful connect.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Last connection-level error.
    pub last_error: Option<String>,
}
