//! Port Interfaces
//!
//! Contracts that infrastructure adapters implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `FeedConnector`: Opens one trade-stream session per symbol
//! - `FeedSession`: An open session yielding raw frames
//! - `TickSink`: Durable destination for decoded ticks
//!
//! The feed ports are the seam that lets a stream connection run against
//! a scripted fake instead of the network.

use async_trait::async_trait;

use crate::domain::tick::{Symbol, Tick};

/// One frame received from a feed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedFrame {
    /// A text payload (JSON trade message).
    Text(String),
    /// Ping from the server.
    Ping(Vec<u8>),
    /// Pong in reply to one of our pings.
    Pong,
    /// Server-initiated close.
    Close,
}

/// Errors from the feed transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    /// Could not open the connection.
    #[error("failed to connect to {url}: {message}")]
    Connect {
        /// Endpoint that was dialed.
        url: String,
        /// Error details.
        message: String,
    },

    /// Opening the connection did not finish in time.
    #[error("connect timed out after {secs}s")]
    ConnectTimeout {
        /// Timeout that elapsed.
        secs: u64,
    },

    /// Protocol or I/O error on an open connection.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// The server closed the connection.
    #[error("connection closed by server")]
    Closed,

    /// No pong arrived before the keepalive deadline.
    #[error("keepalive timeout: no pong within {secs}s")]
    KeepaliveTimeout {
        /// Deadline that elapsed.
        secs: u64,
    },
}

/// An open trade-stream session.
#[async_trait]
pub trait FeedSession: Send {
    /// Next frame. `None` means the stream ended.
    async fn recv(&mut self) -> Option<Result<FeedFrame, FeedError>>;

    /// Send a keepalive ping.
    async fn ping(&mut self, payload: Vec<u8>) -> Result<(), FeedError>;

    /// Answer a server ping.
    async fn pong(&mut self, payload: Vec<u8>) -> Result<(), FeedError>;

    /// Close the session. Errors are ignored.
    async fn close(&mut self);
}

/// Opens trade-stream sessions.
#[async_trait]
pub trait FeedConnector: Send + Sync {
    /// Open a session for `symbol`.
    async fn connect(&self, symbol: &Symbol) -> Result<Box<dyn FeedSession>, FeedError>;
}

/// Destination for decoded ticks.
///
/// Implementations absorb their own failures; the stream loop never sees
/// a storage error.
pub trait TickSink: Send + Sync {
    /// Persist one tick. Returns `false` if it was dropped.
    fn insert_tick(&self, tick: &Tick) -> bool;
}
