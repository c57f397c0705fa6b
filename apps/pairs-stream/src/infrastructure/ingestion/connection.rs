//! Stream Connection
//!
//! Keeps one symbol's trade stream alive: connect, receive with a bounded
//! wait, decode, hand ticks to the sink, and reconnect with exponential
//! backoff on connection-level failures.
//!
//! ```text
//! Connecting ──ok──► Streaming ──error──► Backoff (2^n s) ──► Connecting
//!     │                  │                    │
//!     └─error (ceiling)──┴──── stop ──────────┴──► Stopped | Failed
//! ```
//!
//! A stop request (cancelled token or cleared running flag) is honoured at
//! the top of each loop, after every receive timeout, and during backoff.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::status::ConnectionStatus;
use crate::application::ports::{FeedConnector, FeedError, FeedFrame, FeedSession, TickSink};
use crate::domain::connection::{ConnectionState, RetryDecision, RetryTracker};
use crate::domain::tick::Symbol;
use crate::infrastructure::binance::TradeCodec;
use crate::infrastructure::config::StreamSettings;
use crate::infrastructure::metrics;

/// Lower bound on the receive timeout so an unset value cannot spin.
const MIN_RECEIVE_TIMEOUT: Duration = Duration::from_millis(50);

/// How a streaming session ended.
enum SessionEnd {
    Stopped,
    Failed(FeedError),
}

/// One symbol's connection task.
pub struct StreamConnection {
    symbol: Symbol,
    connector: Arc<dyn FeedConnector>,
    sink: Arc<dyn TickSink>,
    settings: StreamSettings,
    status: Arc<ConnectionStatus>,
    running: Arc<AtomicBool>,
    cancel: CancellationToken,
    codec: TradeCodec,
}

impl std::fmt::Debug for StreamConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConnection")
            .field("symbol", &self.symbol)
            .field("state", &self.status.state())
            .finish_non_exhaustive()
    }
}

impl StreamConnection {
    /// Create a connection for `symbol`.
    #[must_use]
    pub fn new(
        symbol: Symbol,
        connector: Arc<dyn FeedConnector>,
        sink: Arc<dyn TickSink>,
        settings: StreamSettings,
        running: Arc<AtomicBool>,
        cancel: CancellationToken,
    ) -> Self {
        let status = Arc::new(ConnectionStatus::new(symbol.clone()));
        Self {
            symbol,
            connector,
            sink,
            settings,
            status,
            running,
            cancel,
            codec: TradeCodec::new(),
        }
    }

    /// Shared status handle.
    #[must_use]
    pub fn status(&self) -> Arc<ConnectionStatus> {
        Arc::clone(&self.status)
    }

    fn should_stop(&self) -> bool {
        self.cancel.is_cancelled() || !self.running.load(Ordering::Acquire)
    }

    fn finish(&self, state: ConnectionState) -> ConnectionState {
        self.status.set_state(state);
        match state {
            ConnectionState::Failed => {
                tracing::error!(symbol = %self.symbol, "Stream connection failed, giving up");
            }
            _ => tracing::info!(symbol = %self.symbol, "Stream connection stopped"),
        }
        state
    }

    /// Run until stopped or failed. Returns the terminal state.
    pub async fn run(self) -> ConnectionState {
        let mut retries = RetryTracker::new(self.settings.max_reconnect_attempts);
        tracing::info!(symbol = %self.symbol, "Starting stream connection");

        loop {
            if self.should_stop() {
                return self.finish(ConnectionState::Stopped);
            }

            self.status.set_state(ConnectionState::Connecting);
            let connected = tokio::select! {
                () = self.cancel.cancelled() => {
                    return self.finish(ConnectionState::Stopped);
                }
                result = self.connector.connect(&self.symbol) => result,
            };

            let error = match connected {
                Ok(mut session) => {
                    retries.on_connected();
                    self.status.mark_connected();
                    self.status.set_state(ConnectionState::Streaming);
                    tracing::info!(symbol = %self.symbol, "Connected to trade stream");

                    let end = self.stream(session.as_mut()).await;
                    session.close().await;
                    match end {
                        SessionEnd::Stopped => return self.finish(ConnectionState::Stopped),
                        SessionEnd::Failed(e) => e,
                    }
                }
                Err(e) => e,
            };

            match retries.on_failure() {
                RetryDecision::Backoff { attempt, delay } => {
                    self.status.record_failure(attempt, error.to_string());
                    metrics::record_reconnect(self.symbol.as_str());
                    tracing::warn!(
                        symbol = %self.symbol,
                        attempt,
                        max_attempts = retries.max_retries(),
                        delay_secs = delay.as_secs(),
                        error = %error,
                        "Stream connection error, backing off"
                    );

                    if self.should_stop() {
                        return self.finish(ConnectionState::Stopped);
                    }
                    self.status.set_state(ConnectionState::Backoff);
                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            return self.finish(ConnectionState::Stopped);
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::GiveUp { attempts } => {
                    self.status.record_failure(attempts, error.to_string());
                    tracing::warn!(
                        symbol = %self.symbol,
                        attempts,
                        error = %error,
                        "Stream connection error, retry limit reached"
                    );
                    if self.should_stop() {
                        return self.finish(ConnectionState::Stopped);
                    }
                    return self.finish(ConnectionState::Failed);
                }
            }
        }
    }

    /// Receive loop for one open session.
    async fn stream(&self, session: &mut dyn FeedSession) -> SessionEnd {
        let receive_timeout = self.settings.receive_timeout.max(MIN_RECEIVE_TIMEOUT);
        let keepalive = !self.settings.ping_interval.is_zero();
        let ping_every = self.settings.ping_interval.max(Duration::from_secs(1));

        let mut ping_timer = tokio::time::interval_at(Instant::now() + ping_every, ping_every);
        ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut pong_deadline: Option<Instant> = None;

        loop {
            if self.should_stop() {
                return SessionEnd::Stopped;
            }

            let keepalive_expired = async move {
                match pong_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;

                () = self.cancel.cancelled() => return SessionEnd::Stopped,

                () = keepalive_expired => {
                    return SessionEnd::Failed(FeedError::KeepaliveTimeout {
                        secs: self.settings.ping_timeout.as_secs(),
                    });
                }

                _ = ping_timer.tick(), if keepalive => {
                    if let Err(e) = session.ping(Vec::new()).await {
                        return SessionEnd::Failed(e);
                    }
                    if pong_deadline.is_none() {
                        pong_deadline = Some(Instant::now() + self.settings.ping_timeout);
                    }
                }

                received = tokio::time::timeout(receive_timeout, session.recv()) => {
                    let frame = match received {
                        // Quiet period; loop back to observe a stop request.
                        Err(_) => continue,
                        Ok(None) => return SessionEnd::Failed(FeedError::Closed),
                        Ok(Some(Err(e))) => return SessionEnd::Failed(e),
                        Ok(Some(Ok(frame))) => frame,
                    };

                    // Any inbound frame proves the peer is alive.
                    pong_deadline = None;

                    match frame {
                        FeedFrame::Text(text) => self.handle_text(&text),
                        FeedFrame::Ping(payload) => {
                            if let Err(e) = session.pong(payload).await {
                                return SessionEnd::Failed(e);
                            }
                        }
                        FeedFrame::Pong => {}
                        FeedFrame::Close => return SessionEnd::Failed(FeedError::Closed),
                    }
                }
            }
        }
    }

    fn handle_text(&self, text: &str) {
        match self.codec.decode(text, &self.symbol) {
            Ok(tick) => {
                metrics::record_tick_received(self.symbol.as_str());
                let received = self.status.record_tick_received();

                if self.sink.insert_tick(&tick) {
                    metrics::record_tick_stored(self.symbol.as_str());
                    self.status.record_tick_stored();
                }

                let every = self.settings.progress_log_every;
                if every > 0 && received % every == 0 {
                    tracing::info!(symbol = %self.symbol, ticks = received, "Received ticks");
                }
            }
            Err(e) => {
                metrics::record_decode_error(self.symbol.as_str());
                self.status.record_decode_error();
                tracing::debug!(symbol = %self.symbol, error = %e, "Dropping undecodable message");
            }
        }
    }
}
