//! Scripted feed used by the integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use pairs_stream::{ConnectionState, FeedConnector, FeedError, FeedFrame, FeedSession, StreamSettings, Symbol};

/// Trade JSON as the exchange sends it.
pub fn trade_json(symbol: &str, trade_time_ms: i64, price: f64, qty: f64) -> String {
    format!(
        r#"{{"e":"trade","E":{trade_time_ms},"T":{trade_time_ms},"s":"{}","t":1,"p":"{price}","q":"{qty}","m":false}}"#,
        symbol.to_uppercase()
    )
}

/// Stream settings suited to paused-clock tests: no keepalive pings.
pub fn quiet_settings(max_reconnect_attempts: u32) -> StreamSettings {
    StreamSettings {
        receive_timeout: Duration::from_secs(1),
        ping_interval: Duration::ZERO,
        max_reconnect_attempts,
        ..StreamSettings::default()
    }
}

pub fn symbol(raw: &str) -> Symbol {
    Symbol::parse(raw).unwrap()
}

/// What a session does once its frames run out.
#[derive(Debug, Clone, Copy)]
pub enum AfterFrames {
    /// Stay open and silent.
    Idle,
    /// Report end of stream.
    End,
}

/// A session replaying a fixed list of frames.
pub struct ScriptedSession {
    frames: VecDeque<Result<FeedFrame, FeedError>>,
    after: AfterFrames,
    pongs: Arc<AtomicUsize>,
    close_delay: Duration,
}

#[async_trait]
impl FeedSession for ScriptedSession {
    async fn recv(&mut self) -> Option<Result<FeedFrame, FeedError>> {
        if let Some(frame) = self.frames.pop_front() {
            return Some(frame);
        }
        match self.after {
            AfterFrames::Idle => std::future::pending().await,
            AfterFrames::End => None,
        }
    }

    async fn ping(&mut self, _payload: Vec<u8>) -> Result<(), FeedError> {
        Ok(())
    }

    async fn pong(&mut self, _payload: Vec<u8>) -> Result<(), FeedError> {
        self.pongs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) {
        if !self.close_delay.is_zero() {
            tokio::time::sleep(self.close_delay).await;
        }
    }
}

/// Connector that fails a set number of times, then hands out scripted
/// sessions. Every attempt is timestamped on the tokio clock.
pub struct ScriptedConnector {
    failures_remaining: Mutex<u32>,
    frames: Box<dyn Fn(&Symbol) -> Vec<Result<FeedFrame, FeedError>> + Send + Sync>,
    after: AfterFrames,
    attempts: Mutex<Vec<(Symbol, Instant)>>,
    close_delay: Duration,
    pub pongs: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    pub fn new(
        failures: u32,
        after: AfterFrames,
        frames: impl Fn(&Symbol) -> Vec<Result<FeedFrame, FeedError>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            failures_remaining: Mutex::new(failures),
            frames: Box::new(frames),
            after,
            attempts: Mutex::new(Vec::new()),
            close_delay: Duration::ZERO,
            pongs: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sessions take `delay` to close, so a stopped run lingers.
    pub fn with_close_delay(mut self, delay: Duration) -> Self {
        self.close_delay = delay;
        self
    }

    /// Connector that never succeeds.
    pub fn unreachable() -> Self {
        Self::new(u32::MAX, AfterFrames::Idle, |_| Vec::new())
    }

    /// Attempt times for `symbol`.
    pub fn attempts_for(&self, symbol: &Symbol) -> Vec<Instant> {
        self.attempts
            .lock()
            .iter()
            .filter(|(s, _)| s == symbol)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }
}

#[async_trait]
impl FeedConnector for ScriptedConnector {
    async fn connect(&self, symbol: &Symbol) -> Result<Box<dyn FeedSession>, FeedError> {
        self.attempts.lock().push((symbol.clone(), Instant::now()));

        {
            let mut remaining = self.failures_remaining.lock();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(FeedError::Connect {
                    url: format!("scripted://{symbol}"),
                    message: "connection refused".to_string(),
                });
            }
        }

        Ok(Box::new(ScriptedSession {
            frames: (self.frames)(symbol).into(),
            after: self.after,
            pongs: Arc::clone(&self.pongs),
            close_delay: self.close_delay,
        }))
    }
}

/// Poll `probe` on the tokio clock until it yields a state in `targets`.
pub async fn wait_for_state(
    probe: impl Fn() -> ConnectionState,
    targets: &[ConnectionState],
    limit: Duration,
) -> ConnectionState {
    let deadline = Instant::now() + limit;
    loop {
        let state = probe();
        if targets.contains(&state) || Instant::now() >= deadline {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
