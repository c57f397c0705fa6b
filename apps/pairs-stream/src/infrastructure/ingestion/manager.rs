//! Ingestion Manager
//!
//! Owns the set of per-symbol stream connections. `start` and `stop` may be
//! called from synchronous code; tasks run on the runtime handle given at
//! construction.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::connection::StreamConnection;
use super::status::{ConnectionSnapshot, ConnectionStatus};
use crate::application::ports::{FeedConnector, TickSink};
use crate::domain::tick::Symbol;
use crate::infrastructure::config::StreamSettings;

struct ManagerInner {
    running: Arc<AtomicBool>,
    cancel: CancellationToken,
    /// Flips to `true` once every task of the latest run has exited.
    exited: Option<watch::Receiver<bool>>,
    statuses: Vec<Arc<ConnectionStatus>>,
}

impl ManagerInner {
    /// Whether the latest run has no live tasks. A supervisor that ended
    /// without signalling counts as exited.
    fn run_exited(&self) -> bool {
        self.exited
            .as_ref()
            .is_none_or(|rx| *rx.borrow() || rx.has_changed().is_err())
    }
}

/// Starts and stops the stream connections.
pub struct IngestionManager {
    connector: Arc<dyn FeedConnector>,
    sink: Arc<dyn TickSink>,
    settings: StreamSettings,
    runtime: Handle,
    inner: Mutex<ManagerInner>,
}

impl std::fmt::Debug for IngestionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionManager")
            .field("running", &self.is_running())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl IngestionManager {
    /// Create an idle manager.
    #[must_use]
    pub fn new(
        connector: Arc<dyn FeedConnector>,
        sink: Arc<dyn TickSink>,
        settings: StreamSettings,
        runtime: Handle,
    ) -> Self {
        Self {
            connector,
            sink,
            settings,
            runtime,
            inner: Mutex::new(ManagerInner {
                running: Arc::new(AtomicBool::new(false)),
                cancel: CancellationToken::new(),
                exited: None,
                statuses: Vec::new(),
            }),
        }
    }

    /// Start one connection per symbol.
    ///
    /// Returns `false` without side effects when streaming is already
    /// active or the previous run has not finished winding down.
    pub fn start(&self, symbols: &[Symbol]) -> bool {
        let mut inner = self.inner.lock();

        if inner.running.load(Ordering::Acquire) {
            tracing::debug!("Stream already running");
            return false;
        }
        if !inner.run_exited() {
            tracing::warn!("Previous stream run still shutting down");
            return false;
        }

        let running = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();

        let connections: Vec<StreamConnection> = symbols
            .iter()
            .map(|symbol| {
                StreamConnection::new(
                    symbol.clone(),
                    Arc::clone(&self.connector),
                    Arc::clone(&self.sink),
                    self.settings.clone(),
                    Arc::clone(&running),
                    cancel.clone(),
                )
            })
            .collect();
        inner.statuses = connections.iter().map(StreamConnection::status).collect();

        let supervisor_running = Arc::clone(&running);
        let (exited_tx, exited_rx) = watch::channel(false);
        self.runtime.spawn(async move {
            let mut tasks = JoinSet::new();
            for connection in connections {
                tasks.spawn(connection.run());
            }
            while let Some(result) = tasks.join_next().await {
                match result {
                    Ok(state) => tracing::debug!(state = %state, "Stream connection exited"),
                    Err(e) => tracing::error!(error = %e, "Stream connection task panicked"),
                }
            }
            supervisor_running.store(false, Ordering::Release);
            exited_tx.send_replace(true);
            tracing::info!("All stream connections exited");
        });

        tracing::info!(
            symbols = ?symbols.iter().map(Symbol::as_str).collect::<Vec<_>>(),
            "Stream started"
        );

        inner.running = running;
        inner.cancel = cancel;
        inner.exited = Some(exited_rx);
        true
    }

    /// Request every connection to stop. Returns immediately.
    pub fn stop(&self) {
        let inner = self.inner.lock();
        if inner.running.swap(false, Ordering::AcqRel) {
            tracing::info!("Stopping stream");
        }
        inner.cancel.cancel();
    }

    /// Whether streaming is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.lock().running.load(Ordering::Acquire)
    }

    /// Whether every connection task has exited.
    #[must_use]
    pub fn is_quiescent(&self) -> bool {
        self.inner.lock().run_exited()
    }

    /// Wait up to `timeout` for every connection task to exit.
    ///
    /// Only observes the exit signal; a `start` issued meanwhile still sees
    /// the previous run winding down.
    pub async fn wait_quiescent(&self, timeout: Duration) -> bool {
        let Some(mut exited) = self.inner.lock().exited.clone() else {
            return true;
        };

        match tokio::time::timeout(timeout, exited.wait_for(|done| *done)).await {
            Ok(Ok(_)) => true,
            // Sender dropped without signalling: the supervisor is gone.
            Ok(Err(_)) => {
                tracing::error!("Stream supervisor ended without signalling");
                true
            }
            Err(_) => {
                tracing::warn!(timeout_secs = timeout.as_secs(), "Stream connections still running");
                false
            }
        }
    }

    /// Status of each connection from the latest run.
    #[must_use]
    pub fn statuses(&self) -> Vec<ConnectionSnapshot> {
        self.inner
            .lock()
            .statuses
            .iter()
            .map(|status| status.snapshot())
            .collect()
    }
}
