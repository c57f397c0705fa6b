//! Ingestion Manager Integration Tests
//!
//! Start/stop lifecycle of the whole connection set.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use common::{AfterFrames, ScriptedConnector, quiet_settings, symbol, trade_json};
use pairs_stream::{ConnectionState, FeedFrame, IngestionManager, TickStore};

fn manager(connector: &Arc<ScriptedConnector>, store: &Arc<TickStore>) -> IngestionManager {
    IngestionManager::new(
        Arc::clone(connector) as _,
        Arc::clone(store) as _,
        quiet_settings(5),
        Handle::current(),
    )
}

fn streaming_connector() -> Arc<ScriptedConnector> {
    Arc::new(ScriptedConnector::new(0, AfterFrames::Idle, |s| {
        vec![Ok(FeedFrame::Text(trade_json(s.as_str(), 1_700_000_000_000, 10.0, 1.0)))]
    }))
}

#[tokio::test(start_paused = true)]
async fn start_is_idempotent_and_stop_quiesces() {
    let connector = streaming_connector();
    let store = Arc::new(TickStore::in_memory().unwrap());
    let manager = manager(&connector, &store);
    let symbols = vec![symbol("btcusdt"), symbol("ethusdt")];

    assert!(manager.start(&symbols));
    assert!(manager.is_running());
    assert!(!manager.start(&symbols), "second start is a no-op");

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(connector.attempt_count(), 2, "one connection per symbol");
    assert_eq!(store.count(), 2);

    let statuses = manager.statuses();
    assert_eq!(statuses.len(), 2);
    assert!(statuses.iter().all(|s| s.state == ConnectionState::Streaming));

    manager.stop();
    assert!(!manager.is_running());
    assert!(manager.wait_quiescent(Duration::from_secs(5)).await);
    assert!(manager.is_quiescent());
    assert!(
        manager
            .statuses()
            .iter()
            .all(|s| s.state == ConnectionState::Stopped)
    );

    // Stopping again is harmless.
    manager.stop();
    assert!(manager.wait_quiescent(Duration::from_secs(1)).await);
}

#[tokio::test(start_paused = true)]
async fn restart_creates_fresh_connections() {
    let connector = Arc::new(ScriptedConnector::new(2, AfterFrames::Idle, |_| Vec::new()));
    let store = Arc::new(TickStore::in_memory().unwrap());
    let manager = manager(&connector, &store);
    let symbols = vec![symbol("btcusdt")];

    assert!(manager.start(&symbols));
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(manager.statuses()[0].retry_count, 1);

    manager.stop();
    assert!(manager.wait_quiescent(Duration::from_secs(5)).await);
    assert_eq!(manager.statuses()[0].state, ConnectionState::Stopped);

    assert!(manager.start(&symbols));
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The second failure belongs to the new connection, which starts from zero.
    let status = &manager.statuses()[0];
    assert_eq!(status.retry_count, 1);
    assert_eq!(status.state, ConnectionState::Backoff);

    manager.stop();
    assert!(manager.wait_quiescent(Duration::from_secs(5)).await);
}

#[tokio::test(start_paused = true)]
async fn all_failed_connections_end_the_run() {
    let connector = Arc::new(ScriptedConnector::unreachable());
    let store = Arc::new(TickStore::in_memory().unwrap());
    let manager = IngestionManager::new(
        Arc::clone(&connector) as _,
        Arc::clone(&store) as _,
        quiet_settings(2),
        Handle::current(),
    );

    assert!(manager.start(&[symbol("btcusdt"), symbol("ethusdt")]));
    assert!(manager.wait_quiescent(Duration::from_secs(30)).await);

    assert!(!manager.is_running());
    let statuses = manager.statuses();
    assert!(statuses.iter().all(|s| s.state == ConnectionState::Failed));
    assert_eq!(connector.attempt_count(), 4);

    // A failed run can be started again.
    assert!(manager.start(&[symbol("btcusdt")]));
    manager.stop();
    assert!(manager.wait_quiescent(Duration::from_secs(5)).await);
}

#[tokio::test(start_paused = true)]
async fn start_refused_while_waiting_on_a_lingering_run() {
    let connector = Arc::new(
        ScriptedConnector::new(0, AfterFrames::Idle, |_| Vec::new())
            .with_close_delay(Duration::from_secs(10)),
    );
    let store = Arc::new(TickStore::in_memory().unwrap());
    let manager = manager(&connector, &store);
    let symbols = vec![symbol("btcusdt")];

    assert!(manager.start(&symbols));
    tokio::time::sleep(Duration::from_millis(200)).await;
    manager.stop();

    let (quiesced, restarted) = tokio::join!(
        manager.wait_quiescent(Duration::from_secs(30)),
        async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let started = manager.start(&symbols);
            (started, manager.is_quiescent())
        },
    );

    assert!(quiesced);
    assert_eq!(restarted, (false, false), "old run still closing its session");
    assert_eq!(connector.attempt_count(), 1);

    // A short wait that times out leaves the run tracked.
    assert!(manager.start(&symbols));
    tokio::time::sleep(Duration::from_millis(200)).await;
    manager.stop();
    assert!(!manager.wait_quiescent(Duration::from_secs(1)).await);
    assert!(!manager.start(&symbols));
    assert!(manager.wait_quiescent(Duration::from_secs(30)).await);
    assert!(manager.is_quiescent());
    assert_eq!(connector.attempt_count(), 2);
}

#[tokio::test]
async fn stop_before_start_is_a_noop() {
    let connector = streaming_connector();
    let store = Arc::new(TickStore::in_memory().unwrap());
    let manager = manager(&connector, &store);

    manager.stop();
    assert!(!manager.is_running());
    assert!(manager.is_quiescent());
    assert!(manager.statuses().is_empty());
    assert_eq!(connector.attempt_count(), 0);
}
