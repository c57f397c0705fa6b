//! Prometheus Metrics Module
//!
//! Exposes pipeline metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Ticks**: Ticks received and stored per symbol, decode failures
//! - **Connections**: Per-symbol connection state, reconnect attempts
//! - **Storage**: Store errors by operation, stored tick count
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! functions are no-ops until `init_metrics` installs the recorder.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::connection::ConnectionState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first call.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed (for example when
/// another global recorder is already set).
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "pairs_stream_ticks_received_total",
        "Trade messages decoded from the feed"
    );
    describe_counter!(
        "pairs_stream_ticks_stored_total",
        "Ticks written to the tick store"
    );
    describe_counter!(
        "pairs_stream_decode_errors_total",
        "Feed messages dropped because they could not be decoded"
    );
    describe_counter!(
        "pairs_stream_storage_errors_total",
        "Tick store operations that failed"
    );
    describe_counter!(
        "pairs_stream_reconnects_total",
        "Feed reconnection attempts"
    );
    describe_gauge!(
        "pairs_stream_connection_state",
        "Connection state per symbol (0 idle, 1 connecting, 2 streaming, 3 backoff, 4 stopped, 5 failed)"
    );
    describe_gauge!("pairs_stream_stored_ticks", "Ticks currently in the store");
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a decoded trade message.
pub fn record_tick_received(symbol: &str) {
    counter!("pairs_stream_ticks_received_total", "symbol" => symbol.to_string()).increment(1);
}

/// Record a tick written to the store.
pub fn record_tick_stored(symbol: &str) {
    counter!("pairs_stream_ticks_stored_total", "symbol" => symbol.to_string()).increment(1);
}

/// Record a message that failed to decode.
pub fn record_decode_error(symbol: &str) {
    counter!("pairs_stream_decode_errors_total", "symbol" => symbol.to_string()).increment(1);
}

/// Record a failed store operation.
pub fn record_storage_error(operation: &'static str) {
    counter!("pairs_stream_storage_errors_total", "operation" => operation).increment(1);
}

/// Record a reconnection attempt.
pub fn record_reconnect(symbol: &str) {
    counter!("pairs_stream_reconnects_total", "symbol" => symbol.to_string()).increment(1);
}

/// Publish a connection state change.
pub fn set_connection_state(symbol: &str, state: ConnectionState) {
    gauge!("pairs_stream_connection_state", "symbol" => symbol.to_string())
        .set(state.gauge_value());
}

/// Publish the stored tick count.
#[allow(clippy::cast_precision_loss)]
pub fn set_stored_ticks(count: usize) {
    gauge!("pairs_stream_stored_ticks").set(count as f64);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_a_no_op() {
        record_tick_received("btcusdt");
        record_decode_error("btcusdt");
        record_storage_error("insert");
        set_connection_state("btcusdt", ConnectionState::Streaming);
        set_stored_ticks(3);
    }

    #[test]
    fn handle_is_absent_before_init() {
        // Unit tests in this crate never install the recorder.
        assert!(get_metrics_handle().is_none());
    }
}
