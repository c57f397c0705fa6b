//! Tick Store
//!
//! SQLite-backed persistence for trade ticks. The connection lives behind a
//! single `parking_lot::Mutex`; every public operation takes the lock for
//! exactly one statement (or one short transaction) and never across an
//! `.await`.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE ticks (timestamp TEXT, symbol TEXT, price REAL, qty REAL)
//! ```
//!
//! Timestamps are RFC 3339 strings with a fixed microsecond fraction and a
//! `Z` suffix, so lexical order matches chronological order. There is no
//! uniqueness constraint; duplicate ticks are accepted.
//!
//! # Failure policy
//!
//! Public operations log storage errors and return a benign default
//! (`false`, empty, zero) so the ingestion path never stops on a storage
//! failure. The `try_*` variants surface the error.

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, params};

use crate::application::ports::TickSink;
use crate::domain::tick::Tick;
use crate::infrastructure::metrics;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS ticks (
    timestamp TEXT,
    symbol TEXT,
    price REAL,
    qty REAL
)";

const CREATE_INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_ticks_timestamp ON ticks(timestamp)";

/// Tick store errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// SQLite returned an error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The database directory could not be created.
    #[error("failed to create database directory {path}: {source}")]
    Directory {
        /// Directory path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Mutex-serialized SQLite tick store.
pub struct TickStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for TickStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickStore").finish_non_exhaustive()
    }
}

impl TickStore {
    /// Open (or create) a store at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema cannot
    /// be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Directory {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        let store = Self::with_connection(conn)?;

        tracing::info!(path = %path.display(), "Tick store opened");
        Ok(store)
    }

    /// Open a private in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute(CREATE_TABLE, [])?;
        conn.execute(CREATE_INDEX, [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // =========================================================================
    // Public operations (log and default on failure)
    // =========================================================================

    /// Append one tick. Returns `false` if the tick was dropped.
    pub fn insert(&self, tick: &Tick) -> bool {
        match self.try_insert(tick) {
            Ok(()) => true,
            Err(e) => {
                metrics::record_storage_error("insert");
                tracing::error!(symbol = %tick.symbol, error = %e, "Failed to insert tick, dropping it");
                false
            }
        }
    }

    /// Up to `limit` most recent ticks, oldest first.
    #[must_use]
    pub fn read_recent(&self, limit: usize) -> Vec<Tick> {
        self.try_read_recent(limit).unwrap_or_else(|e| {
            metrics::record_storage_error("read");
            tracing::error!(error = %e, limit, "Failed to read ticks");
            Vec::new()
        })
    }

    /// Total number of stored ticks.
    #[must_use]
    pub fn count(&self) -> usize {
        self.try_count().unwrap_or_else(|e| {
            metrics::record_storage_error("count");
            tracing::error!(error = %e, "Failed to count ticks");
            0
        })
    }

    /// Delete all but the `keep_last` most recent ticks.
    ///
    /// Returns the number of rows removed.
    pub fn trim(&self, keep_last: usize) -> usize {
        self.try_trim(keep_last).unwrap_or_else(|e| {
            metrics::record_storage_error("trim");
            tracing::error!(error = %e, keep_last, "Failed to trim ticks");
            0
        })
    }

    /// Delete every tick.
    pub fn clear(&self) {
        if let Err(e) = self.try_clear() {
            metrics::record_storage_error("clear");
            tracing::error!(error = %e, "Failed to clear ticks");
        }
    }

    // =========================================================================
    // Fallible operations
    // =========================================================================

    /// Append one tick.
    ///
    /// # Errors
    ///
    /// Returns the underlying SQLite error.
    pub fn try_insert(&self, tick: &Tick) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO ticks (timestamp, symbol, price, qty) VALUES (?1, ?2, ?3, ?4)",
            params![
                format_timestamp(tick.timestamp),
                tick.symbol,
                tick.price,
                tick.qty
            ],
        )?;
        Ok(())
    }

    /// Up to `limit` most recent ticks, oldest first.
    ///
    /// Rows whose timestamp cannot be parsed are skipped.
    ///
    /// # Errors
    ///
    /// Returns the underlying SQLite error.
    pub fn try_read_recent(&self, limit: usize) -> Result<Vec<Tick>, StorageError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows: Vec<(String, String, f64, f64)> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare_cached(
                "SELECT timestamp, symbol, price, qty FROM ticks
                 ORDER BY timestamp DESC, rowid DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut ticks: Vec<Tick> = rows
            .into_iter()
            .filter_map(|(raw_ts, symbol, price, qty)| match parse_timestamp(&raw_ts) {
                Some(ts) => Some(Tick::new(ts, symbol, price, qty)),
                None => {
                    tracing::warn!(timestamp = %raw_ts, "Skipping tick with unparsable timestamp");
                    None
                }
            })
            .collect();
        ticks.reverse();
        Ok(ticks)
    }

    /// Total number of stored ticks.
    ///
    /// # Errors
    ///
    /// Returns the underlying SQLite error.
    pub fn try_count(&self) -> Result<usize, StorageError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM ticks", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Delete all but the `keep_last` most recent ticks.
    ///
    /// # Errors
    ///
    /// Returns the underlying SQLite error.
    pub fn try_trim(&self, keep_last: usize) -> Result<usize, StorageError> {
        let keep_last = i64::try_from(keep_last).unwrap_or(i64::MAX);
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM ticks WHERE rowid NOT IN (
                SELECT rowid FROM ticks ORDER BY timestamp DESC, rowid DESC LIMIT ?1
             )",
            params![keep_last],
        )?;
        drop(conn);

        if removed > 0 {
            tracing::info!(removed, keep_last, "Trimmed tick store");
        }
        Ok(removed)
    }

    /// Delete every tick.
    ///
    /// # Errors
    ///
    /// Returns the underlying SQLite error.
    pub fn try_clear(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM ticks", [])?;
        drop(conn);

        tracing::info!("Cleared tick store");
        Ok(())
    }
}

impl TickSink for TickStore {
    fn insert_tick(&self, tick: &Tick) -> bool {
        self.insert(tick)
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp, accepting RFC 3339 and naive ISO-8601 forms.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use proptest::prelude::*;

    fn tick(secs: i64, symbol: &str, price: f64) -> Tick {
        Tick::new(
            Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            symbol,
            price,
            1.0,
        )
    }

    #[test]
    fn insert_and_read_back_in_order() {
        let store = TickStore::in_memory().unwrap();
        assert!(store.insert(&tick(2, "ethusdt", 2.0)));
        assert!(store.insert(&tick(1, "btcusdt", 1.0)));
        assert!(store.insert(&tick(3, "btcusdt", 3.0)));

        let ticks = store.read_recent(10);
        let prices: Vec<f64> = ticks.iter().map(|t| t.price).collect();
        assert_eq!(prices, vec![1.0, 2.0, 3.0]);
        assert_eq!(store.count(), 3);
    }

    #[test]
    fn read_recent_keeps_most_recent() {
        let store = TickStore::in_memory().unwrap();
        for i in 0..10 {
            store.insert(&tick(i, "btcusdt", i as f64));
        }

        let ticks = store.read_recent(3);
        let prices: Vec<f64> = ticks.iter().map(|t| t.price).collect();
        assert_eq!(prices, vec![7.0, 8.0, 9.0]);
    }

    #[test]
    fn timestamps_round_trip_with_subsecond_precision() {
        let store = TickStore::in_memory().unwrap();
        let ts = Utc.timestamp_opt(1_700_000_000, 0).unwrap() + TimeDelta::milliseconds(123);
        store.insert(&Tick::new(ts, "btcusdt", 1.0, 0.5));

        let ticks = store.read_recent(1);
        assert_eq!(ticks[0].timestamp, ts);
        assert_eq!(ticks[0].symbol, "btcusdt");
        assert_eq!(ticks[0].qty, 0.5);
    }

    #[test]
    fn naive_timestamps_are_accepted_and_garbage_skipped() {
        let store = TickStore::in_memory().unwrap();
        {
            let conn = store.conn.lock();
            conn.execute(
                "INSERT INTO ticks VALUES ('2024-01-02T03:04:05.250', 'btcusdt', 1.0, 1.0)",
                [],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO ticks VALUES ('not a time', 'btcusdt', 2.0, 1.0)",
                [],
            )
            .unwrap();
        }

        let ticks = store.read_recent(10);
        assert_eq!(ticks.len(), 1);
        assert_eq!(
            ticks[0].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap() + TimeDelta::milliseconds(250)
        );
        assert_eq!(store.count(), 2);
    }

    #[test]
    fn trim_keeps_newest() {
        let store = TickStore::in_memory().unwrap();
        for i in 0..10 {
            store.insert(&tick(i, "btcusdt", 0.0));
        }

        assert_eq!(store.trim(4), 6);
        assert_eq!(store.count(), 4);
        let oldest = store.read_recent(10)[0].timestamp;
        assert_eq!(oldest, Utc.timestamp_opt(1_700_000_006, 0).unwrap());

        assert_eq!(store.trim(100), 0);
        assert_eq!(store.count(), 4);
    }

    #[test]
    fn clear_empties_store() {
        let store = TickStore::in_memory().unwrap();
        store.insert(&tick(0, "btcusdt", 1.0));
        store.clear();
        assert_eq!(store.count(), 0);
        assert!(store.read_recent(5).is_empty());
    }

    #[test]
    fn open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ticks.db");

        let store = TickStore::open(&path).unwrap();
        store.insert(&tick(0, "btcusdt", 1.0));
        drop(store);

        let reopened = TickStore::open(&path).unwrap();
        assert_eq!(reopened.count(), 1);
    }

    proptest! {
        #[test]
        fn count_and_read_recent_bounds(
            offsets in prop::collection::vec(0i64..1_000, 0..60),
            limit in 0usize..80,
        ) {
            let store = TickStore::in_memory().unwrap();
            for (i, offset) in offsets.iter().enumerate() {
                prop_assert!(store.insert(&tick(*offset, "btcusdt", i as f64)));
            }

            prop_assert_eq!(store.count(), offsets.len());

            let recent = store.read_recent(limit);
            prop_assert_eq!(recent.len(), limit.min(offsets.len()));
            prop_assert!(recent.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

            // Everything returned is at least as new as everything left out.
            let mut all: Vec<i64> = offsets.clone();
            all.sort_unstable();
            if let Some(first) = recent.first() {
                let cutoff = all[all.len() - recent.len()];
                prop_assert_eq!(first.timestamp, Utc.timestamp_opt(1_700_000_000 + cutoff, 0).unwrap());
            }
        }

        #[test]
        fn trim_is_idempotent(n in 0usize..40, keep in 0usize..50) {
            let store = TickStore::in_memory().unwrap();
            for i in 0..n {
                store.insert(&tick(i64::try_from(i).unwrap(), "ethusdt", 1.0));
            }

            store.trim(keep);
            let after_first = store.count();
            store.trim(keep);

            prop_assert_eq!(after_first, n.min(keep));
            prop_assert_eq!(store.count(), after_first);
        }
    }
}
