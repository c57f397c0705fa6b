//! CSV export of resampled bars.
//!
//! Columns: `timestamp,open,high,low,close,volume,symbol`, one row per bar,
//! timestamps in RFC 3339.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};

use crate::domain::analytics::{Bar, Timeframe};
use crate::domain::tick::Symbol;

const HEADER: [&str; 7] = ["timestamp", "open", "high", "low", "close", "volume", "symbol"];

/// Export errors.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// CSV encoding failed.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Writing the file failed.
    #[error("failed to write {path}: {source}")]
    Io {
        /// Target path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Render bars as CSV text.
///
/// # Errors
///
/// Returns `ExportError::Csv` if a record cannot be encoded.
pub fn bars_to_csv<'a>(
    rows: impl IntoIterator<Item = (&'a Symbol, &'a Bar)>,
) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(HEADER)?;

    for (symbol, bar) in rows {
        wtr.write_record([
            bar.bucket_start.to_rfc3339_opts(SecondsFormat::Secs, true),
            bar.open.to_string(),
            bar.high.to_string(),
            bar.low.to_string(),
            bar.close.to_string(),
            bar.volume.to_string(),
            symbol.to_string(),
        ])?;
    }

    let bytes = wtr
        .into_inner()
        .map_err(|e| ExportError::Csv(e.into_error().into()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Write bars to `{dir}/bars_{timeframe}_{YYYYmmdd_HHMMSS}.csv`.
///
/// # Errors
///
/// Returns `ExportError` if the directory or file cannot be written.
pub fn write_bars_csv(
    dir: &Path,
    timeframe: Timeframe,
    rows: &[(Symbol, Bar)],
) -> Result<PathBuf, ExportError> {
    std::fs::create_dir_all(dir).map_err(|source| ExportError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let name = format!("bars_{timeframe}_{}.csv", Utc::now().format("%Y%m%d_%H%M%S"));
    let path = dir.join(name);

    let text = bars_to_csv(rows.iter().map(|(symbol, bar)| (symbol, bar)))?;
    std::fs::write(&path, text).map_err(|source| ExportError::Io {
        path: path.clone(),
        source,
    })?;

    tracing::info!(path = %path.display(), rows = rows.len(), "Exported bars");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tokio_test::assert_ok;

    fn bar(secs: i64, close: f64) -> Bar {
        Bar {
            bucket_start: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            open: 10.0,
            high: 12.0,
            low: 9.5,
            close,
            volume: 3.25,
        }
    }

    #[test]
    fn header_and_rows() {
        let btc = Symbol::parse("btcusdt").unwrap();
        let bars = [bar(0, 11.0), bar(60, 11.5)];
        let csv = assert_ok!(bars_to_csv(bars.iter().map(|b| (&btc, b))));
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "timestamp,open,high,low,close,volume,symbol");
        assert_eq!(lines[1], "2023-11-14T22:13:20Z,10,12,9.5,11,3.25,btcusdt");
        assert!(lines[2].ends_with(",11.5,3.25,btcusdt"));
    }

    #[test]
    fn empty_export_has_header_only() {
        let csv = assert_ok!(bars_to_csv(std::iter::empty::<(&Symbol, &Bar)>()));
        assert_eq!(csv.lines().count(), 1);
    }

    #[test]
    fn writes_file_into_new_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("exports");
        let rows = vec![(Symbol::parse("ethusdt").unwrap(), bar(0, 2.0))];

        let path = assert_ok!(write_bars_csv(&target, Timeframe::OneMinute, &rows));

        assert!(path.starts_with(&target));
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("bars_1m_"));
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("ethusdt"));
    }
}
