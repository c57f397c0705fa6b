//! Pair Snapshot
//!
//! The whole dashboard computation as one pull over a tick set.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::domain::analytics::{
    AnalyticsError, AnalyticsResult, Bar, DataQuality, SeriesStats, Timeframe, ZScoreAlert,
    hedge_ratio, latest_finite, resample, rolling_correlation, rolling_zscore, spread,
    ticks_for_symbol,
};
use crate::domain::tick::{Symbol, Tick};
use crate::infrastructure::config::AnalyticsSettings;

/// Statistics for the first two symbols of a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct PairAnalytics {
    /// Dependent leg.
    pub symbol_a: Symbol,
    /// Independent leg.
    pub symbol_b: Symbol,
    /// OLS slope of `a` on `b`.
    pub hedge_ratio: f64,
    /// `a - hedge_ratio * b` over the aligned tick prices.
    pub spread: Vec<f64>,
    /// Rolling z-score of the spread.
    pub zscore: Vec<f64>,
    /// Latest finite z-score.
    pub latest_zscore: Option<f64>,
    /// Alert status of the latest z-score.
    pub alert: ZScoreAlert,
    /// Summary of the spread.
    pub spread_stats: Option<SeriesStats>,
    /// Rolling correlation of bar closes joined on bucket start. `None`
    /// until at least `window` joined bars exist.
    pub correlation: Option<Vec<f64>>,
}

impl PairAnalytics {
    /// Whether the correlation window is still filling.
    #[must_use]
    pub const fn is_collecting_correlation(&self) -> bool {
        self.correlation.is_none()
    }
}

/// Bars, coverage and pair statistics computed from one read.
#[derive(Debug, Clone, PartialEq)]
pub struct PairSnapshot {
    /// Aggregation granularity used for the bars.
    pub timeframe: Timeframe,
    /// Coverage of the tick set.
    pub quality: DataQuality,
    /// Bars per requested symbol.
    pub bars: BTreeMap<Symbol, Vec<Bar>>,
    /// Pair statistics, or why they are unavailable.
    pub pair: AnalyticsResult<PairAnalytics>,
}

impl PairSnapshot {
    /// Compute a snapshot over `ticks` for `symbols`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if a tick time cannot be bucketed. Missing
    /// pair data is reported through `pair`, not as an error.
    pub fn compute(
        ticks: &[Tick],
        symbols: &[Symbol],
        settings: &AnalyticsSettings,
    ) -> AnalyticsResult<Self> {
        let mut bars = BTreeMap::new();
        for symbol in symbols {
            let symbol_bars = resample(ticks_for_symbol(ticks, symbol.as_str()), settings.timeframe)?;
            bars.insert(symbol.clone(), symbol_bars);
        }

        let pair = match symbols {
            [a, b, ..] => pair_analytics(ticks, a, b, &bars, settings),
            _ => Err(AnalyticsError::InvalidInput(
                "pair analytics needs two symbols".to_string(),
            )),
        };

        Ok(Self {
            timeframe: settings.timeframe,
            quality: DataQuality::from_ticks(ticks),
            bars,
            pair,
        })
    }
}

fn prices(ticks: &[Tick], symbol: &Symbol) -> Vec<f64> {
    ticks_for_symbol(ticks, symbol.as_str()).map(|t| t.price).collect()
}

fn pair_analytics(
    ticks: &[Tick],
    a: &Symbol,
    b: &Symbol,
    bars: &BTreeMap<Symbol, Vec<Bar>>,
    settings: &AnalyticsSettings,
) -> AnalyticsResult<PairAnalytics> {
    let prices_a = prices(ticks, a);
    let prices_b = prices(ticks, b);

    let beta = hedge_ratio(&prices_a, &prices_b)?;
    let spread = spread(&prices_a, &prices_b, beta);
    let zscore = rolling_zscore(&spread, settings.zscore_window)?;
    let latest_zscore = latest_finite(&zscore);

    let empty = Vec::new();
    let (closes_a, closes_b) = joined_closes(
        bars.get(a).unwrap_or(&empty),
        bars.get(b).unwrap_or(&empty),
    );
    let correlation = if closes_a.len() >= settings.zscore_window {
        Some(rolling_correlation(&closes_a, &closes_b, settings.zscore_window)?)
    } else {
        None
    };

    Ok(PairAnalytics {
        symbol_a: a.clone(),
        symbol_b: b.clone(),
        hedge_ratio: beta,
        spread_stats: SeriesStats::from_series(&spread),
        alert: ZScoreAlert::evaluate(latest_zscore, settings.zscore_threshold),
        latest_zscore,
        spread,
        zscore,
        correlation,
    })
}

/// Close prices of bars present in both series, in bucket order.
fn joined_closes(a: &[Bar], b: &[Bar]) -> (Vec<f64>, Vec<f64>) {
    let by_start: HashMap<DateTime<Utc>, f64> =
        b.iter().map(|bar| (bar.bucket_start, bar.close)).collect();

    a.iter()
        .filter_map(|bar| by_start.get(&bar.bucket_start).map(|close_b| (bar.close, *close_b)))
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn settings(window: usize) -> AnalyticsSettings {
        AnalyticsSettings {
            timeframe: Timeframe::OneSecond,
            zscore_window: window,
            zscore_threshold: 2.0,
        }
    }

    fn symbols() -> Vec<Symbol> {
        vec![
            Symbol::parse("btcusdt").unwrap(),
            Symbol::parse("ethusdt").unwrap(),
        ]
    }

    fn paired_ticks(n: i64) -> Vec<Tick> {
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        (0..n)
            .flat_map(|i| {
                let ts = start + chrono::TimeDelta::seconds(i);
                let wobble = if i % 3 == 0 { 0.5 } else { -0.25 };
                let eth = 2_000.0 + i as f64;
                [
                    Tick::new(ts, "btcusdt", 2.0f64.mul_add(eth, wobble), 1.0),
                    Tick::new(ts, "ethusdt", eth, 1.0),
                ]
            })
            .collect()
    }

    #[test]
    fn pair_statistics_from_linked_legs() {
        let ticks = paired_ticks(60);
        let snapshot = PairSnapshot::compute(&ticks, &symbols(), &settings(20)).unwrap();

        assert_eq!(snapshot.quality.total_records, 120);
        assert_eq!(snapshot.quality.unique_symbols, 2);
        assert_eq!(snapshot.bars[&symbols()[0]].len(), 60);

        let pair = snapshot.pair.unwrap();
        assert!((pair.hedge_ratio - 2.0).abs() < 0.01);
        assert_eq!(pair.spread.len(), 60);
        assert!(pair.zscore[..19].iter().all(|z| z.is_nan()));
        assert!(pair.latest_zscore.is_some());
        assert!(!matches!(pair.alert, ZScoreAlert::NoSignal));

        let correlation = pair.correlation.unwrap();
        assert_eq!(correlation.len(), 60);
        let last = *correlation.last().unwrap();
        assert!(last > 0.99);
    }

    #[test]
    fn correlation_waits_for_window() {
        let ticks = paired_ticks(10);
        let snapshot = PairSnapshot::compute(&ticks, &symbols(), &settings(20)).unwrap();

        let pair = snapshot.pair.unwrap();
        assert!(pair.is_collecting_correlation());
        assert_eq!(pair.alert, ZScoreAlert::NoSignal);
    }

    #[test]
    fn single_symbol_has_no_pair() {
        let ticks = paired_ticks(5);
        let snapshot = PairSnapshot::compute(&ticks, &symbols()[..1], &settings(3)).unwrap();

        assert_eq!(snapshot.bars.len(), 1);
        assert!(matches!(snapshot.pair, Err(AnalyticsError::InvalidInput(_))));
    }

    #[test]
    fn empty_store_reports_insufficient_data() {
        let snapshot = PairSnapshot::compute(&[], &symbols(), &settings(3)).unwrap();

        assert!(snapshot.bars.values().all(Vec::is_empty));
        assert!(matches!(
            snapshot.pair,
            Err(AnalyticsError::InsufficientData { .. })
        ));
    }
}
