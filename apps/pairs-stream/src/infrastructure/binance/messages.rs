//! Binance Trade Stream Message Types
//!
//! Wire format of the per-symbol `<symbol>@trade` stream.
//!
//! # Wire Format (JSON)
//! ```json
//! {
//!   "e": "trade",
//!   "E": 1700000000123,
//!   "T": 1700000000120,
//!   "s": "BTCUSDT",
//!   "t": 4215771234,
//!   "p": "37012.50",
//!   "q": "0.004",
//!   "X": "MARKET",
//!   "m": true
//! }
//! ```
//!
//! Price and quantity arrive as decimal strings; plain JSON numbers are
//! accepted as well.

use serde::{Deserialize, Serialize};

/// A decimal carried either as a JSON string or a JSON number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Decimal {
    /// `"37012.50"`
    Text(String),
    /// `37012.5`
    Number(f64),
}

impl Decimal {
    /// Numeric value, if the text form parses.
    #[must_use]
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Text(s) => s.trim().parse().ok(),
            Self::Number(n) => Some(*n),
        }
    }
}

/// One trade from the trade stream.
///
/// Only trade time, price and quantity are required; the remaining fields
/// are informational.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeMessage {
    /// Event type (`trade`).
    #[serde(rename = "e", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,

    /// Event time (ms since epoch).
    #[serde(rename = "E", default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<i64>,

    /// Trade time (ms since epoch).
    #[serde(rename = "T")]
    pub trade_time: i64,

    /// Exchange symbol (upper-case).
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,

    /// Trade ID.
    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    pub trade_id: Option<u64>,

    /// Price.
    #[serde(rename = "p")]
    pub price: Decimal,

    /// Quantity.
    #[serde(rename = "q")]
    pub quantity: Decimal,

    /// Whether the buyer was the maker.
    #[serde(rename = "m", default, skip_serializing_if = "Option::is_none")]
    pub is_buyer_maker: Option<bool>,
}
