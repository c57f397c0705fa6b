//! Trade Codec
//!
//! Decodes trade-stream JSON into domain ticks. Decoding never touches the
//! connection; a failed decode drops one message.

use chrono::{DateTime, Utc};

use super::messages::{Decimal, TradeMessage};
use crate::domain::tick::{Symbol, Tick};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON decoding failed (malformed text or missing required field).
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// A numeric field could not be parsed.
    #[error("invalid {field}: {value:?}")]
    InvalidNumber {
        /// Field name.
        field: &'static str,
        /// Raw value.
        value: String,
    },

    /// A numeric field was negative or not finite.
    #[error("{field} must be a finite non-negative number, got {value}")]
    OutOfRange {
        /// Field name.
        field: &'static str,
        /// Parsed value.
        value: f64,
    },

    /// Trade time outside the representable range.
    #[error("invalid trade time: {0}")]
    InvalidTimestamp(i64),
}

/// JSON codec for the trade stream.
#[derive(Debug, Default, Clone)]
pub struct TradeCodec;

impl TradeCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one text frame into a tick for `symbol`.
    ///
    /// The tick carries the subscribed (lower-case) symbol rather than the
    /// exchange's upper-case echo.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed, a required field is
    /// missing, or a value is out of range.
    pub fn decode(&self, text: &str, symbol: &Symbol) -> Result<Tick, CodecError> {
        let message: TradeMessage = serde_json::from_str(text)?;
        Self::to_tick(&message, symbol)
    }

    /// Convert a decoded trade message into a tick.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is out of range.
    pub fn to_tick(message: &TradeMessage, symbol: &Symbol) -> Result<Tick, CodecError> {
        let timestamp = DateTime::<Utc>::from_timestamp_millis(message.trade_time)
            .ok_or(CodecError::InvalidTimestamp(message.trade_time))?;
        let price = decimal_field("price", &message.price)?;
        let qty = decimal_field("quantity", &message.quantity)?;

        Ok(Tick::new(timestamp, symbol.as_str(), price, qty))
    }
}

fn decimal_field(field: &'static str, raw: &Decimal) -> Result<f64, CodecError> {
    let value = raw.value().ok_or_else(|| CodecError::InvalidNumber {
        field,
        value: match raw {
            Decimal::Text(s) => s.clone(),
            Decimal::Number(n) => n.to_string(),
        },
    })?;

    if !value.is_finite() || value < 0.0 {
        return Err(CodecError::OutOfRange { field, value });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn btc() -> Symbol {
        Symbol::parse("btcusdt").unwrap()
    }

    #[test]
    fn decodes_trade() {
        let codec = TradeCodec::new();
        let tick = codec
            .decode(
                r#"{"e":"trade","T":1700000000120,"s":"BTCUSDT","p":"37012.50","q":"0.004"}"#,
                &btc(),
            )
            .unwrap();

        assert_eq!(tick.symbol, "btcusdt");
        assert_eq!(tick.price, 37_012.5);
        assert_eq!(tick.qty, 0.004);
        assert_eq!(
            tick.timestamp,
            Utc.timestamp_millis_opt(1_700_000_000_120).unwrap()
        );
    }

    #[test]
    fn missing_trade_time_is_rejected() {
        let err = TradeCodec::new()
            .decode(r#"{"p":"1","q":"1"}"#, &btc())
            .unwrap_err();
        assert!(matches!(err, CodecError::Json(_)));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(TradeCodec::new().decode("not json", &btc()).is_err());
        assert!(TradeCodec::new().decode(r#"{"result":null,"id":1}"#, &btc()).is_err());
    }

    #[test]
    fn unparsable_price_is_rejected() {
        let err = TradeCodec::new()
            .decode(r#"{"T":1,"p":"abc","q":"1"}"#, &btc())
            .unwrap_err();
        assert!(matches!(err, CodecError::InvalidNumber { field: "price", .. }));
    }

    #[test]
    fn negative_quantity_is_rejected() {
        let err = TradeCodec::new()
            .decode(r#"{"T":1,"p":"10","q":"-2"}"#, &btc())
            .unwrap_err();
        assert!(matches!(err, CodecError::OutOfRange { field: "quantity", .. }));
    }
}
