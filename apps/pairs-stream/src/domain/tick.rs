//! Trade Ticks and Symbols
//!
//! A `Tick` is one decoded trade from the feed. Ticks are immutable once
//! created; they leave the system only through retention trimming or a
//! full clear of the tick store.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minimum length of a tradable instrument name (e.g. `btcusdt`).
const MIN_SYMBOL_LEN: usize = 6;

// =============================================================================
// Tick
// =============================================================================

/// One trade print for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Exchange trade time.
    pub timestamp: DateTime<Utc>,
    /// Instrument symbol (lower-case).
    pub symbol: String,
    /// Trade price.
    pub price: f64,
    /// Traded quantity.
    pub qty: f64,
}

impl Tick {
    /// Create a new tick.
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>, symbol: impl Into<String>, price: f64, qty: f64) -> Self {
        Self {
            timestamp,
            symbol: symbol.into(),
            price,
            qty,
        }
    }
}

// =============================================================================
// Symbol
// =============================================================================

/// Errors from symbol validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    /// Symbol is shorter than the minimum length.
    #[error("symbol '{0}' is too short (minimum {MIN_SYMBOL_LEN} characters)")]
    TooShort(String),

    /// Symbol contains characters outside `[a-z0-9]`.
    #[error("symbol '{0}' contains invalid characters")]
    InvalidCharacters(String),

    /// No symbols remained after parsing a list.
    #[error("no symbols given")]
    Empty,
}

/// A validated, lower-cased instrument symbol.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Parse and normalize a symbol.
    ///
    /// Surrounding whitespace is trimmed and the symbol is lower-cased.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol is too short or not alphanumeric.
    pub fn parse(raw: &str) -> Result<Self, SymbolError> {
        let normalized = raw.trim().to_lowercase();

        if normalized.len() < MIN_SYMBOL_LEN {
            return Err(SymbolError::TooShort(normalized));
        }
        if !normalized.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(SymbolError::InvalidCharacters(normalized));
        }

        Ok(Self(normalized))
    }

    /// Parse a comma-separated symbol list.
    ///
    /// Blank entries are skipped and duplicates removed, keeping the order
    /// of first appearance.
    ///
    /// # Errors
    ///
    /// Returns the first validation error, or `SymbolError::Empty` when
    /// the list contains no symbols.
    pub fn parse_list(raw: &str) -> Result<Vec<Self>, SymbolError> {
        let mut symbols: Vec<Self> = Vec::new();

        for part in raw.split(',').filter(|p| !p.trim().is_empty()) {
            let symbol = Self::parse(part)?;
            if !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }

        if symbols.is_empty() {
            return Err(SymbolError::Empty);
        }
        Ok(symbols)
    }

    /// Get the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalizes_case_and_whitespace() {
        let symbol = Symbol::parse("  BTCUSDT ").unwrap();
        assert_eq!(symbol.as_str(), "btcusdt");
        assert_eq!(symbol.to_string(), "btcusdt");
    }

    #[test]
    fn parse_rejects_short_symbols() {
        assert_eq!(
            Symbol::parse("btc"),
            Err(SymbolError::TooShort("btc".to_string()))
        );
    }

    #[test]
    fn parse_rejects_path_characters() {
        assert!(matches!(
            Symbol::parse("btc/usdt"),
            Err(SymbolError::InvalidCharacters(_))
        ));
    }

    #[test]
    fn parse_list_skips_blanks_and_duplicates() {
        let symbols = Symbol::parse_list("btcusdt, ,ETHUSDT,btcusdt,").unwrap();
        let names: Vec<&str> = symbols.iter().map(Symbol::as_str).collect();
        assert_eq!(names, vec!["btcusdt", "ethusdt"]);
    }

    #[test]
    fn parse_list_empty() {
        assert_eq!(Symbol::parse_list(" , "), Err(SymbolError::Empty));
    }
}
