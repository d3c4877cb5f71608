//! Trade aggressor side
//!
//! Exchanges report the taker side of every public trade. Anything that is
//! not a recognizable buy or sell is kept as `Unknown` rather than rejected,
//! so the trade still reaches the price history.

use serde::{Deserialize, Serialize};

/// Taker side of a public trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    /// Buyer was the aggressor
    Buy,
    /// Seller was the aggressor
    Sell,
    /// Missing or unrecognized side label
    Unknown,
}

impl TradeSide {
    /// Parse an exchange side label, case-insensitively.
    ///
    /// Accepts "buy"/"sell" and the single-letter "b"/"s" shorthand.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "buy" | "b" => TradeSide::Buy,
            "sell" | "s" => TradeSide::Sell,
            _ => TradeSide::Unknown,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, TradeSide::Unknown)
    }
}

impl Default for TradeSide {
    fn default() -> Self {
        TradeSide::Unknown
    }
}
