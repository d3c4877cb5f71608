//! Decimal conversions for book prices and quantities
//!
//! Exchanges publish prices as JSON floats or numeric strings. Book levels
//! are keyed by `Decimal` so that equal prices hash and order identically
//! regardless of the wire representation; derived metrics go back to `f64`.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::errors::ParseError;

/// Convert a wire float into an exact decimal.
///
/// Uses the shortest decimal that round-trips the float, so `100.1_f64`
/// becomes `100.1` and not its binary expansion.
pub fn decimal_from_f64(value: f64) -> Result<Decimal, ParseError> {
    if !value.is_finite() {
        return Err(ParseError::InvalidPrice {
            value: value.to_string(),
        });
    }
    Decimal::from_f64(value).ok_or_else(|| ParseError::InvalidPrice {
        value: value.to_string(),
    })
}

/// Parse a numeric string ("20000.5", "1e-3") into a decimal.
pub fn decimal_from_str(value: &str) -> Result<Decimal, ParseError> {
    let trimmed = value.trim();
    trimmed
        .parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| ParseError::InvalidPrice {
            value: value.to_string(),
        })
}

/// Lossy conversion back to `f64` for metric arithmetic.
pub fn decimal_to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}
