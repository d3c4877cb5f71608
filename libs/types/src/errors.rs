//! Error types for parsing feed-level values
//!
//! Comprehensive error taxonomy using thiserror

use thiserror::Error;

/// Failure to interpret an exchange-provided value
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Instrument {name} is not an option name (expected UNDERLYING-EXPIRY-STRIKE-TYPE)")]
    NotAnOption { name: String },

    #[error("Invalid strike in {name}: {strike}")]
    InvalidStrike { name: String, strike: String },

    #[error("Unrecognized expiry date: {expiry}")]
    InvalidExpiry { expiry: String },

    #[error("Price {value} cannot be represented as a decimal")]
    InvalidPrice { value: String },
}
