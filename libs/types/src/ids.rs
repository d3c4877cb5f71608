//! Identifier types for feed sources and instruments
//!
//! Identifiers are the raw strings the exchanges publish. They are never
//! validated beyond being carried verbatim: a metrics pipeline must keep
//! flowing even when an exchange introduces a naming scheme we have not
//! seen before.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Exchange a message originated from (e.g. "binance", "deribit").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeId(String);

impl ExchangeId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ExchangeId {
    fn default() -> Self {
        Self(String::new())
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ExchangeId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Traded instrument name as published by the exchange
///
/// Formats seen in practice: "BTCUSDT" (spot), "BTC-PERPETUAL" (perp),
/// "BTC-27JUN25-100000-C" (option).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(String);

impl InstrumentId {
    /// Create a new InstrumentId from a string
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the instrument name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstrumentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for InstrumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
