//! Inbound message definitions for the metrics engine
//!
//! Ingesters normalize every exchange feed into three message kinds
//! (`book`, `trade`, `ticker`). This module defines the typed form the
//! engine consumes and the JSON decoding that produces it.
//!
//! Decoding is lenient about numbers: a numeric field may be a JSON number
//! or a numeric string, and a missing or non-numeric field becomes 0.0.
//! Every such default is recorded on the message as a [`QualityIssue`] so
//! metrics computed from it can be flagged downstream.

use rust_decimal::Decimal;
use serde::Deserialize;
use types::ids::{ExchangeId, InstrumentId};
use types::numeric::{decimal_from_f64, decimal_from_str};
use types::side::TradeSide;

use crate::record::QualityIssue;

/// Errors that make a raw message unusable.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("malformed message JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown message type: {0}")]
    UnknownKind(String),

    #[error("message of type {kind} has no instrument")]
    MissingInstrument { kind: String },
}

/// Message kind discriminant, for logging and dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Book,
    Trade,
    Ticker,
}

impl MessageKind {
    pub fn label(&self) -> &'static str {
        match self {
            MessageKind::Book => "book",
            MessageKind::Trade => "trade",
            MessageKind::Ticker => "ticker",
        }
    }
}

/// One side's price level delta. A non-positive size removes the level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelDelta {
    pub price: Decimal,
    pub size: Decimal,
}

impl LevelDelta {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

/// Implied volatility and delta snapshot for one option.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TickerUpdate {
    pub mark_iv: f64,
    pub bid_iv: f64,
    pub ask_iv: f64,
    pub delta: f64,
}

/// Kind-specific payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Book {
        bids: Vec<LevelDelta>,
        asks: Vec<LevelDelta>,
    },
    Trade {
        price: f64,
        size: f64,
        side: TradeSide,
    },
    Ticker(TickerUpdate),
}

/// A normalized market-data message.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Exchange that produced the message.
    pub exchange: ExchangeId,
    /// Instrument the message refers to.
    pub instrument: InstrumentId,
    /// Exchange timestamp in Unix milliseconds.
    pub timestamp: i64,
    /// Kind-specific payload.
    pub payload: Payload,
    /// Inputs that had to be defaulted while decoding.
    pub issues: Vec<QualityIssue>,
}

impl InboundMessage {
    /// Build a book delta message from float levels.
    ///
    /// Levels whose price is not finite are skipped and flagged.
    pub fn book(
        exchange: impl Into<ExchangeId>,
        instrument: impl Into<InstrumentId>,
        timestamp: i64,
        bids: &[(f64, f64)],
        asks: &[(f64, f64)],
    ) -> Self {
        let mut issues = Vec::new();
        let bids = float_levels(bids, &mut issues);
        let asks = float_levels(asks, &mut issues);
        Self {
            exchange: exchange.into(),
            instrument: instrument.into(),
            timestamp,
            payload: Payload::Book { bids, asks },
            issues,
        }
    }

    pub fn trade(
        exchange: impl Into<ExchangeId>,
        instrument: impl Into<InstrumentId>,
        timestamp: i64,
        price: f64,
        size: f64,
        side: TradeSide,
    ) -> Self {
        let issues = if side.is_known() {
            Vec::new()
        } else {
            vec![QualityIssue::UnknownSide]
        };
        Self {
            exchange: exchange.into(),
            instrument: instrument.into(),
            timestamp,
            payload: Payload::Trade { price, size, side },
            issues,
        }
    }

    pub fn ticker(
        exchange: impl Into<ExchangeId>,
        instrument: impl Into<InstrumentId>,
        timestamp: i64,
        update: TickerUpdate,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            instrument: instrument.into(),
            timestamp,
            payload: Payload::Ticker(update),
            issues: Vec::new(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match &self.payload {
            Payload::Book { .. } => MessageKind::Book,
            Payload::Trade { .. } => MessageKind::Trade,
            Payload::Ticker(_) => MessageKind::Ticker,
        }
    }

    /// Whether any input had to be defaulted.
    pub fn is_degraded(&self) -> bool {
        !self.issues.is_empty()
    }

    /// Decode one JSON message as produced by the ingesters.
    pub fn from_json(json: &str) -> Result<Self, MessageError> {
        let wire: WireMessage = serde_json::from_str(json)?;
        wire.normalize()
    }
}

/// A JSON number or a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WireNumber {
    Num(f64),
    Text(String),
}

impl WireNumber {
    /// Finite value only; `NaN`, `inf` and overflowing text count as absent.
    fn as_f64(&self) -> Option<f64> {
        let value = match self {
            WireNumber::Num(v) => Some(*v),
            WireNumber::Text(s) => s.trim().parse::<f64>().ok(),
        };
        value.filter(|v| v.is_finite())
    }

    fn as_decimal(&self) -> Option<Decimal> {
        match self {
            WireNumber::Num(v) => decimal_from_f64(*v).ok(),
            WireNumber::Text(s) => decimal_from_str(s).ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    exchange: Option<String>,
    #[serde(default, alias = "symbol")]
    instrument: Option<String>,
    #[serde(default)]
    timestamp: Option<WireNumber>,
    #[serde(default)]
    bids: Option<Vec<Vec<WireNumber>>>,
    #[serde(default)]
    asks: Option<Vec<Vec<WireNumber>>>,
    #[serde(default)]
    price: Option<WireNumber>,
    #[serde(default)]
    size: Option<WireNumber>,
    #[serde(default)]
    side: Option<String>,
    #[serde(default)]
    mark_iv: Option<WireNumber>,
    #[serde(default)]
    bid_iv: Option<WireNumber>,
    #[serde(default)]
    ask_iv: Option<WireNumber>,
    #[serde(default)]
    delta: Option<WireNumber>,
}

impl WireMessage {
    fn normalize(self) -> Result<InboundMessage, MessageError> {
        let instrument = match self.instrument.as_deref() {
            Some(name) if !name.is_empty() => InstrumentId::new(name),
            _ => {
                return Err(MessageError::MissingInstrument {
                    kind: self.kind.clone(),
                })
            }
        };

        let mut issues = Vec::new();

        let exchange = match &self.exchange {
            Some(name) => ExchangeId::new(name.as_str()),
            None => {
                issues.push(QualityIssue::MissingField("exchange".to_string()));
                ExchangeId::default()
            }
        };

        let timestamp = match self.timestamp.as_ref().and_then(WireNumber::as_f64) {
            Some(ts) => ts as i64,
            None => {
                issues.push(QualityIssue::MissingField("timestamp".to_string()));
                0
            }
        };

        let payload = match self.kind.as_str() {
            "book" => Payload::Book {
                bids: wire_levels(self.bids.as_deref().unwrap_or_default(), &mut issues),
                asks: wire_levels(self.asks.as_deref().unwrap_or_default(), &mut issues),
            },
            "trade" => {
                let price = number_or_zero("price", self.price.as_ref(), &mut issues);
                let size = number_or_zero("size", self.size.as_ref(), &mut issues);
                let side = TradeSide::parse(self.side.as_deref().unwrap_or_default());
                if !side.is_known() {
                    issues.push(QualityIssue::UnknownSide);
                }
                Payload::Trade { price, size, side }
            }
            "ticker" => Payload::Ticker(TickerUpdate {
                mark_iv: number_or_zero("mark_iv", self.mark_iv.as_ref(), &mut issues),
                bid_iv: number_or_zero("bid_iv", self.bid_iv.as_ref(), &mut issues),
                ask_iv: number_or_zero("ask_iv", self.ask_iv.as_ref(), &mut issues),
                delta: number_or_zero("delta", self.delta.as_ref(), &mut issues),
            }),
            other => return Err(MessageError::UnknownKind(other.to_string())),
        };

        Ok(InboundMessage {
            exchange,
            instrument,
            timestamp,
            payload,
            issues,
        })
    }
}

fn number_or_zero(field: &str, value: Option<&WireNumber>, issues: &mut Vec<QualityIssue>) -> f64 {
    match value.and_then(WireNumber::as_f64) {
        Some(v) => v,
        None => {
            issues.push(QualityIssue::MissingField(field.to_string()));
            0.0
        }
    }
}

fn wire_levels(levels: &[Vec<WireNumber>], issues: &mut Vec<QualityIssue>) -> Vec<LevelDelta> {
    let mut out = Vec::with_capacity(levels.len());
    for level in levels {
        let price = level.first().and_then(WireNumber::as_decimal);
        let size = level.get(1).and_then(WireNumber::as_decimal);
        match (price, size) {
            (Some(price), Some(size)) => out.push(LevelDelta::new(price, size)),
            // An unreadable size must not turn into a level removal
            (Some(_), None) => issues.push(QualityIssue::MissingField("size".to_string())),
            (None, _) => issues.push(QualityIssue::InvalidPriceLevel),
        }
    }
    out
}

fn float_levels(levels: &[(f64, f64)], issues: &mut Vec<QualityIssue>) -> Vec<LevelDelta> {
    let mut out = Vec::with_capacity(levels.len());
    for &(price, size) in levels {
        match (decimal_from_f64(price), decimal_from_f64(size)) {
            (Ok(price), Ok(size)) => out.push(LevelDelta::new(price, size)),
            (Ok(_), Err(_)) => issues.push(QualityIssue::MissingField("size".to_string())),
            (Err(_), _) => issues.push(QualityIssue::InvalidPriceLevel),
        }
    }
    out
}
