//! Computed metric records
//!
//! A `MetricRecord` is the immutable unit the engine emits: one exchange,
//! one instrument, one family of metrics, each metric carried as its raw
//! value plus the EMA and SD of its baseline. Serialized, a record looks
//! like
//!
//! ```text
//! {"exchange":"binance","instrument":"BTCUSDT","timestamp":1672515782136,
//!  "micro":{"spread_bps":9.95,"spread_bps_ema":9.95,"spread_bps_sd":0.0,...},
//!  "quality":{"status":"clean"}}
//! ```

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use types::ids::{ExchangeId, InstrumentId};

/// Metric family, which is also the key the metrics are nested under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricFamily {
    Micro,
    Options,
}

impl MetricFamily {
    pub fn key(&self) -> &'static str {
        match self {
            MetricFamily::Micro => "micro",
            MetricFamily::Options => "options",
        }
    }
}

/// Microstructure metric names, in emission order.
pub const MICRO_METRICS: [&str; 7] = [
    "spread_bps",
    "depth_bid",
    "depth_ask",
    "qfr",
    "aggr_imbalance",
    "velocity",
    "acceleration",
];

/// Option metric names, in emission order.
pub const OPTION_METRICS: [&str; 4] = ["atm_iv", "skew_25d", "term_slope", "iv_bid_ask_spread"];

/// A metric value with its adaptive baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub raw: f64,
    pub ema: f64,
    pub sd: f64,
}

impl MetricValue {
    /// Distance of the raw value from its EMA in standard deviations.
    ///
    /// `None` while the baseline has no dispersion yet.
    pub fn z_score(&self) -> Option<f64> {
        if self.sd > 0.0 {
            Some((self.raw - self.ema) / self.sd)
        } else {
            None
        }
    }
}

/// A specific reason a record's inputs were not fully trustworthy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "issue", content = "field", rename_all = "snake_case")]
pub enum QualityIssue {
    /// A field was absent or non-numeric and was defaulted.
    MissingField(String),
    /// A book level with an unrepresentable price was skipped.
    InvalidPriceLevel,
    /// A trade side was neither buy nor sell.
    UnknownSide,
    /// An option name did not parse; the ticker was bucketed under an empty expiry.
    UnparsedInstrument,
    /// The expiry had no call or no put; skew was reported as 0.
    MissingSkewLeg,
}

/// Whether a record was computed from complete inputs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DataQuality {
    #[default]
    Clean,
    Degraded { issues: Vec<QualityIssue> },
}

impl DataQuality {
    pub fn from_issues(issues: Vec<QualityIssue>) -> Self {
        if issues.is_empty() {
            DataQuality::Clean
        } else {
            DataQuality::Degraded { issues }
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, DataQuality::Clean)
    }

    pub fn issues(&self) -> &[QualityIssue] {
        match self {
            DataQuality::Clean => &[],
            DataQuality::Degraded { issues } => issues,
        }
    }
}

/// Immutable output of one engine update.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub exchange: ExchangeId,
    pub instrument: InstrumentId,
    /// Timestamp of the message that triggered the computation (ms).
    pub timestamp: i64,
    pub family: MetricFamily,
    /// Metric name → value, in emission order.
    pub metrics: Vec<(&'static str, MetricValue)>,
    pub quality: DataQuality,
}

impl MetricRecord {
    /// Look up a metric by name.
    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.metrics
            .iter()
            .find(|(metric, _)| *metric == name)
            .map(|(_, value)| value)
    }

    /// Raw value of a metric.
    pub fn raw(&self, name: &str) -> Option<f64> {
        self.get(name).map(|v| v.raw)
    }

    /// Serialize as a single JSON line.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Nested family map: `name`, `name_ema`, `name_sd` for each metric.
struct FamilyFields<'a>(&'a [(&'static str, MetricValue)]);

impl Serialize for FamilyFields<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len() * 3))?;
        for (name, value) in self.0 {
            map.serialize_entry(name, &value.raw)?;
        }
        for (name, value) in self.0 {
            map.serialize_entry(&format!("{name}_ema"), &value.ema)?;
            map.serialize_entry(&format!("{name}_sd"), &value.sd)?;
        }
        map.end()
    }
}

impl Serialize for MetricRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(5))?;
        map.serialize_entry("exchange", &self.exchange)?;
        map.serialize_entry("instrument", &self.instrument)?;
        map.serialize_entry("timestamp", &self.timestamp)?;
        map.serialize_entry(self.family.key(), &FamilyFields(&self.metrics))?;
        map.serialize_entry("quality", &self.quality)?;
        map.end()
    }
}
