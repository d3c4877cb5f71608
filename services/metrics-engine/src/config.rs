//! Engine configuration
//!
//! Every recognized key has a default that applies when the key is absent,
//! so an empty JSON object (or no file at all) is a valid configuration.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::publisher::BackpressurePolicy;
use crate::record::MetricFamily;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// How expiries are ordered when picking the two nearest for the
/// term-structure slope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryOrdering {
    /// Raw string order of the expiry segment. Matches calendar order only
    /// for ISO-style dates; "27JUN25" sorts before "28MAR25".
    #[default]
    Lexical,
    /// Parse expiries as calendar dates; unparseable expiries sort after
    /// all dated ones, lexically among themselves.
    Chronological,
}

/// Metrics engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Quote-fade window length in seconds.
    pub qfr_window_sec: u64,
    /// Depth band as a fraction of mid (0.005 = 0.5%).
    pub depth_pct_band: f64,
    /// Trade-aggression window length in seconds.
    pub aggression_window_sec: u64,
    /// Price-history window length in seconds.
    pub price_accel_window_sec: u64,
    /// EMA period for microstructure metrics.
    pub micro_smoothing_period: u32,
    /// EMA period for option metrics.
    pub options_smoothing_period: u32,
    /// Per-metric period overrides, keyed by metric name (e.g. "atm_iv").
    pub metric_periods: BTreeMap<String, u32>,
    /// Expiry ordering used for the term-structure slope.
    pub expiry_ordering: ExpiryOrdering,
    /// Capacity of each output channel.
    pub output_capacity: usize,
    /// Behaviour when an output channel is full.
    pub backpressure: BackpressurePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            qfr_window_sec: 5,
            depth_pct_band: 0.005,
            aggression_window_sec: 180,
            price_accel_window_sec: 10,
            micro_smoothing_period: 50,
            options_smoothing_period: 50,
            metric_periods: BTreeMap::new(),
            expiry_ordering: ExpiryOrdering::Lexical,
            output_capacity: 1024,
            backpressure: BackpressurePolicy::Block,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the metrics meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.depth_pct_band >= 0.0 && self.depth_pct_band < 1.0) {
            return Err(ConfigError::Invalid {
                key: "depth_pct_band",
                reason: format!("{} is outside [0, 1)", self.depth_pct_band),
            });
        }

        let windows = [
            ("qfr_window_sec", self.qfr_window_sec),
            ("aggression_window_sec", self.aggression_window_sec),
            ("price_accel_window_sec", self.price_accel_window_sec),
        ];
        for (key, value) in windows {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "window must be at least 1 second".to_string(),
                });
            }
        }

        if self.micro_smoothing_period == 0 {
            return Err(ConfigError::Invalid {
                key: "micro_smoothing_period",
                reason: "period must be at least 1".to_string(),
            });
        }
        if self.options_smoothing_period == 0 {
            return Err(ConfigError::Invalid {
                key: "options_smoothing_period",
                reason: "period must be at least 1".to_string(),
            });
        }
        if let Some((metric, _)) = self.metric_periods.iter().find(|(_, p)| **p == 0) {
            return Err(ConfigError::Invalid {
                key: "metric_periods",
                reason: format!("period for {metric} must be at least 1"),
            });
        }

        if self.output_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "output_capacity",
                reason: "capacity must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    /// Smoothing period for a metric: explicit override, else its family default.
    pub fn period_for(&self, metric: &str, family: MetricFamily) -> u32 {
        self.metric_periods.get(metric).copied().unwrap_or(match family {
            MetricFamily::Micro => self.micro_smoothing_period,
            MetricFamily::Options => self.options_smoothing_period,
        })
    }

    pub fn qfr_window_ms(&self) -> i64 {
        secs_to_ms(self.qfr_window_sec)
    }

    pub fn aggression_window_ms(&self) -> i64 {
        secs_to_ms(self.aggression_window_sec)
    }

    pub fn price_accel_window_ms(&self) -> i64 {
        secs_to_ms(self.price_accel_window_sec)
    }
}

fn secs_to_ms(secs: u64) -> i64 {
    i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX)
}
