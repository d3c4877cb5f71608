//! Adaptive baselines for metric values
//!
//! Each (metric, instrument) pair owns an exponential moving average and
//! exponential moving variance, updated in O(1) per sample:
//!
//! ```text
//! first sample:  ema = x, var = 0
//! afterwards:    d = x − ema
//!                ema += α·d
//!                var = (1 − α)·(var + α·d²)
//! α = 2 / (period + 1)
//! ```
//!
//! The variance is biased low over the first few samples.

use std::collections::HashMap;

use types::ids::InstrumentId;

use crate::config::EngineConfig;
use crate::record::{MetricFamily, MetricValue};

/// EMA/SD estimator for one metric stream.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineTracker {
    alpha: f64,
    ema: Option<f64>,
    variance: f64,
}

impl BaselineTracker {
    /// Create a tracker with smoothing horizon `period` (clamped to ≥ 1).
    pub fn new(period: u32) -> Self {
        let period = period.max(1);
        Self {
            alpha: 2.0 / (f64::from(period) + 1.0),
            ema: None,
            variance: 0.0,
        }
    }

    /// Fold in a new observation, returning the updated (ema, sd).
    pub fn update(&mut self, value: f64) -> (f64, f64) {
        let ema = match self.ema {
            None => {
                self.variance = 0.0;
                value
            }
            Some(ema) => {
                let diff = value - ema;
                self.variance = (1.0 - self.alpha) * (self.variance + self.alpha * diff * diff);
                ema + self.alpha * diff
            }
        };
        self.ema = Some(ema);
        (ema, self.variance.sqrt())
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Current EMA, `None` before the first observation.
    pub fn ema(&self) -> Option<f64> {
        self.ema
    }

    pub fn sd(&self) -> f64 {
        self.variance.sqrt()
    }
}

/// All baselines owned by the engine, created lazily per (metric, instrument).
#[derive(Debug, Default)]
pub struct BaselineRegistry {
    trackers: HashMap<(&'static str, InstrumentId), BaselineTracker>,
}

impl BaselineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pass a raw value through its tracker, creating the tracker with the
    /// configured period on first use.
    pub fn observe(
        &mut self,
        config: &EngineConfig,
        family: MetricFamily,
        metric: &'static str,
        instrument: &InstrumentId,
        raw: f64,
    ) -> MetricValue {
        let tracker = self
            .trackers
            .entry((metric, instrument.clone()))
            .or_insert_with(|| BaselineTracker::new(config.period_for(metric, family)));
        let (ema, sd) = tracker.update(raw);
        MetricValue { raw, ema, sd }
    }

    pub fn get(&self, metric: &'static str, instrument: &InstrumentId) -> Option<&BaselineTracker> {
        self.trackers.get(&(metric, instrument.clone()))
    }

    /// Number of live trackers.
    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }
}
