//! Per-instrument state registry
//!
//! Each instrument owns its book and three windows. State is created on
//! the first message that names the instrument and lives for the life of
//! the engine.

use std::collections::HashMap;

use tracing::debug;
use types::ids::InstrumentId;

use crate::config::EngineConfig;
use crate::order_book::{OrderBook, QuoteEvent};
use crate::window::{SlidingWindow, TradePrint};

/// Book and windows for one instrument.
#[derive(Debug, Clone)]
pub struct InstrumentState {
    pub book: OrderBook,
    /// Quote add/cancel events for the quote-fade rate.
    pub quotes: SlidingWindow<QuoteEvent>,
    /// Trades for the aggression imbalance.
    pub trades: SlidingWindow<TradePrint>,
    /// Trade prices for velocity and acceleration.
    pub prices: SlidingWindow<f64>,
}

impl InstrumentState {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            book: OrderBook::new(),
            quotes: SlidingWindow::new(config.qfr_window_ms()),
            trades: SlidingWindow::new(config.aggression_window_ms()),
            prices: SlidingWindow::new(config.price_accel_window_ms()),
        }
    }
}

/// Map from instrument name to its owned state.
#[derive(Debug, Default)]
pub struct InstrumentRegistry {
    states: HashMap<InstrumentId, InstrumentState>,
}

impl InstrumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// State for `instrument`, inserted on first reference.
    pub fn resolve(&mut self, config: &EngineConfig, instrument: &InstrumentId) -> &mut InstrumentState {
        self.states.entry(instrument.clone()).or_insert_with(|| {
            debug!(instrument = %instrument, "Tracking new instrument");
            InstrumentState::new(config)
        })
    }

    pub fn get(&self, instrument: &InstrumentId) -> Option<&InstrumentState> {
        self.states.get(instrument)
    }

    /// Number of instruments tracked.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
