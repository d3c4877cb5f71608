//! In-memory order book built from exchange depth deltas
//!
//! Maintains one instrument's price-level ledger from `[price, size]`
//! deltas. Uses `BTreeMap<Decimal, Decimal>` per side so best prices are
//! the map ends and iteration is deterministic.
//!
//! Delta semantics, per side:
//! - size ≤ 0 on an existing level → level removed, `Cancel` event
//! - size ≤ 0 on an absent level → no-op
//! - size > 0 on an absent level → level inserted, `Add` event
//! - size > 0 on an existing level → size overwritten, no event
//!
//! A level exists only while its size is positive.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use types::numeric::decimal_to_f64;

use crate::messages::LevelDelta;

/// Quote lifecycle event produced by applying a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuoteEvent {
    /// A new price level appeared.
    Add,
    /// An existing price level was pulled.
    Cancel,
}

/// Best bid and best ask, both present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BestPrices {
    pub bid: Decimal,
    pub ask: Decimal,
}

impl BestPrices {
    pub fn mid(&self) -> f64 {
        (decimal_to_f64(self.bid) + decimal_to_f64(self.ask)) / 2.0
    }

    /// Spread in basis points of mid.
    pub fn spread_bps(&self) -> f64 {
        let mid = self.mid();
        if mid == 0.0 {
            return 0.0;
        }
        (decimal_to_f64(self.ask) - decimal_to_f64(self.bid)) / mid * 10_000.0
    }
}

/// Aggregate resting size near mid.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BandDepth {
    pub bid: f64,
    pub ask: f64,
}

/// Price-level ledger for a single instrument.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    /// Bid levels: price → size (ascending; best bid is the last key).
    bids: BTreeMap<Decimal, Decimal>,
    /// Ask levels: price → size (ascending; best ask is the first key).
    asks: BTreeMap<Decimal, Decimal>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply bid and ask deltas, returning the add/cancel events in the
    /// order the deltas were applied (bids first).
    pub fn apply(&mut self, bids: &[LevelDelta], asks: &[LevelDelta]) -> Vec<QuoteEvent> {
        let mut events = Vec::new();
        apply_side(&mut self.bids, bids, &mut events);
        apply_side(&mut self.asks, asks, &mut events);
        events
    }

    /// Best bid (highest) and best ask (lowest); `None` unless both sides
    /// have at least one level.
    pub fn best_prices(&self) -> Option<BestPrices> {
        let bid = *self.bids.keys().next_back()?;
        let ask = *self.asks.keys().next()?;
        Some(BestPrices { bid, ask })
    }

    /// Sum of sizes within `band` (fraction of mid) on each side of mid.
    ///
    /// Bids count at price ≥ mid·(1−band), asks at price ≤ mid·(1+band).
    /// Zero on both sides when the book has no valid best prices.
    pub fn depth_within(&self, band: f64) -> BandDepth {
        let Some(best) = self.best_prices() else {
            return BandDepth::default();
        };
        let mid = best.mid();
        let bid_limit = mid * (1.0 - band);
        let ask_limit = mid * (1.0 + band);

        let bid = self
            .bids
            .iter()
            .rev()
            .take_while(|(price, _)| decimal_to_f64(**price) >= bid_limit)
            .map(|(_, size)| decimal_to_f64(*size))
            .sum();
        let ask = self
            .asks
            .iter()
            .take_while(|(price, _)| decimal_to_f64(**price) <= ask_limit)
            .map(|(_, size)| decimal_to_f64(*size))
            .sum();

        BandDepth { bid, ask }
    }

    /// Size resting at a bid price, if the level exists.
    pub fn bid_size(&self, price: Decimal) -> Option<Decimal> {
        self.bids.get(&price).copied()
    }

    /// Size resting at an ask price, if the level exists.
    pub fn ask_size(&self, price: Decimal) -> Option<Decimal> {
        self.asks.get(&price).copied()
    }

    /// Number of bid price levels.
    pub fn bid_levels(&self) -> usize {
        self.bids.len()
    }

    /// Number of ask price levels.
    pub fn ask_levels(&self) -> usize {
        self.asks.len()
    }

    /// Iterate all levels of both sides as (price, size).
    pub fn levels(&self) -> impl Iterator<Item = (&Decimal, &Decimal)> {
        self.bids.iter().chain(self.asks.iter())
    }
}

fn apply_side(levels: &mut BTreeMap<Decimal, Decimal>, deltas: &[LevelDelta], events: &mut Vec<QuoteEvent>) {
    for delta in deltas {
        if delta.size <= Decimal::ZERO {
            if let Some(prev) = levels.remove(&delta.price) {
                if prev > Decimal::ZERO {
                    events.push(QuoteEvent::Cancel);
                }
            }
        } else if levels.insert(delta.price, delta.size).is_none() {
            events.push(QuoteEvent::Add);
        }
    }
}
