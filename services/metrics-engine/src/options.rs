//! Cross-instrument option analytics
//!
//! Keeps the latest ticker of every option seen, grouped by expiry, and on
//! each ticker update derives:
//!
//! - `atm_iv`: mark IV of the option at the triggering expiry whose |delta| is smallest
//! - `skew_25d`: mark IV of the 25-delta put minus that of the 25-delta call
//! - `term_slope`: ATM IV of the second-nearest expiry minus the nearest one
//! - `iv_bid_ask_spread`: ask IV minus bid IV of the triggering ticker itself
//!
//! Selection ties (equal delta distance) go to the lower strike, then to
//! the lexically smaller instrument name, so results do not depend on
//! arrival order.

use std::collections::BTreeMap;

use tracing::debug;
use types::ids::InstrumentId;
use types::option::{parse_expiry_date, parse_option_instrument, OptionInstrument};

use crate::config::ExpiryOrdering;
use crate::messages::TickerUpdate;
use crate::record::QualityIssue;

/// Latest known state of one option.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionTicker {
    pub instrument: InstrumentId,
    pub identity: OptionInstrument,
    pub mark_iv: f64,
    pub bid_iv: f64,
    pub ask_iv: f64,
    pub delta: f64,
}

/// Latest ticker per instrument, grouped by expiry string.
///
/// Tickers whose names did not parse live under the empty expiry key.
#[derive(Debug, Clone, Default)]
pub struct ExpirySet {
    expiries: BTreeMap<String, BTreeMap<InstrumentId, OptionTicker>>,
}

impl ExpirySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace (last write wins) a ticker under its expiry.
    pub fn upsert(&mut self, ticker: OptionTicker) {
        self.expiries
            .entry(ticker.identity.expiry.clone())
            .or_default()
            .insert(ticker.instrument.clone(), ticker);
    }

    pub fn tickers_at(&self, expiry: &str) -> Option<&BTreeMap<InstrumentId, OptionTicker>> {
        self.expiries.get(expiry)
    }

    /// Real expiries (the unparsed bucket excluded) in the requested order.
    pub fn sorted_expiries(&self, ordering: ExpiryOrdering) -> Vec<&str> {
        let mut expiries: Vec<&str> = self
            .expiries
            .keys()
            .map(String::as_str)
            .filter(|e| !e.is_empty())
            .collect();

        if ordering == ExpiryOrdering::Chronological {
            // Dated expiries first (by date), then undated ones lexically.
            expiries.sort_by_key(|e| {
                let date = parse_expiry_date(e).ok();
                (date.is_none(), date, e.to_string())
            });
        }
        expiries
    }

    pub fn expiry_count(&self) -> usize {
        self.expiries.len()
    }

    /// Total tickers across all expiries.
    pub fn ticker_count(&self) -> usize {
        self.expiries.values().map(BTreeMap::len).sum()
    }
}

/// Pick the ticker minimizing `distance`, breaking ties by strike then name.
fn select_by<'a, I, F>(tickers: I, distance: F) -> Option<&'a OptionTicker>
where
    I: IntoIterator<Item = &'a OptionTicker>,
    F: Fn(&OptionTicker) -> f64,
{
    tickers.into_iter().min_by(|a, b| {
        distance(a)
            .total_cmp(&distance(b))
            .then_with(|| a.identity.strike.total_cmp(&b.identity.strike))
            .then_with(|| a.instrument.cmp(&b.instrument))
    })
}

/// At-the-money ticker: smallest |delta|.
pub fn select_atm<'a>(tickers: impl IntoIterator<Item = &'a OptionTicker>) -> Option<&'a OptionTicker> {
    select_by(tickers, |t| t.delta.abs())
}

/// Call whose delta is nearest +0.25.
pub fn select_call_25d<'a>(tickers: impl IntoIterator<Item = &'a OptionTicker>) -> Option<&'a OptionTicker> {
    select_by(
        tickers.into_iter().filter(|t| t.identity.is_call()),
        |t| (t.delta - 0.25).abs(),
    )
}

/// Put whose delta is nearest −0.25.
pub fn select_put_25d<'a>(tickers: impl IntoIterator<Item = &'a OptionTicker>) -> Option<&'a OptionTicker> {
    select_by(
        tickers.into_iter().filter(|t| t.identity.is_put()),
        |t| (t.delta + 0.25).abs(),
    )
}

/// Option metrics derived from one ticker update.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionSnapshot {
    pub atm_iv: f64,
    pub skew_25d: f64,
    pub term_slope: f64,
    pub iv_bid_ask_spread: f64,
    pub issues: Vec<QualityIssue>,
}

impl OptionSnapshot {
    /// Raw values in emission order.
    pub fn values(&self) -> [(&'static str, f64); 4] {
        [
            ("atm_iv", self.atm_iv),
            ("skew_25d", self.skew_25d),
            ("term_slope", self.term_slope),
            ("iv_bid_ask_spread", self.iv_bid_ask_spread),
        ]
    }
}

/// Maintains the expiry set and derives option analytics.
#[derive(Debug, Clone, Default)]
pub struct OptionsAggregator {
    expiries: ExpirySet,
    ordering: ExpiryOrdering,
}

impl OptionsAggregator {
    pub fn new(ordering: ExpiryOrdering) -> Self {
        Self {
            expiries: ExpirySet::new(),
            ordering,
        }
    }

    /// Record a ticker and compute the option snapshot for its expiry.
    ///
    /// Returns `None` only if the expiry bucket is empty after recording,
    /// which cannot happen for a well-formed update.
    pub fn on_ticker(&mut self, instrument: &InstrumentId, update: &TickerUpdate) -> Option<OptionSnapshot> {
        let mut issues = Vec::new();

        let parsed = parse_option_instrument(instrument.as_str());
        if !parsed.is_parsed() {
            debug!(instrument = %instrument, "Unparseable option instrument name");
            issues.push(QualityIssue::UnparsedInstrument);
        }
        let identity = parsed.into_instrument();
        let expiry = identity.expiry.clone();

        self.expiries.upsert(OptionTicker {
            instrument: instrument.clone(),
            identity,
            mark_iv: update.mark_iv,
            bid_iv: update.bid_iv,
            ask_iv: update.ask_iv,
            delta: update.delta,
        });

        let tickers = self.expiries.tickers_at(&expiry)?;
        let atm = select_atm(tickers.values())?;

        let skew_25d = match (select_put_25d(tickers.values()), select_call_25d(tickers.values())) {
            (Some(put), Some(call)) => put.mark_iv - call.mark_iv,
            _ => {
                issues.push(QualityIssue::MissingSkewLeg);
                0.0
            }
        };

        Some(OptionSnapshot {
            atm_iv: atm.mark_iv,
            skew_25d,
            term_slope: self.term_slope(),
            iv_bid_ask_spread: update.ask_iv - update.bid_iv,
            issues,
        })
    }

    /// ATM IV of the second expiry minus the first; 0 with fewer than two.
    pub fn term_slope(&self) -> f64 {
        let sorted = self.expiries.sorted_expiries(self.ordering);
        let [first, second, ..] = sorted.as_slice() else {
            return 0.0;
        };

        let atm_iv = |expiry: &str| {
            self.expiries
                .tickers_at(expiry)
                .and_then(|tickers| select_atm(tickers.values()))
                .map(|t| t.mark_iv)
        };

        match (atm_iv(*first), atm_iv(*second)) {
            (Some(near), Some(far)) => far - near,
            _ => 0.0,
        }
    }

    pub fn expiries(&self) -> &ExpirySet {
        &self.expiries
    }

    pub fn ordering(&self) -> ExpiryOrdering {
        self.ordering
    }
}
