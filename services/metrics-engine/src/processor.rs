//! Message dispatch and metric computation
//!
//! `MetricsProcessor` is the single owner of all mutable engine state:
//! instrument books and windows, baselines, and the option expiry set. It
//! is synchronous; the fan-in loop feeds it one message at a time and
//! publishes whatever records come back.

use tracing::{debug, trace};

use crate::baseline::BaselineRegistry;
use crate::config::EngineConfig;
use crate::instrument::{InstrumentRegistry, InstrumentState};
use crate::messages::{InboundMessage, Payload};
use crate::options::OptionsAggregator;
use crate::record::{DataQuality, MetricFamily, MetricRecord, MetricValue, QualityIssue};
use crate::window::{acceleration, aggression_imbalance, quote_fade_rate, velocity, TradePrint};

/// Owns engine state and turns messages into metric records.
#[derive(Debug)]
pub struct MetricsProcessor {
    config: EngineConfig,
    instruments: InstrumentRegistry,
    baselines: BaselineRegistry,
    options: OptionsAggregator,
}

impl MetricsProcessor {
    pub fn new(config: EngineConfig) -> Self {
        let options = OptionsAggregator::new(config.expiry_ordering);
        Self {
            config,
            instruments: InstrumentRegistry::new(),
            baselines: BaselineRegistry::new(),
            options,
        }
    }

    /// Apply one message and return the records it produced, in order:
    /// a microstructure record whenever the instrument's book has both
    /// sides, then an options record for ticker messages.
    pub fn process(&mut self, msg: &InboundMessage) -> Vec<MetricRecord> {
        let ts = msg.timestamp;
        trace!(kind = msg.kind().label(), instrument = %msg.instrument, ts, "Processing message");
        let state = self.instruments.resolve(&self.config, &msg.instrument);

        match &msg.payload {
            Payload::Book { bids, asks } => {
                let events = state.book.apply(bids, asks);
                state.quotes.extend(ts, events);
            }
            Payload::Trade { price, size, side } => {
                state.trades.push(ts, TradePrint { size: *size, side: *side });
                state.prices.push(ts, *price);
            }
            Payload::Ticker(_) => {}
        }

        let mut records = Vec::with_capacity(2);

        if let Some(raw) = micro_values(state, self.config.depth_pct_band) {
            // Ticker inputs say nothing about the book; only book/trade
            // issues taint a microstructure record.
            let issues = match msg.payload {
                Payload::Ticker(_) => Vec::new(),
                _ => msg.issues.clone(),
            };
            records.push(self.build_record(msg, MetricFamily::Micro, &raw, issues));
        }

        if let Payload::Ticker(update) = &msg.payload {
            match self.options.on_ticker(&msg.instrument, update) {
                Some(snapshot) => {
                    let mut issues = msg.issues.clone();
                    issues.extend(snapshot.issues.iter().cloned());
                    records.push(self.build_record(msg, MetricFamily::Options, &snapshot.values(), issues));
                }
                None => debug!(instrument = %msg.instrument, "Empty expiry set after ticker; skipping"),
            }
        }

        records
    }

    fn build_record(
        &mut self,
        msg: &InboundMessage,
        family: MetricFamily,
        raw: &[(&'static str, f64)],
        issues: Vec<QualityIssue>,
    ) -> MetricRecord {
        let metrics: Vec<(&'static str, MetricValue)> = raw
            .iter()
            .map(|&(name, value)| {
                let value = self
                    .baselines
                    .observe(&self.config, family, name, &msg.instrument, value);
                (name, value)
            })
            .collect();

        MetricRecord {
            exchange: msg.exchange.clone(),
            instrument: msg.instrument.clone(),
            timestamp: msg.timestamp,
            family,
            metrics,
            quality: DataQuality::from_issues(issues),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn instruments(&self) -> &InstrumentRegistry {
        &self.instruments
    }

    pub fn baselines(&self) -> &BaselineRegistry {
        &self.baselines
    }

    pub fn options(&self) -> &OptionsAggregator {
        &self.options
    }
}

/// Raw microstructure values, or `None` if the book lacks a bid or an ask.
fn micro_values(state: &InstrumentState, band: f64) -> Option<[(&'static str, f64); 7]> {
    let best = state.book.best_prices()?;
    let depth = state.book.depth_within(band);
    Some([
        ("spread_bps", best.spread_bps()),
        ("depth_bid", depth.bid),
        ("depth_ask", depth.ask),
        ("qfr", quote_fade_rate(&state.quotes)),
        ("aggr_imbalance", aggression_imbalance(&state.trades)),
        ("velocity", velocity(&state.prices)),
        ("acceleration", acceleration(&state.prices)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::TickerUpdate;
    use crate::record::{MICRO_METRICS, OPTION_METRICS};
    use types::side::TradeSide;

    fn processor() -> MetricsProcessor {
        MetricsProcessor::new(EngineConfig::default())
    }

    fn book(ts: i64, bids: &[(f64, f64)], asks: &[(f64, f64)]) -> InboundMessage {
        InboundMessage::book("binance", "BTCUSDT", ts, bids, asks)
    }

    #[test]
    fn test_one_sided_book_emits_nothing() {
        let mut p = processor();
        assert!(p.process(&book(0, &[(100.0, 1.0)], &[])).is_empty());
    }

    #[test]
    fn test_book_emits_micro_record() {
        let mut p = processor();
        let records = p.process(&book(0, &[(100.0, 1.0)], &[(101.0, 1.0)]));

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.family, MetricFamily::Micro);
        assert_eq!(record.exchange.as_str(), "binance");

        let names: Vec<&str> = record.metrics.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, MICRO_METRICS.to_vec());

        let spread = record.get("spread_bps").unwrap();
        assert!((spread.raw - 99.50248756).abs() < 1e-6);
        assert_eq!(spread.ema, spread.raw);
        assert_eq!(spread.sd, 0.0);
        assert!(record.quality.is_clean());
    }

    #[test]
    fn test_removal_of_only_ask_stops_emission() {
        let mut p = processor();
        assert_eq!(p.process(&book(0, &[(100.0, 1.0)], &[(101.0, 1.0)])).len(), 1);
        assert!(p.process(&book(1, &[], &[(101.0, 0.0)])).is_empty());
    }

    #[test]
    fn test_qfr_tracks_book_events() {
        let mut p = processor();
        p.process(&book(0, &[(100.0, 1.0), (99.0, 1.0)], &[(101.0, 1.0)]));
        let records = p.process(&book(10, &[(99.0, 0.0)], &[]));

        // 3 adds, 1 cancel
        let qfr = records[0].raw("qfr").unwrap();
        assert!((qfr - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_qfr_window_expires_events() {
        let mut p = processor();
        p.process(&book(0, &[(100.0, 1.0), (99.0, 1.0)], &[(101.0, 1.0)]));
        // 6 s later with a 5 s window: only the new cancel remains
        let records = p.process(&book(6_000, &[(99.0, 0.0)], &[]));
        let qfr = records[0].raw("qfr").unwrap();
        assert!((qfr - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_trades_feed_imbalance_and_velocity() {
        let mut p = processor();
        p.process(&book(0, &[(100.0, 1.0)], &[(101.0, 1.0)]));
        p.process(&InboundMessage::trade("binance", "BTCUSDT", 0, 100.0, 3.0, TradeSide::Buy));
        let records = p.process(&InboundMessage::trade("binance", "BTCUSDT", 10, 105.0, 1.0, TradeSide::Sell));

        let record = &records[0];
        assert!((record.raw("aggr_imbalance").unwrap() - 0.5).abs() < 1e-6);
        assert_eq!(record.raw("velocity"), Some(0.5));
        assert_eq!(record.raw("acceleration"), Some(0.0));
    }

    #[test]
    fn test_trade_without_book_emits_nothing() {
        let mut p = processor();
        let records = p.process(&InboundMessage::trade("binance", "ETHUSDT", 0, 3000.0, 1.0, TradeSide::Buy));
        assert!(records.is_empty());
        assert_eq!(p.instruments().len(), 1);
    }

    #[test]
    fn test_degraded_trade_flags_micro_record() {
        let mut p = processor();
        p.process(&book(0, &[(100.0, 1.0)], &[(101.0, 1.0)]));
        let records = p.process(&InboundMessage::trade("binance", "BTCUSDT", 1, 100.0, 1.0, TradeSide::Unknown));
        assert_eq!(records[0].quality.issues(), &[QualityIssue::UnknownSide]);
    }

    #[test]
    fn test_ticker_emits_options_record() {
        let mut p = processor();
        let update = TickerUpdate {
            mark_iv: 55.0,
            bid_iv: 54.8,
            ask_iv: 55.2,
            delta: 0.45,
        };
        let records = p.process(&InboundMessage::ticker("deribit", "BTC-27JUN25-100000-C", 1, update));

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.family, MetricFamily::Options);
        let names: Vec<&str> = record.metrics.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, OPTION_METRICS.to_vec());
        assert_eq!(record.raw("atm_iv"), Some(55.0));
        // only a call at this expiry
        assert_eq!(record.quality.issues(), &[QualityIssue::MissingSkewLeg]);
    }

    #[test]
    fn test_ticker_on_instrument_with_book_emits_both() {
        let mut p = processor();
        let name = "BTC-27JUN25-100000-C";
        p.process(&InboundMessage::book("deribit", name, 0, &[(0.05, 10.0)], &[(0.06, 10.0)]));

        let update = TickerUpdate {
            mark_iv: 55.0,
            bid_iv: 54.8,
            ask_iv: 55.2,
            delta: 0.45,
        };
        let records = p.process(&InboundMessage::ticker("deribit", name, 1, update));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].family, MetricFamily::Micro);
        assert!(records[0].quality.is_clean());
        assert_eq!(records[1].family, MetricFamily::Options);
    }

    #[test]
    fn test_baselines_are_per_instrument() {
        let mut p = processor();
        p.process(&InboundMessage::book("binance", "A", 0, &[(100.0, 1.0)], &[(101.0, 1.0)]));
        p.process(&InboundMessage::book("binance", "B", 0, &[(100.0, 1.0)], &[(102.0, 1.0)]));

        // 7 micro metrics × 2 instruments
        assert_eq!(p.baselines().len(), 14);
    }

    #[test]
    fn test_baseline_updates_across_records() {
        let mut p = processor();
        p.process(&book(0, &[(100.0, 1.0)], &[(101.0, 1.0)]));
        let records = p.process(&book(1, &[], &[(101.0, 5.0)]));

        // depth_ask changed from 1 to 5; ema moves toward it
        let depth = records[0].get("depth_ask").unwrap();
        assert_eq!(depth.raw, 5.0);
        assert!(depth.ema > 1.0 && depth.ema < 5.0);
        assert!(depth.sd > 0.0);
    }

    #[test]
    fn test_out_of_order_extreme_timestamps_still_emit() {
        let mut p = processor();
        p.process(&book(0, &[(100.0, 1.0)], &[(101.0, 1.0)]));
        p.process(&InboundMessage::trade("binance", "BTCUSDT", i64::MAX, 100.0, 1.0, TradeSide::Buy));
        let records = p.process(&InboundMessage::trade("binance", "BTCUSDT", -2, 101.0, 1.0, TradeSide::Sell));

        assert_eq!(records.len(), 1);
        assert!(records[0].raw("velocity").unwrap().is_finite());
    }
}
