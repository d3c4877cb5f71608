//! Time-bounded event windows
//!
//! `SlidingWindow<T>` is an append-only buffer of `(timestamp_ms, T)` kept
//! in arrival order. Every append prunes from the front all entries older
//! than `now − duration`; an entry exactly at the cutoff is retained.
//!
//! Three windows hang off each instrument: quote events (for the quote-fade
//! rate), trades (for aggression imbalance), and prices (for velocity and
//! acceleration).

use std::collections::VecDeque;

use types::side::TradeSide;

use crate::order_book::QuoteEvent;

/// Additive guard for ratio denominators.
pub const RATIO_EPSILON: f64 = 1e-9;

/// Rolling window of timestamped entries.
#[derive(Debug, Clone)]
pub struct SlidingWindow<T> {
    duration_ms: i64,
    entries: VecDeque<(i64, T)>,
}

impl<T> SlidingWindow<T> {
    pub fn new(duration_ms: i64) -> Self {
        Self {
            duration_ms,
            entries: VecDeque::new(),
        }
    }

    /// Append an entry and prune relative to its timestamp.
    pub fn push(&mut self, timestamp: i64, item: T) {
        self.entries.push_back((timestamp, item));
        self.prune(timestamp);
    }

    /// Append several entries sharing one timestamp, then prune once.
    pub fn extend(&mut self, timestamp: i64, items: impl IntoIterator<Item = T>) {
        self.entries
            .extend(items.into_iter().map(|item| (timestamp, item)));
        self.prune(timestamp);
    }

    /// Drop entries with timestamp < `now − duration`.
    pub fn prune(&mut self, now: i64) {
        let cutoff = now.saturating_sub(self.duration_ms);
        while let Some((ts, _)) = self.entries.front() {
            if *ts < cutoff {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &(i64, T)> + ExactSizeIterator {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn duration_ms(&self) -> i64 {
        self.duration_ms
    }
}

/// Quote-fade rate proxy: `cancels / (cancels + adds + ε)`.
pub fn quote_fade_rate(window: &SlidingWindow<QuoteEvent>) -> f64 {
    let (adds, cancels) = window
        .iter()
        .fold((0u64, 0u64), |(adds, cancels), (_, event)| match event {
            QuoteEvent::Add => (adds + 1, cancels),
            QuoteEvent::Cancel => (adds, cancels + 1),
        });
    let cancels = cancels as f64;
    cancels / (cancels + adds as f64 + RATIO_EPSILON)
}

/// One trade in the aggression window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradePrint {
    pub size: f64,
    pub side: TradeSide,
}

/// Aggression imbalance: `(buy − sell) / (buy + sell + ε)` by volume.
///
/// Trades with an unknown side count toward neither volume.
pub fn aggression_imbalance(window: &SlidingWindow<TradePrint>) -> f64 {
    let (buy, sell) = window
        .iter()
        .fold((0.0, 0.0), |(buy, sell), (_, print)| match print.side {
            TradeSide::Buy => (buy + print.size, sell),
            TradeSide::Sell => (buy, sell + print.size),
            TradeSide::Unknown => (buy, sell),
        });
    (buy - sell) / (buy + sell + RATIO_EPSILON)
}

fn rate(from: (i64, f64), to: (i64, f64)) -> f64 {
    (to.1 - from.1) / to.0.saturating_sub(from.0).max(1) as f64
}

/// Price change per millisecond over the two most recent samples; 0 with
/// fewer than two.
pub fn velocity(window: &SlidingWindow<f64>) -> f64 {
    let mut recent = window.iter().rev();
    match (recent.next(), recent.next()) {
        (Some(&p2), Some(&p1)) => rate(p1, p2),
        _ => 0.0,
    }
}

/// Change in velocity per millisecond over the three most recent samples;
/// 0 with fewer than three.
pub fn acceleration(window: &SlidingWindow<f64>) -> f64 {
    let mut recent = window.iter().rev();
    match (recent.next(), recent.next(), recent.next()) {
        (Some(&p2), Some(&p1), Some(&p0)) => {
            let v1 = rate(p0, p1);
            let v2 = rate(p1, p2);
            (v2 - v1) / p2.0.saturating_sub(p0.0).max(1) as f64
        }
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prune_keeps_entry_at_cutoff() {
        let mut window = SlidingWindow::new(10);
        window.push(0, 'a');
        window.push(5, 'b');
        window.push(10, 'c');
        // cutoff = 0: entry at 0 retained
        assert_eq!(window.len(), 3);

        window.push(11, 'd');
        // cutoff = 1: entry at 0 pruned
        let kept: Vec<char> = window.iter().map(|(_, c)| *c).collect();
        assert_eq!(kept, vec!['b', 'c', 'd']);
    }

    #[test]
    fn test_extend_prunes_once() {
        let mut window = SlidingWindow::new(100);
        window.push(0, 1);
        window.extend(500, [2, 3, 4]);
        assert_eq!(window.len(), 3);
        assert!(window.iter().all(|(ts, _)| *ts == 500));
    }

    #[test]
    fn test_qfr_example() {
        let mut window = SlidingWindow::new(5_000);
        window.push(0, QuoteEvent::Add);
        window.push(1, QuoteEvent::Cancel);
        window.push(2, QuoteEvent::Cancel);
        window.push(3, QuoteEvent::Cancel);
        window.prune(4);

        let qfr = quote_fade_rate(&window);
        assert!((qfr - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_qfr_empty_window_is_zero() {
        let window: SlidingWindow<QuoteEvent> = SlidingWindow::new(5_000);
        assert_eq!(quote_fade_rate(&window), 0.0);
    }

    #[test]
    fn test_aggression_imbalance() {
        let mut window = SlidingWindow::new(180_000);
        window.push(0, TradePrint { size: 3.0, side: TradeSide::Buy });
        window.push(1, TradePrint { size: 1.0, side: TradeSide::Sell });
        window.push(2, TradePrint { size: 10.0, side: TradeSide::Unknown });

        let imbalance = aggression_imbalance(&window);
        assert!((imbalance - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_aggression_imbalance_empty_is_zero() {
        let window: SlidingWindow<TradePrint> = SlidingWindow::new(1_000);
        assert_eq!(aggression_imbalance(&window), 0.0);
    }

    #[test]
    fn test_velocity_two_samples() {
        let mut window = SlidingWindow::new(10_000);
        window.push(0, 100.0);
        assert_eq!(velocity(&window), 0.0);

        window.push(10, 105.0);
        assert_eq!(velocity(&window), 0.5);
    }

    #[test]
    fn test_velocity_duplicate_timestamps() {
        let mut window = SlidingWindow::new(10_000);
        window.push(7, 100.0);
        window.push(7, 103.0);
        assert_eq!(velocity(&window), 3.0);
    }

    #[test]
    fn test_acceleration_needs_three_samples() {
        let mut window = SlidingWindow::new(10_000);
        window.push(0, 100.0);
        window.push(10, 105.0);
        assert_eq!(acceleration(&window), 0.0);

        window.push(20, 115.0);
        // v1 = 0.5, v2 = 1.0, dt = 20
        assert!((acceleration(&window) - 0.025).abs() < 1e-12);
    }

    #[test]
    fn test_velocity_uses_most_recent_samples() {
        let mut window = SlidingWindow::new(10_000);
        window.push(0, 1.0);
        window.push(10, 2.0);
        window.push(20, 12.0);
        assert_eq!(velocity(&window), 1.0);
    }

    #[test]
    fn test_extreme_timestamp_gaps_do_not_overflow() {
        let mut window = SlidingWindow::new(10_000);
        window.push(i64::MAX, 100.0);
        // Older timestamp: the cutoff is relative to it, so nothing is pruned
        window.push(-2, 101.0);
        assert_eq!(window.len(), 2);
        assert_eq!(velocity(&window), 1.0);

        window.push(i64::MIN, 102.0);
        assert!(velocity(&window).is_finite());
        assert!(acceleration(&window).is_finite());
    }
}
