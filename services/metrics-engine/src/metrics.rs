//! Engine counters
//!
//! Lock-free counters the fan-in loop and publisher bump as they work.
//! Held behind an `Arc` so a caller can read them while the loop runs.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Which output channel a record was destined for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputName {
    Storage,
    Alert,
}

impl OutputName {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputName::Storage => "storage",
            OutputName::Alert => "alert",
        }
    }
}

impl std::fmt::Display for OutputName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct EngineMetrics {
    pub messages_received: AtomicU64,
    pub records_emitted: AtomicU64,
    pub records_dropped_storage: AtomicU64,
    pub records_dropped_alert: AtomicU64,
    pub degraded_records: AtomicU64,
    pub messages_drained: AtomicU64,
    pub instruments_tracked: AtomicU64,
    pub sources_closed: AtomicU64,
    pub processing_ns: Mutex<LatencyTracker>,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            records_emitted: AtomicU64::new(0),
            records_dropped_storage: AtomicU64::new(0),
            records_dropped_alert: AtomicU64::new(0),
            degraded_records: AtomicU64::new(0),
            messages_drained: AtomicU64::new(0),
            instruments_tracked: AtomicU64::new(0),
            sources_closed: AtomicU64::new(0),
            processing_ns: Mutex::new(LatencyTracker::new(1000)),
        }
    }

    /// Record one message taken off a source, with its processing time.
    pub fn record_message(&self, latency_ns: u64) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut tracker) = self.processing_ns.lock() {
            tracker.record(latency_ns);
        }
    }

    pub fn record_emitted(&self, degraded: bool) {
        self.records_emitted.fetch_add(1, Ordering::Relaxed);
        if degraded {
            self.degraded_records.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Count a dropped record and return the running total for that output.
    pub fn record_drop(&self, output: OutputName) -> u64 {
        let counter = match output {
            OutputName::Storage => &self.records_dropped_storage,
            OutputName::Alert => &self.records_dropped_alert,
        };
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_drained(&self, count: u64) {
        self.messages_drained.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_source_closed(&self) {
        self.sources_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_instruments_tracked(&self, count: u64) {
        self.instruments_tracked.store(count, Ordering::Relaxed);
    }

    pub fn dropped(&self, output: OutputName) -> u64 {
        match output {
            OutputName::Storage => self.records_dropped_storage.load(Ordering::Relaxed),
            OutputName::Alert => self.records_dropped_alert.load(Ordering::Relaxed),
        }
    }

    /// Export counters as an ordered name → value map.
    pub fn export(&self) -> BTreeMap<String, u64> {
        let mut m = BTreeMap::new();
        m.insert("messages_received".to_string(), self.messages_received.load(Ordering::Relaxed));
        m.insert("records_emitted".to_string(), self.records_emitted.load(Ordering::Relaxed));
        m.insert("records_dropped_storage".to_string(), self.records_dropped_storage.load(Ordering::Relaxed));
        m.insert("records_dropped_alert".to_string(), self.records_dropped_alert.load(Ordering::Relaxed));
        m.insert("degraded_records".to_string(), self.degraded_records.load(Ordering::Relaxed));
        m.insert("messages_drained".to_string(), self.messages_drained.load(Ordering::Relaxed));
        m.insert("instruments_tracked".to_string(), self.instruments_tracked.load(Ordering::Relaxed));
        m.insert("sources_closed".to_string(), self.sources_closed.load(Ordering::Relaxed));
        if let Ok(tracker) = self.processing_ns.lock() {
            if let Some(p99) = tracker.percentile(99) {
                m.insert("processing_p99_ns".to_string(), p99);
            }
        }
        m
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EngineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.export()).finish()
    }
}

/// Bounded ring of latency samples for percentile queries.
#[derive(Debug)]
pub struct LatencyTracker {
    samples: std::collections::VecDeque<u64>,
    max_samples: usize,
}

impl LatencyTracker {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: std::collections::VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
        }
    }

    pub fn record(&mut self, value: u64) {
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Percentile (0-100) by nearest rank over the retained samples.
    pub fn percentile(&self, p: usize) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<u64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();
        let idx = (p.min(100) as f64 / 100.0 * (sorted.len() - 1) as f64) as usize;
        sorted.get(idx).copied()
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_export() {
        let metrics = EngineMetrics::new();
        metrics.record_message(500);
        metrics.record_message(700);
        metrics.record_emitted(false);
        metrics.record_emitted(true);
        metrics.record_drained(3);
        metrics.set_instruments_tracked(2);

        let exported = metrics.export();
        assert_eq!(exported["messages_received"], 2);
        assert_eq!(exported["records_emitted"], 2);
        assert_eq!(exported["degraded_records"], 1);
        assert_eq!(exported["messages_drained"], 3);
        assert_eq!(exported["instruments_tracked"], 2);
        assert!(exported.contains_key("processing_p99_ns"));
    }

    #[test]
    fn test_drops_counted_per_output() {
        let metrics = EngineMetrics::new();
        assert_eq!(metrics.record_drop(OutputName::Storage), 1);
        assert_eq!(metrics.record_drop(OutputName::Storage), 2);
        assert_eq!(metrics.record_drop(OutputName::Alert), 1);

        assert_eq!(metrics.dropped(OutputName::Storage), 2);
        assert_eq!(metrics.dropped(OutputName::Alert), 1);
    }

    #[test]
    fn test_no_latency_key_before_first_message() {
        let metrics = EngineMetrics::new();
        assert!(!metrics.export().contains_key("processing_p99_ns"));
    }

    #[test]
    fn test_latency_tracker_percentile() {
        let mut tracker = LatencyTracker::new(100);
        for i in 1..=100 {
            tracker.record(i);
        }
        let p50 = tracker.percentile(50).unwrap();
        assert!((49..=51).contains(&p50));
        assert_eq!(tracker.percentile(100), Some(100));
    }

    #[test]
    fn test_latency_tracker_evicts_oldest() {
        let mut tracker = LatencyTracker::new(3);
        for v in [10, 20, 30, 40] {
            tracker.record(v);
        }
        assert_eq!(tracker.count(), 3);
        assert_eq!(tracker.percentile(0), Some(20));
    }
}
