//! Multi-source fan-in loop
//!
//! Each source is a bounded `mpsc` receiver wrapped as a stream and merged
//! once into a `SelectAll`. The loop takes whichever source is ready next,
//! hands the message to the processor, and publishes the resulting records.
//! Within one source messages are processed in arrival order; across
//! sources the interleaving is whatever the scheduler produces.
//!
//! A receive that loses the race against shutdown never takes a message off
//! its channel, so nothing is lost there. On shutdown every receiver is
//! closed and whatever is still buffered is drained and processed before
//! the sentinel goes out on both outputs.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures::stream::{SelectAll, Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::messages::InboundMessage;
use crate::metrics::{EngineMetrics, OutputName};
use crate::processor::MetricsProcessor;
use crate::publisher::{MetricsPublisher, Outbound, PublishError};

/// Name of an input source, used in logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One source receiver as a stream. Ends when every sender is dropped.
struct SourceStream {
    id: SourceId,
    rx: mpsc::Receiver<InboundMessage>,
    metrics: Arc<EngineMetrics>,
}

impl Stream for SourceStream {
    type Item = InboundMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.rx.poll_recv(cx) {
            Poll::Ready(None) => {
                info!(source = %self.id, "Source closed");
                self.metrics.record_source_closed();
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

/// Counters captured when the engine stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineReport {
    pub messages_received: u64,
    pub records_emitted: u64,
    pub records_dropped_storage: u64,
    pub records_dropped_alert: u64,
    pub degraded_records: u64,
    pub messages_drained: u64,
    pub instruments_tracked: u64,
}

impl EngineReport {
    fn capture(metrics: &EngineMetrics) -> Self {
        let counters = metrics.export();
        let get = |key: &str| counters.get(key).copied().unwrap_or(0);
        Self {
            messages_received: get("messages_received"),
            records_emitted: get("records_emitted"),
            records_dropped_storage: metrics.dropped(OutputName::Storage),
            records_dropped_alert: metrics.dropped(OutputName::Alert),
            degraded_records: get("degraded_records"),
            messages_drained: get("messages_drained"),
            instruments_tracked: get("instruments_tracked"),
        }
    }
}

/// Merges N input sources into a single processing loop.
pub struct FanInEngine {
    processor: MetricsProcessor,
    sources: SelectAll<SourceStream>,
    publisher: MetricsPublisher,
    metrics: Arc<EngineMetrics>,
}

impl FanInEngine {
    pub fn new(config: EngineConfig, publisher: MetricsPublisher, metrics: Arc<EngineMetrics>) -> Self {
        Self {
            processor: MetricsProcessor::new(config),
            sources: SelectAll::new(),
            publisher,
            metrics,
        }
    }

    /// Build an engine plus its (storage, alert) output receivers, sized
    /// and policed by the configuration.
    pub fn with_outputs(
        config: EngineConfig,
    ) -> (Self, mpsc::Receiver<Outbound>, mpsc::Receiver<Outbound>) {
        let metrics = Arc::new(EngineMetrics::new());
        let (publisher, storage, alert) =
            MetricsPublisher::with_channels(config.output_capacity, config.backpressure, metrics.clone());
        (Self::new(config, publisher, metrics), storage, alert)
    }

    /// Register an existing receiver as a source.
    pub fn add_source(&mut self, id: impl Into<SourceId>, rx: mpsc::Receiver<InboundMessage>) {
        let id = id.into();
        debug!(source = %id, "Source registered");
        self.sources.push(SourceStream {
            id,
            rx,
            metrics: self.metrics.clone(),
        });
    }

    /// Create a bounded source channel and return its sender.
    pub fn source(&mut self, id: impl Into<SourceId>, capacity: usize) -> mpsc::Sender<InboundMessage> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.add_source(id, rx);
        tx
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        self.metrics.clone()
    }

    /// Run until `shutdown` resolves or every source has closed, then
    /// drain, send the sentinel, and report.
    ///
    /// Fails only if an output channel is closed by its consumer.
    pub async fn run<F>(mut self, shutdown: F) -> Result<EngineReport, PublishError>
    where
        F: Future<Output = ()>,
    {
        let config = self.processor.config();
        info!(
            sources = self.sources.len(),
            qfr_window_sec = config.qfr_window_sec,
            depth_pct_band = config.depth_pct_band,
            backpressure = ?self.publisher.policy(),
            "Fan-in engine started"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                next = self.sources.next() => match next {
                    Some(msg) => self.handle(&msg).await?,
                    None => {
                        info!("All sources closed");
                        break;
                    }
                },
            }
        }

        let drained = self.drain().await?;
        info!(drained, "Sources drained");

        self.publisher.shutdown().await?;
        let report = EngineReport::capture(&self.metrics);
        info!(
            messages = report.messages_received,
            records = report.records_emitted,
            dropped_storage = report.records_dropped_storage,
            dropped_alert = report.records_dropped_alert,
            "Fan-in engine stopped"
        );
        Ok(report)
    }

    async fn handle(&mut self, msg: &InboundMessage) -> Result<(), PublishError> {
        let started = Instant::now();
        let records = self.processor.process(msg);
        let elapsed = u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX);

        self.metrics.record_message(elapsed);
        self.metrics
            .set_instruments_tracked(self.processor.instruments().len() as u64);

        for record in records {
            self.publisher.publish(record).await?;
        }
        Ok(())
    }

    /// Close every live receiver and process what is still buffered,
    /// source by source in FIFO order.
    async fn drain(&mut self) -> Result<u64, PublishError> {
        let mut sources = std::mem::replace(&mut self.sources, SelectAll::new());
        for source in sources.iter_mut() {
            source.rx.close();
        }

        let mut drained = 0u64;
        for source in sources.iter_mut() {
            let mut from_source = 0u64;
            while let Some(msg) = source.rx.recv().await {
                self.handle(&msg).await?;
                from_source += 1;
            }
            if from_source > 0 {
                debug!(source = %source.id, count = from_source, "Drained buffered messages");
            }
            drained += from_source;
        }

        self.metrics.record_drained(drained);
        Ok(drained)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{MetricFamily, MetricRecord};
    use types::side::TradeSide;

    fn collect(rx: &mut mpsc::Receiver<Outbound>) -> (Vec<MetricRecord>, bool) {
        let mut records = Vec::new();
        let mut saw_sentinel = false;
        while let Ok(item) = rx.try_recv() {
            match item {
                Outbound::Record(r) => records.push(r),
                Outbound::Shutdown => saw_sentinel = true,
            }
        }
        (records, saw_sentinel)
    }

    #[tokio::test]
    async fn test_runs_until_sources_close() {
        let (mut engine, mut storage, mut alert) = FanInEngine::with_outputs(EngineConfig::default());
        let tx = engine.source("binance", 16);

        tx.send(InboundMessage::book("binance", "BTCUSDT", 0, &[(100.0, 1.0)], &[(101.0, 1.0)]))
            .await
            .unwrap();
        tx.send(InboundMessage::book("binance", "BTCUSDT", 1, &[], &[(101.0, 0.0)]))
            .await
            .unwrap();
        drop(tx);

        let report = engine.run(std::future::pending()).await.unwrap();
        assert_eq!(report.messages_received, 2);
        assert_eq!(report.records_emitted, 1);
        assert_eq!(report.messages_drained, 0);

        let (records, sentinel) = collect(&mut storage);
        assert_eq!(records.len(), 1);
        assert!(sentinel);
        let (alerts, sentinel) = collect(&mut alert);
        assert_eq!(alerts, records);
        assert!(sentinel);
    }

    #[tokio::test]
    async fn test_shutdown_drains_buffered_messages() {
        let (mut engine, mut storage, _alert) = FanInEngine::with_outputs(EngineConfig::default());
        let tx = engine.source("feed", 16);

        for ts in 0..3 {
            tx.send(InboundMessage::book("binance", "BTCUSDT", ts, &[(100.0, 1.0)], &[(101.0, 1.0 + ts as f64)]))
                .await
                .unwrap();
        }

        // Shutdown is already resolved, so nothing is taken by the main loop
        let report = engine.run(std::future::ready(())).await.unwrap();
        assert_eq!(report.messages_drained, 3);
        assert_eq!(report.messages_received, 3);

        let (records, sentinel) = collect(&mut storage);
        let timestamps: Vec<i64> = records.iter().map(|r| r.timestamp).collect();
        assert_eq!(timestamps, vec![0, 1, 2]);
        assert!(sentinel);

        // The receiver was closed; late sends are refused
        assert!(tx.send(InboundMessage::book("binance", "BTCUSDT", 9, &[], &[])).await.is_err());
    }

    #[tokio::test]
    async fn test_per_source_order_preserved() {
        let (mut engine, mut storage, _alert) = FanInEngine::with_outputs(EngineConfig::default());
        let a = engine.source("a", 64);
        let b = engine.source("b", 64);
        assert_eq!(engine.source_count(), 2);

        for ts in 0..10 {
            a.send(InboundMessage::book("ex-a", "X", ts, &[(100.0, 1.0)], &[(101.0, 1.0)]))
                .await
                .unwrap();
            b.send(InboundMessage::book("ex-b", "Y", ts, &[(50.0, 1.0)], &[(51.0, 1.0)]))
                .await
                .unwrap();
        }
        drop(a);
        drop(b);

        let report = engine.run(std::future::pending()).await.unwrap();
        assert_eq!(report.messages_received, 20);
        assert_eq!(report.instruments_tracked, 2);

        let (records, _) = collect(&mut storage);
        for instrument in ["X", "Y"] {
            let ts: Vec<i64> = records
                .iter()
                .filter(|r| r.instrument.as_str() == instrument)
                .map(|r| r.timestamp)
                .collect();
            assert_eq!(ts, (0..10).collect::<Vec<i64>>());
        }
    }

    #[tokio::test]
    async fn test_ticker_and_trade_through_engine() {
        let (mut engine, mut storage, _alert) = FanInEngine::with_outputs(EngineConfig::default());
        let tx = engine.source("deribit", 8);

        tx.send(InboundMessage::trade("deribit", "BTC-PERPETUAL", 0, 100.0, 1.0, TradeSide::Buy))
            .await
            .unwrap();
        tx.send(InboundMessage::ticker(
            "deribit",
            "BTC-27JUN25-100000-P",
            1,
            crate::messages::TickerUpdate {
                mark_iv: 60.0,
                bid_iv: 59.0,
                ask_iv: 61.0,
                delta: -0.3,
            },
        ))
        .await
        .unwrap();
        drop(tx);

        let report = engine.run(std::future::pending()).await.unwrap();
        assert_eq!(report.records_emitted, 1);
        assert_eq!(report.degraded_records, 1);

        let (records, _) = collect(&mut storage);
        assert_eq!(records[0].family, MetricFamily::Options);
        assert_eq!(records[0].raw("iv_bid_ask_spread"), Some(2.0));
    }

    #[tokio::test]
    async fn test_closed_output_stops_engine() {
        let (mut engine, storage, _alert) = FanInEngine::with_outputs(EngineConfig::default());
        let tx = engine.source("feed", 4);
        drop(storage);

        tx.send(InboundMessage::book("binance", "BTCUSDT", 0, &[(100.0, 1.0)], &[(101.0, 1.0)]))
            .await
            .unwrap();
        drop(tx);

        let err = engine.run(std::future::pending()).await.unwrap_err();
        assert_eq!(err, PublishError::Closed { output: OutputName::Storage });
    }

    #[tokio::test]
    async fn test_no_sources_stops_immediately() {
        let (engine, mut storage, _alert) = FanInEngine::with_outputs(EngineConfig::default());
        let report = engine.run(std::future::pending()).await.unwrap();
        assert_eq!(report, EngineReport::default());
        assert_eq!(storage.recv().await, Some(Outbound::Shutdown));
    }
}
