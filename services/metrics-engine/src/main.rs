//! `metrics-engine [config.json]`
//!
//! Reads newline-delimited JSON messages from stdin, writes storage records
//! to stdout as JSON lines, and logs to stderr. Ctrl-C drains and stops.

use std::io::BufRead;

use anyhow::Context;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use metrics_engine::{EngineConfig, FanInEngine, InboundMessage, MetricRecord, Outbound};

/// Distance from the baseline, in SDs, at which the alert consumer logs.
const ALERT_Z_SCORE: f64 = 3.0;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::from_file(&path).with_context(|| format!("loading {path}"))?,
        None => EngineConfig::default(),
    };
    info!(version = metrics_engine::SERVICE_VERSION, "Starting metrics engine");

    let capacity = config.output_capacity;
    let (mut engine, storage_rx, alert_rx) = FanInEngine::with_outputs(config);
    let stdin_tx = engine.source("stdin", capacity);

    // Detached: a blocked stdin read must not hold up runtime shutdown.
    std::thread::spawn(move || read_stdin(stdin_tx));

    let storage = tokio::spawn(storage_consumer(storage_rx));
    let alert = tokio::spawn(alert_consumer(alert_rx));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C; running until input ends");
            std::future::pending::<()>().await;
        }
    };

    let report = engine.run(shutdown).await?;
    storage.await.context("storage consumer panicked")??;
    alert.await.context("alert consumer panicked")?;

    info!(
        messages = report.messages_received,
        records = report.records_emitted,
        degraded = report.degraded_records,
        drained = report.messages_drained,
        instruments = report.instruments_tracked,
        "Metrics engine finished"
    );
    Ok(())
}

fn read_stdin(tx: mpsc::Sender<InboundMessage>) {
    let stdin = std::io::stdin();
    for (line_no, line) in stdin.lock().lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match InboundMessage::from_json(&line) {
            Ok(msg) => {
                if tx.blocking_send(msg).is_err() {
                    debug!("Engine stopped accepting input");
                    break;
                }
            }
            Err(e) => warn!(line = line_no + 1, error = %e, "Skipping undecodable message"),
        }
    }
}

async fn storage_consumer(mut rx: mpsc::Receiver<Outbound>) -> Result<(), anyhow::Error> {
    let mut stdout = tokio::io::stdout();
    while let Some(item) = rx.recv().await {
        match item {
            Outbound::Record(record) => {
                let mut line = record.to_json()?;
                line.push('\n');
                stdout.write_all(line.as_bytes()).await?;
            }
            Outbound::Shutdown => break,
        }
    }
    stdout.flush().await?;
    Ok(())
}

async fn alert_consumer(mut rx: mpsc::Receiver<Outbound>) {
    while let Some(item) = rx.recv().await {
        match item {
            Outbound::Record(record) => log_outliers(&record),
            Outbound::Shutdown => break,
        }
    }
}

fn log_outliers(record: &MetricRecord) {
    for (name, value) in &record.metrics {
        if let Some(z) = value.z_score() {
            if z.abs() > ALERT_Z_SCORE {
                debug!(
                    exchange = %record.exchange,
                    instrument = %record.instrument,
                    metric = *name,
                    raw = value.raw,
                    ema = value.ema,
                    z,
                    "Metric outside baseline"
                );
            }
        }
    }
}
