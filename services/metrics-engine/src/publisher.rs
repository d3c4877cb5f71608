//! Output side of the engine
//!
//! Every record goes to two bounded channels, storage and alert. What
//! happens when one of them is full is the backpressure policy:
//!
//! - `Block`: await capacity. A slow consumer stalls the whole engine
//!   loop; this is the engine's throughput ceiling.
//! - `DropAndCount`: skip the record for that output, bump its drop
//!   counter and log a warning. Drops are never silent.
//!
//! The shutdown sentinel is always delivered with `Block`, whatever the
//! policy, so a consumer can rely on seeing it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::metrics::{EngineMetrics, OutputName};
use crate::record::MetricRecord;

/// Item carried on an output channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Record(MetricRecord),
    /// Sentinel: the engine has drained and stopped. Consumers should
    /// finish their own work and exit.
    Shutdown,
}

/// Policy when an output channel is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    Block,
    DropAndCount,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PublishError {
    #[error("{output} output channel closed by its consumer")]
    Closed { output: OutputName },
}

/// Forwards records to the storage and alert outputs.
#[derive(Debug, Clone)]
pub struct MetricsPublisher {
    storage: mpsc::Sender<Outbound>,
    alert: mpsc::Sender<Outbound>,
    policy: BackpressurePolicy,
    metrics: Arc<EngineMetrics>,
}

impl MetricsPublisher {
    pub fn new(
        storage: mpsc::Sender<Outbound>,
        alert: mpsc::Sender<Outbound>,
        policy: BackpressurePolicy,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            storage,
            alert,
            policy,
            metrics,
        }
    }

    /// Create both output channels with `capacity` slots each and return
    /// the publisher together with the (storage, alert) receivers.
    pub fn with_channels(
        capacity: usize,
        policy: BackpressurePolicy,
        metrics: Arc<EngineMetrics>,
    ) -> (Self, mpsc::Receiver<Outbound>, mpsc::Receiver<Outbound>) {
        let (storage_tx, storage_rx) = mpsc::channel(capacity.max(1));
        let (alert_tx, alert_rx) = mpsc::channel(capacity.max(1));
        (Self::new(storage_tx, alert_tx, policy, metrics), storage_rx, alert_rx)
    }

    pub fn policy(&self) -> BackpressurePolicy {
        self.policy
    }

    /// Send one record to storage, then to alert.
    pub async fn publish(&self, record: MetricRecord) -> Result<(), PublishError> {
        let degraded = !record.quality.is_clean();
        if degraded {
            debug!(
                instrument = %record.instrument,
                family = record.family.key(),
                issues = ?record.quality.issues(),
                "Emitting degraded record"
            );
        }
        self.metrics.record_emitted(degraded);

        self.send(OutputName::Storage, Outbound::Record(record.clone()))
            .await?;
        self.send(OutputName::Alert, Outbound::Record(record)).await
    }

    /// Deliver the sentinel on both outputs.
    pub async fn shutdown(&self) -> Result<(), PublishError> {
        for output in [OutputName::Storage, OutputName::Alert] {
            self.sender(output)
                .send(Outbound::Shutdown)
                .await
                .map_err(|_| PublishError::Closed { output })?;
        }
        debug!("Shutdown sentinel sent on both outputs");
        Ok(())
    }

    fn sender(&self, output: OutputName) -> &mpsc::Sender<Outbound> {
        match output {
            OutputName::Storage => &self.storage,
            OutputName::Alert => &self.alert,
        }
    }

    async fn send(&self, output: OutputName, item: Outbound) -> Result<(), PublishError> {
        let tx = self.sender(output);
        match self.policy {
            BackpressurePolicy::Block => tx
                .send(item)
                .await
                .map_err(|_| PublishError::Closed { output }),
            BackpressurePolicy::DropAndCount => match tx.try_send(item) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => {
                    let dropped = self.metrics.record_drop(output);
                    warn!(output = %output, dropped, "Output full: record dropped");
                    Ok(())
                }
                Err(TrySendError::Closed(_)) => Err(PublishError::Closed { output }),
            },
        }
    }
}
