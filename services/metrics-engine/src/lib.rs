//! Metrics Engine
//!
//! Consumes normalized market-data messages from any number of exchange
//! ingesters and produces, per instrument:
//! - Microstructure metrics: spread, banded depth, quote-fade rate,
//!   aggression imbalance, price velocity and acceleration
//! - Option-surface metrics: ATM implied vol, 25-delta skew, term-structure
//!   slope, implied-vol bid/ask spread
//!
//! Every metric carries its raw value plus an adaptive EMA/SD baseline, and
//! every record carries a data-quality flag.
//!
//! # Architecture
//!
//! ```text
//!  source A   source B   source N      (bounded mpsc, one per ingester)
//!      │          │          │
//!   ┌──▼──────────▼──────────▼──┐
//!   │   FanInEngine (SelectAll) │
//!   └────────────┬──────────────┘
//!                │
//!   ┌────────────▼──────────────┐
//!   │      MetricsProcessor     │
//!   │ ┌────┐ ┌───────┐ ┌──────┐ │
//!   │ │Book│ │Windows│ │Option│ │
//!   │ └─┬──┘ └───┬───┘ └──┬───┘ │
//!   │   └────────▼────────┘     │
//!   │        Baselines          │
//!   └────────────┬──────────────┘
//!                │ MetricRecord
//!   ┌────────────▼──────────────┐
//!   │     MetricsPublisher      │
//!   └──────┬─────────────┬──────┘
//!          ▼             ▼
//!       storage        alert
//! ```
//!
//! All mutable state is owned by the single processing loop; nothing is
//! shared or locked except the counters in [`metrics::EngineMetrics`].

pub mod baseline;
pub mod config;
pub mod engine;
pub mod instrument;
pub mod messages;
pub mod metrics;
pub mod options;
pub mod order_book;
pub mod processor;
pub mod publisher;
pub mod record;
pub mod window;

pub use config::{ConfigError, EngineConfig, ExpiryOrdering};
pub use engine::{EngineReport, FanInEngine, SourceId};
pub use messages::{InboundMessage, MessageError};
pub use processor::MetricsProcessor;
pub use publisher::{BackpressurePolicy, MetricsPublisher, Outbound, PublishError};
pub use record::{DataQuality, MetricFamily, MetricRecord, MetricValue, QualityIssue};

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
