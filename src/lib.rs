//! Stock Anomaly Detector Library
//!
//! Flags anomalous trades in a continuous stream: high volume, rapid price
//! changes and price outliers from an online-retrained Isolation Forest.

pub mod config;
pub mod consumer;
pub mod dedup;
pub mod detector;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod producer;
pub mod rules;
pub mod scorer;
pub mod sink;
pub mod types;

pub use config::AppConfig;
pub use consumer::TradeConsumer;
pub use detector::{AnomalyDetector, Detection};
pub use error::{DecodeError, PublishError};
pub use pipeline::{Outcome, Pipeline};
pub use producer::AnomalyProducer;
pub use sink::{AnomalySink, MemorySink};
pub use types::{anomaly::AnomalyLabel, anomaly::AnomalyResult, trade::TradeEvent};
