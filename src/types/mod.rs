//! Type definitions for the anomaly detection pipeline

pub mod anomaly;
pub mod trade;

pub use anomaly::{AnomalyLabel, AnomalyResult};
pub use trade::{SequenceId, TradeEvent};
