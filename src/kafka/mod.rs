//! Kafka integration module
//!
//! This module provides:
//! - Parsing of hub connection strings into Kafka endpoints
//! - A stream client with manual partition assignment and
//!   timestamp-based starting offsets
//! - Checkpoints stored as committed consumer group offsets

mod config;
mod consumer;

pub use config::{KafkaClientConfig, KafkaEndpoint};
pub use consumer::KafkaStreamClient;
