//! Error handling module for hubcapture
//!
//! This module defines the error types used throughout the crate. Controller
//! level failures are distinct variants so callers can tell a session that
//! never started apart from one that started but failed to shut down.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for hubcapture operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for hubcapture
#[derive(Error, Debug)]
pub enum Error {
    /// Session configuration rejected before any connection attempt
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The stream client could not connect
    #[error("Connection error: {0}")]
    Connection(String),

    /// The receive operation did not terminate within the shutdown bound
    #[error("Receive operation did not stop within {0:?}")]
    ShutdownTimeout(Duration),

    /// Event body could not be decoded into a mapping
    #[error("Decode error: {0}")]
    Decode(String),

    /// Checkpoint could not be advanced
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Kafka endpoint errors raised while receiving
    #[error("Kafka error: {0}")]
    Kafka(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Error::InvalidConfig(msg.into())
    }

    /// Create a connection error
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Error::Connection(msg.into())
    }

    /// Create a decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Error::Decode(msg.into())
    }

    /// Create a checkpoint error
    pub fn checkpoint<S: Into<String>>(msg: S) -> Self {
        Error::Checkpoint(msg.into())
    }

    /// Create a Kafka error
    pub fn kafka<S: Into<String>>(msg: S) -> Self {
        Error::Kafka(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// True when the session failed before the receive operation started
    pub fn is_startup_failure(&self) -> bool {
        matches!(self, Error::InvalidConfig(_) | Error::Connection(_))
    }

    /// Stable tag for structured logs
    pub fn error_type(&self) -> &'static str {
        match self {
            Error::InvalidConfig(_) => "invalid_config",
            Error::Connection(_) => "connection_error",
            Error::ShutdownTimeout(_) => "shutdown_timeout",
            Error::Decode(_) => "decode_error",
            Error::Checkpoint(_) => "checkpoint_error",
            Error::Kafka(_) => "kafka_error",
            Error::Serialization(_) => "serialization_error",
            Error::Io(_) => "io_error",
            Error::Internal(_) => "internal_error",
        }
    }
}

/// Convert from anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

/// Convert from envconfig::Error to our Error type
impl From<envconfig::Error> for Error {
    fn from(err: envconfig::Error) -> Self {
        Error::InvalidConfig(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::InvalidConfig(err.to_string())
    }
}

impl From<rdkafka::error::KafkaError> for Error {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        Error::Kafka(err.to_string())
    }
}
