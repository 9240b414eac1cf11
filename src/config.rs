//! Configuration module for hubcapture
//!
//! Session parameters come either from environment variables (with `.env`
//! support for local development) or from a TOML file. Both paths produce the
//! same strongly-typed [`AppConfig`], which is validated before any
//! connection is attempted.

use envconfig::Envconfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::kafka::KafkaClientConfig;

/// Main configuration structure for hubcapture
#[derive(Debug, Clone, Deserialize, Serialize, Envconfig)]
pub struct AppConfig {
    /// Capture session configuration
    #[envconfig(nested = true)]
    pub session: SessionConfig,

    /// Kafka consumer tuning
    #[serde(default)]
    #[envconfig(nested = true)]
    pub kafka: KafkaClientConfig,

    /// Logging configuration
    #[serde(default)]
    #[envconfig(nested = true)]
    pub logging: LoggingConfig,
}

/// Parameters of a single timed capture session
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Envconfig)]
pub struct SessionConfig {
    /// Name of the event stream (event hub / topic)
    #[serde(alias = "eventhub_name")]
    #[envconfig(from = "HUB_STREAM_NAME")]
    pub stream_name: String,

    /// Connection string or bootstrap server list
    #[envconfig(from = "HUB_CONNECTION_STRING")]
    pub connection_string: String,

    /// Consumer group used for reading and checkpointing
    #[serde(default = "default_consumer_group")]
    #[envconfig(from = "HUB_CONSUMER_GROUP", default = "$Default")]
    pub consumer_group: String,

    /// How long to receive for, in seconds
    #[serde(alias = "streaming_duration")]
    #[envconfig(from = "HUB_STREAMING_DURATION_SECS", default = "60")]
    pub duration_secs: u64,

    /// How far back the starting position lies, in minutes
    #[serde(alias = "streaming_window")]
    #[envconfig(from = "HUB_STREAMING_WINDOW_MINUTES", default = "5")]
    pub lookback_minutes: u64,

    /// Upper bound on waiting for the receive operation to stop
    #[serde(default = "default_shutdown_timeout_secs")]
    #[envconfig(from = "HUB_SHUTDOWN_TIMEOUT_SECS", default = "30")]
    pub shutdown_timeout_secs: u64,
}

impl SessionConfig {
    /// Create a session configuration with the default consumer group and
    /// shutdown bound
    pub fn new(
        stream_name: impl Into<String>,
        connection_string: impl Into<String>,
        duration_secs: u64,
        lookback_minutes: u64,
    ) -> Self {
        Self {
            stream_name: stream_name.into(),
            connection_string: connection_string.into(),
            consumer_group: default_consumer_group(),
            duration_secs,
            lookback_minutes,
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }

    /// Override the consumer group
    pub fn with_consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = consumer_group.into();
        self
    }

    /// Override the shutdown bound
    pub fn with_shutdown_timeout_secs(mut self, secs: u64) -> Self {
        self.shutdown_timeout_secs = secs;
        self
    }

    /// Receive duration as Duration
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// Look-back window as a chrono Duration
    ///
    /// Fails for minute counts chrono cannot represent.
    pub fn lookback(&self) -> Result<chrono::Duration> {
        i64::try_from(self.lookback_minutes)
            .ok()
            .and_then(chrono::Duration::try_minutes)
            .ok_or_else(|| {
                Error::invalid_config(format!(
                    "Streaming window of {} minutes is out of range",
                    self.lookback_minutes
                ))
            })
    }

    /// Shutdown bound as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Validate the session parameters
    pub fn validate(&self) -> Result<()> {
        if self.duration_secs == 0 {
            return Err(Error::invalid_config(
                "Streaming duration must be greater than 0 seconds",
            ));
        }

        self.lookback()?;

        if self.shutdown_timeout_secs == 0 {
            return Err(Error::invalid_config(
                "Shutdown timeout must be greater than 0 seconds",
            ));
        }

        if self.stream_name.trim().is_empty() {
            return Err(Error::invalid_config("Stream name cannot be empty"));
        }

        if self.connection_string.trim().is_empty() {
            return Err(Error::invalid_config("Connection string cannot be empty"));
        }

        if self.consumer_group.trim().is_empty() {
            return Err(Error::invalid_config("Consumer group cannot be empty"));
        }

        Ok(())
    }

    /// Connection string with the shared access key hidden
    pub fn masked_connection_string(&self) -> String {
        mask_connection_string(&self.connection_string)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize, Envconfig)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,

    /// Environment (development, staging, production)
    #[serde(default = "default_environment")]
    #[envconfig(from = "ENVIRONMENT", default = "development")]
    pub environment: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            environment: default_environment(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenv::dotenv().ok();

        AppConfig::init_from_env().map_err(Error::from)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::invalid_config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_toml_str(&contents)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.session.validate()
    }

    /// Log configuration (with sensitive data masked)
    pub fn log_config(&self) {
        tracing::info!(
            stream_name = %self.session.stream_name,
            connection = %self.session.masked_connection_string(),
            consumer_group = %self.session.consumer_group,
            duration_secs = %self.session.duration_secs,
            lookback_minutes = %self.session.lookback_minutes,
            shutdown_timeout_secs = %self.session.shutdown_timeout_secs,
            "Session configuration"
        );

        tracing::info!(
            client_id = %self.kafka.client_id,
            session_timeout_ms = %self.kafka.session_timeout_ms,
            request_timeout_ms = %self.kafka.request_timeout_ms,
            "Kafka configuration"
        );

        tracing::info!(
            log_level = %self.logging.log_level,
            environment = %self.logging.environment,
            "Logging configuration"
        );
    }
}

/// Hide the value of every `SharedAccessKey=` segment
pub fn mask_connection_string(connection_string: &str) -> String {
    if !connection_string.contains('=') {
        return connection_string.to_string();
    }

    connection_string
        .split(';')
        .map(|segment| match segment.split_once('=') {
            Some((key, _)) if key.trim().eq_ignore_ascii_case("SharedAccessKey") => {
                format!("{}=***", key)
            },
            _ => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join(";")
}

// Default value functions
fn default_consumer_group() -> String {
    "$Default".to_string()
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SessionConfig {
        SessionConfig::new("telemetry", "localhost:9092", 10, 5)
    }

    #[test]
    fn test_session_defaults() {
        let config = session();
        assert_eq!(config.consumer_group, "$Default");
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
        assert_eq!(config.duration(), Duration::from_secs(10));
        assert_eq!(config.lookback().unwrap(), chrono::Duration::minutes(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_duration_rejected() {
        let config = SessionConfig::new("telemetry", "localhost:9092", 0, 5);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_zero_lookback_allowed() {
        let config = SessionConfig::new("telemetry", "localhost:9092", 1, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_oversized_lookback_rejected_without_panic() {
        for minutes in [u64::MAX, i64::MAX as u64 + 1, i64::MAX as u64, i64::MAX as u64 / 60_000 + 1] {
            let config = SessionConfig::new("telemetry", "localhost:9092", 1, minutes);
            assert!(matches!(config.lookback(), Err(Error::InvalidConfig(_))));
            assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_blank_fields_rejected() {
        assert!(SessionConfig::new(" ", "localhost:9092", 1, 0).validate().is_err());
        assert!(SessionConfig::new("telemetry", "", 1, 0).validate().is_err());
        assert!(session().with_consumer_group("").validate().is_err());
        assert!(session().with_shutdown_timeout_secs(0).validate().is_err());
    }

    #[test]
    fn test_connection_string_masking() {
        let config = SessionConfig::new(
            "telemetry",
            "Endpoint=sb://ns.servicebus.windows.net/;SharedAccessKeyName=listen;SharedAccessKey=s3cr3t",
            1,
            0,
        );

        let masked = config.masked_connection_string();
        assert!(masked.contains("SharedAccessKey=***"));
        assert!(masked.contains("SharedAccessKeyName=listen"));
        assert!(!masked.contains("s3cr3t"));
    }

    #[test]
    fn test_plain_brokers_not_masked() {
        assert_eq!(mask_connection_string("b1:9092,b2:9092"), "b1:9092,b2:9092");
    }

    #[test]
    fn test_toml_with_legacy_keys() {
        let config = AppConfig::from_toml_str(
            r#"
            [session]
            eventhub_name = "telemetry"
            connection_string = "localhost:9092"
            consumer_group = "analytics"
            streaming_duration = 20
            streaming_window = 15

            [logging]
            log_level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.session.stream_name, "telemetry");
        assert_eq!(config.session.consumer_group, "analytics");
        assert_eq!(config.session.duration_secs, 20);
        assert_eq!(config.session.lookback_minutes, 15);
        assert_eq!(config.session.shutdown_timeout_secs, 30);
        assert_eq!(config.logging.log_level, "debug");
        assert_eq!(config.logging.environment, "development");
        assert_eq!(config.kafka.client_id, "hubcapture");
    }

    #[test]
    fn test_toml_negative_window_rejected() {
        let result = AppConfig::from_toml_str(
            r#"
            [session]
            stream_name = "telemetry"
            connection_string = "localhost:9092"
            duration_secs = 20
            lookback_minutes = -1
            "#,
        );

        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.toml");
        std::fs::write(
            &path,
            "[session]\nstream_name = \"orders\"\nconnection_string = \"localhost:9092\"\nduration_secs = 3\nlookback_minutes = 0\n",
        )
        .unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.session.stream_name, "orders");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file() {
        let result = AppConfig::from_file("/nonexistent/capture.toml");
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
