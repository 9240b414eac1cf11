//! Kafka client configuration module

use envconfig::Envconfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// Port of the Kafka-compatible endpoint of a hub namespace
const HUB_KAFKA_PORT: u16 = 9093;

/// Tuning knobs for the Kafka consumer
#[derive(Debug, Clone, Deserialize, Serialize, Envconfig)]
pub struct KafkaClientConfig {
    /// Session timeout in milliseconds
    #[serde(default = "default_session_timeout")]
    #[envconfig(from = "KAFKA_SESSION_TIMEOUT_MS", default = "30000")]
    pub session_timeout_ms: u32,

    /// Timeout for metadata and offset lookups in milliseconds
    #[serde(default = "default_request_timeout")]
    #[envconfig(from = "KAFKA_REQUEST_TIMEOUT_MS", default = "10000")]
    pub request_timeout_ms: u64,

    /// Fetch min bytes
    #[serde(default = "default_fetch_min_bytes")]
    #[envconfig(from = "KAFKA_FETCH_MIN_BYTES", default = "1")]
    pub fetch_min_bytes: i32,

    /// Fetch max wait ms
    #[serde(default = "default_fetch_max_wait_ms")]
    #[envconfig(from = "KAFKA_FETCH_MAX_WAIT_MS", default = "500")]
    pub fetch_max_wait_ms: i32,

    /// Client id reported to the broker
    #[serde(default = "default_client_id")]
    #[envconfig(from = "KAFKA_CLIENT_ID", default = "hubcapture")]
    pub client_id: String,
}

impl Default for KafkaClientConfig {
    fn default() -> Self {
        Self {
            session_timeout_ms: default_session_timeout(),
            request_timeout_ms: default_request_timeout(),
            fetch_min_bytes: default_fetch_min_bytes(),
            fetch_max_wait_ms: default_fetch_max_wait_ms(),
            client_id: default_client_id(),
        }
    }
}

impl KafkaClientConfig {
    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Build rdkafka consumer configuration
    pub fn build_consumer_config(
        &self,
        endpoint: &KafkaEndpoint,
        consumer_group: &str,
    ) -> rdkafka::ClientConfig {
        let mut config = rdkafka::ClientConfig::new();

        config
            .set("bootstrap.servers", &endpoint.bootstrap_servers)
            .set("group.id", consumer_group)
            .set("client.id", &self.client_id)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", self.session_timeout_ms.to_string())
            .set("fetch.min.bytes", self.fetch_min_bytes.to_string())
            .set("fetch.wait.max.ms", self.fetch_max_wait_ms.to_string());

        if let Some(password) = &endpoint.sasl_password {
            config
                .set("security.protocol", "SASL_SSL")
                .set("sasl.mechanism", "PLAIN")
                .set("sasl.username", "$ConnectionString")
                .set("sasl.password", password);
        }

        config
    }
}

/// Where and how to reach the broker
#[derive(Clone, PartialEq, Eq)]
pub struct KafkaEndpoint {
    /// Comma-separated `host:port` list
    pub bootstrap_servers: String,
    /// Full connection string used as SASL PLAIN password
    pub sasl_password: Option<String>,
    /// Entity named in the connection string, if any
    pub entity_path: Option<String>,
}

impl KafkaEndpoint {
    /// Parse a hub connection string or a plain bootstrap server list
    ///
    /// `Endpoint=sb://<namespace>/;SharedAccessKeyName=..;SharedAccessKey=..`
    /// resolves to `<namespace>:9093` with SASL authentication; anything else
    /// is taken as a broker list without authentication.
    pub fn parse(connection_string: &str) -> Result<Self> {
        let trimmed = connection_string.trim();
        if trimmed.is_empty() {
            return Err(Error::connection("Connection string is empty"));
        }

        if !trimmed.contains('=') {
            return Ok(Self {
                bootstrap_servers: trimmed.to_string(),
                sasl_password: None,
                entity_path: None,
            });
        }

        let mut endpoint = None;
        let mut entity_path = None;
        for segment in trimmed.split(';').filter(|s| !s.trim().is_empty()) {
            let Some((key, value)) = segment.split_once('=') else {
                return Err(Error::connection(
                    "Malformed connection string, expected key=value segments",
                ));
            };
            match key.trim().to_ascii_lowercase().as_str() {
                "endpoint" => endpoint = Some(value.trim().to_string()),
                "entitypath" => entity_path = Some(value.trim().to_string()),
                _ => {},
            }
        }

        let endpoint =
            endpoint.ok_or_else(|| Error::connection("Connection string has no Endpoint"))?;
        let host = endpoint
            .trim_start_matches("sb://")
            .trim_start_matches("amqps://")
            .trim_end_matches('/');
        if host.is_empty() {
            return Err(Error::connection("Connection string Endpoint has no host"));
        }

        Ok(Self {
            bootstrap_servers: format!("{}:{}", host, HUB_KAFKA_PORT),
            sasl_password: Some(trimmed.to_string()),
            entity_path,
        })
    }
}

impl std::fmt::Debug for KafkaEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaEndpoint")
            .field("bootstrap_servers", &self.bootstrap_servers)
            .field("sasl", &self.sasl_password.is_some())
            .field("entity_path", &self.entity_path)
            .finish()
    }
}

// Default value functions
fn default_session_timeout() -> u32 {
    30000 // 30 seconds
}

fn default_request_timeout() -> u64 {
    10000
}

fn default_fetch_min_bytes() -> i32 {
    1
}

fn default_fetch_max_wait_ms() -> i32 {
    500
}

fn default_client_id() -> String {
    "hubcapture".to_string()
}
