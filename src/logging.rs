//! Structured logging for hubcapture
//!
//! Everything is written to stderr: stdout carries the captured table.
//! Production environments get one JSON object per line, everything else a
//! human-readable layout.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Output layout of the log stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    pub fn for_environment(environment: &str) -> Self {
        if environment.eq_ignore_ascii_case("production") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Filter used when `RUST_LOG` is not set
///
/// librdkafka is chatty at info, so it is held at warn unless the configured
/// level is stricter.
pub fn default_directive(config: &LoggingConfig) -> String {
    let level = config.log_level.trim().to_ascii_lowercase();
    let rdkafka = match level.as_str() {
        "error" | "off" => level.as_str(),
        _ => "warn",
    };
    format!("hubcapture={},rdkafka={}", level, rdkafka)
}

/// Install the global subscriber
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config)));
    let format = LogFormat::for_environment(&config.environment);

    // Option<Layer> is a no-op layer when None
    let json = (format == LogFormat::Json).then(|| {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
    });
    let pretty = (format == LogFormat::Pretty).then(|| {
        fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_span_events(FmtSpan::CLOSE)
    });

    Registry::default()
        .with(filter)
        .with(json)
        .with(pretty)
        .try_init()
        .map_err(|e| Error::internal(format!("Failed to initialize tracing: {}", e)))?;

    tracing::info!(
        environment = %config.environment,
        log_level = %config.log_level,
        format = ?format,
        "Logging initialized"
    );

    Ok(())
}

/// Span covering one capture session
#[macro_export]
macro_rules! session_span {
    ($session_id:expr, $stream:expr) => {
        tracing::info_span!(
            "capture_session",
            session_id = %$session_id,
            stream = %$stream,
            events_collected = tracing::field::Empty,
            elapsed_ms = tracing::field::Empty,
        )
    };
}

/// Span covering delivery of one event
#[macro_export]
macro_rules! partition_span {
    ($partition_id:expr) => {
        tracing::info_span!(
            "partition",
            partition_id = %$partition_id,
            last_offset = tracing::field::Empty,
        )
    };
}

/// Log a crate [`Error`](crate::Error) with its stable type tag
#[macro_export]
macro_rules! log_error {
    ($error:expr, $msg:expr) => {
        tracing::error!(
            error = %$error,
            error_type = $error.error_type(),
            $msg
        )
    };
}

/// Metrics emitted as structured log events
pub struct LogMetrics;

impl LogMetrics {
    /// Counter increment, logged at debug since it fires per event
    pub fn counter(name: &str, value: u64, labels: &[(&str, &str)]) {
        tracing::debug!(
            metric_type = "counter",
            metric_name = name,
            metric_value = value,
            metric_labels = ?labels,
            "Metric recorded"
        );
    }

    /// Gauge sample, logged once per session
    pub fn gauge(name: &str, value: f64, labels: &[(&str, &str)]) {
        tracing::info!(
            metric_type = "gauge",
            metric_name = name,
            metric_value = value,
            metric_labels = ?labels,
            "Metric recorded"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logging(level: &str, environment: &str) -> LoggingConfig {
        LoggingConfig {
            log_level: level.to_string(),
            environment: environment.to_string(),
        }
    }

    #[test]
    fn test_format_follows_environment() {
        assert_eq!(LogFormat::for_environment("production"), LogFormat::Json);
        assert_eq!(LogFormat::for_environment("PRODUCTION"), LogFormat::Json);
        assert_eq!(LogFormat::for_environment("development"), LogFormat::Pretty);
        assert_eq!(LogFormat::for_environment("staging"), LogFormat::Pretty);
    }

    #[test]
    fn test_default_directive_quiets_rdkafka() {
        assert_eq!(
            default_directive(&logging("debug", "development")),
            "hubcapture=debug,rdkafka=warn"
        );
        assert_eq!(
            default_directive(&logging(" INFO ", "production")),
            "hubcapture=info,rdkafka=warn"
        );
    }

    #[test]
    fn test_default_directive_keeps_stricter_level() {
        assert_eq!(
            default_directive(&logging("error", "production")),
            "hubcapture=error,rdkafka=error"
        );
    }

    #[test]
    fn test_log_error_accepts_crate_errors() {
        let err = Error::kafka("broker down");
        crate::log_error!(err, "Close failed");
    }

    #[test]
    fn test_spans_build() {
        let _session = crate::session_span!("abc", "telemetry");
        let _partition = crate::partition_span!("3");
    }
}
