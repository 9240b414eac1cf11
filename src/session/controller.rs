//! Timed capture session
//!
//! A session connects, receives on a separate task for exactly the configured
//! duration, closes the client and waits (bounded) for the receive task to
//! finish before the collected events are turned into a [`Table`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn, Instrument, Span};
use uuid::Uuid;

use super::collector::EventCollector;
use crate::client::{EventHandler, StartingPosition, StreamClient};
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::logging::LogMetrics;
use crate::models::{materialize, Table};

/// Summary of a finished session
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub stream_name: String,
    pub starting_position: DateTime<Utc>,
    pub elapsed: Duration,
    pub events_collected: usize,
    pub partitions: Vec<String>,
    pub partition_errors: usize,
    pub session_errors: usize,
}

/// Table plus the report of the session that produced it
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub table: Table,
    pub report: SessionReport,
}

/// Runs capture sessions against one stream client
///
/// The controller can run any number of sessions one after another; each
/// gets its own collector.
pub struct SessionController {
    client: Arc<dyn StreamClient>,
}

impl SessionController {
    pub fn new(client: Arc<dyn StreamClient>) -> Self {
        Self { client }
    }

    /// Run one session and return the captured table
    pub async fn run_session(&self, config: &SessionConfig) -> Result<Table> {
        self.run_session_with_report(config)
            .await
            .map(|outcome| outcome.table)
    }

    /// Run one session and return the table together with its report
    pub async fn run_session_with_report(&self, config: &SessionConfig) -> Result<SessionOutcome> {
        config.validate()?;

        let session_id = Uuid::new_v4();
        let span = crate::session_span!(session_id, config.stream_name);

        self.run_validated(session_id, config)
            .instrument(span)
            .await
    }

    async fn run_validated(&self, session_id: Uuid, config: &SessionConfig) -> Result<SessionOutcome> {
        let starting_position = StartingPosition::lookback_from(Utc::now(), config.lookback()?)?;

        info!(
            connection = %config.masked_connection_string(),
            consumer_group = %config.consumer_group,
            starting_position = %starting_position,
            "Connecting to stream"
        );

        self.client
            .connect(
                &config.connection_string,
                &config.consumer_group,
                &config.stream_name,
            )
            .await
            .map_err(|e| match e {
                Error::Connection(_) => e,
                other => Error::connection(other.to_string()),
            })?;

        let collector = Arc::new(EventCollector::new());
        let handler: Arc<dyn EventHandler> = collector.clone();
        let client = Arc::clone(&self.client);
        let started = Instant::now();

        let mut receive = tokio::spawn(
            async move { client.receive(handler, starting_position).await }
                .instrument(Span::current()),
        );

        info!(duration_secs = config.duration_secs, "Receiving events");
        sleep(config.duration()).await;

        if let Err(e) = self.client.close().await {
            crate::log_error!(e, "Failed to close stream client");
        }

        match timeout(config.shutdown_timeout(), &mut receive).await {
            Ok(Ok(Ok(()))) => debug!("Receive operation stopped"),
            Ok(Ok(Err(e))) => {
                warn!(error = %e, "Receive operation ended with an error, keeping partial results");
            },
            Ok(Err(join_error)) => {
                error!(error = %join_error, "Receive task failed");
                return Err(Error::internal(format!("Receive task failed: {}", join_error)));
            },
            Err(_) => {
                receive.abort();
                error!(
                    shutdown_timeout_secs = config.shutdown_timeout_secs,
                    "Receive operation did not stop, discarding collected events"
                );
                return Err(Error::ShutdownTimeout(config.shutdown_timeout()));
            },
        }

        let collected = collector.freeze();
        let table = materialize(&collected.records);
        let elapsed = started.elapsed();

        let span = Span::current();
        span.record("events_collected", collected.records.len() as u64);
        span.record("elapsed_ms", elapsed.as_millis() as u64);

        LogMetrics::gauge(
            "session_table_rows",
            table.len() as f64,
            &[("stream", config.stream_name.as_str())],
        );

        let report = SessionReport {
            session_id,
            stream_name: config.stream_name.clone(),
            starting_position: starting_position.timestamp,
            elapsed,
            events_collected: collected.records.len(),
            partitions: collected.partitions.iter().cloned().collect(),
            partition_errors: collected.partition_errors(),
            session_errors: collected.session_errors(),
        };

        info!(
            starting_position = %starting_position,
            events = report.events_collected,
            columns = table.columns().len(),
            partitions = report.partitions.len(),
            partition_errors = report.partition_errors,
            session_errors = report.session_errors,
            "Finished streaming events"
        );

        Ok(SessionOutcome { table, report })
    }
}

/// Run a single session with `client`
pub async fn run_session(config: &SessionConfig, client: Arc<dyn StreamClient>) -> Result<Table> {
    SessionController::new(client).run_session(config).await
}
