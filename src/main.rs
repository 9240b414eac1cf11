//! hubcapture - capture a time window of a partitioned event stream
//!
//! Reads from a look-back starting position for a fixed duration, then prints
//! the collected events as a JSON table on stdout.

use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use hubcapture::error::Result;
use hubcapture::kafka::KafkaStreamClient;
use hubcapture::logging::{self, LogMetrics};
use hubcapture::{AppConfig, SessionController};

#[derive(Parser, Debug)]
#[command(name = "hubcapture")]
#[command(version)]
#[command(about = "Capture a time window of an event stream as a table")]
struct Args {
    /// TOML configuration file; environment variables are used when omitted
    #[arg(short, long, env = "HUBCAPTURE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the receive duration in seconds
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Override the look-back window in minutes
    #[arg(long)]
    lookback_minutes: Option<u64>,

    /// Print rows as an array of JSON objects instead of columns + rows
    #[arg(long)]
    records: bool,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::from_env()?,
    };

    if let Some(duration) = args.duration_secs {
        config.session.duration_secs = duration;
    }
    if let Some(lookback) = args.lookback_minutes {
        config.session.lookback_minutes = lookback;
    }

    config.validate()?;

    logging::init_tracing(&config.logging)?;
    config.log_config();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting hubcapture");

    let client = Arc::new(KafkaStreamClient::new(config.kafka.clone()));
    let controller = SessionController::new(client);
    let outcome = controller.run_session_with_report(&config.session).await?;

    LogMetrics::gauge(
        "session_elapsed_secs",
        outcome.report.elapsed.as_secs_f64(),
        &[("stream", config.session.stream_name.as_str())],
    );

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match (args.records, args.pretty) {
        (true, true) => serde_json::to_writer_pretty(&mut out, &outcome.table.records())?,
        (true, false) => serde_json::to_writer(&mut out, &outcome.table.records())?,
        (false, true) => serde_json::to_writer_pretty(&mut out, &outcome.table)?,
        (false, false) => serde_json::to_writer(&mut out, &outcome.table)?,
    }
    writeln!(out)?;

    tracing::info!(
        session_id = %outcome.report.session_id,
        rows = outcome.table.len(),
        "hubcapture finished"
    );
    Ok(())
}
