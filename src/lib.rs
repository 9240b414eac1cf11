//! hubcapture library
//!
//! Time-boxed capture of a partitioned event stream: a session reads from a
//! look-back starting position for a fixed duration, collects the decoded
//! event bodies and returns them as a uniform table.

pub mod client;
pub mod config;
pub mod error;
pub mod kafka;
pub mod logging;
pub mod models;
pub mod session;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export commonly used types at the crate root
pub use config::{AppConfig, SessionConfig};
pub use error::{Error, Result};

pub use client::{CheckpointStore, EventHandler, StartingPosition, StreamClient};
pub use models::{materialize, CloseReason, EventData, PartitionContext, Record, Table};
pub use session::{run_session, EventCollector, SessionController, SessionOutcome, SessionReport};
