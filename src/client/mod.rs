//! Stream client boundary
//!
//! The session controller only talks to the message hub through
//! [`StreamClient`]. Transport, authentication, partition ownership and
//! checkpoint persistence all live behind it. Received events and partition
//! lifecycle changes flow back through an [`EventHandler`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::models::{CloseReason, EventData, PartitionContext};

/// Position from which a receive operation starts reading each partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartingPosition {
    /// Enqueued-time boundary
    pub timestamp: DateTime<Utc>,
    /// Whether an event enqueued exactly at `timestamp` is delivered
    pub inclusive: bool,
}

impl StartingPosition {
    /// Inclusive position at an absolute time
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            inclusive: true,
        }
    }

    /// Inclusive position `lookback` before `now`
    pub fn lookback_from(now: DateTime<Utc>, lookback: chrono::Duration) -> Result<Self> {
        now.checked_sub_signed(lookback)
            .map(Self::at)
            .ok_or_else(|| {
                Error::invalid_config(format!(
                    "Streaming window of {} minutes reaches before the earliest representable time",
                    lookback.num_minutes()
                ))
            })
    }

    /// Boundary as milliseconds since the Unix epoch
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

impl fmt::Display for StartingPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({})",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            if self.inclusive { "inclusive" } else { "exclusive" }
        )
    }
}

/// Consumer connection to a partitioned event stream
#[async_trait]
pub trait StreamClient: Send + Sync {
    /// Open a connection for `stream_name` under `consumer_group`
    async fn connect(
        &self,
        connection_string: &str,
        consumer_group: &str,
        stream_name: &str,
    ) -> Result<()>;

    /// Deliver events to `handler` until [`close`](StreamClient::close) is
    /// called or an unrecoverable error ends the operation
    ///
    /// Unrecoverable errors are reported through
    /// [`EventHandler::on_error`] without a partition context before this
    /// returns.
    async fn receive(
        &self,
        handler: Arc<dyn EventHandler>,
        starting_position: StartingPosition,
    ) -> Result<()>;

    /// Signal a running receive operation to stop
    async fn close(&self) -> Result<()>;
}

/// Callbacks invoked by a receive operation
///
/// Calls for different partitions may run concurrently. Implementations must
/// not panic; failures are reported, never propagated.
pub trait EventHandler: Send + Sync {
    /// An event arrived on the context's partition
    fn on_event(&self, ctx: &PartitionContext, event: EventData);

    /// A partition was claimed and is about to deliver events
    fn on_partition_initialize(&self, ctx: &PartitionContext);

    /// A partition stopped delivering events
    fn on_partition_close(&self, ctx: &PartitionContext, reason: CloseReason);

    /// A delivery error; without a context the error concerns the whole
    /// receive operation
    fn on_error(&self, ctx: Option<&PartitionContext>, error: &Error);
}

/// Durable per-partition position store owned by the client
pub trait CheckpointStore: Send + Sync {
    /// Mark `event` as processed on `partition_id`
    fn update_checkpoint(&self, partition_id: &str, event: &EventData) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_lookback_from() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let position = StartingPosition::lookback_from(now, chrono::Duration::minutes(15)).unwrap();

        assert_eq!(position.timestamp, Utc.with_ymd_and_hms(2024, 5, 1, 11, 45, 0).unwrap());
        assert!(position.inclusive);
    }

    #[test]
    fn test_zero_lookback_is_now() {
        let now = Utc::now();
        let position = StartingPosition::lookback_from(now, chrono::Duration::zero()).unwrap();
        assert_eq!(position.timestamp, now);
    }

    #[test]
    fn test_display() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 5).unwrap();
        assert_eq!(
            StartingPosition::at(ts).to_string(),
            "2024-05-01 08:30:05 (inclusive)"
        );
        assert_eq!(StartingPosition::at(ts).timestamp_millis(), ts.timestamp_millis());
    }
}
