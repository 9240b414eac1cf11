//! Event data models for hubcapture
//!
//! This module defines the event as delivered by a stream client, the
//! per-callback partition context and the partition close reasons.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::client::CheckpointStore;
use crate::error::{Error, Result};

/// A decoded event body: string keys to JSON values
pub type Record = Map<String, Value>;

/// Event as received from the stream
///
/// The body is kept as opaque bytes until the collector decodes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    /// Partition the event was read from
    pub partition_id: String,

    /// Position of the event within its partition
    pub offset: i64,

    /// When the service accepted the event
    pub enqueued_time: Option<DateTime<Utc>>,

    /// Optional partition key set by the producer
    pub partition_key: Option<String>,

    /// Raw payload
    pub body: Vec<u8>,
}

impl EventData {
    /// Create a new event with no enqueued time or partition key
    pub fn new(partition_id: impl Into<String>, offset: i64, body: impl Into<Vec<u8>>) -> Self {
        Self {
            partition_id: partition_id.into(),
            offset,
            enqueued_time: None,
            partition_key: None,
            body: body.into(),
        }
    }

    /// Create an event whose body is the serialized JSON value
    pub fn from_json(partition_id: impl Into<String>, offset: i64, value: &Value) -> Self {
        Self::new(partition_id, offset, value.to_string())
    }

    /// Set the enqueued time
    pub fn with_enqueued_time(mut self, enqueued_time: DateTime<Utc>) -> Self {
        self.enqueued_time = Some(enqueued_time);
        self
    }

    /// Set the partition key
    pub fn with_partition_key(mut self, key: impl Into<String>) -> Self {
        self.partition_key = Some(key.into());
        self
    }

    /// Body as UTF-8 text
    pub fn body_as_str(&self) -> Result<&str> {
        std::str::from_utf8(&self.body).map_err(|e| {
            Error::decode(format!(
                "Body of event at partition {} offset {} is not UTF-8: {}",
                self.partition_id, self.offset, e
            ))
        })
    }

    /// Body decoded as a JSON object
    pub fn body_as_json(&self) -> Result<Record> {
        let value: Value = serde_json::from_str(self.body_as_str()?).map_err(|e| {
            Error::decode(format!(
                "Body of event at partition {} offset {} is not JSON: {}",
                self.partition_id, self.offset, e
            ))
        })?;

        match value {
            Value::Object(map) => Ok(map),
            other => Err(Error::decode(format!(
                "Body of event at partition {} offset {} is a JSON {}, expected an object",
                self.partition_id,
                self.offset,
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Identifies the partition a callback is about and lets the handler
/// advance its checkpoint
///
/// Handed to callbacks by reference; handlers must not keep it.
#[derive(Clone)]
pub struct PartitionContext {
    partition_id: String,
    stream_name: String,
    consumer_group: String,
    checkpoint_store: Arc<dyn CheckpointStore>,
}

impl PartitionContext {
    /// Create a context for one partition
    pub fn new(
        partition_id: impl Into<String>,
        stream_name: impl Into<String>,
        consumer_group: impl Into<String>,
        checkpoint_store: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            partition_id: partition_id.into(),
            stream_name: stream_name.into(),
            consumer_group: consumer_group.into(),
            checkpoint_store,
        }
    }

    pub fn partition_id(&self) -> &str {
        &self.partition_id
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    pub fn consumer_group(&self) -> &str {
        &self.consumer_group
    }

    /// Record `event` as the last processed position of this partition
    pub fn update_checkpoint(&self, event: &EventData) -> Result<()> {
        self.checkpoint_store.update_checkpoint(&self.partition_id, event)
    }
}

impl fmt::Debug for PartitionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionContext")
            .field("partition_id", &self.partition_id)
            .field("stream_name", &self.stream_name)
            .field("consumer_group", &self.consumer_group)
            .finish_non_exhaustive()
    }
}

/// Why a partition stopped being processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    /// The client was closed
    #[serde(rename = "SHUTDOWN")]
    Shutdown,
    /// Another consumer claimed the partition
    #[serde(rename = "OWNERSHIP_LOST")]
    OwnershipLost,
    /// The receiving process is exiting
    #[serde(rename = "PROCESS_EXIT")]
    ProcessExit,
}

impl CloseReason {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Shutdown => "SHUTDOWN",
            CloseReason::OwnershipLost => "OWNERSHIP_LOST",
            CloseReason::ProcessExit => "PROCESS_EXIT",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
