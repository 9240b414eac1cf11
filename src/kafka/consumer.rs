//! Kafka stream client with manual partition assignment

use super::{KafkaClientConfig, KafkaEndpoint};
use crate::client::{CheckpointStore, EventHandler, StartingPosition, StreamClient};
use crate::error::{Error, Result};
use crate::models::{CloseReason, EventData, PartitionContext};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::StreamExt;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::topic_partition_list::TopicPartitionList;
use rdkafka::Offset;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Open consumer plus what a receive operation needs to know about it
#[derive(Clone)]
struct Connection {
    consumer: Arc<StreamConsumer>,
    stream_name: String,
    consumer_group: String,
    partitions: Vec<i32>,
    cancel: CancellationToken,
}

/// Stream client reading a hub through its Kafka-compatible endpoint
///
/// Every partition of the stream is assigned to this consumer directly; the
/// consumer group is only used to store checkpoints as committed offsets.
pub struct KafkaStreamClient {
    /// Consumer settings
    config: KafkaClientConfig,

    /// Current connection, if any
    connection: Mutex<Option<Connection>>,
}

impl KafkaStreamClient {
    /// Create a client that connects on demand
    pub fn new(config: KafkaClientConfig) -> Self {
        Self {
            config,
            connection: Mutex::new(None),
        }
    }

    fn current(&self) -> Result<Connection> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| Error::connection("Stream client is not connected"))
    }

    /// Resolve the starting offset of every partition for a timestamp
    async fn resolve_offsets(
        &self,
        conn: &Connection,
        starting_position: StartingPosition,
    ) -> Result<TopicPartitionList> {
        let mut timestamps = TopicPartitionList::new();
        for partition in &conn.partitions {
            timestamps.add_partition_offset(
                &conn.stream_name,
                *partition,
                Offset::Offset(starting_position.timestamp_millis()),
            )?;
        }

        let consumer = Arc::clone(&conn.consumer);
        let timeout = self.config.request_timeout();
        let resolved =
            tokio::task::spawn_blocking(move || consumer.offsets_for_times(timestamps, timeout))
                .await
                .map_err(|e| anyhow!("Offset lookup task failed: {}", e))??;

        Ok(resolved)
    }
}

/// Look up the partition ids of a topic
fn fetch_partition_ids(
    consumer: &StreamConsumer,
    topic: &str,
    timeout: Duration,
) -> Result<Vec<i32>> {
    let metadata = consumer
        .fetch_metadata(Some(topic), timeout)
        .map_err(|e| Error::connection(format!("Failed to fetch metadata: {}", e)))?;

    let topic_metadata = metadata
        .topics()
        .iter()
        .find(|t| t.name() == topic)
        .ok_or_else(|| Error::connection(format!("Stream '{}' not found", topic)))?;

    if let Some(err) = topic_metadata.error() {
        return Err(Error::connection(format!(
            "Stream '{}' is not available: {:?}",
            topic, err
        )));
    }

    let partitions: Vec<i32> = topic_metadata.partitions().iter().map(|p| p.id()).collect();
    if partitions.is_empty() {
        return Err(Error::connection(format!("Stream '{}' has no partitions", topic)));
    }

    Ok(partitions)
}

/// Why the receive loop let go of its partitions
///
/// The loop only stops without a cancel when the consumer's message stream
/// itself ended.
fn close_reason(cancelled: bool) -> CloseReason {
    if cancelled {
        CloseReason::Shutdown
    } else {
        CloseReason::ProcessExit
    }
}

/// Copy a broker message into an owned event
fn event_from_message(message: &BorrowedMessage<'_>) -> EventData {
    let mut event = EventData::new(
        message.partition().to_string(),
        message.offset(),
        message.payload().map(|p| p.to_vec()).unwrap_or_default(),
    );

    if let Some(enqueued) = message
        .timestamp()
        .to_millis()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
    {
        event = event.with_enqueued_time(enqueued);
    }

    if let Some(key) = message.key() {
        event = event.with_partition_key(String::from_utf8_lossy(key));
    }

    event
}

#[async_trait]
impl StreamClient for KafkaStreamClient {
    async fn connect(
        &self,
        connection_string: &str,
        consumer_group: &str,
        stream_name: &str,
    ) -> Result<()> {
        let endpoint = KafkaEndpoint::parse(connection_string)?;
        if let Some(entity) = &endpoint.entity_path {
            if entity != stream_name {
                warn!(
                    entity_path = %entity,
                    stream = %stream_name,
                    "Connection string names a different stream, using the configured one"
                );
            }
        }

        info!(
            bootstrap_servers = %endpoint.bootstrap_servers,
            stream = %stream_name,
            "Connecting to Kafka endpoint"
        );

        let consumer: StreamConsumer = self
            .config
            .build_consumer_config(&endpoint, consumer_group)
            .create()
            .map_err(|e| Error::connection(format!("Failed to create Kafka consumer: {}", e)))?;
        let consumer = Arc::new(consumer);

        let probe = Arc::clone(&consumer);
        let topic = stream_name.to_string();
        let timeout = self.config.request_timeout();
        let partitions =
            tokio::task::spawn_blocking(move || fetch_partition_ids(&probe, &topic, timeout))
                .await
                .map_err(|e| Error::internal(format!("Metadata task failed: {}", e)))??;

        info!(partitions = partitions.len(), "Connected to stream");

        let previous = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Connection {
                consumer,
                stream_name: stream_name.to_string(),
                consumer_group: consumer_group.to_string(),
                partitions,
                cancel: CancellationToken::new(),
            });

        if let Some(previous) = previous {
            previous.cancel.cancel();
        }

        Ok(())
    }

    async fn receive(
        &self,
        handler: Arc<dyn EventHandler>,
        starting_position: StartingPosition,
    ) -> Result<()> {
        let conn = match self.current() {
            Ok(conn) => conn,
            Err(e) => {
                handler.on_error(None, &e);
                return Err(e);
            },
        };

        let assignment = match self.resolve_offsets(&conn, starting_position).await {
            Ok(tpl) => tpl,
            Err(e) => {
                handler.on_error(None, &e);
                return Err(e);
            },
        };

        if let Err(e) = conn.consumer.assign(&assignment) {
            let err = Error::from(e);
            handler.on_error(None, &err);
            return Err(err);
        }

        let checkpoints: Arc<dyn CheckpointStore> = Arc::new(KafkaCheckpointStore {
            consumer: Arc::clone(&conn.consumer),
            topic: conn.stream_name.clone(),
        });

        let contexts: BTreeMap<i32, PartitionContext> = conn
            .partitions
            .iter()
            .map(|p| {
                let ctx = PartitionContext::new(
                    p.to_string(),
                    conn.stream_name.clone(),
                    conn.consumer_group.clone(),
                    Arc::clone(&checkpoints),
                );
                (*p, ctx)
            })
            .collect();

        for ctx in contexts.values() {
            handler.on_partition_initialize(ctx);
        }

        info!(
            starting_position = %starting_position,
            partitions = contexts.len(),
            "Receiving from stream"
        );

        let stream = conn.consumer.stream();
        tokio::pin!(stream);

        loop {
            tokio::select! {
                _ = conn.cancel.cancelled() => break,
                message = stream.next() => match message {
                    Some(Ok(message)) => {
                        let Some(ctx) = contexts.get(&message.partition()) else {
                            debug!(partition = message.partition(), "Message from unassigned partition");
                            continue;
                        };
                        let event = event_from_message(&message);
                        let span = crate::partition_span!(ctx.partition_id());
                        span.record("last_offset", event.offset);
                        span.in_scope(|| handler.on_event(ctx, event));
                    },
                    Some(Err(e)) => handler.on_error(None, &Error::from(e)),
                    None => {
                        warn!("Kafka message stream ended");
                        break;
                    },
                },
            }
        }

        let reason = close_reason(conn.cancel.is_cancelled());
        for ctx in contexts.values() {
            handler.on_partition_close(ctx, reason);
        }

        info!("Kafka consumer stopped");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let conn = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match conn {
            Some(conn) => {
                info!(stream = %conn.stream_name, "Closing stream client");
                conn.cancel.cancel();
            },
            None => debug!("Close called without an open connection"),
        }

        Ok(())
    }
}

/// Checkpoints stored as committed offsets of the consumer group
struct KafkaCheckpointStore {
    consumer: Arc<StreamConsumer>,
    topic: String,
}

impl CheckpointStore for KafkaCheckpointStore {
    fn update_checkpoint(&self, partition_id: &str, event: &EventData) -> Result<()> {
        let partition: i32 = partition_id
            .parse()
            .map_err(|_| Error::checkpoint(format!("Invalid partition id '{}'", partition_id)))?;

        // Committed offsets name the next message to read
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&self.topic, partition, Offset::Offset(event.offset + 1))
            .map_err(|e| Error::checkpoint(e.to_string()))?;

        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| Error::checkpoint(format!("Failed to commit offset: {}", e)))
    }
}
