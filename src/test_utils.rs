//! Test utilities for hubcapture
//!
//! This module provides in-memory implementations of the stream client
//! boundary for testing sessions without a message hub.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::client::{CheckpointStore, EventHandler, StartingPosition, StreamClient};
use crate::error::{Error, Result};
use crate::models::{CloseReason, EventData, PartitionContext};

/// Checkpoint store that keeps the last offset per partition in memory
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    offsets: Mutex<HashMap<String, i64>>,
    updates: AtomicUsize,
    fail_next: Mutex<Option<String>>,
}

impl InMemoryCheckpointStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the store to fail on the next update
    pub fn fail_next_operation(&self, error_message: &str) {
        *self.fail_next.lock().unwrap() = Some(error_message.to_string());
    }

    /// Last checkpointed offset of a partition
    pub fn checkpoint(&self, partition_id: &str) -> Option<i64> {
        self.offsets.lock().unwrap().get(partition_id).copied()
    }

    /// Number of successful updates
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn update_checkpoint(&self, partition_id: &str, event: &EventData) -> Result<()> {
        if let Some(msg) = self.fail_next.lock().unwrap().take() {
            return Err(Error::checkpoint(msg));
        }
        self.offsets
            .lock()
            .unwrap()
            .insert(partition_id.to_string(), event.offset);
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Events one scripted partition delivers
#[derive(Debug, Clone)]
pub struct ScriptedPartition {
    pub partition_id: String,
    pub events: Vec<EventData>,
    pub error: Option<String>,
}

/// Stream client that replays scripted partitions
///
/// Each partition runs on its own task: it is initialized, delivers its
/// events, optionally reports a partition-scoped error, then idles until the
/// client is closed. Behaviour switches cover connection failures,
/// session-level failures that end the receive operation early, and a
/// receive operation that ignores `close`.
pub struct ScriptedStreamClient {
    partitions: Vec<ScriptedPartition>,
    fail_connect: Option<String>,
    session_failure: Option<String>,
    ignore_close: bool,
    event_interval: Duration,
    checkpoints: Arc<dyn CheckpointStore>,
    connect_calls: AtomicUsize,
    close_calls: AtomicUsize,
    connection: Mutex<Option<(String, String)>>,
    starting_positions: Mutex<Vec<StartingPosition>>,
    cancel: Mutex<CancellationToken>,
}

impl Default for ScriptedStreamClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedStreamClient {
    /// Create a client with no partitions
    pub fn new() -> Self {
        Self {
            partitions: Vec::new(),
            fail_connect: None,
            session_failure: None,
            ignore_close: false,
            event_interval: Duration::ZERO,
            checkpoints: Arc::new(InMemoryCheckpointStore::new()),
            connect_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            connection: Mutex::new(None),
            starting_positions: Mutex::new(Vec::new()),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Add a partition delivering JSON bodies at offsets 0, 1, 2, ...
    pub fn with_partition(mut self, partition_id: &str, bodies: Vec<Value>) -> Self {
        let events = bodies
            .iter()
            .enumerate()
            .map(|(offset, body)| EventData::from_json(partition_id, offset as i64, body))
            .collect();
        self.partitions.push(ScriptedPartition {
            partition_id: partition_id.to_string(),
            events,
            error: None,
        });
        self
    }

    /// Add a partition delivering prebuilt events
    pub fn with_raw_partition(mut self, partition_id: &str, events: Vec<EventData>) -> Self {
        self.partitions.push(ScriptedPartition {
            partition_id: partition_id.to_string(),
            events,
            error: None,
        });
        self
    }

    /// Report a partition-scoped error after the partition's events
    pub fn with_partition_error(mut self, partition_id: &str, message: &str) -> Self {
        if let Some(partition) = self
            .partitions
            .iter_mut()
            .find(|p| p.partition_id == partition_id)
        {
            partition.error = Some(message.to_string());
        }
        self
    }

    /// Fail every connection attempt
    pub fn fail_connect(mut self, message: &str) -> Self {
        self.fail_connect = Some(message.to_string());
        self
    }

    /// After all partitions delivered, report a session-scoped error and end
    /// the receive operation without waiting for `close`
    pub fn fail_session_after_delivery(mut self, message: &str) -> Self {
        self.session_failure = Some(message.to_string());
        self
    }

    /// Keep the receive operation running after `close`
    pub fn ignore_close(mut self) -> Self {
        self.ignore_close = true;
        self
    }

    /// Pause between consecutive events of a partition
    pub fn with_event_interval(mut self, interval: Duration) -> Self {
        self.event_interval = interval;
        self
    }

    /// Use a custom checkpoint store
    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = store;
        self
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Starting positions passed to every receive call so far
    pub fn starting_positions(&self) -> Vec<StartingPosition> {
        self.starting_positions.lock().unwrap().clone()
    }

    fn context(&self, partition_id: &str) -> PartitionContext {
        let (stream, group) = self
            .connection
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_default();
        PartitionContext::new(partition_id, stream, group, Arc::clone(&self.checkpoints))
    }
}

#[async_trait]
impl StreamClient for ScriptedStreamClient {
    async fn connect(
        &self,
        _connection_string: &str,
        consumer_group: &str,
        stream_name: &str,
    ) -> Result<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = &self.fail_connect {
            return Err(Error::connection(msg.clone()));
        }
        *self.connection.lock().unwrap() =
            Some((stream_name.to_string(), consumer_group.to_string()));
        *self.cancel.lock().unwrap() = CancellationToken::new();
        Ok(())
    }

    async fn receive(
        &self,
        handler: Arc<dyn EventHandler>,
        starting_position: StartingPosition,
    ) -> Result<()> {
        self.starting_positions
            .lock()
            .unwrap()
            .push(starting_position);

        let cancel = self.cancel.lock().unwrap().clone();
        let stop_after_delivery = self.session_failure.is_some();
        let mut tasks = JoinSet::new();

        for partition in &self.partitions {
            let ctx = self.context(&partition.partition_id);
            let events = partition.events.clone();
            let error = partition.error.clone();
            let handler = Arc::clone(&handler);
            let cancel = cancel.clone();
            let interval = self.event_interval;
            let ignore_close = self.ignore_close;

            tasks.spawn(async move {
                handler.on_partition_initialize(&ctx);

                for event in events {
                    if !interval.is_zero() {
                        tokio::select! {
                            _ = tokio::time::sleep(interval) => {},
                            _ = cancel.cancelled(), if !ignore_close => break,
                        }
                    }
                    if cancel.is_cancelled() && !ignore_close {
                        break;
                    }
                    handler.on_event(&ctx, event);
                }

                if let Some(msg) = error {
                    handler.on_error(Some(&ctx), &Error::kafka(msg));
                }

                if stop_after_delivery {
                    handler.on_partition_close(&ctx, CloseReason::OwnershipLost);
                    return;
                }

                if ignore_close {
                    std::future::pending::<()>().await;
                }

                cancel.cancelled().await;
                handler.on_partition_close(&ctx, CloseReason::Shutdown);
            });
        }

        while tasks.join_next().await.is_some() {}

        if let Some(msg) = &self.session_failure {
            let err = Error::kafka(msg.clone());
            handler.on_error(None, &err);
            return Err(err);
        }

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.cancel.lock().unwrap().cancel();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[derive(Default)]
    struct CountingHandler {
        events: AtomicUsize,
        initialized: AtomicUsize,
        closed: AtomicUsize,
        errors: AtomicUsize,
    }

    impl EventHandler for CountingHandler {
        fn on_event(&self, _ctx: &PartitionContext, _event: EventData) {
            self.events.fetch_add(1, Ordering::SeqCst);
        }

        fn on_partition_initialize(&self, _ctx: &PartitionContext) {
            self.initialized.fetch_add(1, Ordering::SeqCst);
        }

        fn on_partition_close(&self, _ctx: &PartitionContext, _reason: CloseReason) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }

        fn on_error(&self, _ctx: Option<&PartitionContext>, _error: &Error) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_checkpoint_store() {
        let store = InMemoryCheckpointStore::new();
        store
            .update_checkpoint("0", &EventData::new("0", 3, "{}"))
            .unwrap();

        assert_eq!(store.checkpoint("0"), Some(3));
        assert_eq!(store.checkpoint("1"), None);

        store.fail_next_operation("boom");
        assert!(store
            .update_checkpoint("0", &EventData::new("0", 4, "{}"))
            .is_err());
        assert_eq!(store.checkpoint("0"), Some(3));
        assert_eq!(store.update_count(), 1);
    }

    #[tokio::test]
    async fn test_scripted_client_runs_until_closed() {
        let client = Arc::new(
            ScriptedStreamClient::new()
                .with_partition("0", vec![json!({"a": 1}), json!({"a": 2})])
                .with_partition("1", vec![json!({"b": 1})]),
        );
        let handler = Arc::new(CountingHandler::default());

        client.connect("cs", "$Default", "telemetry").await.unwrap();
        let receiving = {
            let client = Arc::clone(&client);
            let handler: Arc<dyn EventHandler> = handler.clone();
            tokio::spawn(async move { client.receive(handler, StartingPosition::at(Utc::now())).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!receiving.is_finished());

        client.close().await.unwrap();
        receiving.await.unwrap().unwrap();

        assert_eq!(handler.events.load(Ordering::SeqCst), 3);
        assert_eq!(handler.initialized.load(Ordering::SeqCst), 2);
        assert_eq!(handler.closed.load(Ordering::SeqCst), 2);
        assert_eq!(client.connect_calls(), 1);
        assert_eq!(client.close_calls(), 1);
        assert_eq!(client.starting_positions().len(), 1);
    }

    #[tokio::test]
    async fn test_scripted_client_connect_failure() {
        let client = ScriptedStreamClient::new().fail_connect("unauthorized");
        let result = client.connect("cs", "$Default", "telemetry").await;
        assert!(matches!(result, Err(Error::Connection(_))));
        assert_eq!(client.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_scripted_client_session_failure() {
        let client = ScriptedStreamClient::new()
            .with_partition("0", vec![json!({"a": 1})])
            .fail_session_after_delivery("load balancing failed");
        let handler = Arc::new(CountingHandler::default());

        client.connect("cs", "$Default", "telemetry").await.unwrap();
        let result = client
            .receive(handler.clone(), StartingPosition::at(Utc::now()))
            .await;

        assert!(result.is_err());
        assert_eq!(handler.events.load(Ordering::SeqCst), 1);
        assert_eq!(handler.errors.load(Ordering::SeqCst), 1);
    }
}
