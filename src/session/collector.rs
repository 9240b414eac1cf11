//! In-memory event collector
//!
//! The collector is the [`EventHandler`] a capture session hands to its
//! stream client. Every decoded event is appended under a mutex before its
//! partition checkpoint is advanced, so a checkpoint never runs ahead of the
//! collected data. Once the session has joined the receive operation the
//! collector is frozen and its contents are taken out exactly once.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::client::EventHandler;
use crate::error::Error;
use crate::logging::LogMetrics;
use crate::models::{CloseReason, EventData, PartitionContext, Record};

/// Whether a delivery error concerned one partition or the whole receive
/// operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorScope {
    Partition,
    Session,
}

/// A delivery error reported to the collector
#[derive(Debug, Clone, Serialize)]
pub struct ReceiveError {
    pub scope: ErrorScope,
    pub partition_id: Option<String>,
    pub error_type: &'static str,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Everything a frozen collector held
#[derive(Debug, Default)]
pub struct CollectedEvents {
    /// Decoded bodies in arrival order
    pub records: Vec<Record>,
    /// Partitions that were initialized or delivered events
    pub partitions: BTreeSet<String>,
    /// Delivery errors in the order they were reported
    pub errors: Vec<ReceiveError>,
}

impl CollectedEvents {
    pub fn partition_errors(&self) -> usize {
        self.errors
            .iter()
            .filter(|e| e.scope == ErrorScope::Partition)
            .count()
    }

    pub fn session_errors(&self) -> usize {
        self.errors
            .iter()
            .filter(|e| e.scope == ErrorScope::Session)
            .count()
    }
}

#[derive(Debug, Default)]
struct CollectorState {
    collected: CollectedEvents,
    frozen: bool,
    dropped_after_freeze: u64,
}

/// Append-only accumulator of decoded events
#[derive(Debug, Default)]
pub struct EventCollector {
    state: Mutex<CollectorState>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic elsewhere must not take the callbacks down with it.
    fn lock(&self) -> MutexGuard<'_, CollectorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of records collected so far
    pub fn len(&self) -> usize {
        self.lock().collected.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the records collected so far
    pub fn snapshot(&self) -> Vec<Record> {
        self.lock().collected.records.clone()
    }

    pub fn is_frozen(&self) -> bool {
        self.lock().frozen
    }

    /// Events that arrived after [`freeze`](EventCollector::freeze)
    pub fn dropped_after_freeze(&self) -> u64 {
        self.lock().dropped_after_freeze
    }

    /// Stop accepting events and take the collected contents
    ///
    /// Events delivered after this call are dropped without advancing their
    /// checkpoint. A second call returns empty contents.
    pub fn freeze(&self) -> CollectedEvents {
        let mut state = self.lock();
        state.frozen = true;
        std::mem::take(&mut state.collected)
    }

    /// Append a record unless frozen; returns whether it was kept
    fn append(&self, partition_id: &str, record: Record) -> bool {
        let mut state = self.lock();
        if state.frozen {
            state.dropped_after_freeze += 1;
            return false;
        }
        state.collected.partitions.insert(partition_id.to_string());
        state.collected.records.push(record);
        true
    }

    fn record_error(&self, ctx: Option<&PartitionContext>, error: &Error) {
        let scope = match ctx {
            Some(_) => ErrorScope::Partition,
            None => ErrorScope::Session,
        };

        let entry = ReceiveError {
            scope,
            partition_id: ctx.map(|c| c.partition_id().to_string()),
            error_type: error.error_type(),
            message: error.to_string(),
            occurred_at: Utc::now(),
        };

        self.lock().collected.errors.push(entry);
    }
}

impl EventHandler for EventCollector {
    fn on_event(&self, ctx: &PartitionContext, event: EventData) {
        debug!(
            partition_id = %ctx.partition_id(),
            offset = event.offset,
            "Received event"
        );

        match event.body_as_json() {
            Ok(record) => {
                if !self.append(ctx.partition_id(), record) {
                    warn!(
                        partition_id = %ctx.partition_id(),
                        offset = event.offset,
                        "Event arrived after the collector was frozen, dropping it"
                    );
                    return;
                }
                LogMetrics::counter(
                    "events_collected",
                    1,
                    &[("partition", ctx.partition_id())],
                );
            },
            Err(e) => {
                warn!(
                    partition_id = %ctx.partition_id(),
                    offset = event.offset,
                    error = %e,
                    "Skipping undecodable event"
                );
                self.record_error(Some(ctx), &e);
            },
        }

        // Undecodable events are checkpointed too so they are not re-read
        if let Err(e) = ctx.update_checkpoint(&event) {
            warn!(
                partition_id = %ctx.partition_id(),
                offset = event.offset,
                error = %e,
                "Failed to advance checkpoint"
            );
            self.record_error(Some(ctx), &e);
        }
    }

    fn on_partition_initialize(&self, ctx: &PartitionContext) {
        info!(
            partition_id = %ctx.partition_id(),
            stream = %ctx.stream_name(),
            "Partition has been initialized"
        );
        let mut state = self.lock();
        if !state.frozen {
            state
                .collected
                .partitions
                .insert(ctx.partition_id().to_string());
        }
    }

    fn on_partition_close(&self, ctx: &PartitionContext, reason: CloseReason) {
        info!(
            partition_id = %ctx.partition_id(),
            reason = %reason,
            "Partition has been closed"
        );
    }

    fn on_error(&self, ctx: Option<&PartitionContext>, error: &Error) {
        match ctx {
            Some(ctx) => warn!(
                partition_id = %ctx.partition_id(),
                error = %error,
                "Error while receiving from partition"
            ),
            None => warn!(
                error = %error,
                "Error in the receive operation outside any partition"
            ),
        }
        self.record_error(ctx, error);
    }
}
