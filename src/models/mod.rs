//! Data models for hubcapture
//!
//! This module contains the event structures delivered by stream clients and
//! the tabular view built from collected events.

pub mod event;
pub mod table;

// Re-export commonly used types
pub use event::{CloseReason, EventData, PartitionContext, Record};
pub use table::{materialize, Table};
