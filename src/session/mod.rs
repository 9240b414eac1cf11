//! Timed capture sessions
//!
//! This module provides:
//! - The event collector handed to stream clients as callback handler
//! - The session controller that times, stops and joins the receive operation

mod collector;
mod controller;

pub use collector::{CollectedEvents, ErrorScope, EventCollector, ReceiveError};
pub use controller::{run_session, SessionController, SessionOutcome, SessionReport};
