//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime events emitted by the agent components.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Beacon`, `TelemetryPublisher`, `CommandIntake`, `Agent`,
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the agent's event listener, which fans out to the `SubscriberSet`
//!   and watches for `ConnectionLost`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
