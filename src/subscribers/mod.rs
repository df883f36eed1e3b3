//! # Event subscribers for the edgevisor agent.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out and
//! the built-in [`LogWriter`] that renders events through `tracing`.
//!
//! ## Architecture
//! ```text
//! Beacon/Publisher/Intake ── publish(Event) ──► Bus ──► event listener
//!                                                          │
//!                                                          ▼
//!                                                     SubscriberSet
//!                                                 ┌────────┼────────┐
//!                                                 ▼        ▼        ▼
//!                                             LogWriter  Metrics  Custom
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use edgevisor::{Event, EventKind, Subscribe};
//! use async_trait::async_trait;
//!
//! struct MissedTelemetry;
//!
//! #[async_trait]
//! impl Subscribe for MissedTelemetry {
//!     async fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::SampleFailed {
//!             // increment failure counter
//!         }
//!     }
//!     fn name(&self) -> &'static str { "missed-telemetry" }
//! }
//! ```

mod log;
mod set;
mod subscribe;

pub use log::LogWriter;
pub(crate) use set::panic_message;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
