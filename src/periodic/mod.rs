//! # Periodic task primitive.
//!
//! - [`PeriodicHandle`]: owned, cancelable handle returned to the caller
//! - `Tick` / `spawn_periodic`: crate-internal job contract and spawner used by
//!   the beacon and the telemetry publisher

mod ticker;

pub use ticker::PeriodicHandle;
pub(crate) use ticker::{Tick, spawn_periodic};
