//! Runtime core: lifecycle and shutdown.
//!
//! The public API from this module is [`Agent`] / [`AgentBuilder`], which start the
//! components, and [`AgentHandle`], which owns them until disposal.
//!
//! Internal modules:
//! - `builder`: validates configuration, wires bus, subscribers and components;
//! - `lifecycle`: state machine and ordered, idempotent dispose;
//! - `shutdown`: cross-platform shutdown signal handling.

mod builder;
mod lifecycle;
mod shutdown;

pub use builder::{Agent, AgentBuilder};
pub use lifecycle::{AgentHandle, LifecycleState};
pub use shutdown::{run_until_shutdown, wait_for_shutdown_signal};
