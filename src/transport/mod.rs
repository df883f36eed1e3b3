//! # Publish/subscribe transport seam.
//!
//! This module provides the [`Connection`] trait the agent is written against and
//! two implementations:
//! - [`MemoryConnection`]: in-process fabric with wildcard routing;
//! - [`TracedConnection`]: decorator that logs traffic of any connection.
//!
//! Subject grammar lives in [`SubjectPattern`].

mod connection;
mod memory;
mod subject;
mod traced;

pub use connection::{
    Connection, ConnectionRef, Message, Subscription, SubscriptionId, TransportError,
};
pub use memory::MemoryConnection;
pub use subject::{SubjectPattern, validate_subject};
pub use traced::TracedConnection;
