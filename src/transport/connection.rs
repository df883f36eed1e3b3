//! # Connection contract for the publish/subscribe fabric.
//!
//! The agent never talks to a broker directly. Every component receives a shared
//! [`ConnectionRef`] and relies only on the guarantees below.
//!
//! ## Contract
//! - **Ordered**: messages published on one subject reach a subscriber in publish order.
//! - **Concurrent**: `publish` may be called from many tasks at once.
//! - **Wildcards**: `subscribe` accepts `*` / `>` patterns (see [`SubjectPattern`](super::SubjectPattern)).
//! - **Unsubscribe closes the stream**: after [`Connection::unsubscribe`] no new message is
//!   routed to the subscription; messages already buffered are still yielded, then the
//!   stream ends.
//! - **Closed connection ends every stream**: a subscription stream that ends without an
//!   unsubscribe means the connection was lost.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use thiserror::Error;

/// Shared handle to a connection.
pub type ConnectionRef = Arc<dyn Connection>;

/// Errors returned by a [`Connection`].
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection is closed or draining; nothing more can be published.
    #[error("connection closed")]
    Closed,

    /// Subject or pattern does not follow the subject grammar.
    #[error("invalid subject {subject:?}: {reason}")]
    InvalidSubject {
        /// The rejected subject.
        subject: String,
        /// What was wrong.
        reason: &'static str,
    },
}

impl TransportError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::Closed => "transport_closed",
            TransportError::InvalidSubject { .. } => "transport_invalid_subject",
        }
    }
}

/// One delivered message.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    /// Concrete subject the message was published on.
    pub subject: String,
    /// Raw body.
    pub payload: Vec<u8>,
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("subject", &self.subject)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// Identifier of a subscription within one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sid-{}", self.0)
    }
}

/// Receiving side of a subscription.
pub struct Subscription {
    id: SubscriptionId,
    pattern: String,
    stream: Pin<Box<dyn Stream<Item = Message> + Send>>,
}

impl Subscription {
    /// Wraps a transport-specific message stream.
    pub fn new(
        id: SubscriptionId,
        pattern: impl Into<String>,
        stream: impl Stream<Item = Message> + Send + 'static,
    ) -> Self {
        Self {
            id,
            pattern: pattern.into(),
            stream: Box::pin(stream),
        }
    }

    /// Subscription id to pass to [`Connection::unsubscribe`].
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Pattern this subscription was created with.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Next message, or `None` once the subscription is closed.
    pub async fn next(&mut self) -> Option<Message> {
        self.stream.next().await
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

/// # Publish/subscribe connection.
///
/// Implementations wrap a real broker client or, like
/// [`MemoryConnection`](super::MemoryConnection), route messages in-process.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Publishes `payload` on a concrete `subject` (fire-and-forget).
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Subscribes to a subject pattern.
    async fn subscribe(&self, pattern: &str) -> Result<Subscription, TransportError>;

    /// Stops routing new messages to the subscription. Unknown ids are ignored.
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), TransportError>;

    /// Gracefully closes the whole connection: stops every subscription and
    /// rejects further publishes.
    async fn drain(&self) -> Result<(), TransportError>;

    /// True once the connection is closed or drained.
    fn is_closed(&self) -> bool;
}
