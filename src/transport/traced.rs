//! # Logging decorator for any connection.
//!
//! [`TracedConnection`] forwards every call to the wrapped connection and records
//! publishes and subscription changes through `tracing`. Wrapping a
//! [`MemoryConnection`](super::MemoryConnection) with no other subscribers gives a
//! dry-run transport that only prints what would have been sent.

use async_trait::async_trait;

use super::connection::{Connection, Subscription, SubscriptionId, TransportError};

/// Connection wrapper that logs traffic.
pub struct TracedConnection<C> {
    inner: C,
}

impl<C: Connection> TracedConnection<C> {
    /// Wraps `inner`.
    pub fn new(inner: C) -> Self {
        Self { inner }
    }

    /// Borrow the wrapped connection.
    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: Connection> Connection for TracedConnection<C> {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        tracing::debug!(
            subject,
            payload = %String::from_utf8_lossy(&payload),
            "publish"
        );
        let res = self.inner.publish(subject, payload).await;
        if let Err(e) = &res {
            tracing::warn!(subject, error = %e, "publish rejected");
        }
        res
    }

    async fn subscribe(&self, pattern: &str) -> Result<Subscription, TransportError> {
        let sub = self.inner.subscribe(pattern).await?;
        tracing::debug!(pattern, sid = %sub.id(), "subscribed");
        Ok(sub)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), TransportError> {
        tracing::debug!(sid = %id, "unsubscribe");
        self.inner.unsubscribe(id).await
    }

    async fn drain(&self) -> Result<(), TransportError> {
        tracing::info!("draining connection");
        self.inner.drain().await
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryConnection;

    #[tokio::test]
    async fn forwards_to_inner() {
        let traced = TracedConnection::new(MemoryConnection::new());
        let mut sub = traced.subscribe("events.data").await.unwrap();
        traced.publish("events.data", b"[]".to_vec()).await.unwrap();

        let msg = sub.next().await.unwrap();
        assert_eq!(msg.subject, "events.data");
        assert_eq!(traced.inner().published_count(), 1);

        traced.drain().await.unwrap();
        assert!(traced.is_closed());
        assert!(sub.next().await.is_none());
    }
}
