//! # In-process publish/subscribe fabric.
//!
//! [`MemoryConnection`] routes published messages to every matching subscription
//! through per-subscription unbounded queues. It honours the full
//! [`Connection`] contract and is what tests and the demo run against.
//!
//! ## Architecture
//! ```text
//! publish(subject) ──► routes (RwLock<BTreeMap<sid, Route>>)
//!                          │  pattern.matches(subject)?
//!                          ├──► [queue sid-1] ──► Subscription::next()
//!                          └──► [queue sid-2] ──► Subscription::next()
//!
//! unsubscribe(sid) ──► route removed ──► sender dropped ──► queue drains, stream ends
//! drain()/close()  ──► every route removed, publishes rejected
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};

use super::connection::{Connection, Message, Subscription, SubscriptionId, TransportError};
use super::subject::{SubjectPattern, validate_subject};

struct Route {
    pattern: SubjectPattern,
    tx: mpsc::UnboundedSender<Message>,
}

struct Fabric {
    routes: RwLock<BTreeMap<SubscriptionId, Route>>,
    next_sid: AtomicU64,
    closed: AtomicBool,
    published: AtomicU64,
}

/// In-memory connection. Clones share the same fabric.
#[derive(Clone)]
pub struct MemoryConnection {
    fabric: Arc<Fabric>,
}

impl Default for MemoryConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConnection {
    /// Creates an empty, open fabric.
    pub fn new() -> Self {
        Self {
            fabric: Arc::new(Fabric {
                routes: RwLock::new(BTreeMap::new()),
                next_sid: AtomicU64::new(1),
                closed: AtomicBool::new(false),
                published: AtomicU64::new(0),
            }),
        }
    }

    /// Simulates an abrupt connection loss: every subscription stream ends
    /// and further publishes fail with [`TransportError::Closed`].
    pub async fn close(&self) {
        self.fabric.closed.store(true, Ordering::SeqCst);
        self.fabric.routes.write().await.clear();
    }

    /// Number of live subscriptions.
    pub async fn subscription_count(&self) -> usize {
        self.fabric.routes.read().await.len()
    }

    /// Total number of accepted publishes since creation.
    pub fn published_count(&self) -> u64 {
        self.fabric.published.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        if self.fabric.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        validate_subject(subject)?;

        let routes = self.fabric.routes.read().await;
        for route in routes.values().filter(|r| r.pattern.matches(subject)) {
            // A dropped receiver only means the subscriber went away.
            let _ = route.tx.send(Message {
                subject: subject.to_owned(),
                payload: payload.clone(),
            });
        }
        self.fabric.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<Subscription, TransportError> {
        if self.fabric.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let pattern = SubjectPattern::parse(pattern)?;
        let sid = SubscriptionId(self.fabric.next_sid.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();

        let raw = pattern.as_str().to_owned();
        self.fabric
            .routes
            .write()
            .await
            .insert(sid, Route { pattern, tx });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });
        Ok(Subscription::new(sid, raw, stream))
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), TransportError> {
        self.fabric.routes.write().await.remove(&id);
        Ok(())
    }

    async fn drain(&self) -> Result<(), TransportError> {
        self.close().await;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.fabric.closed.load(Ordering::SeqCst)
    }
}
