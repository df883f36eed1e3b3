//! # Liveness beacon.
//!
//! Publishes an empty message on `heartbeat.<service>.service` on every tick. The
//! fleet manager treats the mere presence of the message inside its liveness window
//! as the health signal; richer health data is a separate concern.
//!
//! ```text
//! every interval (default 10s):
//!   publish("heartbeat.<name>.service", [])
//!     ├─ Ok              → HeartbeatSent
//!     ├─ Err(Closed)     → ConnectionLost
//!     └─ Err(other)      → PublishFailed
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::events::{Bus, Event, EventKind};
use crate::identity::ServiceIdentity;
use crate::periodic::{PeriodicHandle, Tick, spawn_periodic};
use crate::transport::{ConnectionRef, TransportError};

/// Default heartbeat interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Heartbeat publisher. Use [`Beacon::start`].
pub struct Beacon {
    conn: ConnectionRef,
    service: ServiceIdentity,
    subject: String,
    bus: Bus,
}

impl Beacon {
    /// Starts the beacon as a child of `parent` and returns its handle.
    ///
    /// `interval` must be non-zero (see [`AgentConfig::validate`](crate::AgentConfig::validate)).
    pub fn start(
        conn: ConnectionRef,
        service: &ServiceIdentity,
        interval: Duration,
        bus: Bus,
        parent: &CancellationToken,
    ) -> PeriodicHandle {
        let beacon = Arc::new(Self {
            conn,
            service: service.clone(),
            subject: service.heartbeat_subject(),
            bus,
        });
        spawn_periodic("heartbeat", beacon, interval, parent)
    }
}

#[async_trait]
impl Tick for Beacon {
    async fn tick(&self, ctx: &CancellationToken) {
        if ctx.is_cancelled() {
            return;
        }
        let res = self.conn.publish(&self.subject, Vec::new()).await;
        self.bus.publish(publish_outcome(
            EventKind::HeartbeatSent,
            &self.service,
            &self.subject,
            res,
        ));
    }
}

/// Maps a publish result to the event reported for it.
pub(crate) fn publish_outcome(
    ok: EventKind,
    service: &ServiceIdentity,
    subject: &str,
    res: Result<(), TransportError>,
) -> Event {
    let ev = match res {
        Ok(()) => Event::new(ok),
        Err(TransportError::Closed) => Event::new(EventKind::ConnectionLost)
            .with_error(TransportError::Closed.to_string()),
        Err(e) => Event::new(EventKind::PublishFailed).with_error(e.to_string()),
    };
    ev.with_service(service.name()).with_subject(subject)
}
