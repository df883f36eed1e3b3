//! # Telemetry publisher.
//!
//! On every tick asks the [`Sample`](super::Sample) implementation for a fresh
//! batch, encodes it and publishes it on the shared `events.<topic>` subject
//! (`events.data` by default).
//!
//! ```text
//! every interval (default 60s):
//!   sampler.sample()
//!     ├─ Err / panic → SampleFailed, tick skipped, timer continues
//!     └─ Ok(batch) → codec.encode(batch)
//!                      ├─ Err → MalformedPayload
//!                      └─ Ok(bytes) → publish("events.data", bytes) → TelemetryPublished
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use super::codec::CodecRef;
use super::sampler::SamplerRef;
use crate::beacon::publish_outcome;
use crate::error::ServiceError;
use crate::events::{Bus, Event, EventKind};
use crate::identity::{ServiceIdentity, event_subject};
use crate::periodic::{PeriodicHandle, Tick, spawn_periodic};
use crate::subscribers::panic_message;
use crate::transport::ConnectionRef;

/// Default telemetry interval.
pub const DEFAULT_TELEMETRY_INTERVAL: Duration = Duration::from_secs(60);

/// Periodic batch publisher. Use [`TelemetryPublisher::start`].
pub struct TelemetryPublisher {
    conn: ConnectionRef,
    service: ServiceIdentity,
    subject: String,
    sampler: SamplerRef,
    codec: CodecRef,
    bus: Bus,
}

/// Everything the publisher needs besides the connection.
pub struct PublisherParams {
    /// Tick period (non-zero).
    pub interval: Duration,
    /// Suffix of the `events.<topic>` subject.
    pub topic: String,
    /// Batch source.
    pub sampler: SamplerRef,
    /// Payload encoder.
    pub codec: CodecRef,
}

impl TelemetryPublisher {
    /// Starts the publisher as a child of `parent` and returns its handle.
    pub fn start(
        conn: ConnectionRef,
        service: &ServiceIdentity,
        params: PublisherParams,
        bus: Bus,
        parent: &CancellationToken,
    ) -> PeriodicHandle {
        let publisher = Arc::new(Self {
            conn,
            service: service.clone(),
            subject: event_subject(&params.topic),
            sampler: params.sampler,
            codec: params.codec,
            bus,
        });
        spawn_periodic("telemetry", publisher, params.interval, parent)
    }

    fn report(&self, kind: EventKind) -> Event {
        Event::new(kind)
            .with_service(self.service.name())
            .with_subject(self.subject.as_str())
    }
}

#[async_trait]
impl Tick for TelemetryPublisher {
    async fn tick(&self, ctx: &CancellationToken) {
        let sampled = tokio::select! {
            biased;
            _ = ctx.cancelled() => return,
            res = AssertUnwindSafe(self.sampler.sample()).catch_unwind() => res,
        };
        let sampled = sampled.unwrap_or_else(|panic| {
            Err(ServiceError::sample(format!(
                "sampler panicked: {}",
                panic_message(&*panic)
            )))
        });
        let batch = match sampled {
            Ok(batch) => batch,
            Err(e) => {
                self.bus
                    .publish(self.report(EventKind::SampleFailed).with_error(e.to_string()));
                return;
            }
        };

        let payload = match self.codec.encode(&batch) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.bus.publish(
                    self.report(EventKind::MalformedPayload)
                        .with_records(batch.len())
                        .with_error(e.to_string()),
                );
                return;
            }
        };

        if ctx.is_cancelled() {
            return;
        }
        let size = payload.len();
        let res = self.conn.publish(&self.subject, payload).await;
        let ev = publish_outcome(EventKind::TelemetryPublished, &self.service, &self.subject, res)
            .with_bytes(size)
            .with_records(batch.len());
        self.bus.publish(ev);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{Codec, JsonCodec, MeasurementBatch, SampleFn};
    use crate::transport::{Connection, MemoryConnection, Subscription};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time;

    fn drain_pending(sub: &mut Subscription) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(Some(m)) = futures::FutureExt::now_or_never(sub.next()) {
            out.push(m.payload);
        }
        out
    }

    fn flaky_sampler(fail_on: u32) -> SamplerRef {
        let calls = Arc::new(AtomicU32::new(0));
        SampleFn::arc("flaky", move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n == fail_on {
                    return Err(ServiceError::sample("sensor read error"));
                }
                Ok(MeasurementBatch::at(f64::from(n)).with(
                    "urn:cpt:diagnostic:battery-charge",
                    "%EL",
                    f64::from(n),
                ))
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn sample_failure_skips_only_that_tick() {
        let conn = MemoryConnection::new();
        let mut data = conn.subscribe("events.data").await.unwrap();
        let bus = Bus::new(256);
        let mut events = bus.subscribe();
        let id = ServiceIdentity::new("diagnostic").unwrap();
        let root = CancellationToken::new();

        let h = TelemetryPublisher::start(
            Arc::new(conn.clone()),
            &id,
            PublisherParams {
                interval: Duration::from_secs(1),
                topic: "data".into(),
                sampler: flaky_sampler(2),
                codec: Arc::new(JsonCodec),
            },
            bus,
            &root,
        );

        time::sleep(Duration::from_millis(5_500)).await;
        let published = drain_pending(&mut data);
        assert_eq!(published.len(), 4);
        let ticks: Vec<f64> = published
            .iter()
            .map(|p| JsonCodec.decode_batch(p).unwrap().records()[0].value())
            .collect();
        assert_eq!(ticks, [1.0, 3.0, 4.0, 5.0]);

        let mut failures = 0;
        while let Ok(ev) = events.try_recv() {
            if ev.kind == EventKind::SampleFailed {
                failures += 1;
                assert_eq!(ev.error.as_deref(), Some("sample failed: sensor read error"));
            }
        }
        assert_eq!(failures, 1);

        // Still running after the failure.
        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(drain_pending(&mut data).len(), 1);
        assert!(!h.is_stopped());
        h.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_sampler_skips_only_that_tick() {
        let conn = MemoryConnection::new();
        let mut data = conn.subscribe("events.data").await.unwrap();
        let bus = Bus::new(256);
        let mut events = bus.subscribe();
        let id = ServiceIdentity::new("diagnostic").unwrap();
        let root = CancellationToken::new();

        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let sampler = SampleFn::arc("gauge", move || {
            let n = c.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n == 2 {
                    panic!("gauge driver crashed");
                }
                Ok::<_, ServiceError>(MeasurementBatch::at(f64::from(n)).with(
                    "urn:cpt:diagnostic:fuel-level",
                    "%FL",
                    f64::from(n),
                ))
            }
        });

        let h = TelemetryPublisher::start(
            Arc::new(conn.clone()),
            &id,
            PublisherParams {
                interval: Duration::from_secs(1),
                topic: "data".into(),
                sampler,
                codec: Arc::new(JsonCodec),
            },
            bus,
            &root,
        );

        time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(drain_pending(&mut data).len(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert!(!h.is_stopped());

        let failures: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|ev| ev.kind == EventKind::SampleFailed)
            .collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(
            failures[0].error.as_deref(),
            Some("sample failed: sampler panicked: gauge driver crashed")
        );
        h.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_on_custom_topic() {
        let conn = MemoryConnection::new();
        let mut infos = conn.subscribe("events.infos").await.unwrap();
        let id = ServiceIdentity::new("diagnostic").unwrap();
        let root = CancellationToken::new();

        let _h = TelemetryPublisher::start(
            Arc::new(conn.clone()),
            &id,
            PublisherParams {
                interval: Duration::from_millis(100),
                topic: "infos".into(),
                sampler: flaky_sampler(0),
                codec: Arc::new(JsonCodec),
            },
            Bus::new(16),
            &root,
        );

        let msg = infos.next().await.unwrap();
        assert_eq!(msg.subject, "events.infos");
        root.cancel();
    }
}
