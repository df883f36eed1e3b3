//! # Service lifecycle controller.
//!
//! [`AgentHandle`] is the single addressable unit returned by
//! [`AgentBuilder::start`](super::AgentBuilder::start). It owns the beacon and publisher
//! timers, the command subscription and the event listener, and exposes one
//! idempotent [`dispose`](AgentHandle::dispose).
//!
//! ## State machine
//! ```text
//! Created ──start()──► Running ──dispose()──► Disposing ──► Disposed
//! ```
//!
//! ## Dispose order
//! ```text
//! dispose()
//!   ├─► DisposeRequested
//!   ├─► publisher.stop()           (sync, no new telemetry tick)
//!   ├─► beacon.stop()              (sync, no new heartbeat tick)
//!   ├─► commands.drain().await     (unless already closed)
//!   ├─► await both timer loops     (no tick body still running)
//!   ├─► await auxiliary publishes  (publish_event calls already past the state check)
//!   ├─► Disposed
//!   └─► flush event listener and subscribers
//! ```
//!
//! Concurrent and repeated calls await the same completion.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{OnceCell, broadcast, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::commands::CommandSubscription;
use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::events::{Bus, Event, EventKind};
use crate::identity::{ServiceIdentity, event_subject};
use crate::periodic::PeriodicHandle;
use crate::telemetry::CodecRef;
use crate::transport::{ConnectionRef, validate_subject};

/// Lifecycle of one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Configured, components not started.
    Created,
    /// Beacon, publisher and command intake are running.
    Running,
    /// `dispose` is in progress.
    Disposing,
    /// Everything stopped; nothing originates from the handle anymore.
    Disposed,
}

impl LifecycleState {
    /// Returns a short stable label (snake_case).
    pub fn as_label(&self) -> &'static str {
        match self {
            LifecycleState::Created => "created",
            LifecycleState::Running => "running",
            LifecycleState::Disposing => "disposing",
            LifecycleState::Disposed => "disposed",
        }
    }
}

/// Components owned by a running agent.
pub(crate) struct Parts {
    pub(crate) service: ServiceIdentity,
    pub(crate) config: AgentConfig,
    pub(crate) conn: ConnectionRef,
    pub(crate) codec: CodecRef,
    pub(crate) bus: Bus,
    pub(crate) root: CancellationToken,
    pub(crate) beacon: PeriodicHandle,
    pub(crate) publisher: PeriodicHandle,
    pub(crate) commands: CommandSubscription,
    pub(crate) listener: Listener,
    pub(crate) state: watch::Sender<LifecycleState>,
    pub(crate) aux: TaskTracker,
}

/// Control side of the event listener task.
pub(crate) struct Listener {
    pub(crate) stop: CancellationToken,
    pub(crate) done: CancellationToken,
    pub(crate) lost: CancellationToken,
}

struct Inner {
    parts: Parts,
    disposed: OnceCell<()>,
}

/// Handle to a running agent. Cheap to clone; every clone controls the same agent.
#[derive(Clone)]
pub struct AgentHandle {
    inner: Arc<Inner>,
}

impl AgentHandle {
    pub(crate) fn new(parts: Parts) -> Self {
        parts.state.send_replace(LifecycleState::Running);
        Self {
            inner: Arc::new(Inner {
                parts,
                disposed: OnceCell::new(),
            }),
        }
    }

    /// Service identity.
    pub fn identity(&self) -> &ServiceIdentity {
        &self.inner.parts.service
    }

    /// Configuration the agent was started with.
    pub fn config(&self) -> &AgentConfig {
        &self.inner.parts.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        *self.inner.parts.state.borrow()
    }

    /// Receiver of state transitions.
    pub fn watch_state(&self) -> watch::Receiver<LifecycleState> {
        self.inner.parts.state.subscribe()
    }

    /// Receiver of runtime events published after this call.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.inner.parts.bus.subscribe()
    }

    /// True once a component reported that the connection closed underneath it.
    pub fn is_connection_lost(&self) -> bool {
        self.inner.parts.listener.lost.is_cancelled()
    }

    /// Resolves when a component reports connection loss.
    pub async fn connection_lost(&self) {
        self.inner.parts.listener.lost.cancelled().await;
    }

    /// Publishes an auxiliary structured event on `events.<topic>`.
    ///
    /// Rejected with [`AgentError::Disposed`] once disposal has begun. A call
    /// accepted before that completes before [`dispose`](Self::dispose) resolves.
    pub async fn publish_event(&self, topic: &str, value: &Value) -> Result<(), AgentError> {
        let p = &self.inner.parts;
        // Taken before the state check so dispose cannot miss this call.
        let _inflight = p.aux.token();
        if self.state() != LifecycleState::Running {
            return Err(AgentError::Disposed {
                service: p.service.name().to_string(),
            });
        }
        let subject = event_subject(topic);
        validate_subject(&subject)?;
        let payload = p.codec.encode_value(value)?;
        let size = payload.len();

        match p.conn.publish(&subject, payload).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let ev = Event::new(EventKind::PublishFailed)
                    .with_service(p.service.name())
                    .with_subject(subject.as_str())
                    .with_bytes(size)
                    .with_error(e.to_string());
                p.bus.publish(ev);
                Err(e.into())
            }
        }
    }

    /// Stops the agent: telemetry timer, heartbeat timer, then command intake.
    ///
    /// Idempotent. After it resolves no publish and no handler invocation
    /// originates from this agent.
    pub async fn dispose(&self) {
        self.inner
            .disposed
            .get_or_init(|| self.inner.parts.dispose_once())
            .await;
    }
}

impl Parts {
    async fn dispose_once(&self) {
        self.state.send_replace(LifecycleState::Disposing);
        self.bus.publish(self.report(EventKind::DisposeRequested));

        if self.publisher.stop() {
            self.bus.publish(self.report(EventKind::PublisherStopped));
        }
        if self.beacon.stop() {
            self.bus.publish(self.report(EventKind::BeaconStopped));
        }
        if !self.commands.is_closed() {
            self.commands.drain().await;
        }
        self.publisher.stopped().await;
        self.beacon.stopped().await;
        self.aux.close();
        self.aux.wait().await;
        self.root.cancel();

        self.state.send_replace(LifecycleState::Disposed);
        self.bus.publish(self.report(EventKind::Disposed));

        self.listener.stop.cancel();
        self.listener.done.cancelled().await;
    }

    fn report(&self, kind: EventKind) -> Event {
        Event::new(kind).with_service(self.service.name())
    }
}

impl std::fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentHandle")
            .field("service", &self.inner.parts.service.name())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Command, HandlerFn, HandlerRef};
    use crate::core::Agent;
    use crate::error::ServiceError;
    use crate::subscribers::Subscribe;
    use crate::telemetry::{MeasurementBatch, SampleFn, SamplerRef};
    use crate::transport::{
        Connection, MemoryConnection, Subscription, SubscriptionId, TransportError,
    };
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time;

    fn pending(sub: &mut Subscription) -> usize {
        let mut n = 0;
        while let Some(Some(_)) = futures::FutureExt::now_or_never(sub.next()) {
            n += 1;
        }
        n
    }

    fn battery() -> SamplerRef {
        SampleFn::arc("battery", || async {
            let batch = MeasurementBatch::new()
                .with("urn:cpt:diagnostic:battery-charge", "%EL", 87.0);
            Ok::<_, ServiceError>(batch)
        })
    }

    fn fast_config() -> AgentConfig {
        AgentConfig {
            heartbeat_interval: Duration::from_millis(50),
            telemetry_interval: Duration::from_millis(80),
            ..AgentConfig::default()
        }
    }

    async fn start(conn: &MemoryConnection, handler: HandlerRef) -> AgentHandle {
        Agent::builder(ServiceIdentity::new("diagnostic").unwrap())
            .with_config(fast_config())
            .with_sampler(battery())
            .with_handler(handler)
            .start(Arc::new(conn.clone()))
            .await
            .unwrap()
    }

    fn noop() -> HandlerRef {
        HandlerFn::arc(|_cmd: Command| async { Ok::<_, ServiceError>(()) })
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_is_idempotent() {
        let conn = MemoryConnection::new();
        let agent = start(&conn, noop()).await;
        assert_eq!(agent.state(), LifecycleState::Running);

        agent.dispose().await;
        assert_eq!(agent.state(), LifecycleState::Disposed);
        agent.dispose().await;
        assert_eq!(agent.state(), LifecycleState::Disposed);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_dispose_awaits_the_same_completion() {
        let conn = MemoryConnection::new();
        let agent = start(&conn, noop()).await;
        let mut events = agent.events();

        let (a, b) = (agent.clone(), agent.clone());
        let (ra, rb) = tokio::join!(
            tokio::spawn(async move { a.dispose().await }),
            tokio::spawn(async move { b.dispose().await }),
        );
        ra.unwrap();
        rb.unwrap();
        assert_eq!(agent.state(), LifecycleState::Disposed);

        let mut requested = 0;
        let mut disposed = 0;
        while let Ok(ev) = events.try_recv() {
            match ev.kind {
                EventKind::DisposeRequested => requested += 1,
                EventKind::Disposed => disposed += 1,
                _ => {}
            }
        }
        assert_eq!((requested, disposed), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_is_published_after_dispose() {
        let conn = MemoryConnection::new();
        let mut hb = conn.subscribe("heartbeat.diagnostic.service").await.unwrap();
        let mut data = conn.subscribe("events.data").await.unwrap();
        let agent = start(&conn, noop()).await;

        time::sleep(Duration::from_millis(120)).await;
        agent.dispose().await;
        let beats = pending(&mut hb);
        assert_eq!(beats, 2);
        assert_eq!(pending(&mut data), 1);

        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(pending(&mut hb), 0);
        assert_eq!(pending(&mut data), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_handler_finishes_before_dispose_resolves() {
        let conn = MemoryConnection::new();
        let (started_tx, mut started_rx) = mpsc::unbounded_channel();
        let done = Arc::new(AtomicBool::new(false));
        let calls = Arc::new(AtomicUsize::new(0));

        let (d, c) = (done.clone(), calls.clone());
        let handler = HandlerFn::arc(move |_cmd: Command| {
            let (d, c, started) = (d.clone(), c.clone(), started_tx.clone());
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                let _ = started.send(());
                time::sleep(Duration::from_millis(300)).await;
                d.store(true, Ordering::SeqCst);
                Ok::<_, ServiceError>(())
            }
        });
        let agent = start(&conn, handler).await;

        conn.publish("commands.diagnostic.selftest", Vec::new())
            .await
            .unwrap();
        started_rx.recv().await.unwrap();
        agent.dispose().await;
        assert!(done.load(Ordering::SeqCst));

        conn.publish("commands.diagnostic.selftest", Vec::new())
            .await
            .unwrap();
        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn commands_reach_the_handler_demultiplexed() {
        let conn = MemoryConnection::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler = HandlerFn::arc(move |cmd: Command| {
            let tx = tx.clone();
            async move {
                let _ = tx.send((cmd.name, cmd.payload));
                Ok::<_, ServiceError>(())
            }
        });
        let agent = start(&conn, handler).await;

        conn.publish("commands.diagnostic.reboot", br#"{"force": true}"#.to_vec())
            .await
            .unwrap();
        let (name, payload) = rx.recv().await.unwrap();
        assert_eq!(name, "reboot");
        assert_eq!(payload, json!({"force": true}));
        agent.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn publish_event_goes_to_events_topic_until_disposed() {
        let conn = MemoryConnection::new();
        let mut infos = conn.subscribe("events.infos").await.unwrap();
        let agent = start(&conn, noop()).await;

        agent
            .publish_event("infos", &json!({"firmware": "1.4.2"}))
            .await
            .unwrap();
        let msg = infos.next().await.unwrap();
        assert_eq!(msg.subject, "events.infos");
        assert_eq!(
            serde_json::from_slice::<Value>(&msg.payload).unwrap(),
            json!({"firmware": "1.4.2"})
        );

        let bad = agent.publish_event("a.>", &Value::Null).await.unwrap_err();
        assert_eq!(bad.as_label(), "agent_transport");

        agent.dispose().await;
        let err = agent.publish_event("infos", &Value::Null).await.unwrap_err();
        assert_eq!(err.as_label(), "agent_disposed");
    }

    /// Holds every `events.*` publish for 200 ms and announces it on `entered`.
    struct SlowEvents {
        inner: MemoryConnection,
        entered: mpsc::UnboundedSender<()>,
    }

    #[async_trait]
    impl Connection for SlowEvents {
        async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), TransportError> {
            if subject.starts_with("events.") {
                let _ = self.entered.send(());
                time::sleep(Duration::from_millis(200)).await;
            }
            self.inner.publish(subject, payload).await
        }

        async fn subscribe(&self, pattern: &str) -> Result<Subscription, TransportError> {
            self.inner.subscribe(pattern).await
        }

        async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), TransportError> {
            self.inner.unsubscribe(id).await
        }

        async fn drain(&self) -> Result<(), TransportError> {
            self.inner.drain().await
        }

        fn is_closed(&self) -> bool {
            self.inner.is_closed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_event_lands_before_dispose_resolves() {
        let conn = MemoryConnection::new();
        let mut params = conn.subscribe("events.params").await.unwrap();
        let (entered_tx, mut entered_rx) = mpsc::unbounded_channel();
        let slow = SlowEvents {
            inner: conn.clone(),
            entered: entered_tx,
        };
        let agent = Agent::builder(ServiceIdentity::new("diagnostic").unwrap())
            .with_sampler(battery())
            .start(Arc::new(slow))
            .await
            .unwrap();

        let a = agent.clone();
        let publish = tokio::spawn(async move {
            a.publish_event("params", &json!({"n": "metrics"})).await
        });
        entered_rx.recv().await.unwrap();

        agent.dispose().await;
        assert_eq!(pending(&mut params), 1);
        publish.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn configured_limit_bounds_agent_handlers() {
        let conn = MemoryConnection::new();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (running.clone(), peak.clone());
        let handler = HandlerFn::arc(move |_cmd: Command| {
            let (r, p) = (r.clone(), p.clone());
            async move {
                let now = r.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                time::sleep(Duration::from_millis(50)).await;
                r.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, ServiceError>(())
            }
        });
        let agent = Agent::builder(ServiceIdentity::new("diagnostic").unwrap())
            .with_config(AgentConfig {
                max_inflight_commands: 1,
                ..fast_config()
            })
            .with_sampler(battery())
            .with_handler(handler)
            .start(Arc::new(conn.clone()))
            .await
            .unwrap();

        for _ in 0..3 {
            conn.publish("commands.diagnostic.selftest", Vec::new())
                .await
                .unwrap();
        }
        time::sleep(Duration::from_millis(500)).await;
        agent.dispose().await;
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    struct Kinds(Mutex<Vec<EventKind>>);

    #[async_trait]
    impl Subscribe for Kinds {
        async fn on_event(&self, event: &Event) {
            if let Ok(mut kinds) = self.0.lock() {
                kinds.push(event.kind);
            }
        }

        fn name(&self) -> &'static str {
            "kinds"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_see_the_whole_lifecycle() {
        let conn = MemoryConnection::new();
        let kinds = Arc::new(Kinds(Mutex::new(Vec::new())));
        let agent = Agent::builder(ServiceIdentity::new("diagnostic").unwrap())
            .with_config(fast_config())
            .with_sampler(battery())
            .with_subscribers(vec![kinds.clone() as Arc<dyn Subscribe>])
            .start(Arc::new(conn.clone()))
            .await
            .unwrap();

        time::sleep(Duration::from_millis(100)).await;
        agent.dispose().await;

        let seen = kinds.0.lock().unwrap().clone();
        assert_eq!(seen.first(), Some(&EventKind::AgentStarting));
        assert!(seen.contains(&EventKind::AgentStarted));
        assert!(seen.contains(&EventKind::HeartbeatSent));
        assert!(seen.contains(&EventKind::TelemetryPublished));
        assert!(seen.contains(&EventKind::IntakeClosed));
        assert_eq!(seen.last(), Some(&EventKind::Disposed));
    }

    #[tokio::test(start_paused = true)]
    async fn connection_loss_is_observable() {
        let conn = MemoryConnection::new();
        let agent = start(&conn, noop()).await;

        conn.close().await;
        agent.connection_lost().await;
        assert!(agent.is_connection_lost());

        agent.dispose().await;
        assert_eq!(agent.state(), LifecycleState::Disposed);
    }
}
