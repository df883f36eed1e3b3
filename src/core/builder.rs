use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::lifecycle::{AgentHandle, LifecycleState, Listener, Parts};
use crate::beacon::Beacon;
use crate::commands::{CommandIntake, HandlerRef, IntakeParams, LogCommands};
use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::events::{Bus, Event, EventKind};
use crate::identity::ServiceIdentity;
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::telemetry::{CodecRef, JsonCodec, PublisherParams, SamplerRef, TelemetryPublisher};
use crate::transport::ConnectionRef;

/// Entry point for building an agent.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use edgevisor::{
///     Agent, MeasurementBatch, MemoryConnection, SampleFn, ServiceError, ServiceIdentity,
/// };
///
/// # async fn demo() -> Result<(), edgevisor::AgentError> {
/// let agent = Agent::builder(ServiceIdentity::new("diagnostic")?)
///     .with_sampler(SampleFn::arc("battery", || async {
///         let batch = MeasurementBatch::new()
///             .with("urn:cpt:diagnostic:battery-charge", "%EL", 87.0);
///         Ok::<_, ServiceError>(batch)
///     }))
///     .start(Arc::new(MemoryConnection::new()))
///     .await?;
///
/// agent.dispose().await;
/// # Ok(())
/// # }
/// ```
pub struct Agent;

impl Agent {
    /// Starts configuring an agent for `identity`.
    pub fn builder(identity: ServiceIdentity) -> AgentBuilder {
        AgentBuilder::new(identity)
    }
}

/// Builder for constructing an agent with optional features.
pub struct AgentBuilder {
    identity: ServiceIdentity,
    config: AgentConfig,
    sampler: Option<SamplerRef>,
    handler: HandlerRef,
    codec: CodecRef,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl AgentBuilder {
    /// Creates a builder with default configuration, [`JsonCodec`] and the
    /// [`LogCommands`] handler.
    pub fn new(identity: ServiceIdentity) -> Self {
        Self {
            identity,
            config: AgentConfig::default(),
            sampler: None,
            handler: Arc::new(LogCommands),
            codec: Arc::new(JsonCodec),
            subscribers: Vec::new(),
        }
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the telemetry source. Required.
    pub fn with_sampler(mut self, sampler: SamplerRef) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Sets the command handler.
    pub fn with_handler(mut self, handler: HandlerRef) -> Self {
        self.handler = handler;
        self
    }

    /// Sets the payload codec used for telemetry, commands and auxiliary events.
    pub fn with_codec(mut self, codec: CodecRef) -> Self {
        self.codec = codec;
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events through dedicated workers with
    /// bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Starts beacon, publisher and command intake (in that order) on `conn`.
    ///
    /// On failure nothing keeps running.
    pub async fn start(self, conn: ConnectionRef) -> Result<AgentHandle, AgentError> {
        self.config.validate()?;
        let sampler = self.sampler.ok_or_else(|| AgentError::InvalidConfig {
            reason: "telemetry sampler not set".to_string(),
        })?;
        let (state, _) = watch::channel(LifecycleState::Created);

        let bus = Bus::new(self.config.bus_capacity);
        let subs = SubscriberSet::new(self.subscribers, bus.clone());
        let listener = spawn_listener(bus.subscribe(), subs);
        let root = CancellationToken::new();
        let service = self.identity;
        let report = |kind| Event::new(kind).with_service(service.name());

        bus.publish(report(EventKind::AgentStarting));
        let beacon = Beacon::start(
            Arc::clone(&conn),
            &service,
            self.config.heartbeat_interval,
            bus.clone(),
            &root,
        );
        let publisher = TelemetryPublisher::start(
            Arc::clone(&conn),
            &service,
            PublisherParams {
                interval: self.config.telemetry_interval,
                topic: self.config.telemetry_topic.clone(),
                sampler,
                codec: Arc::clone(&self.codec),
            },
            bus.clone(),
            &root,
        );
        let intake = CommandIntake::start(
            Arc::clone(&conn),
            &service,
            IntakeParams {
                codec: Arc::clone(&self.codec),
                handler: self.handler,
                max_inflight: self.config.concurrency_limit(),
            },
            bus.clone(),
        )
        .await;

        let commands = match intake {
            Ok(sub) => sub,
            Err(e) => {
                root.cancel();
                publisher.stopped().await;
                beacon.stopped().await;
                listener.stop.cancel();
                listener.done.cancelled().await;
                return Err(e);
            }
        };
        bus.publish(report(EventKind::AgentStarted));

        Ok(AgentHandle::new(Parts {
            service: service.clone(),
            config: self.config,
            conn,
            codec: self.codec,
            bus,
            root,
            beacon,
            publisher,
            commands,
            listener,
            state,
            aux: TaskTracker::new(),
        }))
    }
}

/// Forwards bus events to the subscriber set and watches for connection loss.
///
/// On stop, forwards what is still buffered and waits for subscriber workers.
fn spawn_listener(mut rx: broadcast::Receiver<Event>, subs: SubscriberSet) -> Listener {
    let stop = CancellationToken::new();
    let done = CancellationToken::new();
    let lost = CancellationToken::new();

    let (stop_rx, lost_tx) = (stop.clone(), lost.clone());
    let done_guard = done.clone().drop_guard();
    tokio::spawn(async move {
        let _done = done_guard;
        let forward = |ev: &Event| {
            if ev.kind == EventKind::ConnectionLost {
                lost_tx.cancel();
            }
            subs.emit(ev);
        };

        loop {
            tokio::select! {
                biased;
                res = rx.recv() => match res {
                    Ok(ev) => forward(&ev),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = stop_rx.cancelled() => break,
            }
        }
        loop {
            match rx.try_recv() {
                Ok(ev) => forward(&ev),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        subs.shutdown().await;
    });

    Listener { stop, done, lost }
}
