//! # edgevisor
//!
//! **Edgevisor** is the participant-side contract of an edge service on a shared
//! publish/subscribe fabric: it announces liveness, emits telemetry and receives
//! commands addressed to it, with one ordered and idempotent shutdown.
//!
//! It is not a scheduler or orchestrator. The fleet manager lives on the other side
//! of the fabric; this crate only defines how a single service behaves towards it.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!                         ┌──────────────────────────────┐
//!                         │  AgentHandle (one service)   │
//!                         └──────┬────────┬────────┬─────┘
//!                                ▼        ▼        ▼
//!     ┌──────────────────┐ ┌────────────┐ ┌──────────────────────┐
//!     │      Beacon      │ │ Telemetry  │ │    CommandIntake     │
//!     │  (timer, 10 s)   │ │ Publisher  │ │ (receive loop +      │
//!     │                  │ │(timer, 60s)│ │  tracked handlers)   │
//!     └────────┬─────────┘ └─────┬──────┘ └──────────┬───────────┘
//!              │ publish         │ publish           │ subscribe
//!              ▼                 ▼                   ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                 Connection (Arc<dyn Connection>)                  │
//! │  heartbeat.<name>.service   events.data   commands.<name>.>       │
//! └───────────────────────────────────────────────────────────────────┘
//!
//!   every component ── publish(Event) ──► Bus ──► event listener
//!                                                    ├─► SubscriberSet ─► LogWriter, ...
//!                                                    └─► ConnectionLost watch
//! ```
//!
//! ### Lifecycle
//! ```text
//! Agent::builder(identity) ──► start(conn) ──► Running
//!
//! dispose():
//!   ├─► stop telemetry timer  (sync)
//!   ├─► stop heartbeat timer  (sync)
//!   ├─► drain command intake  (unsubscribe, dispatch buffered, wait handlers)
//!   └─► Disposed: nothing is published or handled afterwards
//! ```
//!
//! ## Features
//! | Area              | Description                                                        | Key types / traits                         |
//! |-------------------|--------------------------------------------------------------------|--------------------------------------------|
//! | **Lifecycle**     | Start components, ordered idempotent dispose, signal handling.     | [`Agent`], [`AgentHandle`]                 |
//! | **Liveness**      | Empty heartbeat on a per-service subject.                          | [`Beacon`], [`PeriodicHandle`]             |
//! | **Telemetry**     | Periodic `{t, n, u, v}` batches on `events.<topic>`.               | [`Sample`], [`MeasurementBatch`], [`Codec`]|
//! | **Commands**      | Wildcard subscription, demultiplexing, tracked handler tasks.      | [`CommandHandler`], [`Command`]            |
//! | **Transport**     | Pluggable connection, in-memory fabric, tracing decorator.         | [`Connection`], [`MemoryConnection`]       |
//! | **Subscriber API**| Hook into runtime events (logging, metrics, custom subscribers).   | [`Subscribe`], [`LogWriter`]               |
//! | **Errors**        | Typed errors for the runtime and for contained per-tick failures.  | [`AgentError`], [`ServiceError`]           |
//! | **Configuration** | Runtime settings, optionally from environment variables.           | [`AgentConfig`], [`EnvConfig`]             |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use edgevisor::{
//!     Agent, AgentConfig, Command, HandlerFn, LogWriter, MeasurementBatch, MemoryConnection,
//!     SampleFn, ServiceError, ServiceIdentity, Subscribe,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let conn = Arc::new(MemoryConnection::new());
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::default())];
//!
//!     let agent = Agent::builder(ServiceIdentity::new("diagnostic")?)
//!         .with_config(AgentConfig::default())
//!         .with_subscribers(subs)
//!         .with_sampler(SampleFn::arc("battery", || async {
//!             let batch = MeasurementBatch::new()
//!                 .with("urn:cpt:diagnostic:battery-charge", "%EL", 87.0);
//!             Ok::<_, ServiceError>(batch)
//!         }))
//!         .with_handler(HandlerFn::arc(|cmd: Command| async move {
//!             println!("{} {}", cmd.name, cmd.payload);
//!             Ok::<_, ServiceError>(())
//!         }))
//!         .start(conn)
//!         .await?;
//!
//!     agent.dispose().await;
//!     Ok(())
//! }
//! ```
mod beacon;
mod commands;
mod config;
mod core;
mod error;
mod events;
mod identity;
mod periodic;
mod subscribers;
mod telemetry;
mod transport;

// ---- Public re-exports ----

pub use beacon::{Beacon, DEFAULT_HEARTBEAT_INTERVAL};
pub use commands::{
    Command, CommandHandler, CommandIntake, CommandSubscription, HandlerFn, HandlerRef,
    IntakeParams, LogCommands,
};
pub use config::{AgentConfig, EnvConfig};
pub use core::{
    Agent, AgentBuilder, AgentHandle, LifecycleState, run_until_shutdown,
    wait_for_shutdown_signal,
};
pub use error::{AgentError, ServiceError};
pub use events::{Bus, Event, EventKind};
pub use identity::{DEFAULT_TELEMETRY_TOPIC, ServiceIdentity, TELEMETRY_SUBJECT, event_subject};
pub use periodic::PeriodicHandle;
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
pub use telemetry::{
    Codec, CodecError, CodecRef, DEFAULT_TELEMETRY_INTERVAL, JsonCodec, Measurement,
    MeasurementBatch, PublisherParams, Sample, SampleFn, SamplerRef, TelemetryPublisher,
    epoch_seconds,
};
pub use transport::{
    Connection, ConnectionRef, MemoryConnection, Message, SubjectPattern, Subscription,
    SubscriptionId, TracedConnection, TransportError, validate_subject,
};
