//! Diagnostic service on an in-memory fabric, with a fleet-manager stub on the
//! other side. Besides `events.data` telemetry, the service sends `events.infos`
//! and `events.params` every ten minutes.
//!
//! ```text
//! RUST_LOG=debug SERVICE_NAME=diagnostic HEARTBEAT_INTERVAL_S=2 MESSAGE_INTERVAL_S=5 \
//!     cargo run --example diagnostic
//! ```
//!
//! Stop with Ctrl-C: the agent disposes and the connection is drained.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use edgevisor::{
    Agent, AgentError, AgentHandle, Codec, Command, Connection, ConnectionRef, EnvConfig,
    HandlerFn, JsonCodec, LogWriter, MeasurementBatch, MemoryConnection, SampleFn, SamplerRef,
    ServiceError, ServiceIdentity, Subscribe, TracedConnection, epoch_seconds,
    run_until_shutdown,
};
use rand::Rng;
use serde_json::json;
use tracing_subscriber::EnvFilter;

/// Battery charge and fuel level, random for the demo.
fn diagnostic_sampler(service: &ServiceIdentity) -> SamplerRef {
    let base = format!("urn:cpt:{}", service.name());
    SampleFn::arc("diagnostic", move || {
        let mut rng = rand::rng();
        let batch = MeasurementBatch::new()
            .with(
                format!("{base}:battery-charge"),
                "%EL",
                f64::from(rng.random_range(0..=100u8)),
            )
            .with(
                format!("{base}:fuel-level"),
                "%FL",
                f64::from(rng.random_range(0..=100u8)),
            );
        async move { Ok::<_, ServiceError>(batch) }
    })
}

/// Cadence of the `infos` and `params` auxiliary events.
const AUX_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Publishes device info and metric descriptors until the agent is disposed.
async fn auxiliary_events(agent: AgentHandle) {
    let base = format!("urn:cpt:{}:", agent.identity().name());
    let params = json!({
        "bn": base,
        "n": "metrics",
        "vs": [
            {"id": "battery-charge", "name": "battery_charge", "unit": "%EL"},
            {"id": "fuel-level", "name": "fuel_level", "unit": "%FL"},
        ],
    });

    let mut every = tokio::time::interval(AUX_INTERVAL);
    loop {
        every.tick().await;
        let infos = json!({
            "fwVersion": env!("CARGO_PKG_VERSION"),
            "status": "connected",
            "timestamp": epoch_seconds().round(),
        });
        for (topic, value) in [("infos", &infos), ("params", &params)] {
            match agent.publish_event(topic, value).await {
                Ok(()) => {}
                Err(AgentError::Disposed { .. }) => return,
                Err(e) => tracing::warn!(topic, error = %e, "auxiliary event not sent"),
            }
        }
    }
}

/// Watches heartbeats and telemetry, then sends one command.
async fn fleet_manager(fabric: MemoryConnection, service: ServiceIdentity) -> anyhow::Result<()> {
    let mut heartbeats = fabric.subscribe("heartbeat.*.service").await?;
    let mut events = fabric.subscribe("events.>").await?;
    let codec = JsonCodec;

    tokio::spawn(async move {
        while let Some(msg) = heartbeats.next().await {
            tracing::info!(target: "fleet", subject = %msg.subject, "service alive");
        }
    });
    tokio::spawn(async move {
        while let Some(msg) = events.next().await {
            match codec.decode(&msg.payload) {
                Ok(value) => {
                    tracing::info!(target: "fleet", subject = %msg.subject, %value, "event")
                }
                Err(e) => {
                    tracing::warn!(target: "fleet", subject = %msg.subject, error = %e, "bad event")
                }
            }
        }
    });

    tokio::time::sleep(Duration::from_secs(3)).await;
    let subject = format!("{}reboot", service.command_prefix());
    fabric
        .publish(&subject, serde_json::to_vec(&json!({"force": true}))?)
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let env = EnvConfig::from_env().context("failed to load config from environment")?;
    tracing::info!(
        service = %env.service_name,
        heartbeat_s = env.heartbeat_interval_s,
        message_s = env.message_interval_s,
        nats_url = %env.nats_url,
        "configuration loaded"
    );
    let (identity, config) = env.into_parts()?;

    let fabric = MemoryConnection::new();
    let conn: ConnectionRef = Arc::new(TracedConnection::new(fabric.clone()));

    let manager = tokio::spawn(fleet_manager(fabric, identity.clone()));

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let agent = Agent::builder(identity.clone())
        .with_config(config)
        .with_subscribers(subs)
        .with_sampler(diagnostic_sampler(&identity))
        .with_handler(HandlerFn::arc(|cmd: Command| async move {
            match cmd.name.as_str() {
                "reboot" => {
                    let force = cmd.arg("force").and_then(|v| v.as_bool()).unwrap_or(false);
                    tracing::info!(force, "reboot requested");
                    Ok(())
                }
                other => Err(ServiceError::handler(format!("unknown command {other:?}"))),
            }
        }))
        .start(Arc::clone(&conn))
        .await?;

    let aux = tokio::spawn(auxiliary_events(agent.clone()));

    run_until_shutdown(agent, conn).await?;
    aux.abort();
    manager.abort();
    Ok(())
}
