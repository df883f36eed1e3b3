//! # LogWriter: render events through `tracing`
//!
//! Routine ticks go to `debug`, lifecycle and commands to `info`, contained
//! failures to `warn`, connection loss to `error`.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO  agent starting service="diagnostic"
//! DEBUG heartbeat sent service="diagnostic" subject="heartbeat.diagnostic.service"
//! INFO  command received service="diagnostic" command="reboot" bytes=14
//! WARN  sample failed service="diagnostic" subject="events.data" error="sensor offline"
//! ERROR connection lost service="diagnostic"
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let service = e.service.as_deref().unwrap_or("-");
        let subject = e.subject.as_deref().unwrap_or("-");
        let command = e.command.as_deref().unwrap_or("-");
        let error = e.error.as_deref().unwrap_or("-");

        match e.kind {
            EventKind::AgentStarting => tracing::info!(service, "agent starting"),
            EventKind::AgentStarted => tracing::info!(service, "agent started"),
            EventKind::DisposeRequested => tracing::info!(service, "stopping service"),
            EventKind::Disposed => tracing::info!(service, "service stopped"),

            EventKind::HeartbeatSent => tracing::debug!(service, subject, "heartbeat sent"),
            EventKind::BeaconStopped => tracing::debug!(service, "heartbeat stopped"),
            EventKind::TelemetryPublished => tracing::debug!(
                service,
                subject,
                records = e.records.unwrap_or_default(),
                bytes = e.bytes.unwrap_or_default(),
                "telemetry published"
            ),
            EventKind::PublisherStopped => tracing::debug!(service, "telemetry stopped"),
            EventKind::SampleFailed => tracing::warn!(service, subject, error, "sample failed"),

            EventKind::CommandReceived => tracing::info!(
                service,
                command,
                bytes = e.bytes.unwrap_or_default(),
                "command received"
            ),
            EventKind::CommandCompleted => tracing::debug!(service, command, "command completed"),
            EventKind::HandlerFailed => {
                tracing::warn!(service, subject, command, error, "command handler failed")
            }
            EventKind::MalformedPayload => tracing::warn!(
                service,
                subject,
                bytes = e.bytes.unwrap_or_default(),
                error,
                "malformed payload"
            ),
            EventKind::IntakeDraining => tracing::debug!(service, subject, "draining commands"),
            EventKind::IntakeClosed => tracing::debug!(service, subject, "command intake closed"),

            EventKind::PublishFailed => tracing::warn!(service, subject, error, "publish failed"),
            EventKind::ConnectionLost => tracing::error!(service, subject, "connection lost"),

            EventKind::SubscriberOverflow => {
                tracing::warn!(subscriber = service, error, "subscriber dropped event")
            }
            EventKind::SubscriberPanicked => {
                tracing::warn!(subscriber = service, error, "subscriber panicked")
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
