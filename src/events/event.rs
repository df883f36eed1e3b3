//! # Runtime events emitted by the agent components.
//!
//! The [`EventKind`] enum classifies events across four categories:
//! - **Lifecycle**: agent start and dispose progress
//! - **Periodic**: heartbeat and telemetry ticks, sample failures
//! - **Commands**: inbound command flow, decode and handler failures
//! - **Transport / subscribers**: publish failures, connection loss, overflow
//!
//! Every contained failure (a skipped tick, a dropped message, a failed handler)
//! is reported as an event, so no error silently disappears.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use edgevisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::HandlerFailed)
//!     .with_service("diagnostic")
//!     .with_subject("commands.diagnostic.reboot")
//!     .with_command("reboot")
//!     .with_error("device busy");
//!
//! assert_eq!(ev.kind, EventKind::HandlerFailed);
//! assert_eq!(ev.command.as_deref(), Some("reboot"));
//! assert!(ev.is_failure());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Lifecycle ===
    /// `start` began; components are about to be started.
    AgentStarting,
    /// Beacon, publisher and command intake are all running.
    AgentStarted,
    /// `dispose` was called for the first time.
    DisposeRequested,
    /// Timers stopped and command intake drained.
    Disposed,

    // === Periodic ===
    /// Heartbeat published.
    ///
    /// Sets: `service`, `subject`.
    HeartbeatSent,
    /// Beacon timer cancelled.
    BeaconStopped,
    /// Telemetry batch published.
    ///
    /// Sets: `service`, `subject`, `records`, `bytes`.
    TelemetryPublished,
    /// Sampler failed; tick skipped.
    ///
    /// Sets: `service`, `subject`, `error`.
    SampleFailed,
    /// Publisher timer cancelled.
    PublisherStopped,

    // === Commands ===
    /// Command decoded and dispatched to the handler.
    ///
    /// Sets: `service`, `subject`, `command`, `bytes`.
    CommandReceived,
    /// Handler returned `Ok`.
    CommandCompleted,
    /// Handler returned an error or panicked.
    ///
    /// Sets: `service`, `subject`, `command`, `error`.
    HandlerFailed,
    /// Payload could not be decoded (or encoded); message skipped.
    ///
    /// Sets: `service`, `subject`, `bytes`, `error`.
    MalformedPayload,
    /// Drain requested on the command subscription.
    IntakeDraining,
    /// Command subscription fully closed (drain finished or connection lost).
    IntakeClosed,

    // === Transport ===
    /// A publish was rejected by the connection.
    ///
    /// Sets: `service`, `subject`, `error`.
    PublishFailed,
    /// The connection closed underneath the agent. Fatal.
    ConnectionLost,

    // === Subscribers ===
    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `service` (subscriber name), `error`.
    SubscriberOverflow,
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `service` (subscriber name), `error` (panic message).
    SubscriberPanicked,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Service name, if applicable.
    pub service: Option<Arc<str>>,
    /// Subject involved (published to or received on).
    pub subject: Option<Arc<str>>,
    /// Command name for command events.
    pub command: Option<Arc<str>>,
    /// Human-readable error.
    pub error: Option<Arc<str>>,
    /// Payload size in bytes.
    pub bytes: Option<usize>,
    /// Number of records in a telemetry batch.
    pub records: Option<usize>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            service: None,
            subject: None,
            command: None,
            error: None,
            bytes: None,
            records: None,
        }
    }

    /// Attaches a service name.
    #[inline]
    pub fn with_service(mut self, service: impl Into<Arc<str>>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Attaches a subject.
    #[inline]
    pub fn with_subject(mut self, subject: impl Into<Arc<str>>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Attaches a command name.
    #[inline]
    pub fn with_command(mut self, command: impl Into<Arc<str>>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Attaches an error message.
    #[inline]
    pub fn with_error(mut self, error: impl Into<Arc<str>>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Attaches a payload size.
    #[inline]
    pub fn with_bytes(mut self, n: usize) -> Self {
        self.bytes = Some(n);
        self
    }

    /// Attaches a record count.
    #[inline]
    pub fn with_records(mut self, n: usize) -> Self {
        self.records = Some(n);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_service(subscriber)
            .with_error(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_service(subscriber)
            .with_error(info)
    }

    /// True for events reporting a contained or fatal failure.
    pub fn is_failure(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SampleFailed
                | EventKind::HandlerFailed
                | EventKind::MalformedPayload
                | EventKind::PublishFailed
                | EventKind::ConnectionLost
                | EventKind::SubscriberOverflow
                | EventKind::SubscriberPanicked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotonic() {
        let a = Event::new(EventKind::HeartbeatSent);
        let b = Event::new(EventKind::HeartbeatSent);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn overflow_is_a_failure() {
        let ev = Event::subscriber_overflow("log", "full");
        assert!(ev.is_failure());
        assert_eq!(ev.service.as_deref(), Some("log"));
        assert!(!Event::new(EventKind::Disposed).is_failure());
    }
}
