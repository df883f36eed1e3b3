//! # Command intake.
//!
//! Subscribes once to `commands.<service>.>`, turns every inbound message into a
//! [`Command`] and dispatches the handler as an independent tracked task.
//!
//! ## Receive loop
//! ```text
//! loop (select, biased):
//!   ├─ drain requested ──► unsubscribe ──► dispatch buffered ──► wait handlers ──► closed
//!   ├─ message ──► strip "commands.<name>." ──► decode body
//!   │                 ├─ Err → MalformedPayload (handler skipped)
//!   │                 └─ Ok  → [permit] → tracker.spawn(handler.handle(cmd))
//!   │                                        ├─ Ok          → CommandCompleted
//!   │                                        └─ Err / panic → HandlerFailed
//!   └─ stream ended ──► ConnectionLost ──► wait handlers ──► closed
//! ```
//!
//! ## Rules
//! - Dispatch order equals transport order; completion order is unspecified.
//! - Once drain begins, no message delivered after the unsubscribe reaches the handler.
//! - `drain()` resolves only after every spawned handler finished.
//! - With a limit `n > 0`, at most `n` handlers run at once; the loop waits for a
//!   permit before dispatching the next message.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::command::Command;
use super::handler::HandlerRef;
use crate::error::{AgentError, ServiceError};
use crate::events::{Bus, Event, EventKind};
use crate::identity::ServiceIdentity;
use crate::subscribers::panic_message;
use crate::telemetry::CodecRef;
use crate::transport::{ConnectionRef, Message, Subscription};

/// Everything the intake needs besides the connection.
pub struct IntakeParams {
    /// Body decoder.
    pub codec: CodecRef,
    /// Command receiver.
    pub handler: HandlerRef,
    /// Max concurrently running handlers (`None` = unlimited).
    pub max_inflight: Option<usize>,
}

/// Receive loop state. Use [`CommandIntake::start`].
pub struct CommandIntake {
    conn: ConnectionRef,
    service: ServiceIdentity,
    codec: CodecRef,
    handler: HandlerRef,
    limit: Option<Arc<Semaphore>>,
    tracker: TaskTracker,
    bus: Bus,
}

impl CommandIntake {
    /// Subscribes to the service's command namespace and spawns the receive loop.
    ///
    /// Fails only if the transport refuses the subscription.
    pub async fn start(
        conn: ConnectionRef,
        service: &ServiceIdentity,
        params: IntakeParams,
        bus: Bus,
    ) -> Result<CommandSubscription, AgentError> {
        let subject = service.command_wildcard();
        let sub = conn.subscribe(&subject).await?;

        let limit = params
            .max_inflight
            .filter(|&n| n > 0)
            .map(|n| Arc::new(Semaphore::new(n)));
        let intake = Self {
            conn,
            service: service.clone(),
            codec: params.codec,
            handler: params.handler,
            limit,
            tracker: TaskTracker::new(),
            bus,
        };

        let drain_req = CancellationToken::new();
        let closed = CancellationToken::new();
        let closed_guard = closed.clone().drop_guard();
        let req = drain_req.clone();
        tokio::spawn(async move {
            let _closed = closed_guard;
            intake.run(sub, req).await;
        });

        Ok(CommandSubscription {
            subject,
            drain_req,
            closed,
        })
    }

    async fn run(self, mut sub: Subscription, drain_req: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = drain_req.cancelled() => {
                    self.drain_buffered(&mut sub).await;
                    break;
                }
                msg = sub.next() => match msg {
                    Some(msg) => self.dispatch(msg).await,
                    None => {
                        self.bus.publish(
                            self.report(EventKind::ConnectionLost)
                                .with_subject(sub.pattern())
                                .with_error("command subscription ended"),
                        );
                        break;
                    }
                },
            }
        }

        self.tracker.close();
        self.tracker.wait().await;
        self.bus.publish(self.report(EventKind::IntakeClosed));
    }

    /// Stops deliveries, then dispatches what the subscription already buffered.
    async fn drain_buffered(&self, sub: &mut Subscription) {
        self.bus.publish(
            self.report(EventKind::IntakeDraining)
                .with_subject(sub.pattern()),
        );
        if let Err(e) = self.conn.unsubscribe(sub.id()).await {
            self.bus.publish(
                self.report(EventKind::PublishFailed)
                    .with_subject(sub.pattern())
                    .with_error(e.to_string()),
            );
        }
        while let Some(Some(msg)) = sub.next().now_or_never() {
            self.dispatch(msg).await;
        }
    }

    async fn dispatch(&self, msg: Message) {
        let Some(name) = self.service.command_name(&msg.subject) else {
            self.bus.publish(
                self.report(EventKind::MalformedPayload)
                    .with_subject(msg.subject.as_str())
                    .with_bytes(msg.payload.len())
                    .with_error("subject outside the service command namespace"),
            );
            return;
        };
        let name = name.to_owned();

        let payload = match self.codec.decode(&msg.payload) {
            Ok(v) => v,
            Err(e) => {
                self.bus.publish(
                    self.report(EventKind::MalformedPayload)
                        .with_subject(msg.subject.as_str())
                        .with_command(name.as_str())
                        .with_bytes(msg.payload.len())
                        .with_error(ServiceError::from(e).to_string()),
                );
                return;
            }
        };

        let permit = match &self.limit {
            None => None,
            Some(sem) => match sem.clone().acquire_owned().await {
                Ok(p) => Some(p),
                Err(_) => return,
            },
        };

        self.bus.publish(
            self.report(EventKind::CommandReceived)
                .with_subject(msg.subject.as_str())
                .with_command(name.as_str())
                .with_bytes(msg.payload.len()),
        );

        let command = Command::new(name, payload, msg.subject);
        let handler = Arc::clone(&self.handler);
        let bus = self.bus.clone();
        let service = self.service.clone();
        self.tracker.spawn(async move {
            let _permit = permit;
            let name = command.name.clone();
            let subject = command.subject.clone();
            let res = AssertUnwindSafe(handler.handle(command)).catch_unwind().await;

            let ev = match res {
                Ok(Ok(())) => Event::new(EventKind::CommandCompleted),
                Ok(Err(e)) => Event::new(EventKind::HandlerFailed).with_error(e.to_string()),
                Err(panic) => Event::new(EventKind::HandlerFailed).with_error(format!(
                    "handler panicked: {}",
                    panic_message(&*panic)
                )),
            };
            bus.publish(
                ev.with_service(service.name())
                    .with_subject(subject)
                    .with_command(name),
            );
        });
    }

    fn report(&self, kind: EventKind) -> Event {
        Event::new(kind).with_service(self.service.name())
    }
}

/// Handle to a running command intake.
#[derive(Debug)]
pub struct CommandSubscription {
    subject: String,
    drain_req: CancellationToken,
    closed: CancellationToken,
}

impl CommandSubscription {
    /// Wildcard subject the intake listens on.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// True once the intake finished: drained, or stopped after connection loss,
    /// with every handler task completed.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Unsubscribes, dispatches already-buffered messages and waits for every
    /// outstanding handler.
    ///
    /// Idempotent; concurrent callers await the same completion.
    pub async fn drain(&self) {
        self.drain_req.cancel();
        self.closed.cancelled().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::HandlerFn;
    use crate::telemetry::JsonCodec;
    use crate::transport::{Connection, MemoryConnection};
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time;

    fn recording(tx: mpsc::UnboundedSender<Command>) -> HandlerRef {
        HandlerFn::arc(move |cmd: Command| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(cmd);
                Ok::<_, ServiceError>(())
            }
        })
    }

    async fn start(conn: &MemoryConnection, handler: HandlerRef, bus: Bus) -> CommandSubscription {
        let id = ServiceIdentity::new("diagnostic").unwrap();
        CommandIntake::start(
            Arc::new(conn.clone()),
            &id,
            IntakeParams {
                codec: Arc::new(JsonCodec),
                handler,
                max_inflight: None,
            },
            bus,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn demultiplexes_name_and_payload() {
        let conn = MemoryConnection::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = start(&conn, recording(tx), Bus::new(64)).await;
        assert_eq!(sub.subject(), "commands.diagnostic.>");

        conn.publish("commands.diagnostic.reboot", br#"{"force":true}"#.to_vec())
            .await
            .unwrap();
        conn.publish("commands.diagnostic.camera.zoom", Vec::new())
            .await
            .unwrap();
        conn.publish("commands.gps.reboot", b"{}".to_vec()).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.name, "reboot");
        assert_eq!(first.payload, json!({"force": true}));
        assert_eq!(first.subject, "commands.diagnostic.reboot");

        let second = rx.recv().await.unwrap();
        assert_eq!(second.name, "camera.zoom");
        assert_eq!(second.payload, Value::Null);

        sub.drain().await;
        assert!(rx.try_recv().is_err(), "other services' commands are not delivered");
    }

    #[tokio::test]
    async fn malformed_body_is_reported_and_loop_continues() {
        let conn = MemoryConnection::new();
        let bus = Bus::new(64);
        let mut events = bus.subscribe();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = start(&conn, recording(tx), bus).await;

        conn.publish("commands.diagnostic.reboot", b"{not json".to_vec())
            .await
            .unwrap();
        conn.publish("commands.diagnostic.ping", b"1".to_vec()).await.unwrap();

        let cmd = rx.recv().await.unwrap();
        assert_eq!(cmd.name, "ping");
        assert_eq!(cmd.payload, json!(1));

        let malformed = loop {
            let ev = events.recv().await.unwrap();
            if ev.kind == EventKind::MalformedPayload {
                break ev;
            }
        };
        assert_eq!(malformed.subject.as_deref(), Some("commands.diagnostic.reboot"));
        assert_eq!(malformed.bytes, Some(9));
        assert!(malformed.error.is_some());
        sub.drain().await;
    }

    #[tokio::test(start_paused = true)]
    async fn drain_waits_for_in_flight_handler() {
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
                time::sleep(Duration::from_millis(200)).await;
                d.store(true, Ordering::SeqCst);
                Ok::<_, ServiceError>(())
            }
        });
        let sub = start(&conn, handler, Bus::new(64)).await;

        conn.publish("commands.diagnostic.calibrate", Vec::new())
            .await
            .unwrap();
        started_rx.recv().await.unwrap();

        sub.drain().await;
        assert!(done.load(Ordering::SeqCst), "drain resolved before the handler finished");
        assert!(sub.is_closed());
        assert_eq!(conn.subscription_count().await, 0);

        conn.publish("commands.diagnostic.calibrate", Vec::new())
            .await
            .unwrap();
        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn buffered_messages_are_dispatched_on_drain() {
        let conn = MemoryConnection::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = start(&conn, recording(tx), Bus::new(64)).await;

        // Published before the loop gets a chance to run; sit in the buffer.
        for i in 0..3 {
            conn.publish("commands.diagnostic.step", json!(i).to_string().into_bytes())
                .await
                .unwrap();
        }
        sub.drain().await;

        let mut seen = Vec::new();
        while let Ok(cmd) = rx.try_recv() {
            seen.push(cmd.payload);
        }
        assert_eq!(seen, [json!(0), json!(1), json!(2)]);
    }

    #[tokio::test]
    async fn concurrent_drains_share_completion() {
        let conn = MemoryConnection::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let sub = Arc::new(start(&conn, recording(tx), Bus::new(64)).await);

        let (a, b) = (sub.clone(), sub.clone());
        tokio::join!(a.drain(), b.drain());
        assert!(sub.is_closed());
        sub.drain().await;
    }

    #[tokio::test]
    async fn handler_errors_and_panics_are_contained() {
        let conn = MemoryConnection::new();
        let bus = Bus::new(64);
        let mut events = bus.subscribe();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handler = HandlerFn::arc(move |cmd: Command| {
            let tx = tx.clone();
            async move {
                match cmd.name.as_str() {
                    "explode" => panic!("boom"),
                    "fail" => Err(ServiceError::handler("device busy")),
                    _ => {
                        let _ = tx.send(cmd.name);
                        Ok(())
                    }
                }
            }
        });
        let sub = start(&conn, handler, bus).await;

        for name in ["explode", "fail", "ok"] {
            conn.publish(&format!("commands.diagnostic.{name}"), Vec::new())
                .await
                .unwrap();
        }
        assert_eq!(rx.recv().await.unwrap(), "ok");
        sub.drain().await;

        let mut failures = Vec::new();
        while let Ok(ev) = events.try_recv() {
            if ev.kind == EventKind::HandlerFailed {
                failures.push((ev.command.unwrap().to_string(), ev.error.unwrap().to_string()));
            }
        }
        failures.sort();
        assert_eq!(
            failures,
            [
                ("explode".to_string(), "handler panicked: boom".to_string()),
                ("fail".to_string(), "handler failed: device busy".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn stream_end_without_drain_reports_connection_loss() {
        let conn = MemoryConnection::new();
        let bus = Bus::new(64);
        let mut events = bus.subscribe();
        let (tx, _rx) = mpsc::unbounded_channel();
        let sub = start(&conn, recording(tx), bus).await;

        conn.close().await;
        let lost = loop {
            let ev = events.recv().await.unwrap();
            if ev.kind == EventKind::ConnectionLost {
                break ev;
            }
        };
        assert_eq!(lost.subject.as_deref(), Some("commands.diagnostic.>"));
        sub.drain().await;
        assert!(sub.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn limit_bounds_concurrent_handlers() {
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

        let id = ServiceIdentity::new("diagnostic").unwrap();
        let sub = CommandIntake::start(
            Arc::new(conn.clone()),
            &id,
            IntakeParams {
                codec: Arc::new(JsonCodec),
                handler,
                max_inflight: Some(2),
            },
            Bus::new(64),
        )
        .await
        .unwrap();

        for _ in 0..6 {
            conn.publish("commands.diagnostic.work", Vec::new())
                .await
                .unwrap();
        }
        time::sleep(Duration::from_millis(500)).await;
        sub.drain().await;
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }
}
