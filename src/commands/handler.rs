//! # Command handler abstraction.
//!
//! [`CommandHandler`] is the service implementer's hook for inbound commands.
//! [`HandlerFn`] wraps a closure `Fn(Command) -> Fut`; [`LogCommands`] only records
//! what it receives and is the default when no handler is configured.
//!
//! ## Example
//! ```rust
//! use edgevisor::{Command, HandlerFn, HandlerRef, ServiceError};
//!
//! let h: HandlerRef = HandlerFn::arc(|cmd: Command| async move {
//!     match cmd.name.as_str() {
//!         "reboot" => Ok(()),
//!         other => Err(ServiceError::handler(format!("unknown command {other}"))),
//!     }
//! });
//! # let _ = h;
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use super::command::Command;
use crate::error::ServiceError;

/// Shared handle to a command handler.
pub type HandlerRef = Arc<dyn CommandHandler>;

/// # Receiver of decoded commands.
///
/// Each invocation runs in its own task; several may overlap. Errors and panics
/// are contained to the invocation and reported as `HandlerFailed` events.
#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    /// Handles one command.
    async fn handle(&self, command: Command) -> Result<(), ServiceError>;
}

/// Function-backed handler.
pub struct HandlerFn<F> {
    f: F,
}

impl<F> HandlerFn<F> {
    /// Wraps a closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Wraps a closure and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> CommandHandler for HandlerFn<F>
where
    F: Fn(Command) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ServiceError>> + Send + 'static,
{
    async fn handle(&self, command: Command) -> Result<(), ServiceError> {
        (self.f)(command).await
    }
}

/// Handler that only logs the command it received.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCommands;

#[async_trait]
impl CommandHandler for LogCommands {
    async fn handle(&self, command: Command) -> Result<(), ServiceError> {
        tracing::info!(
            command = %command.name,
            subject = %command.subject,
            payload = %command.payload,
            "received command"
        );
        Ok(())
    }
}
