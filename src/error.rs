//! Error types used by the edgevisor agent and its components.
//!
//! This module defines two main error enums:
//!
//! - [`AgentError`] errors raised by the agent runtime itself (startup, connection loss).
//! - [`ServiceError`] errors raised by one tick or one command; always contained.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging/metrics.

use thiserror::Error;

use crate::telemetry::CodecError;
use crate::transport::TransportError;

/// # Errors produced by the agent runtime.
///
/// Only [`AgentError::ConnectionLost`] can happen after a successful start; it is
/// treated as fatal for the whole service and surfaced to the process.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum AgentError {
    /// The shared connection closed underneath the agent.
    #[error("connection lost for service {service:?}")]
    ConnectionLost {
        /// Service that observed the loss.
        service: String,
    },

    /// Configuration rejected by [`AgentConfig::validate`](crate::AgentConfig::validate).
    #[error("invalid config: {reason}")]
    InvalidConfig {
        /// What was wrong.
        reason: String,
    },

    /// Service name cannot be used to derive subjects.
    #[error("invalid service name {name:?}: {reason}")]
    InvalidIdentity {
        /// The rejected name.
        name: String,
        /// What was wrong.
        reason: &'static str,
    },

    /// Transport refused an operation during startup.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Environment configuration could not be parsed.
    #[error("failed to load config from environment: {0}")]
    Env(#[from] envy::Error),

    /// Operation attempted on an agent that is disposing or disposed.
    #[error("service {service:?} is disposed")]
    Disposed {
        /// Service name.
        service: String,
    },

    /// Auxiliary event could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// OS signal handlers could not be installed.
    #[error("signal handler registration failed: {0}")]
    Signal(#[from] std::io::Error),
}

impl AgentError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use edgevisor::AgentError;
    ///
    /// let err = AgentError::ConnectionLost { service: "diagnostic".into() };
    /// assert_eq!(err.as_label(), "agent_connection_lost");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            AgentError::ConnectionLost { .. } => "agent_connection_lost",
            AgentError::InvalidConfig { .. } => "agent_invalid_config",
            AgentError::InvalidIdentity { .. } => "agent_invalid_identity",
            AgentError::Transport(_) => "agent_transport",
            AgentError::Env(_) => "agent_env",
            AgentError::Disposed { .. } => "agent_disposed",
            AgentError::Codec(_) => "agent_codec",
            AgentError::Signal(_) => "agent_signal",
        }
    }

    /// Returns true if the process should stop (or reconnect at a higher layer).
    pub fn is_fatal(&self) -> bool {
        matches!(self, AgentError::ConnectionLost { .. })
    }
}

/// # Errors produced by a single tick or a single command.
///
/// These never stop the component that raised them: the tick is skipped or the
/// message is dropped, an event is reported, and processing continues.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Payload could not be decoded (or encoded).
    #[error("malformed payload: {error}")]
    MalformedPayload {
        /// The underlying codec message.
        error: String,
    },

    /// The telemetry sampler failed for this tick.
    #[error("sample failed: {error}")]
    SampleFailure {
        /// The underlying error message.
        error: String,
    },

    /// The command handler failed for this invocation.
    #[error("handler failed: {error}")]
    HandlerFailure {
        /// The underlying error message.
        error: String,
    },
}

impl ServiceError {
    /// Shorthand for [`ServiceError::SampleFailure`].
    pub fn sample(error: impl ToString) -> Self {
        ServiceError::SampleFailure {
            error: error.to_string(),
        }
    }

    /// Shorthand for [`ServiceError::HandlerFailure`].
    pub fn handler(error: impl ToString) -> Self {
        ServiceError::HandlerFailure {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use edgevisor::ServiceError;
    ///
    /// assert_eq!(ServiceError::sample("sensor offline").as_label(), "sample_failure");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ServiceError::MalformedPayload { .. } => "malformed_payload",
            ServiceError::SampleFailure { .. } => "sample_failure",
            ServiceError::HandlerFailure { .. } => "handler_failure",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ServiceError::MalformedPayload { error } => format!("malformed: {error}"),
            ServiceError::SampleFailure { error } => format!("sample: {error}"),
            ServiceError::HandlerFailure { error } => format!("handler: {error}"),
        }
    }
}

impl From<CodecError> for ServiceError {
    fn from(err: CodecError) -> Self {
        ServiceError::MalformedPayload {
            error: err.to_string(),
        }
    }
}
