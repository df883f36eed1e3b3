//! # Service identity and the subjects derived from it.
//!
//! | Subject                       | Direction | Purpose          |
//! |-------------------------------|-----------|------------------|
//! | `heartbeat.<name>.service`    | publish   | liveness signal  |
//! | `events.data`                 | publish   | telemetry        |
//! | `events.<topic>`              | publish   | auxiliary events |
//! | `commands.<name>.>`           | subscribe | inbound commands |

use std::fmt;
use std::sync::Arc;

use crate::error::AgentError;

/// Shared telemetry subject (not namespaced per service).
pub const TELEMETRY_SUBJECT: &str = "events.data";

/// Default telemetry topic, the suffix of [`TELEMETRY_SUBJECT`].
pub const DEFAULT_TELEMETRY_TOPIC: &str = "data";

/// Validated service name. Cheap to clone.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ServiceIdentity {
    name: Arc<str>,
}

impl ServiceIdentity {
    /// Validates `name` so that every derived subject is well-formed.
    ///
    /// The name must be a single subject token: non-empty, without `.`, `*`, `>`
    /// or whitespace.
    pub fn new(name: impl Into<String>) -> Result<Self, AgentError> {
        let name = name.into();
        let reason = if name.is_empty() {
            Some("empty name")
        } else if name.contains('.') {
            Some("'.' separates subject tokens")
        } else if name.contains(['*', '>']) {
            Some("wildcard characters are reserved")
        } else if name.chars().any(char::is_whitespace) {
            Some("whitespace is not allowed")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(AgentError::InvalidIdentity { name, reason }),
            None => Ok(Self { name: name.into() }),
        }
    }

    /// The service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `heartbeat.<name>.service`
    pub fn heartbeat_subject(&self) -> String {
        format!("heartbeat.{}.service", self.name)
    }

    /// `commands.<name>.`: stripped from inbound subjects to get the command name.
    pub fn command_prefix(&self) -> String {
        format!("commands.{}.", self.name)
    }

    /// `commands.<name>.>`
    pub fn command_wildcard(&self) -> String {
        format!("commands.{}.>", self.name)
    }

    /// Extracts the command name from an inbound subject.
    ///
    /// Returns `None` if the subject is outside this service's command namespace.
    pub fn command_name<'a>(&self, subject: &'a str) -> Option<&'a str> {
        subject
            .strip_prefix("commands.")
            .and_then(|rest| rest.strip_prefix(self.name()))
            .and_then(|rest| rest.strip_prefix('.'))
            .filter(|name| !name.is_empty())
    }
}

/// `events.<topic>`
pub fn event_subject(topic: &str) -> String {
    format!("events.{topic}")
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Debug for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ServiceIdentity").field(&self.name).finish()
    }
}
