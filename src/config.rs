//! # Agent configuration.
//!
//! [`AgentConfig`] holds the knobs of one agent: timer intervals, telemetry topic,
//! command concurrency and bus capacity. [`EnvConfig`] loads the same values (plus
//! the service name) from environment variables via `envy`.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use edgevisor::AgentConfig;
//!
//! let mut cfg = AgentConfig::default();
//! cfg.heartbeat_interval = Duration::from_secs(5);
//! cfg.max_inflight_commands = 4;
//!
//! assert!(cfg.validate().is_ok());
//! assert_eq!(cfg.concurrency_limit(), Some(4));
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::beacon::DEFAULT_HEARTBEAT_INTERVAL;
use crate::error::AgentError;
use crate::identity::{DEFAULT_TELEMETRY_TOPIC, ServiceIdentity};
use crate::telemetry::DEFAULT_TELEMETRY_INTERVAL;
use crate::transport::validate_subject;

/// Runtime configuration of one agent.
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Heartbeat period.
    pub heartbeat_interval: Duration,
    /// Telemetry period.
    pub telemetry_interval: Duration,
    /// Telemetry is published on `events.<telemetry_topic>`.
    pub telemetry_topic: String,
    /// Maximum number of concurrently running command handlers (0 = unlimited).
    pub max_inflight_commands: usize,
    /// Capacity of the internal event bus.
    pub bus_capacity: usize,
}

impl Default for AgentConfig {
    /// Provides a default configuration:
    /// - `heartbeat_interval = 10s`
    /// - `telemetry_interval = 60s`
    /// - `telemetry_topic = "data"`
    /// - `max_inflight_commands = 0` (unlimited)
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            telemetry_interval: DEFAULT_TELEMETRY_INTERVAL,
            telemetry_topic: DEFAULT_TELEMETRY_TOPIC.to_string(),
            max_inflight_commands: 0,
            bus_capacity: 1024,
        }
    }
}

impl AgentConfig {
    /// Rejects values the agent cannot run with.
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.heartbeat_interval.is_zero() {
            return Err(invalid("heartbeat_interval must be non-zero"));
        }
        if self.telemetry_interval.is_zero() {
            return Err(invalid("telemetry_interval must be non-zero"));
        }
        if self.telemetry_topic.is_empty() {
            return Err(invalid("telemetry_topic must not be empty"));
        }
        if self.telemetry_topic.contains(['*', '>']) {
            return Err(invalid("telemetry_topic must not contain wildcards"));
        }
        validate_subject(&format!("events.{}", self.telemetry_topic))
            .map_err(|e| invalid(&format!("telemetry_topic: {e}")))?;
        if self.bus_capacity == 0 {
            return Err(invalid("bus_capacity must be non-zero"));
        }
        Ok(())
    }

    /// Handler concurrency limit, `None` when unlimited.
    pub fn concurrency_limit(&self) -> Option<usize> {
        match self.max_inflight_commands {
            0 => None,
            n => Some(n),
        }
    }
}

fn invalid(reason: &str) -> AgentError {
    AgentError::InvalidConfig {
        reason: reason.to_string(),
    }
}

/// Configuration read from environment variables.
///
/// | Variable                | Default                 |
/// |-------------------------|-------------------------|
/// | `SERVICE_NAME`          | `custom_service`        |
/// | `HEARTBEAT_INTERVAL_S`  | `10`                    |
/// | `MESSAGE_INTERVAL_S`    | `60`                    |
/// | `TELEMETRY_TOPIC`       | `data`                  |
/// | `MAX_INFLIGHT_COMMANDS` | `0`                     |
/// | `NATS_URL`              | `nats://127.0.0.1:4222` |
///
/// `NATS_URL` is not used by the agent itself; it is carried for whatever
/// transport adapter the binary wires up.
#[derive(Debug, Clone, Deserialize)]
pub struct EnvConfig {
    /// Service name.
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Heartbeat period in seconds.
    #[serde(default = "default_heartbeat_s")]
    pub heartbeat_interval_s: u64,
    /// Telemetry period in seconds.
    #[serde(default = "default_message_s")]
    pub message_interval_s: u64,
    /// Telemetry topic.
    #[serde(default = "default_topic")]
    pub telemetry_topic: String,
    /// Handler concurrency limit (0 = unlimited).
    #[serde(default)]
    pub max_inflight_commands: usize,
    /// Broker URL.
    #[serde(default = "default_nats_url")]
    pub nats_url: String,
}

fn default_service_name() -> String {
    "custom_service".to_string()
}

fn default_heartbeat_s() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL.as_secs()
}

fn default_message_s() -> u64 {
    DEFAULT_TELEMETRY_INTERVAL.as_secs()
}

fn default_topic() -> String {
    DEFAULT_TELEMETRY_TOPIC.to_string()
}

fn default_nats_url() -> String {
    "nats://127.0.0.1:4222".to_string()
}

impl EnvConfig {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self, AgentError> {
        Ok(envy::from_env::<Self>()?)
    }

    /// Reads from explicit `(NAME, value)` pairs.
    pub fn from_pairs<I>(vars: I) -> Result<Self, AgentError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Ok(envy::from_iter::<_, Self>(vars)?)
    }

    /// Validates and splits into identity and agent configuration.
    pub fn into_parts(self) -> Result<(ServiceIdentity, AgentConfig), AgentError> {
        let identity = ServiceIdentity::new(self.service_name)?;
        let cfg = AgentConfig {
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_s),
            telemetry_interval: Duration::from_secs(self.message_interval_s),
            telemetry_topic: self.telemetry_topic,
            max_inflight_commands: self.max_inflight_commands,
            ..AgentConfig::default()
        };
        cfg.validate()?;
        Ok((identity, cfg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = AgentConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(cfg.telemetry_interval, Duration::from_secs(60));
        assert_eq!(cfg.concurrency_limit(), None);
    }

    #[test]
    fn rejects_zero_intervals_and_bad_topics() {
        let mut cfg = AgentConfig {
            heartbeat_interval: Duration::ZERO,
            ..AgentConfig::default()
        };
        assert_eq!(cfg.validate().unwrap_err().as_label(), "agent_invalid_config");

        cfg.heartbeat_interval = Duration::from_secs(1);
        cfg.telemetry_interval = Duration::ZERO;
        assert!(cfg.validate().is_err());

        cfg.telemetry_interval = Duration::from_secs(1);
        for topic in ["", "a.>", "*", "a..b"] {
            cfg.telemetry_topic = topic.to_string();
            assert!(cfg.validate().is_err(), "topic {topic:?} accepted");
        }
        cfg.telemetry_topic = "infos".to_string();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn env_defaults() {
        let env = EnvConfig::from_pairs(Vec::new()).unwrap();
        assert_eq!(env.service_name, "custom_service");
        assert_eq!(env.nats_url, "nats://127.0.0.1:4222");

        let (id, cfg) = env.into_parts().unwrap();
        assert_eq!(id.name(), "custom_service");
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(cfg.telemetry_interval, Duration::from_secs(60));
        assert_eq!(cfg.telemetry_topic, "data");
    }

    #[test]
    fn env_overrides() {
        let env = EnvConfig::from_pairs(vars(&[
            ("SERVICE_NAME", "diagnostic"),
            ("HEARTBEAT_INTERVAL_S", "3"),
            ("MESSAGE_INTERVAL_S", "15"),
            ("TELEMETRY_TOPIC", "infos"),
            ("MAX_INFLIGHT_COMMANDS", "8"),
        ]))
        .unwrap();
        let (id, cfg) = env.into_parts().unwrap();
        assert_eq!(id.heartbeat_subject(), "heartbeat.diagnostic.service");
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(3));
        assert_eq!(cfg.telemetry_interval, Duration::from_secs(15));
        assert_eq!(cfg.telemetry_topic, "infos");
        assert_eq!(cfg.concurrency_limit(), Some(8));
    }

    #[test]
    fn env_errors_surface_as_agent_errors() {
        let err = EnvConfig::from_pairs(vars(&[("HEARTBEAT_INTERVAL_S", "soon")])).unwrap_err();
        assert_eq!(err.as_label(), "agent_env");

        let zero = EnvConfig::from_pairs(vars(&[("MESSAGE_INTERVAL_S", "0")])).unwrap();
        assert_eq!(zero.into_parts().unwrap_err().as_label(), "agent_invalid_config");

        let dotted = EnvConfig::from_pairs(vars(&[("SERVICE_NAME", "a.b")])).unwrap();
        assert_eq!(dotted.into_parts().unwrap_err().as_label(), "agent_invalid_identity");
    }
}
