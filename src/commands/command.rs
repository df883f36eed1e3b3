//! Inbound command value handed to the handler.

use serde_json::Value;

/// One decoded command.
///
/// Built by the intake for every inbound message, passed to the handler by value
/// and dropped when the invocation ends.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Command name: the subject with the `commands.<service>.` prefix removed
    /// (may itself contain dots, e.g. `camera.zoom`).
    pub name: String,
    /// Decoded body; [`Value::Null`] for an empty body.
    pub payload: Value,
    /// Full subject the message arrived on.
    pub subject: String,
}

impl Command {
    /// Creates a command.
    pub fn new(name: impl Into<String>, payload: Value, subject: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload,
            subject: subject.into(),
        }
    }

    /// Looks up a top-level argument when the payload is an object.
    pub fn arg(&self, key: &str) -> Option<&Value> {
        self.payload.as_object().and_then(|m| m.get(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn arg_reads_object_fields_only() {
        let cmd = Command::new("reboot", json!({"force": true}), "commands.diagnostic.reboot");
        assert_eq!(cmd.arg("force"), Some(&json!(true)));
        assert_eq!(cmd.arg("delay"), None);

        let bare = Command::new("ping", Value::Null, "commands.diagnostic.ping");
        assert_eq!(bare.arg("force"), None);
    }
}
