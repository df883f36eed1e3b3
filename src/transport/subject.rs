//! # Subject grammar and wildcard matching.
//!
//! Subjects are dot-separated, non-empty tokens (`heartbeat.diagnostic.service`).
//! Subscription patterns may additionally use:
//! - `*`: matches exactly one token;
//! - `>`: only as the last token, matches one or more remaining tokens.
//!
//! ```text
//! commands.diagnostic.>   matches  commands.diagnostic.reboot
//!                         matches  commands.diagnostic.net.reset
//!                         rejects  commands.diagnostic
//! heartbeat.*.service     matches  heartbeat.gps.service
//! ```

use super::TransportError;

/// A validated subscription pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectPattern {
    raw: String,
    tokens: Vec<String>,
}

impl SubjectPattern {
    /// Parses a pattern, rejecting empty tokens and a non-terminal `>`.
    pub fn parse(pattern: &str) -> Result<Self, TransportError> {
        let tokens: Vec<String> = pattern.split('.').map(str::to_owned).collect();
        for (i, token) in tokens.iter().enumerate() {
            if token.is_empty() {
                return Err(invalid(pattern, "empty token"));
            }
            if token == ">" && i + 1 != tokens.len() {
                return Err(invalid(pattern, "'>' must be the last token"));
            }
            if token.len() > 1 && token.contains(['*', '>']) {
                return Err(invalid(pattern, "wildcards must be whole tokens"));
            }
            if token.chars().any(char::is_whitespace) {
                return Err(invalid(pattern, "whitespace in subject"));
            }
        }
        Ok(Self {
            raw: pattern.to_owned(),
            tokens,
        })
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True if a concrete `subject` is routed to this pattern.
    pub fn matches(&self, subject: &str) -> bool {
        let mut parts = subject.split('.');
        for token in &self.tokens {
            match token.as_str() {
                ">" => return parts.next().is_some(),
                "*" => {
                    if parts.next().is_none() {
                        return false;
                    }
                }
                literal => {
                    if parts.next() != Some(literal) {
                        return false;
                    }
                }
            }
        }
        parts.next().is_none()
    }
}

/// Validates a subject used for publishing (no wildcards allowed).
pub fn validate_subject(subject: &str) -> Result<(), TransportError> {
    if subject.is_empty() {
        return Err(invalid(subject, "empty subject"));
    }
    for token in subject.split('.') {
        if token.is_empty() {
            return Err(invalid(subject, "empty token"));
        }
        if token.contains(['*', '>']) {
            return Err(invalid(subject, "wildcards are not allowed when publishing"));
        }
        if token.chars().any(char::is_whitespace) {
            return Err(invalid(subject, "whitespace in subject"));
        }
    }
    Ok(())
}

fn invalid(subject: &str, reason: &'static str) -> TransportError {
    TransportError::InvalidSubject {
        subject: subject.to_owned(),
        reason,
    }
}
