//! Error severity shared across components.
//!
//! Every remote interaction (controller command, radar session, telemetry
//! poll) reports failures through a typed error that maps onto a
//! [`Severity`]. Callers branch on the severity instead of on the error kind.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Logged and survived; the current configuration keeps going.
    Warning,
    /// Aborts the current configuration (or the process, before any device
    /// interaction).
    Fatal,
}

impl Severity {
    pub fn is_fatal(self) -> bool {
        matches!(self, Severity::Fatal)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Fatal => write!(f, "fatal"),
        }
    }
}

/// Implemented by error types that carry a severity.
pub trait Classify {
    fn severity(&self) -> Severity;
}
