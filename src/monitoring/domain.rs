//! Monitored domains and their status vocabulary

use serde::{Deserialize, Serialize};
use std::fmt;

/// A monitored domain of the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Documents,
    Messages,
    Storage,
    Users,
    Security,
    EdgeFunctions,
}

impl Domain {
    /// Every monitored domain, in display order
    pub const ALL: [Domain; 6] = [
        Domain::Documents,
        Domain::Messages,
        Domain::Storage,
        Domain::Users,
        Domain::Security,
        Domain::EdgeFunctions,
    ];

    /// Stable identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Documents => "documents",
            Domain::Messages => "messages",
            Domain::Storage => "storage",
            Domain::Users => "users",
            Domain::Security => "security",
            Domain::EdgeFunctions => "edge_functions",
        }
    }

    /// Change topics whose events affect this domain
    pub fn topics(&self) -> &'static [&'static str] {
        match self {
            Domain::Documents => &["documents"],
            Domain::Messages => &["messages"],
            Domain::Storage => &["storage_objects"],
            Domain::Users => &["profiles"],
            Domain::Security => &["security_events", "audit_logs"],
            Domain::EdgeFunctions => &["function_invocations"],
        }
    }

    /// Parse a stable identifier
    pub fn parse(s: &str) -> Option<Domain> {
        Domain::ALL.into_iter().find(|d| d.as_str() == s)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status classification of a snapshot
///
/// Service-style domains use `Healthy | Degraded | Down`; the security domain
/// uses `Secure | Warning | Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Healthy,
    Degraded,
    Down,
    Secure,
    Warning,
    Critical,
}

impl Status {
    /// Severity rank: 0 nominal, 1 warning, 2 failing
    pub fn severity(&self) -> u8 {
        match self {
            Status::Healthy | Status::Secure => 0,
            Status::Degraded | Status::Warning => 1,
            Status::Down | Status::Critical => 2,
        }
    }

    /// Lowercase label
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Healthy => "healthy",
            Status::Degraded => "degraded",
            Status::Down => "down",
            Status::Secure => "secure",
            Status::Warning => "warning",
            Status::Critical => "critical",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
