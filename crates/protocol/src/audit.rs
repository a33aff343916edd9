//! Audit trail records.

use serde::{Deserialize, Serialize};

/// Outcome recorded for an audited step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    /// The request was received.
    Attempt,
    /// Policy evaluation denied the request.
    Denied,
    /// The request completed.
    Success,
    /// The request failed (not found, too large, decode or internal errors).
    Error,
}

impl AuditOutcome {
    /// Lowercase name of the outcome.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Attempt => "attempt",
            AuditOutcome::Denied => "denied",
            AuditOutcome::Success => "success",
            AuditOutcome::Error => "error",
        }
    }
}

impl std::fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single audit log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique record identifier.
    pub id: String,
    /// When the event happened, unix milliseconds.
    pub timestamp_ms: u64,
    /// Principal identifier.
    pub principal: String,
    /// Resource string (`file:<path>` or `directory:<path>`).
    pub resource: String,
    /// Requested action.
    pub action: String,
    /// Outcome of the step.
    pub outcome: AuditOutcome,
    /// Free-form details.
    pub details: String,
    /// Remote address of the requester, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}
