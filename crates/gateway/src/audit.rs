//! Audit trail for access decisions.
//!
//! Every list and read request records an `attempt`, then exactly one of
//! `denied`, `success` or `error`. Sinks are fire-and-forget: recording never
//! fails or blocks the request path.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use protocol::{AuditOutcome, AuditRecord};
use tracing::{info, warn};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use uuid::Uuid;

/// Destination for audit records.
pub trait AuditSink: Send + Sync {
    /// Record one event. Must not block or panic.
    fn record(&self, record: &AuditRecord);
}

/// Emits audit records as structured events on the `audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord) {
        info!(
            target: "audit",
            id = %record.id,
            principal = %record.principal,
            resource = %record.resource,
            action = %record.action,
            outcome = %record.outcome,
            details = %record.details,
            "access"
        );
    }
}

/// Appends audit records as JSON lines through a background writer.
///
/// The returned [`WorkerGuard`] must be held for as long as records are
/// written; dropping it flushes and stops the writer.
pub struct FileAuditSink {
    writer: NonBlocking,
}

impl FileAuditSink {
    /// Open (or create) the audit file at `path`.
    pub fn open(path: &Path) -> Result<(Self, WorkerGuard)> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("audit log path has no file name: {}", path.display()))?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create audit log directory: {}", dir.display()))?;

        let appender = RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(file_name)
            .build(dir)
            .with_context(|| format!("Failed to open audit log: {}", path.display()))?;

        let (writer, guard) = tracing_appender::non_blocking(appender);
        Ok((Self { writer }, guard))
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, record: &AuditRecord) {
        let mut line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to serialize audit record");
                return;
            }
        };
        line.push('\n');

        let mut writer = self.writer.clone();
        if let Err(e) = writer.write_all(line.as_bytes()) {
            warn!(error = %e, "Failed to write audit record");
        }
    }
}

/// Keeps audit records in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events, oldest first.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Outcomes in recording order.
    pub fn outcomes(&self) -> Vec<AuditOutcome> {
        self.records().iter().map(|r| r.outcome).collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: &AuditRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }
}

/// Builds audit records and hands them to a sink.
#[derive(Clone)]
pub struct Auditor {
    sink: Arc<dyn AuditSink>,
}

impl Auditor {
    /// Create an auditor writing to `sink`.
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Record one access event.
    pub fn log_access(
        &self,
        principal: &str,
        resource: &str,
        action: &str,
        outcome: AuditOutcome,
        details: impl Into<String>,
    ) {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);

        self.sink.record(&AuditRecord {
            id: Uuid::new_v4().to_string(),
            timestamp_ms,
            principal: principal.to_string(),
            resource: resource.to_string(),
            action: action.to_string(),
            outcome,
            details: details.into(),
            ip_address: None,
        });
    }
}

impl std::fmt::Debug for Auditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auditor").finish_non_exhaustive()
    }
}
