//! Append-only audit trail of vault actions.
//!
//! Records what happened to which owner's record and when. Titles,
//! ciphertexts, handles and plaintext are never recorded.
//! Supports pluggable sinks for forwarding records to files, S3, etc.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::encoding::Address;

/// What a flow did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Stored,
    Revealed,
    Updated,
    Deleted,
}

/// A permanent record of one completed flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub owner: Address,
    pub action: AuditAction,
    /// Record index on the ledger at the time of the action.
    pub index: usize,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn now(owner: Address, action: AuditAction, index: usize) -> Self {
        Self {
            owner,
            action,
            index,
            timestamp: Utc::now(),
        }
    }
}

/// A sink that receives audit records. Implement this to forward records
/// to a file, database, S3, or other persistent store.
pub trait AuditSink: Send {
    /// Append a record. Called for every completed flow.
    fn append(&mut self, record: AuditRecord);
}

/// An append-only log of vault actions.
/// Can forward records to additional sinks via `add_forward_sink`.
#[derive(Default)]
pub struct AuditLog {
    records: Vec<AuditRecord>,
    forward_sinks: Vec<Box<dyn AuditSink>>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("records", &self.records)
            .field("forward_sinks", &self.forward_sinks.len())
            .finish()
    }
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink to receive a copy of every record.
    pub fn add_forward_sink(&mut self, sink: Box<dyn AuditSink>) {
        self.forward_sinks.push(sink);
    }

    /// Append a new record to the log and forward to any attached sinks.
    pub fn append(&mut self, record: AuditRecord) {
        for sink in self.forward_sinks.iter_mut() {
            sink.append(record.clone());
        }
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AuditRecord> {
        self.records.iter()
    }

    /// A copy of the records without the sinks.
    pub fn snapshot(&self) -> Vec<AuditRecord> {
        self.records.clone()
    }
}

// ---------------------------------------------------------------------------
// Built-in sink: file
// ---------------------------------------------------------------------------

/// Writes audit records as JSON lines (one per record) to a file.
/// Creates the file if it doesn't exist; appends if it does.
pub struct FileAuditSink {
    file: std::fs::File,
}

impl FileAuditSink {
    /// Open or create a file for append-only audit logging.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }
}

impl AuditSink for FileAuditSink {
    fn append(&mut self, record: AuditRecord) {
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to serialize audit record");
                return;
            }
        };
        if let Err(e) = writeln!(self.file, "{line}").and_then(|_| self.file.flush()) {
            warn!(error = %e, "failed to write audit record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_sink_writes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let mut log = AuditLog::new();
        log.add_forward_sink(Box::new(FileAuditSink::new(&path).unwrap()));
        let owner = Address::from_bytes([0xa1; 20]);
        log.append(AuditRecord::now(owner, AuditAction::Stored, 0));
        log.append(AuditRecord::now(owner, AuditAction::Revealed, 0));

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: AuditRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.action, AuditAction::Stored);
        assert_eq!(first.owner, owner);
        assert!(lines[1].contains("\"revealed\""));
        assert_eq!(log.len(), 2);
    }
}
