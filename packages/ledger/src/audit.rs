//! Konform Ledger: Append-Only Audit Log
//!
//! Every metered action leaves a row. The core never deletes entries;
//! retention is a collaborator concern.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use konform_core::EngineError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audited action kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Scan,
    FixGenerated,
    FixExported,
    FixApplied,
    Feedback,
}

/// One audit row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub user_id: Uuid,
    pub action: AuditAction,
    /// Scan or fix id the entry refers to
    pub reference: String,
    /// Structured details, action-specific
    #[serde(default)]
    pub details: serde_json::Value,
}

impl AuditEntry {
    pub fn new(user_id: Uuid, action: AuditAction, reference: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            user_id,
            action,
            reference: reference.into(),
            details: serde_json::Value::Null,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Append-only audit sink.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<(), EngineError>;
}

/// In-memory sink. Exposes reads for tests and the admin surface; offers
/// no way to delete or rewrite entries.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditSink for MemoryAuditLog {
    async fn append(&self, entry: AuditEntry) -> Result<(), EngineError> {
        tracing::debug!(user = %entry.user_id, action = ?entry.action, reference = %entry.reference, "audit");
        self.entries.lock().push(entry);
        Ok(())
    }
}
