//! Konform Ledger: Quota, Audit & Idempotency
//!
//! The only component with contended writes. Per-user counters sit behind
//! fine-grained locks; the audit log is append-only; feedback is
//! write-once per (user, fix); repeated fix requests inside the
//! idempotency window resolve from a bounded TTL cache.

pub mod audit;
pub mod feedback;
pub mod idempotency;
pub mod quota;

pub use audit::{AuditAction, AuditEntry, AuditSink, MemoryAuditLog};
pub use feedback::{Feedback, FeedbackStore};
pub use idempotency::IdempotencyCache;
pub use quota::{plan_limits, LedgerError, PlanLimits, QuotaLedger, QuotaRecord};
