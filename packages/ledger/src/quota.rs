//! Konform Ledger: Per-User Quota Counters
//!
//! `try_consume` is transactional per user: the per-user lock makes the
//! read-check-increment atomic, so no interleaving can push `used` past
//! `limit`. A limit of -1 denotes unlimited. Decrements happen only
//! through the explicit refund flow.

use chrono::{DateTime, Duration, Utc};
use konform_core::QuotaKind;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Ledger-specific failures.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("unknown user")]
    UnknownUser,
    #[error("feedback already recorded for this fix")]
    DuplicateFeedback,
    #[error("rating must be between 1 and 5, got {0}")]
    InvalidRating(u8),
}

/// Limits of one plan. -1 = unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanLimits {
    pub scans: i64,
    pub fixes: i64,
    pub exports: i64,
}

/// Plan presets. Plan identity stays an opaque string on the record;
/// unknown plans fall back to the free tier.
pub fn plan_limits(plan: &str) -> PlanLimits {
    match plan {
        "starter" => PlanLimits {
            scans: 10,
            fixes: 50,
            exports: 20,
        },
        "professional" => PlanLimits {
            scans: 50,
            fixes: 500,
            exports: 200,
        },
        "enterprise" => PlanLimits {
            scans: -1,
            fixes: -1,
            exports: -1,
        },
        _ => PlanLimits {
            scans: 3,
            fixes: 5,
            exports: 2,
        },
    }
}

/// Per-user counters for the current period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub plan: String,
    pub scans_used: i64,
    pub scans_limit: i64,
    pub fixes_used: i64,
    pub fixes_limit: i64,
    pub exports_used: i64,
    pub exports_limit: i64,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

impl QuotaRecord {
    /// Fresh record from a plan preset, period starting now.
    pub fn from_plan(plan: &str, now: DateTime<Utc>) -> Self {
        let limits = plan_limits(plan);
        Self {
            plan: plan.to_string(),
            scans_used: 0,
            scans_limit: limits.scans,
            fixes_used: 0,
            fixes_limit: limits.fixes,
            exports_used: 0,
            exports_limit: limits.exports,
            period_start: now,
            period_end: now + Duration::days(30),
        }
    }

    fn counters(&mut self, kind: QuotaKind) -> (&mut i64, i64) {
        match kind {
            QuotaKind::Scan => (&mut self.scans_used, self.scans_limit),
            QuotaKind::Fix => (&mut self.fixes_used, self.fixes_limit),
            QuotaKind::Export => (&mut self.exports_used, self.exports_limit),
        }
    }

    /// Remaining units; -1 when unlimited, never negative otherwise.
    pub fn remaining(&self, kind: QuotaKind) -> i64 {
        let (used, limit) = match kind {
            QuotaKind::Scan => (self.scans_used, self.scans_limit),
            QuotaKind::Fix => (self.fixes_used, self.fixes_limit),
            QuotaKind::Export => (self.exports_used, self.exports_limit),
        };
        if limit < 0 {
            -1
        } else {
            (limit - used).max(0)
        }
    }
}

/// Quota ledger with per-user fine-grained locking.
#[derive(Default)]
pub struct QuotaLedger {
    users: Mutex<HashMap<Uuid, Arc<Mutex<QuotaRecord>>>>,
}

impl QuotaLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-user cell, created lazily from the plan preset.
    fn cell(&self, user_id: Uuid, plan: &str) -> Arc<Mutex<QuotaRecord>> {
        let mut users = self.users.lock();
        users
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(QuotaRecord::from_plan(plan, Utc::now()))))
            .clone()
    }

    /// Try to consume `n` units. Atomic per user: either all `n` are
    /// consumed or none. Returns `(ok, remaining)`.
    pub fn try_consume(&self, user_id: Uuid, plan: &str, kind: QuotaKind, n: i64) -> (bool, i64) {
        let cell = self.cell(user_id, plan);
        let mut record = cell.lock();
        let (used, limit) = record.counters(kind);
        if limit >= 0 && *used + n > limit {
            let remaining = (limit - *used).max(0);
            tracing::debug!(user = %user_id, kind = %kind, remaining, "quota exhausted");
            return (false, remaining);
        }
        *used += n;
        drop(record);
        let remaining = cell.lock().remaining(kind);
        (true, remaining)
    }

    /// Explicit refund; never drops below zero.
    pub fn refund(&self, user_id: Uuid, plan: &str, kind: QuotaKind, n: i64) {
        let cell = self.cell(user_id, plan);
        let mut record = cell.lock();
        let (used, _) = record.counters(kind);
        *used = (*used - n).max(0);
        tracing::debug!(user = %user_id, kind = %kind, refunded = n, "quota refunded");
    }

    /// Atomic period rollover: counters reset, window replaced.
    pub fn reset_period(
        &self,
        user_id: Uuid,
        new_start: DateTime<Utc>,
        new_end: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let users = self.users.lock();
        let cell = users.get(&user_id).ok_or(LedgerError::UnknownUser)?.clone();
        drop(users);
        let mut record = cell.lock();
        record.scans_used = 0;
        record.fixes_used = 0;
        record.exports_used = 0;
        record.period_start = new_start;
        record.period_end = new_end;
        Ok(())
    }

    /// Snapshot of one user's record.
    pub fn record(&self, user_id: Uuid) -> Option<QuotaRecord> {
        let users = self.users.lock();
        users.get(&user_id).map(|cell| cell.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consume_until_exhausted() {
        let ledger = QuotaLedger::new();
        let user = Uuid::new_v4();
        // free plan: 3 scans
        assert_eq!(ledger.try_consume(user, "free", QuotaKind::Scan, 1), (true, 2));
        assert_eq!(ledger.try_consume(user, "free", QuotaKind::Scan, 1), (true, 1));
        assert_eq!(ledger.try_consume(user, "free", QuotaKind::Scan, 1), (true, 0));
        assert_eq!(ledger.try_consume(user, "free", QuotaKind::Scan, 1), (false, 0));
    }

    #[test]
    fn test_overflow_has_no_side_effects() {
        let ledger = QuotaLedger::new();
        let user = Uuid::new_v4();
        // Asking for more than the limit at once must not consume anything
        assert_eq!(ledger.try_consume(user, "free", QuotaKind::Fix, 99), (false, 5));
        assert_eq!(ledger.try_consume(user, "free", QuotaKind::Fix, 1), (true, 4));
    }

    #[test]
    fn test_unlimited_plan() {
        let ledger = QuotaLedger::new();
        let user = Uuid::new_v4();
        for _ in 0..100 {
            let (ok, remaining) = ledger.try_consume(user, "enterprise", QuotaKind::Scan, 1);
            assert!(ok);
            assert_eq!(remaining, -1);
        }
    }

    #[test]
    fn test_refund_floor() {
        let ledger = QuotaLedger::new();
        let user = Uuid::new_v4();
        ledger.try_consume(user, "free", QuotaKind::Fix, 2);
        ledger.refund(user, "free", QuotaKind::Fix, 5);
        assert_eq!(ledger.record(user).unwrap().fixes_used, 0);
    }

    #[test]
    fn test_reset_period() {
        let ledger = QuotaLedger::new();
        let user = Uuid::new_v4();
        ledger.try_consume(user, "free", QuotaKind::Scan, 3);
        let start = Utc::now();
        let end = start + Duration::days(30);
        ledger.reset_period(user, start, end).unwrap();
        let record = ledger.record(user).unwrap();
        assert_eq!(record.scans_used, 0);
        assert_eq!(record.period_start, start);
        assert!(ledger.reset_period(Uuid::new_v4(), start, end).is_err());
    }

    #[test]
    fn test_concurrent_consumes_respect_limit() {
        // Under n concurrent consumes of 1 against a limit of k, exactly
        // min(n, k) succeed.
        let ledger = Arc::new(QuotaLedger::new());
        let user = Uuid::new_v4();
        let threads = 32;
        let limit = 5; // free-plan fixes

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    ledger.try_consume(user, "free", QuotaKind::Fix, 1).0
                })
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap_or(false))
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, limit);
        let record = ledger.record(user).unwrap();
        assert_eq!(record.fixes_used, limit as i64);
        assert!(record.fixes_used <= record.fixes_limit);
    }
}
