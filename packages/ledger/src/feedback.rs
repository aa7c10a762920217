//! Konform Ledger: Fix Feedback
//!
//! One rating per (user, fix), write-once.

use crate::quota::LedgerError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A user's rating of a generated fix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub user_id: Uuid,
    pub fix_id: Uuid,
    /// 1 (useless) to 5 (deployed as-is)
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Write-once feedback store.
#[derive(Debug, Default)]
pub struct FeedbackStore {
    entries: Mutex<HashMap<(Uuid, Uuid), Feedback>>,
}

impl FeedbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &self,
        user_id: Uuid,
        fix_id: Uuid,
        rating: u8,
        comment: Option<String>,
    ) -> Result<(), LedgerError> {
        if !(1..=5).contains(&rating) {
            return Err(LedgerError::InvalidRating(rating));
        }
        let mut entries = self.entries.lock();
        if entries.contains_key(&(user_id, fix_id)) {
            return Err(LedgerError::DuplicateFeedback);
        }
        entries.insert(
            (user_id, fix_id),
            Feedback {
                user_id,
                fix_id,
                rating,
                comment,
                recorded_at: Utc::now(),
            },
        );
        Ok(())
    }

    pub fn get(&self, user_id: Uuid, fix_id: Uuid) -> Option<Feedback> {
        self.entries.lock().get(&(user_id, fix_id)).cloned()
    }
}
