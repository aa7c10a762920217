//! Konform Legal: Update Model & Snapshot Window

use chrono::{DateTime, Duration, Utc};
use konform_core::Pillar;
use serde::{Deserialize, Serialize};

/// Severity of a legal change as assessed by the ingestion side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateSeverity {
    Critical,
    High,
    Medium,
    Info,
}

/// One legal update, externally written by the news-ingestion collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegalUpdate {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub severity: UpdateSeverity,
    /// Pillars this change affects
    pub pillars: Vec<Pillar>,
    pub effective_date: DateTime<Utc>,
    #[serde(default)]
    pub source_url: Option<String>,
    /// Textual requirements derived from the change
    #[serde(default)]
    pub requirements: Vec<String>,
    pub published_at: DateTime<Utc>,
}

/// Publication window for overlay consideration.
pub const PUBLISH_WINDOW_DAYS: i64 = 90;
/// How far in the future an effective date may lie and still count.
pub const EFFECTIVE_HORIZON_DAYS: i64 = 30;

/// Read-only set of updates active at one point in time.
#[derive(Debug, Clone)]
pub struct LegalSnapshot {
    pub taken_at: DateTime<Utc>,
    pub updates: Vec<LegalUpdate>,
}

impl LegalSnapshot {
    /// Empty snapshot; the overlay becomes a no-op.
    pub fn empty(taken_at: DateTime<Utc>) -> Self {
        Self {
            taken_at,
            updates: Vec::new(),
        }
    }

    /// Filter raw updates down to the active window: published within the
    /// last 90 days, effective date passed or imminent (within 30 days).
    pub fn filtered(updates: Vec<LegalUpdate>, taken_at: DateTime<Utc>) -> Self {
        let publish_floor = taken_at - Duration::days(PUBLISH_WINDOW_DAYS);
        let effective_ceiling = taken_at + Duration::days(EFFECTIVE_HORIZON_DAYS);
        let updates = updates
            .into_iter()
            .filter(|u| u.published_at >= publish_floor && u.published_at <= taken_at)
            .filter(|u| u.effective_date <= effective_ceiling)
            .collect();
        Self { taken_at, updates }
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(published_days_ago: i64, effective_in_days: i64) -> LegalUpdate {
        let now = Utc::now();
        LegalUpdate {
            id: "u1".into(),
            title: "Test".into(),
            description: String::new(),
            severity: UpdateSeverity::Medium,
            pillars: vec![Pillar::Cookie],
            effective_date: now + Duration::days(effective_in_days),
            source_url: None,
            requirements: vec![],
            published_at: now - Duration::days(published_days_ago),
        }
    }

    #[test]
    fn test_window_filtering() {
        let now = Utc::now();
        let snapshot = LegalSnapshot::filtered(
            vec![
                update(10, -5),   // recent, already effective -> kept
                update(120, -5),  // published too long ago -> dropped
                update(10, 10),   // effective soon -> kept
                update(10, 60),   // effective far in the future -> dropped
            ],
            now,
        );
        assert_eq!(snapshot.updates.len(), 2);
    }

    #[test]
    fn test_serde_wire_shape() {
        let yaml = r#"
id: bgh-2026-01
title: BGH ruling on tracking consent
severity: critical
pillars: [cookie]
effective_date: 2026-07-01T00:00:00Z
published_at: 2026-07-10T00:00:00Z
"#;
        let update: LegalUpdate = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(update.severity, UpdateSeverity::Critical);
        assert_eq!(update.pillars, vec![Pillar::Cookie]);
        assert!(update.description.is_empty());
    }
}
