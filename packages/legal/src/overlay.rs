//! Konform Legal: Overlay Application
//!
//! An update matches an issue when (a) the issue's pillar is among the
//! update's pillars and (b) the update's title/description overlaps the
//! pillar's keyword set. Boosts are monotonic: severity only steps up
//! (ceiling at critical) and risk only grows.

use crate::update::{LegalSnapshot, LegalUpdate, UpdateSeverity};
use konform_core::{Issue, LegalUpdateRef, Pillar};

/// Keyword set per pillar for title/description overlap.
fn pillar_keywords(pillar: Pillar) -> &'static [&'static str] {
    match pillar {
        Pillar::Imprint => &["impressum", "tmg"],
        Pillar::Privacy => &["dsgvo", "gdpr", "datenschutz"],
        Pillar::Cookie => &["cookie", "ttdsg", "tracking", "consent", "einwilligung"],
        Pillar::Accessibility => &["bfsg", "wcag", "barrierefreiheit", "accessibility"],
    }
}

/// (severity steps, risk multiplier) per update severity.
fn boost(severity: UpdateSeverity) -> Option<(u8, f64)> {
    match severity {
        UpdateSeverity::Critical => Some((2, 1.5)),
        UpdateSeverity::High => Some((1, 1.3)),
        UpdateSeverity::Medium => Some((0, 1.2)),
        UpdateSeverity::Info => None,
    }
}

fn matches(update: &LegalUpdate, issue: &Issue) -> bool {
    if !update.pillars.contains(&issue.pillar) {
        return false;
    }
    let haystack = format!("{} {}", update.title, update.description).to_lowercase();
    pillar_keywords(issue.pillar)
        .iter()
        .any(|keyword| haystack.contains(keyword))
}

/// Result of applying the overlay to one scan's issues.
#[derive(Debug, Clone)]
pub struct OverlayOutcome {
    /// Derived issues; the input is never mutated in place
    pub issues: Vec<Issue>,
    /// Whether any boost was applied
    pub applied: bool,
    /// Number of distinct updates that boosted at least one issue
    pub updates_applied: u32,
    /// Total risk increase in euros across all issues
    pub risk_delta: u64,
}

/// Apply the snapshot to a list of issues, deriving boosted copies.
pub fn apply_overlay(issues: &[Issue], snapshot: &LegalSnapshot) -> OverlayOutcome {
    let mut derived = Vec::with_capacity(issues.len());
    let mut used_updates: Vec<&str> = Vec::new();
    let mut risk_delta = 0u64;

    for issue in issues {
        let mut boosted = issue.clone();
        let mut reasons: Vec<String> = Vec::new();

        for update in &snapshot.updates {
            if !matches(update, issue) {
                continue;
            }
            let Some((steps, multiplier)) = boost(update.severity) else {
                continue;
            };
            boosted.severity = boosted.severity.escalate_by(steps);
            let new_risk = (f64::from(boosted.risk_euro) * multiplier).round() as u32;
            boosted.risk_euro = new_risk.max(boosted.risk_euro);
            boosted.legal_update_refs.push(LegalUpdateRef {
                id: update.id.clone(),
                title: update.title.clone(),
            });
            reasons.push(update.title.clone());
            if !used_updates.contains(&update.id.as_str()) {
                used_updates.push(&update.id);
            }
        }

        if !reasons.is_empty() {
            boosted.risk_increase_reason =
                Some(format!("Risk raised by recent legal changes: {}", reasons.join("; ")));
            risk_delta += u64::from(boosted.risk_euro) - u64::from(issue.risk_euro);
            tracing::debug!(
                issue = %issue.id,
                from = issue.risk_euro,
                to = boosted.risk_euro,
                "legal overlay applied"
            );
        }
        derived.push(boosted);
    }

    OverlayOutcome {
        applied: !used_updates.is_empty(),
        updates_applied: used_updates.len() as u32,
        risk_delta,
        issues: derived,
    }
}
