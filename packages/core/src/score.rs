//! Konform Core: Scoring & Risk Model
//!
//! Deterministic aggregation of issues into per-pillar scores, a weighted
//! overall score and the summed monetary risk.

use crate::types::{Issue, Pillar, Severity};
use std::collections::BTreeMap;

/// Score deduction per issue severity.
fn deduction(severity: Severity) -> u32 {
    match severity {
        Severity::Critical => 20,
        Severity::Warning => 8,
        Severity::Info => 2,
    }
}

/// Pillar weights for the overall score. Sums to 1.0.
fn weight(pillar: Pillar) -> f64 {
    match pillar {
        Pillar::Imprint => 0.15,
        Pillar::Privacy => 0.35,
        Pillar::Cookie => 0.20,
        Pillar::Accessibility => 0.30,
    }
}

/// Score of a single pillar: 100 minus deductions, clamped at 0.
pub fn pillar_score(issues: &[Issue], pillar: Pillar) -> u8 {
    let deducted: u32 = issues
        .iter()
        .filter(|i| i.pillar == pillar)
        .map(|i| deduction(i.severity))
        .sum();
    100u32.saturating_sub(deducted) as u8
}

/// Scores for all four pillars.
pub fn pillar_scores(issues: &[Issue]) -> BTreeMap<Pillar, u8> {
    Pillar::ALL
        .iter()
        .map(|&p| (p, pillar_score(issues, p)))
        .collect()
}

/// Weighted overall score, rounded to the nearest integer.
pub fn overall_score(scores: &BTreeMap<Pillar, u8>) -> u8 {
    let weighted: f64 = scores
        .iter()
        .map(|(&p, &s)| weight(p) * f64::from(s))
        .sum();
    weighted.round().clamp(0.0, 100.0) as u8
}

/// Total risk in euros: plain sum of per-issue risk.
pub fn total_risk_euro(issues: &[Issue]) -> u64 {
    issues.iter().map(|i| u64::from(i.risk_euro)).sum()
}

/// Deterministic report order: pillar order, severity descending, title
/// ascending. Stable, so equal keys keep their insertion order.
pub fn sort_issues(issues: &mut [Issue]) {
    issues.sort_by(|a, b| {
        a.pillar
            .cmp(&b.pillar)
            .then(b.severity.cmp(&a.severity))
            .then(a.title.cmp(&b.title))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(pillar: Pillar, severity: Severity, title: &str, risk: u32) -> Issue {
        Issue {
            id: format!("t:{}:{}", pillar, title),
            pillar,
            severity,
            title: title.to_string(),
            description: String::new(),
            risk_euro: risk,
            legal_basis: String::new(),
            auto_fixable: false,
            missing: false,
            locator: None,
            hint: None,
            legal_update_refs: Vec::new(),
            risk_increase_reason: None,
        }
    }

    #[test]
    fn test_empty_scan_is_perfect() {
        let scores = pillar_scores(&[]);
        assert!(scores.values().all(|&s| s == 100));
        assert_eq!(overall_score(&scores), 100);
        assert_eq!(total_risk_euro(&[]), 0);
    }

    #[test]
    fn test_pillar_score_deductions() {
        let issues = vec![
            issue(Pillar::Imprint, Severity::Critical, "a", 3000),
            issue(Pillar::Imprint, Severity::Warning, "b", 500),
            issue(Pillar::Imprint, Severity::Info, "c", 100),
        ];
        // 100 - 20 - 8 - 2
        assert_eq!(pillar_score(&issues, Pillar::Imprint), 70);
        assert_eq!(pillar_score(&issues, Pillar::Privacy), 100);
    }

    #[test]
    fn test_pillar_score_clamps_at_zero() {
        let issues: Vec<Issue> = (0..6)
            .map(|i| issue(Pillar::Cookie, Severity::Critical, &format!("i{i}"), 1000))
            .collect();
        assert_eq!(pillar_score(&issues, Pillar::Cookie), 0);
    }

    #[test]
    fn test_overall_score_weighting() {
        let mut scores = BTreeMap::new();
        scores.insert(Pillar::Imprint, 100u8);
        scores.insert(Pillar::Privacy, 0u8);
        scores.insert(Pillar::Cookie, 100u8);
        scores.insert(Pillar::Accessibility, 100u8);
        // 0.15*100 + 0.35*0 + 0.20*100 + 0.30*100 = 65
        assert_eq!(overall_score(&scores), 65);
    }

    #[test]
    fn test_total_risk_is_plain_sum() {
        let issues = vec![
            issue(Pillar::Cookie, Severity::Critical, "a", 5000),
            issue(Pillar::Cookie, Severity::Critical, "b", 2500),
        ];
        assert_eq!(total_risk_euro(&issues), 7500);
    }

    #[test]
    fn test_sort_is_deterministic() {
        let mut issues = vec![
            issue(Pillar::Cookie, Severity::Warning, "z", 0),
            issue(Pillar::Imprint, Severity::Info, "m", 0),
            issue(Pillar::Cookie, Severity::Critical, "a", 0),
            issue(Pillar::Imprint, Severity::Info, "a", 0),
        ];
        sort_issues(&mut issues);
        let titles: Vec<&str> = issues.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "m", "a", "z"]);
        assert_eq!(issues[0].pillar, Pillar::Imprint);
        assert_eq!(issues[2].severity, Severity::Critical);
    }
}
