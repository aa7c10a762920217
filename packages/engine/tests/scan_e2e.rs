//! End-to-end orchestrator tests over in-memory collaborators.
//!
//! No network: the fetcher resolves against canned fixtures, the legal
//! source is static, persistence is the memory store.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use konform_catalog::Catalog;
use konform_checks::standard_checks;
use konform_core::{Pillar, QuotaKind, RenderMode, Severity};
use konform_engine::{EngineConfig, MemoryStore, Orchestrator, ScanOptions};
use konform_fetch::{FetchError, FetchedDocument, FetchedPage, PageFetcher};
use konform_fixes::FixGenerator;
use konform_legal::{LegalUpdate, StaticLegalSource, UpdateSeverity};
use konform_ledger::MemoryAuditLog;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const BASE: &str = "https://www.example.com/";

const TRACKING_FIXTURE: &str = r#"<!DOCTYPE html>
<html lang="de"><head><title>Shop</title></head>
<body>
  <h1>Willkommen</h1>
  <script src="https://www.googletagmanager.com/gtag/js?id=G-X"></script>
</body></html>"#;

struct FixtureFetcher {
    pages: HashMap<String, String>,
    delay: Option<Duration>,
}

impl FixtureFetcher {
    fn new(pages: &[(&str, &str)]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|(url, body)| (url.to_string(), body.to_string()))
                .collect(),
            delay: None,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl PageFetcher for FixtureFetcher {
    async fn fetch(
        &self,
        url: &str,
        _mode: RenderMode,
        cancel: &CancellationToken,
    ) -> Result<FetchedPage, FetchError> {
        if let Some(delay) = self.delay {
            tokio::select! {
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        let body = self
            .pages
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Connect("dns lookup failed".into()))?;
        Ok(FetchedPage {
            requested_url: url.to_string(),
            final_url: url.to_string(),
            status: 200,
            headers: BTreeMap::new(),
            raw_html: body.clone(),
            dom_html: body.clone(),
            cookies: vec![],
            local_storage: None,
            network_log: vec![],
            linked_css: vec![],
            size_bytes: body.len() as u64,
            fetch_ms: 1,
            render_mode_used: RenderMode::Static,
            warnings: vec![],
        })
    }

    async fn fetch_document(
        &self,
        url: &str,
        _cancel: &CancellationToken,
    ) -> Result<FetchedDocument, FetchError> {
        match self.pages.get(url) {
            Some(body) => Ok(FetchedDocument {
                requested_url: url.to_string(),
                final_url: url.to_string(),
                status: 200,
                body: body.clone(),
            }),
            None => Ok(FetchedDocument {
                requested_url: url.to_string(),
                final_url: url.to_string(),
                status: 404,
                body: String::new(),
            }),
        }
    }
}

struct Harness {
    orchestrator: Orchestrator,
    audit: Arc<MemoryAuditLog>,
}

fn harness_with(fetcher: FixtureFetcher, legal: StaticLegalSource) -> Harness {
    let catalog = Arc::new(Catalog::builtin().expect("builtin catalog"));
    let audit = Arc::new(MemoryAuditLog::new());
    let orchestrator = Orchestrator::new(
        Arc::new(fetcher),
        standard_checks(),
        catalog.clone(),
        Arc::new(legal),
        Arc::new(MemoryStore::new()),
        audit.clone(),
        Arc::new(FixGenerator::new(catalog)),
        EngineConfig::default(),
    );
    Harness {
        orchestrator,
        audit,
    }
}

fn harness(pages: &[(&str, &str)]) -> Harness {
    harness_with(FixtureFetcher::new(pages), StaticLegalSource::default())
}

#[tokio::test]
async fn test_unreachable_site_synthetic_scan() {
    let h = harness(&[]);
    let cancel = CancellationToken::new();
    let result = h
        .orchestrator
        .scan(
            &cancel,
            "https://example.invalid",
            Uuid::new_v4(),
            "free",
            ScanOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(result.issues.len(), 1);
    let issue = &result.issues[0];
    assert_eq!(issue.pillar, Pillar::Imprint);
    assert_eq!(issue.severity, Severity::Critical);
    assert_eq!(issue.title, "Site unreachable");
    assert_eq!(result.overall_score, 0);
    assert!(result.total_risk_euro >= 3000);
    // Synthetic scans are persisted and audited like any other
    assert_eq!(h.audit.len(), 1);
}

#[tokio::test]
async fn test_tracking_fixture_full_scan() {
    let h = harness(&[(BASE, TRACKING_FIXTURE)]);
    let cancel = CancellationToken::new();
    let result = h
        .orchestrator
        .scan(&cancel, BASE, Uuid::new_v4(), "free", ScanOptions::default())
        .await
        .unwrap();

    let cookie_criticals = result
        .issues
        .iter()
        .filter(|i| i.pillar == Pillar::Cookie && i.severity == Severity::Critical)
        .count();
    assert!(cookie_criticals >= 2);
    assert!(result
        .issues
        .iter()
        .any(|i| i.title == "Tracking without consent" && i.risk_euro >= 5000));
    assert!(result
        .issues
        .iter()
        .any(|i| i.title.contains("Google Analytics 4 section")));

    // Risk accounting: stored total equals the sum of issue risks
    let sum: u64 = result.issues.iter().map(|i| u64::from(i.risk_euro)).sum();
    assert_eq!(result.total_risk_euro, sum);

    // Score bounds
    assert!(result.pillar_scores.values().all(|&s| s <= 100));
    assert!(result.overall_score <= 100);
}

#[tokio::test]
async fn test_scan_determinism() {
    let fingerprint = |result: &konform_core::ScanResult| {
        (
            result
                .issues
                .iter()
                .map(|i| (i.pillar, i.severity, i.title.clone(), i.risk_euro))
                .collect::<Vec<_>>(),
            result.pillar_scores.clone(),
            result.overall_score,
            result.total_risk_euro,
        )
    };

    let h = harness(&[(BASE, TRACKING_FIXTURE)]);
    let cancel = CancellationToken::new();
    let user = Uuid::new_v4();
    let a = h
        .orchestrator
        .scan(&cancel, BASE, user, "free", ScanOptions::default())
        .await
        .unwrap();
    let b = h
        .orchestrator
        .scan(&cancel, BASE, user, "free", ScanOptions::default())
        .await
        .unwrap();

    assert_ne!(a.scan_id, b.scan_id);
    assert_eq!(fingerprint(&a), fingerprint(&b));
}

#[tokio::test]
async fn test_scan_quota_enforced() {
    let h = harness(&[(BASE, TRACKING_FIXTURE)]);
    let cancel = CancellationToken::new();
    let user = Uuid::new_v4();
    // free plan: 3 scans
    for _ in 0..3 {
        h.orchestrator
            .scan(&cancel, BASE, user, "free", ScanOptions::default())
            .await
            .unwrap();
    }
    let err = h
        .orchestrator
        .scan(&cancel, BASE, user, "free", ScanOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "quota_exceeded");
}

#[tokio::test]
async fn test_cancellation_returns_quickly_without_persisting() {
    let h = harness_with(
        FixtureFetcher::new(&[(BASE, TRACKING_FIXTURE)]).with_delay(Duration::from_secs(5)),
        StaticLegalSource::default(),
    );
    let cancel = CancellationToken::new();
    let user = Uuid::new_v4();

    cancel.cancel();
    let started = Instant::now();
    let err = h
        .orchestrator
        .scan(&cancel, BASE, user, "free", ScanOptions::default())
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(err.code(), "cancelled");
    assert!(elapsed < Duration::from_millis(100), "took {elapsed:?}");
    // Nothing persisted, quota refunded
    assert_eq!(h.audit.len(), 0);
    let record = h.orchestrator.quota().record(user).unwrap();
    assert_eq!(record.scans_used, 0);
}

#[tokio::test]
async fn test_per_user_inflight_cap() {
    let h = Arc::new(harness_with(
        FixtureFetcher::new(&[(BASE, TRACKING_FIXTURE)]).with_delay(Duration::from_millis(500)),
        StaticLegalSource::default(),
    ));
    let user = Uuid::new_v4();

    let mut slow = Vec::new();
    for _ in 0..2 {
        let h = h.clone();
        slow.push(tokio::spawn(async move {
            let cancel = CancellationToken::new();
            h.orchestrator
                .scan(&cancel, BASE, user, "professional", ScanOptions::default())
                .await
        }));
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let cancel = CancellationToken::new();
    let err = h
        .orchestrator
        .scan(&cancel, BASE, user, "professional", ScanOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "busy");

    for handle in slow {
        handle.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn test_fix_idempotency_and_quota() {
    let h = harness(&[(BASE, TRACKING_FIXTURE)]);
    let cancel = CancellationToken::new();
    let user = Uuid::new_v4();
    let scan = h
        .orchestrator
        .scan(&cancel, BASE, user, "free", ScanOptions::default())
        .await
        .unwrap();

    let banner_issue = scan
        .issues
        .iter()
        .find(|i| i.title == "No cookie consent banner")
        .expect("banner issue");

    let ids = vec![banner_issue.id.clone()];
    let company = Default::default();
    let first = h
        .orchestrator
        .generate_fixes(&cancel, scan.scan_id, &ids, &company, user, "free")
        .await
        .unwrap();

    assert_eq!(first.fixes.len(), 1);
    assert!(!first.idempotent_hit);
    let fix = &first.fixes[0];
    assert_eq!(fix.fix_type, konform_core::FixType::Widget);
    assert_eq!(fix.artifact.files.len(), 3);
    assert!(fix.validation.passed());
    assert_eq!(
        h.orchestrator.quota().record(user).unwrap().fixes_used,
        1
    );

    // Same request within the window: same fix id, no extra quota
    let second = h
        .orchestrator
        .generate_fixes(&cancel, scan.scan_id, &ids, &company, user, "free")
        .await
        .unwrap();
    assert!(second.idempotent_hit);
    assert_eq!(second.fixes.len(), 1);
    assert_eq!(second.fixes[0].fix_id, fix.fix_id);
    assert_eq!(
        h.orchestrator.quota().record(user).unwrap().fixes_used,
        1
    );
}

#[tokio::test]
async fn test_fix_quota_partial_exhaustion() {
    let h = harness(&[(BASE, TRACKING_FIXTURE)]);
    let cancel = CancellationToken::new();
    let user = Uuid::new_v4();
    let scan = h
        .orchestrator
        .scan(&cancel, BASE, user, "free", ScanOptions::default())
        .await
        .unwrap();

    // Burn the fix budget down to a single remaining unit (free: 5)
    let (ok, _) = h
        .orchestrator
        .quota()
        .try_consume(user, "free", QuotaKind::Fix, 4);
    assert!(ok);

    let auto_fixable: Vec<String> = scan
        .issues
        .iter()
        .filter(|i| i.auto_fixable)
        .map(|i| i.id.clone())
        .take(3)
        .collect();
    assert!(auto_fixable.len() >= 2, "fixture must yield several fixable issues");

    let outcome = h
        .orchestrator
        .generate_fixes(&cancel, scan.scan_id, &auto_fixable, &Default::default(), user, "free")
        .await
        .unwrap();

    assert_eq!(outcome.fixes.len(), 1, "only one unit of quota was left");
    assert!(outcome.quota_exhausted);
    assert!(outcome
        .failed
        .values()
        .any(|code| code == "quota_exceeded"));
}

#[tokio::test]
async fn test_legal_overlay_raises_tracking_risk() {
    let now = Utc::now();
    let update = LegalUpdate {
        id: "bgh-tracking-2026".into(),
        title: "Ruling tightens tracking consent".into(),
        description: "Consent must precede any tracking request".into(),
        severity: UpdateSeverity::Critical,
        pillars: vec![Pillar::Cookie],
        effective_date: now - ChronoDuration::days(2),
        source_url: None,
        requirements: vec![],
        published_at: now - ChronoDuration::days(5),
    };
    let h = harness_with(
        FixtureFetcher::new(&[(BASE, TRACKING_FIXTURE)]),
        StaticLegalSource::new(vec![update]),
    );

    let cancel = CancellationToken::new();
    let result = h
        .orchestrator
        .scan(&cancel, BASE, Uuid::new_v4(), "free", ScanOptions::default())
        .await
        .unwrap();

    assert!(result.legal_updates_applied);
    assert!(result.legal_updates_count >= 1);
    let tracking = result
        .issues
        .iter()
        .find(|i| i.title == "Tracking without consent")
        .expect("tracking issue");
    assert_eq!(tracking.severity, Severity::Critical);
    assert!(tracking.risk_euro >= 7500);
    assert!(!tracking.legal_update_refs.is_empty());
    assert!(tracking.risk_increase_reason.is_some());

    // Post-overlay risk accounting still holds
    let sum: u64 = result.issues.iter().map(|i| u64::from(i.risk_euro)).sum();
    assert_eq!(result.total_risk_euro, sum);
}

#[tokio::test]
async fn test_fixes_ownership_and_not_found() {
    let h = harness(&[(BASE, TRACKING_FIXTURE)]);
    let cancel = CancellationToken::new();
    let owner = Uuid::new_v4();
    let scan = h
        .orchestrator
        .scan(&cancel, BASE, owner, "free", ScanOptions::default())
        .await
        .unwrap();

    let stranger = Uuid::new_v4();
    let err = h
        .orchestrator
        .generate_fixes(
            &cancel,
            scan.scan_id,
            &[scan.issues[0].id.clone()],
            &Default::default(),
            stranger,
            "free",
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "permission_denied");

    let err = h
        .orchestrator
        .generate_fixes(
            &cancel,
            Uuid::new_v4(),
            &["x".to_string()],
            &Default::default(),
            owner,
            "free",
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "not_found");
}

#[tokio::test]
async fn test_invalid_url_rejected() {
    let h = harness(&[]);
    let cancel = CancellationToken::new();
    let err = h
        .orchestrator
        .scan(
            &cancel,
            "ftp://example.com",
            Uuid::new_v4(),
            "free",
            ScanOptions::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_input");
}

#[tokio::test]
async fn test_export_consumes_quota_and_audits() {
    let h = harness(&[(BASE, TRACKING_FIXTURE)]);
    let cancel = CancellationToken::new();
    let user = Uuid::new_v4();
    let scan = h
        .orchestrator
        .scan(&cancel, BASE, user, "free", ScanOptions::default())
        .await
        .unwrap();
    let issue = scan.issues.iter().find(|i| i.auto_fixable).unwrap();
    let outcome = h
        .orchestrator
        .generate_fixes(&cancel, scan.scan_id, &[issue.id.clone()], &Default::default(), user, "free")
        .await
        .unwrap();
    let fix_id = outcome.fixes[0].fix_id;

    let exported = h.orchestrator.export_fix(fix_id, user, "free").await.unwrap();
    assert_eq!(exported.fix_id, fix_id);
    assert_eq!(h.orchestrator.quota().record(user).unwrap().exports_used, 1);

    // free plan: 2 exports
    h.orchestrator.export_fix(fix_id, user, "free").await.unwrap();
    let err = h
        .orchestrator
        .export_fix(fix_id, user, "free")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "quota_exceeded");

    // Strangers cannot export someone else's fix
    let err = h
        .orchestrator
        .export_fix(fix_id, Uuid::new_v4(), "free")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "permission_denied");
}

#[tokio::test]
async fn test_feedback_write_once() {
    let h = harness(&[(BASE, TRACKING_FIXTURE)]);
    let cancel = CancellationToken::new();
    let user = Uuid::new_v4();
    let scan = h
        .orchestrator
        .scan(&cancel, BASE, user, "free", ScanOptions::default())
        .await
        .unwrap();
    let issue = scan.issues.iter().find(|i| i.auto_fixable).unwrap();
    let outcome = h
        .orchestrator
        .generate_fixes(&cancel, scan.scan_id, &[issue.id.clone()], &Default::default(), user, "free")
        .await
        .unwrap();
    let fix_id = outcome.fixes[0].fix_id;

    h.orchestrator
        .record_feedback(fix_id, user, 5, Some("deployed".into()))
        .await
        .unwrap();
    let err = h
        .orchestrator
        .record_feedback(fix_id, user, 1, None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_input");
}
