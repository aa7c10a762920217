//! Konform Engine: Orchestrator
//!
//! Two entry points: `scan` and `generate_fixes`. Collaborators are
//! explicit handles wired at construction; there are no hidden globals.
//! A scan fans out to the four check workers, each consulting the
//! memoized classifier, with per-check deadlines and cooperative
//! cancellation throughout. Nothing is persisted on cancellation.

use crate::config::EngineConfig;
use crate::store::ScanStore;
use chrono::Utc;
use konform_catalog::Catalog;
use konform_checks::{CheckContext, ClassifierHandle, ComplianceCheck, IssueDraft};
use konform_core::{
    idempotency_key, overall_score, pillar_scores, sort_issues, total_risk_euro, CompanyInfo,
    EngineError, EngineResult, GeneratedFix, Issue, IssueLocator, Pillar, QuotaKind, RenderMode,
    ScanResult, ScanWarning, Severity,
};
use konform_fetch::{FetchError, PageFetcher, PageSnapshot};
use konform_fixes::{FixError, FixGenerator};
use konform_legal::{apply_overlay, LegalUpdateSource};
use konform_ledger::{
    AuditAction, AuditEntry, AuditSink, FeedbackStore, IdempotencyCache, QuotaLedger,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Options for one scan request.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub render_mode: RenderMode,
}

/// Result of a fix request; partial success is the normal shape.
#[derive(Debug)]
pub struct FixesOutcome {
    pub fixes: Vec<GeneratedFix>,
    /// issue id -> stable error code
    pub failed: BTreeMap<String, String>,
    /// Remaining fix quota after this request; -1 when unlimited
    pub quota_remaining: i64,
    /// True when the response came from the idempotency window
    pub idempotent_hit: bool,
    /// True when quota ran out partway through
    pub quota_exhausted: bool,
}

/// The wired engine.
pub struct Orchestrator {
    fetcher: Arc<dyn PageFetcher>,
    checks: Vec<Arc<dyn ComplianceCheck>>,
    catalog: Arc<Catalog>,
    legal: Arc<dyn LegalUpdateSource>,
    store: Arc<dyn ScanStore>,
    audit: Arc<dyn AuditSink>,
    quota: Arc<QuotaLedger>,
    feedback: Arc<FeedbackStore>,
    generator: Arc<FixGenerator>,
    idempotency: Arc<IdempotencyCache>,
    config: EngineConfig,
    inflight: Arc<Mutex<HashMap<Uuid, u32>>>,
}

/// RAII decrement for the per-user in-flight counter.
struct InflightGuard {
    inflight: Arc<Mutex<HashMap<Uuid, u32>>>,
    user_id: Uuid,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        let mut inflight = self.inflight.lock();
        if let Some(count) = inflight.get_mut(&self.user_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                inflight.remove(&self.user_id);
            }
        }
    }
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        checks: Vec<Arc<dyn ComplianceCheck>>,
        catalog: Arc<Catalog>,
        legal: Arc<dyn LegalUpdateSource>,
        store: Arc<dyn ScanStore>,
        audit: Arc<dyn AuditSink>,
        generator: Arc<FixGenerator>,
        config: EngineConfig,
    ) -> Self {
        Self {
            fetcher,
            checks,
            catalog,
            legal,
            store,
            audit,
            quota: Arc::new(QuotaLedger::new()),
            feedback: Arc::new(FeedbackStore::new()),
            generator,
            idempotency: Arc::new(IdempotencyCache::default()),
            config,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn quota(&self) -> &QuotaLedger {
        &self.quota
    }

    pub fn feedback(&self) -> &FeedbackStore {
        &self.feedback
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn acquire_inflight(&self, user_id: Uuid) -> EngineResult<InflightGuard> {
        let mut inflight = self.inflight.lock();
        let count = inflight.entry(user_id).or_insert(0);
        if *count >= self.config.max_inflight_scans_per_user {
            return Err(EngineError::Busy);
        }
        *count += 1;
        Ok(InflightGuard {
            inflight: self.inflight.clone(),
            user_id,
        })
    }

    fn validate_url(url: &str) -> EngineResult<()> {
        let parsed =
            url::Url::parse(url).map_err(|_| EngineError::InvalidInput(format!("bad url: {url}")))?;
        match parsed.scheme() {
            "http" | "https" => Ok(()),
            other => Err(EngineError::InvalidInput(format!(
                "unsupported scheme: {other}"
            ))),
        }
    }

    /// One-issue scan for unreachable targets.
    fn synthetic_unreachable(
        scan_id: Uuid,
        url: &str,
        user_id: Uuid,
        mode: RenderMode,
        error: &FetchError,
    ) -> ScanResult {
        let issue = IssueDraft::new(
            Severity::Critical,
            "Site unreachable",
            3000,
            "TMG §5 Abs. 1",
        )
        .with_description(format!("The site could not be analyzed: {error}"))
        .with_locator(IssueLocator::Page {
            url: url.to_string(),
        })
        .missing()
        .finish(&scan_id, Pillar::Imprint);

        let status = match error {
            FetchError::Status(code) => *code,
            _ => 0,
        };
        let pillar_scores: BTreeMap<Pillar, u8> =
            Pillar::ALL.iter().map(|&p| (p, 0u8)).collect();
        ScanResult {
            scan_id,
            url: url.to_string(),
            user_id,
            timestamp: Utc::now(),
            render_mode_used: mode,
            metrics: konform_core::PageMetrics {
                size_bytes: 0,
                http_status: status,
                content_encoding: None,
                fetch_ms: 0,
            },
            total_risk_euro: u64::from(issue.risk_euro),
            issues: vec![issue],
            pillar_scores,
            overall_score: 0,
            legal_updates_applied: false,
            legal_updates_count: 0,
            warnings: vec![ScanWarning::new(
                "unreachable",
                "analysis stopped after the fetch failed",
            )],
        }
    }

    /// Fan the four checks out and collect their issues. Check failures
    /// become a synthetic partial-analysis warning instead of failing the
    /// scan; cancellation propagates.
    async fn run_checks(
        &self,
        ctx: &CheckContext,
        warnings: &mut Vec<ScanWarning>,
    ) -> EngineResult<Vec<Issue>> {
        let mut handles = Vec::with_capacity(self.checks.len());
        for check in &self.checks {
            let check = check.clone();
            let ctx = ctx.clone();
            let deadline = self.config.check_timeout;
            handles.push((
                check.pillar(),
                tokio::spawn(async move {
                    tokio::time::timeout(deadline, check.run(&ctx)).await
                }),
            ));
        }

        let mut issues = Vec::new();
        for (pillar, handle) in handles {
            let outcome = handle.await;
            if ctx.cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            match outcome {
                Ok(Ok(Ok(found))) => issues.extend(found),
                Ok(Ok(Err(err))) if err.is_cancelled() => return Err(EngineError::Cancelled),
                Ok(Ok(Err(err))) => {
                    tracing::warn!(pillar = %pillar, error = %err, "check failed, partial analysis");
                    warnings.push(ScanWarning::new(
                        "partial_analysis",
                        format!("{pillar} check failed: {err}"),
                    ));
                    issues.push(Self::partial_issue(ctx.scan_id, pillar));
                }
                Ok(Err(_elapsed)) => {
                    tracing::warn!(pillar = %pillar, "check deadline exceeded, partial analysis");
                    warnings.push(ScanWarning::new(
                        "partial_analysis",
                        format!("{pillar} check exceeded its deadline"),
                    ));
                    issues.push(Self::partial_issue(ctx.scan_id, pillar));
                }
                Err(join_err) => {
                    tracing::error!(pillar = %pillar, error = %join_err, "check worker died");
                    warnings.push(ScanWarning::new(
                        "partial_analysis",
                        format!("{pillar} check aborted"),
                    ));
                    issues.push(Self::partial_issue(ctx.scan_id, pillar));
                }
            }
        }
        Ok(issues)
    }

    fn partial_issue(scan_id: Uuid, pillar: Pillar) -> Issue {
        IssueDraft::new(
            Severity::Warning,
            format!("Partial analysis: {pillar}"),
            0,
            "",
        )
        .with_description(
            "This pillar could not be fully analyzed; re-run the scan for complete results.",
        )
        .finish(&scan_id, pillar)
    }

    async fn scan_inner(
        &self,
        cancel: &CancellationToken,
        scan_id: Uuid,
        url: &str,
        user_id: Uuid,
        opts: &ScanOptions,
    ) -> EngineResult<ScanResult> {
        let page = match self.fetcher.fetch(url, opts.render_mode, cancel).await {
            Ok(page) => page,
            Err(err) if err.is_target_fault() => {
                tracing::info!(url = %url, error = %err, "target unreachable, synthetic scan");
                return Ok(Self::synthetic_unreachable(
                    scan_id,
                    url,
                    user_id,
                    opts.render_mode,
                    &err,
                ));
            }
            Err(err) => return Err(err.into()),
        };

        let page = Arc::new(page);
        let mut snapshot = PageSnapshot::parse(&page.dom_html, &page.final_url);
        for (href, css) in &page.linked_css {
            snapshot.add_linked_css(href, css.clone());
        }
        let snapshot = Arc::new(snapshot);

        let signals = snapshot.signals(
            page.cookie_names(),
            page.local_storage
                .as_ref()
                .map(|storage| storage.keys().cloned().collect()),
        );
        let classifier = Arc::new(ClassifierHandle::new(self.catalog.snapshot(), signals));

        let ctx = CheckContext {
            scan_id,
            page: page.clone(),
            snapshot,
            classifier,
            fetcher: self.fetcher.clone(),
            cancel: cancel.clone(),
        };

        let mut warnings = page.warnings.clone();
        let mut issues = self.run_checks(&ctx, &mut warnings).await?;

        // Deterministic assembly: overlay first, then ordering and scores
        let legal_snapshot = self.legal.snapshot(Utc::now()).await;
        let overlay = apply_overlay(&issues, &legal_snapshot);
        issues = overlay.issues;
        sort_issues(&mut issues);

        let scores = pillar_scores(&issues);
        let overall = overall_score(&scores);
        let total_risk = total_risk_euro(&issues);

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        Ok(ScanResult {
            scan_id,
            url: url.to_string(),
            user_id,
            timestamp: Utc::now(),
            render_mode_used: page.render_mode_used,
            metrics: page.metrics(),
            issues,
            pillar_scores: scores,
            overall_score: overall,
            total_risk_euro: total_risk,
            legal_updates_applied: overlay.applied,
            legal_updates_count: overlay.updates_applied,
            warnings,
        })
    }

    /// Run a full compliance scan.
    pub async fn scan(
        &self,
        cancel: &CancellationToken,
        url: &str,
        user_id: Uuid,
        plan: &str,
        opts: ScanOptions,
    ) -> EngineResult<ScanResult> {
        Self::validate_url(url)?;
        let _inflight = self.acquire_inflight(user_id)?;

        let (ok, remaining) = self.quota.try_consume(user_id, plan, QuotaKind::Scan, 1);
        if !ok {
            return Err(EngineError::QuotaExceeded {
                kind: QuotaKind::Scan,
                remaining,
            });
        }

        let scan_id = Uuid::new_v4();
        tracing::info!(scan = %scan_id, url = %url, user = %user_id, "scan started");

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(EngineError::Cancelled),
            inner = tokio::time::timeout(
                self.config.scan_timeout,
                self.scan_inner(cancel, scan_id, url, user_id, &opts),
            ) => match inner {
                Ok(result) => result,
                Err(_) => Err(EngineError::Internal("scan deadline exceeded".into())),
            },
        };

        match result {
            Ok(scan) => {
                self.store.put_scan(&scan).await?;
                self.audit
                    .append(
                        AuditEntry::new(user_id, AuditAction::Scan, scan.scan_id.to_string())
                            .with_details(serde_json::json!({
                                "url": scan.url,
                                "issues": scan.issues.len(),
                                "overall_score": scan.overall_score,
                            })),
                    )
                    .await?;
                tracing::info!(
                    scan = %scan.scan_id,
                    issues = scan.issues.len(),
                    score = scan.overall_score,
                    "scan completed"
                );
                Ok(scan)
            }
            Err(err) => {
                // The scan produced nothing persistent; give the unit back
                // unless the caller simply ran out of quota.
                if !matches!(err, EngineError::QuotaExceeded { .. }) {
                    self.quota.refund(user_id, plan, QuotaKind::Scan, 1);
                }
                Err(err)
            }
        }
    }

    /// Generate fixes for a subset of a scan's issues.
    pub async fn generate_fixes(
        &self,
        cancel: &CancellationToken,
        scan_id: Uuid,
        issue_ids: &[String],
        company: &CompanyInfo,
        user_id: Uuid,
        plan: &str,
    ) -> EngineResult<FixesOutcome> {
        if issue_ids.is_empty() {
            return Err(EngineError::InvalidInput("no issue ids given".into()));
        }

        let scan = self
            .store
            .get_scan(scan_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("scan {scan_id}")))?;
        if scan.user_id != user_id {
            return Err(EngineError::PermissionDenied(
                "scan belongs to another user".into(),
            ));
        }

        let key = idempotency_key(&user_id, &scan_id, issue_ids, company);

        // Fast path: cache; authoritative path: the store's unique key
        let cached_ids = self.idempotency.get(&key);
        let stored = match cached_ids {
            Some(ids) => {
                let mut fixes = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(fix) = self.store.get_fix(id).await? {
                        fixes.push(fix);
                    }
                }
                fixes
            }
            None => self.store.fixes_by_idempotency(&key).await?,
        };
        if !stored.is_empty() {
            tracing::debug!(scan = %scan_id, "fix request served from idempotency window");
            let (_, remaining) = self.quota.try_consume(user_id, plan, QuotaKind::Fix, 0);
            return Ok(FixesOutcome {
                fixes: stored,
                failed: BTreeMap::new(),
                quota_remaining: remaining,
                idempotent_hit: true,
                quota_exhausted: false,
            });
        }

        let mut fixes: Vec<GeneratedFix> = Vec::new();
        let mut failed: BTreeMap<String, String> = BTreeMap::new();
        let mut quota_exhausted = false;
        // Zero-unit consume: creates the record lazily and reads `remaining`
        let (_, mut remaining) = self.quota.try_consume(user_id, plan, QuotaKind::Fix, 0);

        for issue_id in issue_ids {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if quota_exhausted {
                failed.insert(issue_id.clone(), "quota_exceeded".to_string());
                continue;
            }
            let Some(issue) = scan.issue(issue_id) else {
                failed.insert(issue_id.clone(), "not_found".to_string());
                continue;
            };

            let generated = tokio::time::timeout(
                self.config.fix_timeout,
                self.generator.generate(&scan, issue, company, cancel),
            )
            .await;

            match generated {
                Ok(Ok(fix)) => {
                    let (ok, left) = self.quota.try_consume(user_id, plan, QuotaKind::Fix, 1);
                    remaining = left;
                    if !ok {
                        quota_exhausted = true;
                        failed.insert(issue_id.clone(), "quota_exceeded".to_string());
                        continue;
                    }
                    fixes.push(fix);
                }
                Ok(Err(FixError::Cancelled)) => return Err(EngineError::Cancelled),
                Ok(Err(err)) => {
                    tracing::warn!(issue = %issue_id, error = %err, "fix generation failed");
                    failed.insert(issue_id.clone(), err.code().to_string());
                }
                Err(_elapsed) => {
                    tracing::warn!(issue = %issue_id, "fix generation deadline exceeded");
                    failed.insert(issue_id.clone(), "timeout".to_string());
                }
            }
        }

        for fix in &fixes {
            self.store.put_fix(fix, &key).await?;
            self.audit
                .append(
                    AuditEntry::new(user_id, AuditAction::FixGenerated, fix.fix_id.to_string())
                        .with_details(serde_json::json!({
                            "scan_id": scan_id,
                            "issue_id": fix.issue_id,
                        })),
                )
                .await?;
        }
        if !fixes.is_empty() {
            self.idempotency
                .put(key, fixes.iter().map(|f| f.fix_id).collect());
        }

        Ok(FixesOutcome {
            fixes,
            failed,
            quota_remaining: remaining,
            idempotent_hit: false,
            quota_exhausted,
        })
    }

    /// Mark a fix as exported; consumes export quota and leaves an audit row.
    pub async fn export_fix(
        &self,
        fix_id: Uuid,
        user_id: Uuid,
        plan: &str,
    ) -> EngineResult<GeneratedFix> {
        let fix = self
            .store
            .get_fix(fix_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("fix {fix_id}")))?;
        if fix.user_id != user_id {
            return Err(EngineError::PermissionDenied(
                "fix belongs to another user".into(),
            ));
        }
        let (ok, remaining) = self.quota.try_consume(user_id, plan, QuotaKind::Export, 1);
        if !ok {
            return Err(EngineError::QuotaExceeded {
                kind: QuotaKind::Export,
                remaining,
            });
        }
        self.audit
            .append(AuditEntry::new(
                user_id,
                AuditAction::FixExported,
                fix_id.to_string(),
            ))
            .await?;
        Ok(fix)
    }

    /// Record write-once feedback for a fix.
    pub async fn record_feedback(
        &self,
        fix_id: Uuid,
        user_id: Uuid,
        rating: u8,
        comment: Option<String>,
    ) -> EngineResult<()> {
        let fix = self
            .store
            .get_fix(fix_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("fix {fix_id}")))?;
        if fix.user_id != user_id {
            return Err(EngineError::PermissionDenied(
                "fix belongs to another user".into(),
            ));
        }
        self.feedback
            .record(user_id, fix_id, rating, comment)
            .map_err(|e| EngineError::InvalidInput(e.to_string()))?;
        self.audit
            .append(AuditEntry::new(
                user_id,
                AuditAction::Feedback,
                fix_id.to_string(),
            ))
            .await?;
        Ok(())
    }
}
