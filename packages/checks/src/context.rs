//! Konform Checks: Shared Check Contract
//!
//! All four pillar checks implement the same trait: DOM snapshot plus
//! response metadata in, issues out. Checks share no state; the classifier
//! is consulted through a once-computed handle so every check sees the same
//! per-DOM result without recomputation.

use async_trait::async_trait;
use konform_catalog::{classify, ClassifiedService, PageSignals, ServiceEntry};
use konform_core::{issue_id, Issue, IssueLocator, Pillar, RemediationHint, Severity};
use konform_fetch::{FetchError, FetchedDocument, FetchedPage, PageFetcher, PageSnapshot};
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

/// Check failures. These never fail a scan; the orchestrator converts them
/// into a synthetic partial-analysis warning issue.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("check cancelled")]
    Cancelled,
    #[error("internal: {0}")]
    Internal(String),
}

impl CheckError {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            CheckError::Cancelled | CheckError::Fetch(FetchError::Cancelled)
        )
    }
}

/// Classifier results memoized per DOM behind a once-computed guard.
pub struct ClassifierHandle {
    catalog: Arc<Vec<ServiceEntry>>,
    signals: PageSignals,
    memo: OnceLock<Arc<Vec<ClassifiedService>>>,
}

impl ClassifierHandle {
    pub fn new(catalog: Arc<Vec<ServiceEntry>>, signals: PageSignals) -> Self {
        Self {
            catalog,
            signals,
            memo: OnceLock::new(),
        }
    }

    /// Classified services for this page; computed on first access.
    pub fn services(&self) -> Arc<Vec<ClassifiedService>> {
        self.memo
            .get_or_init(|| Arc::new(classify(&self.catalog, &self.signals)))
            .clone()
    }

    /// Catalog snapshot used for request-URL matching.
    pub fn catalog(&self) -> &[ServiceEntry] {
        &self.catalog
    }
}

impl std::fmt::Debug for ClassifierHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierHandle")
            .field("catalog", &self.catalog.len())
            .field("computed", &self.memo.get().is_some())
            .finish()
    }
}

/// Everything a check needs. Cheap to clone across the fan-out.
#[derive(Clone)]
pub struct CheckContext {
    pub scan_id: Uuid,
    pub page: Arc<FetchedPage>,
    pub snapshot: Arc<PageSnapshot>,
    pub classifier: Arc<ClassifierHandle>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub cancel: CancellationToken,
}

impl CheckContext {
    /// Resolve a possibly relative href against the final page URL.
    pub fn resolve(&self, href: &str) -> Option<String> {
        let base = Url::parse(&self.page.final_url).ok()?;
        base.join(href).ok().map(|u| u.to_string())
    }

    /// Locate a legal sub-page: footer links first, any matching link next,
    /// well-known paths last. Returns the first page that answers with a
    /// non-error status and a non-empty body.
    pub async fn locate_page(
        &self,
        keywords: &regex::Regex,
        fallback_paths: &[&str],
    ) -> Result<Option<FetchedDocument>, CheckError> {
        let mut candidates: Vec<String> = Vec::new();
        let mut push = |href: &str, candidates: &mut Vec<String>| {
            if let Some(resolved) = self.resolve(href) {
                if !candidates.contains(&resolved) {
                    candidates.push(resolved);
                }
            }
        };

        for link in self.snapshot.links.iter().filter(|l| l.in_footer) {
            if keywords.is_match(&link.text) || keywords.is_match(&link.href) {
                push(&link.href, &mut candidates);
            }
        }
        for link in self.snapshot.links.iter().filter(|l| !l.in_footer) {
            if keywords.is_match(&link.text) || keywords.is_match(&link.href) {
                push(&link.href, &mut candidates);
            }
        }
        for path in fallback_paths {
            push(path, &mut candidates);
        }

        for candidate in candidates {
            if self.cancel.is_cancelled() {
                return Err(CheckError::Cancelled);
            }
            match self.fetcher.fetch_document(&candidate, &self.cancel).await {
                Ok(doc) if doc.status < 400 && !doc.body.trim().is_empty() => {
                    tracing::debug!(url = %candidate, "sub-page located");
                    return Ok(Some(doc));
                }
                Ok(_) => {}
                Err(FetchError::Cancelled) => return Err(CheckError::Cancelled),
                Err(err) => {
                    tracing::debug!(url = %candidate, error = %err, "sub-page candidate failed");
                }
            }
        }
        Ok(None)
    }
}

/// The common check contract.
#[async_trait]
pub trait ComplianceCheck: Send + Sync {
    fn pillar(&self) -> Pillar;
    async fn run(&self, ctx: &CheckContext) -> Result<Vec<Issue>, CheckError>;
}

/// Builder for issues, filling in id derivation and defaults.
#[derive(Debug, Clone)]
pub struct IssueDraft {
    severity: Severity,
    title: String,
    description: String,
    risk_euro: u32,
    legal_basis: String,
    auto_fixable: bool,
    missing: bool,
    locator: Option<IssueLocator>,
    hint: Option<RemediationHint>,
}

impl IssueDraft {
    pub fn new(
        severity: Severity,
        title: impl Into<String>,
        risk_euro: u32,
        legal_basis: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            title: title.into(),
            description: String::new(),
            risk_euro,
            legal_basis: legal_basis.into(),
            auto_fixable: false,
            missing: false,
            locator: None,
            hint: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_locator(mut self, locator: IssueLocator) -> Self {
        self.locator = Some(locator);
        self
    }

    pub fn with_hint(mut self, hint: RemediationHint) -> Self {
        self.hint = Some(hint);
        self
    }

    pub fn auto_fixable(mut self) -> Self {
        self.auto_fixable = true;
        self
    }

    pub fn missing(mut self) -> Self {
        self.missing = true;
        self
    }

    pub fn finish(self, scan_id: &Uuid, pillar: Pillar) -> Issue {
        let locator_key = format!(
            "{}|{}",
            self.locator
                .as_ref()
                .map(IssueLocator::canonical)
                .unwrap_or_else(|| "-".to_string()),
            self.title
        );
        Issue {
            id: issue_id(scan_id, pillar, &locator_key),
            pillar,
            severity: self.severity,
            title: self.title,
            description: self.description,
            risk_euro: self.risk_euro,
            legal_basis: self.legal_basis,
            auto_fixable: self.auto_fixable,
            missing: self.missing,
            locator: self.locator,
            hint: self.hint,
            legal_update_refs: Vec::new(),
            risk_increase_reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_draft_defaults() {
        let scan_id = Uuid::new_v4();
        let issue = IssueDraft::new(Severity::Warning, "Missing phone number", 1500, "TMG §5")
            .with_description("No phone number found on the imprint page")
            .finish(&scan_id, Pillar::Imprint);
        assert_eq!(issue.pillar, Pillar::Imprint);
        assert_eq!(issue.severity, Severity::Warning);
        assert!(!issue.auto_fixable);
        assert!(!issue.missing);
        assert!(issue.id.starts_with(&scan_id.to_string()));
    }

    #[test]
    fn test_distinct_titles_distinct_ids() {
        let scan_id = Uuid::new_v4();
        let a = IssueDraft::new(Severity::Warning, "Missing phone number", 1500, "TMG §5")
            .finish(&scan_id, Pillar::Imprint);
        let b = IssueDraft::new(Severity::Warning, "Missing email address", 1500, "TMG §5")
            .finish(&scan_id, Pillar::Imprint);
        assert_ne!(a.id, b.id);
    }
}
