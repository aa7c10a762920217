//! Konform Core: Domain Types
//!
//! Issues, scans and the supporting vocabulary shared by every pipeline
//! stage. All enums are closed; wire names are lowercase snake_case.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Regulatory pillar a finding belongs to.
///
/// Declaration order is the canonical report order and drives the
/// deterministic issue sort.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Pillar {
    /// Provider disclosure (TMG §5)
    Imprint,
    /// Privacy policy (GDPR)
    Privacy,
    /// Cookie & tracking consent (TTDSG §25)
    Cookie,
    /// Accessibility (BFSG / WCAG 2.1 AA)
    Accessibility,
}

impl Pillar {
    /// All pillars in report order.
    pub const ALL: [Pillar; 4] = [
        Pillar::Imprint,
        Pillar::Privacy,
        Pillar::Cookie,
        Pillar::Accessibility,
    ];

    /// Stable lowercase tag, identical to the serde wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Pillar::Imprint => "imprint",
            Pillar::Privacy => "privacy",
            Pillar::Cookie => "cookie",
            Pillar::Accessibility => "accessibility",
        }
    }
}

impl std::fmt::Display for Pillar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issue severity. Ordering is ascending: info < warning < critical.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    /// Raise by one step, saturating at critical.
    pub fn escalate(self) -> Severity {
        match self {
            Severity::Info => Severity::Warning,
            Severity::Warning | Severity::Critical => Severity::Critical,
        }
    }

    /// Raise by `steps`, saturating at critical.
    pub fn escalate_by(self, steps: u8) -> Severity {
        (0..steps).fold(self, |s, _| s.escalate())
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Where on the page an issue was observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueLocator {
    /// CSS selector of the offending element
    Selector { selector: String },
    /// Raw outer HTML of the offending element
    Element { outer_html: String },
    /// Image source URL
    Image { src: String },
    /// A foreground/background color pair, with the selector it applies to
    ColorPair {
        foreground: String,
        background: String,
        selector: String,
    },
    /// A page-level finding (missing page, missing banner)
    Page { url: String },
}

impl IssueLocator {
    /// Canonical string used for issue-id derivation. Must be stable across
    /// re-scans of an unchanged page.
    pub fn canonical(&self) -> String {
        match self {
            IssueLocator::Selector { selector } => format!("sel:{selector}"),
            IssueLocator::Element { outer_html } => format!("el:{outer_html}"),
            IssueLocator::Image { src } => format!("img:{src}"),
            IssueLocator::ColorPair {
                foreground,
                background,
                selector,
            } => format!("color:{foreground}:{background}:{selector}"),
            IssueLocator::Page { url } => format!("page:{url}"),
        }
    }
}

/// Machine-readable remediation hint, keyed by what the fix generator needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemediationHint {
    /// Imprint/privacy: a mandatory field is absent from the page
    MissingField { field: String },
    /// Privacy: a detected service lacks its policy section
    ServiceSection { service_key: String },
    /// Cookie: services that must be gated behind consent
    ConsentGate { service_keys: Vec<String> },
    /// Accessibility: suggested replacement foreground color
    SuggestedColor { foreground: String, ratio: f64 },
    /// Accessibility: suggested alt text with model confidence
    SuggestedAltText { text: String, confidence: f64 },
}

/// Reference to a legal update that affected an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegalUpdateRef {
    pub id: String,
    pub title: String,
}

/// A single, independently remediable compliance finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    /// Stable id: `<scan_id>:<pillar>:<locator digest>`
    pub id: String,
    pub pillar: Pillar,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    /// Estimated fine exposure in euros
    pub risk_euro: u32,
    /// Legal citation, e.g. "TMG §5 Abs. 1" or "DSGVO Art. 13"
    pub legal_basis: String,
    /// Whether the fix generator can produce a deployable artifact
    pub auto_fixable: bool,
    /// True when the finding is an absent page/element rather than a broken one
    pub missing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locator: Option<IssueLocator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<RemediationHint>,
    /// Legal updates that raised this issue, attached by the overlay
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub legal_update_refs: Vec<LegalUpdateRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_increase_reason: Option<String>,
}

/// Derive the stable issue id from scan id, pillar and the locator key.
///
/// Format: `<scan_id>:<pillar>:<sha1 prefix, 12 hex chars>`.
pub fn issue_id(scan_id: &Uuid, pillar: Pillar, locator_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(locator_key.as_bytes());
    let digest = hasher.finalize();
    format!("{scan_id}:{pillar}:{}", &hex::encode(digest)[..12])
}

/// How the page was retrieved before analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Static first, escalate to rendered on skeleton-SPA pages
    #[default]
    Auto,
    /// Single HTTP GET, no JavaScript execution
    Static,
    /// Headless browser with network-idle wait
    Rendered,
}

impl std::fmt::Display for RenderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RenderMode::Auto => "auto",
            RenderMode::Static => "static",
            RenderMode::Rendered => "rendered",
        };
        f.write_str(s)
    }
}

/// Raw page metrics recorded with every scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageMetrics {
    pub size_bytes: u64,
    pub http_status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    /// Wall-clock fetch duration in milliseconds
    pub fetch_ms: u64,
}

/// Non-fatal degradation attached to a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Stable machine code, e.g. "render_fallback", "partial_analysis"
    pub code: String,
    pub message: String,
}

impl ScanWarning {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Metered action kinds tracked by the quota ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaKind {
    Scan,
    Fix,
    Export,
}

impl std::fmt::Display for QuotaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QuotaKind::Scan => "scan",
            QuotaKind::Fix => "fix",
            QuotaKind::Export => "export",
        };
        f.write_str(s)
    }
}

/// Complete result of a compliance scan. Immutable once persisted; the
/// legal overlay derives a new value instead of editing a stored one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub scan_id: Uuid,
    pub url: String,
    pub user_id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Mode actually used, after `auto` resolution and render fallback
    pub render_mode_used: RenderMode,
    pub metrics: PageMetrics,
    pub issues: Vec<Issue>,
    pub pillar_scores: BTreeMap<Pillar, u8>,
    pub overall_score: u8,
    pub total_risk_euro: u64,
    pub legal_updates_applied: bool,
    pub legal_updates_count: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ScanWarning>,
}

impl ScanResult {
    /// Look up an issue by id.
    pub fn issue(&self, id: &str) -> Option<&Issue> {
        self.issues.iter().find(|i| i.id == id)
    }
}
