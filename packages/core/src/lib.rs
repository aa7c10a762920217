//! Konform Core: Compliance Domain Model
//!
//! Shared vocabulary for the scan-and-remediate pipeline:
//! - Pillars, severities, issues and scans
//! - Generated fixes and their artifacts
//! - Scoring and monetary risk aggregation
//! - The engine-wide error taxonomy with stable codes

pub mod error;
pub mod fix;
pub mod score;
pub mod types;

// Re-exports
pub use error::{EngineError, EngineResult};
pub use fix::{
    idempotency_key, CompanyInfo, FixArtifact, FixSource, FixType, GeneratedFix, ValidationReport,
    ValidationStatus,
};
pub use score::{overall_score, pillar_score, pillar_scores, sort_issues, total_risk_euro};
pub use types::{
    issue_id, Issue, IssueLocator, LegalUpdateRef, PageMetrics, Pillar, QuotaKind, RemediationHint,
    RenderMode, ScanResult, ScanWarning, Severity,
};
