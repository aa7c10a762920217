//! Konform Checks: The Four Pillar Analyzers
//!
//! Each check maps the normalized page (plus classified services) to a
//! list of issues. The checks share nothing and run concurrently; the
//! orchestrator owns the fan-out and the per-check deadline.

pub mod accessibility;
pub mod context;
pub mod contrast;
pub mod cookie;
pub mod cssscan;
pub mod imprint;
pub mod privacy;

pub use accessibility::AccessibilityCheck;
pub use context::{CheckContext, CheckError, ClassifierHandle, ComplianceCheck, IssueDraft};
pub use cookie::CookieCheck;
pub use imprint::ImprintCheck;
pub use privacy::PrivacyCheck;

use std::sync::Arc;

/// The standard battery, in pillar order.
pub fn standard_checks() -> Vec<Arc<dyn ComplianceCheck>> {
    vec![
        Arc::new(ImprintCheck::new()),
        Arc::new(PrivacyCheck::new()),
        Arc::new(CookieCheck::new()),
        Arc::new(AccessibilityCheck::new()),
    ]
}
