//! Konform Catalog: Third-Party Service Registry & Classifier
//!
//! A static-ish registry of known third-party services (analytics pixels,
//! tag managers, consent platforms, embeds) with:
//! - Fingerprints: script/iframe URL patterns, cookie and storage names
//! - A blocking recipe per service for consent gating
//! - Copy-on-write hot reload from a versioned YAML file
//!
//! The classifier cross-cuts the cookie and privacy checks: it matches a
//! normalized page against the catalog and emits evidence bundles.

pub mod catalog;
pub mod classifier;
pub mod entry;
pub mod signals;

pub use catalog::{Catalog, CatalogError};
pub use classifier::{
    classify, match_request_url, ClassifiedService, MatchEvidence, MatchKind, UNCLASSIFIED_KEY,
};
pub use entry::{pattern_matches_name, pattern_matches_url, BlockMethod, ServiceCategory, ServiceEntry};
pub use signals::{PageSignals, ScriptSignal};
