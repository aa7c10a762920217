//! Konform Legal: Legal-Update Overlay
//!
//! Recent legal changes (court rulings, new regulation milestones) raise
//! the severity and monetary risk of issues they affect. The overlay is a
//! deterministic post-processing step over a read-only snapshot taken at
//! scan time; it derives new issue values and never mutates stored scans.

pub mod overlay;
pub mod source;
pub mod update;

pub use overlay::{apply_overlay, OverlayOutcome};
pub use source::{LegalUpdateSource, StaticLegalSource};
pub use update::{LegalSnapshot, LegalUpdate, UpdateSeverity};
