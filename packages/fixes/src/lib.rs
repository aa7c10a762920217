//! Konform Fixes: Remediation Artifact Generation
//!
//! Per-category remediation for auto-fixable issues:
//! - Imprint/privacy legal texts from canonical templates
//! - A three-file cookie-banner bundle with per-service blocking recipes
//! - Contrast and focus CSS patches
//! - LLM-assisted alt text with confidence gating
//! - Guide fallbacks for everything else
//!
//! Every artifact passes a type-specific validator before it leaves the
//! generator; failures downgrade to a guide.

pub mod alttext;
pub mod banner;
pub mod cssfix;
pub mod generator;
pub mod templates;
pub mod validate;

pub use alttext::{
    AltTextConfig, AltTextModel, AltTextRequest, AltTextSuggestion, FixedAltTextModel,
    HttpAltTextModel, LegalTextModel, AUTO_FIX_CONFIDENCE,
};
pub use banner::banner_bundle;
pub use generator::{FixError, FixGenerator};
pub use templates::{
    imprint_template, privacy_template, service_paragraph, RenderedTemplate,
};
pub use validate::{validate_css, validate_files, validate_html, validate_js};
