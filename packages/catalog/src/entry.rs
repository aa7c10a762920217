//! Konform Catalog: Service Entries & Pattern Grammar
//!
//! One entry per known third-party service. Two pattern grammars apply:
//! - URL patterns: plain substring, or a glob when the pattern contains `*`
//! - Cookie/storage name patterns: literal, or `name*` as prefix wildcard

use serde::{Deserialize, Serialize};

/// Purpose category of a service. The taxonomy is closed and authoritative:
/// a pattern match overrides any inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceCategory {
    /// Required for site operation; never blocked, never needs consent
    Necessary,
    /// Comfort features; consent depends on purpose
    Functional,
    Analytics,
    Marketing,
}

impl ServiceCategory {
    /// Whether this category always requires consent.
    pub fn always_requires_consent(&self) -> bool {
        matches!(self, ServiceCategory::Analytics | ServiceCategory::Marketing)
    }
}

impl std::fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServiceCategory::Necessary => "necessary",
            ServiceCategory::Functional => "functional",
            ServiceCategory::Analytics => "analytics",
            ServiceCategory::Marketing => "marketing",
        };
        f.write_str(s)
    }
}

/// How a service is disabled pending consent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlockMethod {
    /// Rewrite `<script src>` to a benign data URL, rehydrate on consent
    #[default]
    ScriptRewrite,
    /// Replace `<iframe>` with a click-to-load placeholder
    IframePlaceholder,
    /// Necessary services: document only
    NoBlocking,
}

/// A known third-party service with its fingerprints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEntry {
    /// Unique service key, e.g. "google_analytics_ga4"
    pub key: String,
    /// Display name
    pub name: String,
    pub category: ServiceCategory,
    /// Operating company, e.g. "Google Ireland Limited"
    pub provider: String,
    #[serde(default)]
    pub script_patterns: Vec<String>,
    #[serde(default)]
    pub iframe_patterns: Vec<String>,
    #[serde(default)]
    pub cookie_patterns: Vec<String>,
    #[serde(default)]
    pub storage_patterns: Vec<String>,
    #[serde(default)]
    pub block_method: BlockMethod,
    #[serde(default)]
    pub privacy_policy_url: Option<String>,
    /// Processing purpose used in generated privacy sections
    #[serde(default)]
    pub purpose: Option<String>,
    /// Default retention statement for generated privacy sections
    #[serde(default)]
    pub default_retention: Option<String>,
    /// Explicit consent override for functional services
    #[serde(default)]
    pub consent_required: Option<bool>,
    /// Free-form markers, e.g. "cmp", "accessibility_widget"
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ServiceEntry {
    /// Consent requirement: explicit override first, category inference
    /// second. Necessary services never require consent.
    pub fn requires_consent(&self) -> bool {
        if self.category == ServiceCategory::Necessary {
            return false;
        }
        match self.consent_required {
            Some(explicit) => explicit,
            None => self.category.always_requires_consent(),
        }
    }

    /// Effective blocking recipe. Necessary services are never blocked.
    pub fn effective_block_method(&self) -> BlockMethod {
        if self.category == ServiceCategory::Necessary {
            BlockMethod::NoBlocking
        } else {
            self.block_method
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// URL pattern match: substring by default, glob when `*` is present.
/// Globs match pattern fragments in order; leading/trailing `*` relax the
/// respective anchor.
pub fn pattern_matches_url(pattern: &str, url: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    if !pattern.contains('*') {
        return url.contains(pattern);
    }
    let anchored_start = !pattern.starts_with('*');
    let anchored_end = !pattern.ends_with('*');
    let fragments: Vec<&str> = pattern.split('*').filter(|f| !f.is_empty()).collect();
    if fragments.is_empty() {
        return true;
    }
    let mut pos = 0usize;
    for (i, fragment) in fragments.iter().enumerate() {
        match url[pos..].find(fragment) {
            Some(offset) => {
                if i == 0 && anchored_start && offset != 0 {
                    return false;
                }
                pos += offset + fragment.len();
            }
            None => return false,
        }
    }
    if anchored_end && !url.ends_with(fragments[fragments.len() - 1]) {
        return false;
    }
    true
}

/// Cookie/storage name match: literal equality, or `name*` prefix wildcard.
/// No other metacharacters exist in this grammar.
pub fn pattern_matches_name(pattern: &str, name: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => !prefix.is_empty() && name.starts_with(prefix),
        None => pattern == name,
    }
}
