//! Konform Catalog: Cookie/Script Classifier
//!
//! Matches a normalized page against the catalog. Every hit carries an
//! evidence bundle (pattern + element), the inferred consent requirement
//! and the blocking recipe the fix generator consumes.
//!
//! Unknown third-party scripts are collected under the reserved
//! `unclassified` pseudo-service with category `marketing` (conservative).

use crate::entry::{
    pattern_matches_name, pattern_matches_url, BlockMethod, ServiceCategory, ServiceEntry,
};
use crate::signals::PageSignals;
use serde::{Deserialize, Serialize};
use url::Url;

/// Key of the reserved pseudo-service for unknown third parties.
pub const UNCLASSIFIED_KEY: &str = "unclassified";

/// Which fingerprint fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    ScriptSrc,
    ScriptInline,
    Iframe,
    Cookie,
    Storage,
}

/// One fired fingerprint with the element it fired on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchEvidence {
    pub kind: MatchKind,
    /// The catalog pattern that matched
    pub pattern: String,
    /// The matched element: script src, iframe src, cookie name, ...
    pub element: String,
}

/// A service identified on the page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedService {
    pub key: String,
    pub name: String,
    pub category: ServiceCategory,
    pub provider: String,
    pub requires_consent: bool,
    pub block_method: BlockMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub privacy_policy_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_retention: Option<String>,
    pub evidence: Vec<MatchEvidence>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl ClassifiedService {
    fn from_entry(entry: &ServiceEntry, evidence: Vec<MatchEvidence>) -> Self {
        Self {
            key: entry.key.clone(),
            name: entry.name.clone(),
            category: entry.category,
            provider: entry.provider.clone(),
            requires_consent: entry.requires_consent(),
            block_method: entry.effective_block_method(),
            privacy_policy_url: entry.privacy_policy_url.clone(),
            purpose: entry.purpose.clone(),
            default_retention: entry.default_retention.clone(),
            evidence,
            tags: entry.tags.clone(),
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Collect evidence for one entry against the page. Union of all four
/// matching rules, in rule order.
fn match_entry(entry: &ServiceEntry, signals: &PageSignals) -> Vec<MatchEvidence> {
    let mut evidence = Vec::new();

    for script in &signals.scripts {
        for pattern in &entry.script_patterns {
            if let Some(src) = &script.src {
                if pattern_matches_url(pattern, src) {
                    evidence.push(MatchEvidence {
                        kind: MatchKind::ScriptSrc,
                        pattern: pattern.clone(),
                        element: src.clone(),
                    });
                }
            }
            if let Some(inline) = &script.inline {
                if inline.contains(pattern.as_str()) {
                    evidence.push(MatchEvidence {
                        kind: MatchKind::ScriptInline,
                        pattern: pattern.clone(),
                        element: script.evidence(),
                    });
                }
            }
        }
    }

    for src in &signals.iframe_srcs {
        for pattern in &entry.iframe_patterns {
            if pattern_matches_url(pattern, src) {
                evidence.push(MatchEvidence {
                    kind: MatchKind::Iframe,
                    pattern: pattern.clone(),
                    element: src.clone(),
                });
            }
        }
    }

    for name in &signals.cookie_names {
        for pattern in &entry.cookie_patterns {
            if pattern_matches_name(pattern, name) {
                evidence.push(MatchEvidence {
                    kind: MatchKind::Cookie,
                    pattern: pattern.clone(),
                    element: name.clone(),
                });
            }
        }
    }

    // Storage is only evaluated when the renderer captured it
    if let Some(keys) = &signals.storage_keys {
        for key in keys {
            for pattern in &entry.storage_patterns {
                if pattern_matches_name(pattern, key) {
                    evidence.push(MatchEvidence {
                        kind: MatchKind::Storage,
                        pattern: pattern.clone(),
                        element: key.clone(),
                    });
                }
            }
        }
    }

    evidence
}

/// Host of a script URL, tolerating protocol-relative srcs.
fn script_host(src: &str) -> Option<String> {
    let absolute = if let Some(rest) = src.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        src.to_string()
    };
    let parsed = Url::parse(&absolute).ok()?;
    parsed.host_str().map(|h| h.to_string())
}

fn same_site(page_host: &str, host: &str) -> bool {
    let strip = |h: &str| h.strip_prefix("www.").map(str::to_string).unwrap_or_else(|| h.to_string());
    strip(page_host) == strip(host)
}

/// Match the whole page against the catalog. Output is sorted by service
/// key for deterministic reports. Every matching service appears; unknown
/// third-party scripts are folded into the `unclassified` pseudo-service.
pub fn classify(entries: &[ServiceEntry], signals: &PageSignals) -> Vec<ClassifiedService> {
    let mut matched: Vec<ClassifiedService> = Vec::new();
    let mut matched_srcs: Vec<String> = Vec::new();

    for entry in entries {
        if entry.key == UNCLASSIFIED_KEY {
            continue;
        }
        let evidence = match_entry(entry, signals);
        if evidence.is_empty() {
            continue;
        }
        for ev in &evidence {
            if ev.kind == MatchKind::ScriptSrc {
                matched_srcs.push(ev.element.clone());
            }
        }
        matched.push(ClassifiedService::from_entry(entry, evidence));
    }

    // Unknown third-party scripts -> unclassified pseudo-service
    let unknown: Vec<MatchEvidence> = signals
        .external_script_srcs()
        .filter(|src| !matched_srcs.iter().any(|m| m.as_str() == *src))
        .filter(|src| match script_host(src) {
            Some(host) => !same_site(&signals.page_host, &host),
            None => false,
        })
        .map(|src| MatchEvidence {
            kind: MatchKind::ScriptSrc,
            pattern: String::new(),
            element: src.to_string(),
        })
        .collect();

    if !unknown.is_empty() {
        if let Some(pseudo) = entries.iter().find(|e| e.key == UNCLASSIFIED_KEY) {
            matched.push(ClassifiedService::from_entry(pseudo, unknown));
        } else {
            tracing::warn!(
                count = unknown.len(),
                "unknown third-party scripts found but catalog lacks the reserved entry"
            );
        }
    }

    matched.sort_by(|a, b| a.key.cmp(&b.key));
    matched
}

/// Match a single request URL (from the render network log) against the
/// catalog. Used for prior-consent analysis.
pub fn match_request_url<'a>(entries: &'a [ServiceEntry], url: &str) -> Option<&'a ServiceEntry> {
    entries.iter().find(|entry| {
        entry
            .script_patterns
            .iter()
            .chain(entry.iframe_patterns.iter())
            .any(|p| pattern_matches_url(p, url))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::signals::ScriptSignal;

    fn signals_with_script(src: &str) -> PageSignals {
        PageSignals {
            page_host: "example.com".into(),
            scripts: vec![ScriptSignal::external(src)],
            ..Default::default()
        }
    }

    #[test]
    fn test_ga4_script_detection() {
        let catalog = Catalog::builtin().unwrap();
        let signals =
            signals_with_script("https://www.googletagmanager.com/gtag/js?id=G-X");
        let services = classify(&catalog.snapshot(), &signals);

        let ga4 = services
            .iter()
            .find(|s| s.key == "google_analytics_ga4")
            .expect("GA4 must match");
        assert_eq!(ga4.category, ServiceCategory::Analytics);
        assert_eq!(ga4.block_method, BlockMethod::ScriptRewrite);
        assert!(ga4.requires_consent);
        assert_eq!(ga4.evidence[0].kind, MatchKind::ScriptSrc);
    }

    #[test]
    fn test_cookie_name_detection() {
        let catalog = Catalog::builtin().unwrap();
        let signals = PageSignals {
            page_host: "example.com".into(),
            cookie_names: vec!["_ga_ABC123".into(), "session".into()],
            ..Default::default()
        };
        let services = classify(&catalog.snapshot(), &signals);
        assert!(services.iter().any(|s| s.key == "google_analytics_ga4"));
    }

    #[test]
    fn test_iframe_placeholder_recipe() {
        let catalog = Catalog::builtin().unwrap();
        let signals = PageSignals {
            page_host: "example.com".into(),
            iframe_srcs: vec!["https://www.youtube.com/embed/xyz".into()],
            ..Default::default()
        };
        let services = classify(&catalog.snapshot(), &signals);
        let yt = services.iter().find(|s| s.key == "youtube").unwrap();
        assert_eq!(yt.block_method, BlockMethod::IframePlaceholder);
        assert!(yt.requires_consent);
    }

    #[test]
    fn test_unknown_third_party_is_unclassified_marketing() {
        let catalog = Catalog::builtin().unwrap();
        let signals = signals_with_script("https://cdn.obscure-tracker.io/t.js");
        let services = classify(&catalog.snapshot(), &signals);

        let pseudo = services.iter().find(|s| s.key == UNCLASSIFIED_KEY).unwrap();
        assert_eq!(pseudo.category, ServiceCategory::Marketing);
        assert!(pseudo.requires_consent);
        assert_eq!(pseudo.evidence[0].element, "https://cdn.obscure-tracker.io/t.js");
    }

    #[test]
    fn test_first_party_scripts_not_flagged() {
        let catalog = Catalog::builtin().unwrap();
        let signals = signals_with_script("https://www.example.com/assets/app.js");
        let services = classify(&catalog.snapshot(), &signals);
        assert!(services.iter().all(|s| s.key != UNCLASSIFIED_KEY));
    }

    #[test]
    fn test_storage_only_with_render_capture() {
        let catalog = Catalog::builtin().unwrap();
        let mut signals = PageSignals {
            page_host: "example.com".into(),
            storage_keys: None,
            ..Default::default()
        };
        // Not rendered: storage rule never fires
        assert!(classify(&catalog.snapshot(), &signals).is_empty());

        signals.storage_keys = Some(vec!["uc_settings".into()]);
        let services = classify(&catalog.snapshot(), &signals);
        assert!(services.iter().any(|s| s.key == "usercentrics"));
    }

    #[test]
    fn test_every_matching_service_appears() {
        let catalog = Catalog::builtin().unwrap();
        let signals = PageSignals {
            page_host: "example.com".into(),
            scripts: vec![
                ScriptSignal::external("https://www.googletagmanager.com/gtag/js?id=G-1"),
                ScriptSignal::external("https://connect.facebook.net/en_US/fbevents.js"),
                ScriptSignal::external("https://static.hotjar.com/c/hotjar-1.js"),
            ],
            ..Default::default()
        };
        let services = classify(&catalog.snapshot(), &signals);
        let keys: Vec<&str> = services.iter().map(|s| s.key.as_str()).collect();
        assert!(keys.contains(&"google_analytics_ga4"));
        assert!(keys.contains(&"facebook_pixel"));
        assert!(keys.contains(&"hotjar"));
        // Sorted for determinism
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_match_request_url() {
        let catalog = Catalog::builtin().unwrap();
        let snapshot = catalog.snapshot();
        let entry =
            match_request_url(&snapshot, "https://region1.google-analytics.com/g/collect?v=2");
        assert_eq!(entry.unwrap().key, "google_analytics_ga4");
        assert!(match_request_url(&snapshot, "https://example.com/style.css").is_none());
    }
}
