//! Konform Checks: Cookie & Tracking Consent (TTDSG §25)
//!
//! Four questions: is there a consent mechanism, do trackers load before
//! consent, can the visitor reject, and are the cookies documented in the
//! privacy policy.

use crate::context::{CheckContext, CheckError, ComplianceCheck, IssueDraft};
use async_trait::async_trait;
use konform_catalog::{match_request_url, ClassifiedService, MatchKind};
use konform_core::{Issue, IssueLocator, Pillar, RemediationHint, Severity};
use konform_fetch::PageSnapshot;
use once_cell::sync::Lazy;
use regex::Regex;

static REJECT_BUTTON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)ablehnen|reject|nur\s+notwendige|necessary\s+only|alle\s+ablehnen|decline")
        .expect("static regex")
});

static PRIVACY_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)datenschutz|privacy|datenschutzerklärung").expect("static regex")
});

const PRIVACY_FALLBACKS: &[&str] = &["/datenschutz", "/privacy"];

const LEGAL_BASIS: &str = "TTDSG §25 Abs. 1";

/// Consent-mechanism check.
#[derive(Debug, Default)]
pub struct CookieCheck;

impl CookieCheck {
    pub fn new() -> Self {
        Self
    }

    fn consent_needing(services: &[ClassifiedService]) -> Vec<&ClassifiedService> {
        services.iter().filter(|s| s.requires_consent).collect()
    }

    fn service_keys(services: &[&ClassifiedService]) -> Vec<String> {
        services.iter().map(|s| s.key.clone()).collect()
    }

    /// Services observed loading before any consent interaction.
    ///
    /// With a render network log this is exact: pre-interaction requests
    /// matched against the catalog. Statically it is inferred: a
    /// consent-requiring service whose script/iframe sits plainly in the
    /// initial DOM loads unconditionally when no consent mechanism exists.
    fn pre_consent_services<'a>(
        ctx: &CheckContext,
        needing: &[&'a ClassifiedService],
        consent_present: bool,
    ) -> Vec<&'a ClassifiedService> {
        if !ctx.page.network_log.is_empty() {
            let catalog = ctx.classifier.catalog();
            let mut hit: Vec<&ClassifiedService> = Vec::new();
            for request in ctx.page.network_log.iter().filter(|r| r.pre_interaction) {
                if let Some(entry) = match_request_url(catalog, &request.url) {
                    if entry.requires_consent() {
                        if let Some(service) = needing.iter().find(|s| s.key == entry.key).copied()
                        {
                            if !hit.iter().any(|s| s.key == service.key) {
                                hit.push(service);
                            }
                        }
                    }
                }
            }
            return hit;
        }

        if consent_present {
            return Vec::new();
        }
        needing
            .iter()
            .filter(|s| {
                s.evidence.iter().any(|e| {
                    matches!(
                        e.kind,
                        MatchKind::ScriptSrc | MatchKind::ScriptInline | MatchKind::Iframe
                    )
                })
            })
            .copied()
            .collect()
    }
}

#[async_trait]
impl ComplianceCheck for CookieCheck {
    fn pillar(&self) -> Pillar {
        Pillar::Cookie
    }

    async fn run(&self, ctx: &CheckContext) -> Result<Vec<Issue>, CheckError> {
        let services = ctx.classifier.services();
        let needing = Self::consent_needing(&services);
        let mut issues = Vec::new();

        let has_cmp = services.iter().any(|s| s.has_tag("cmp"));
        let has_banner_markup = !ctx.snapshot.banner_regions.is_empty();
        let consent_present = has_cmp || has_banner_markup;

        // (1) Consent mechanism
        if !consent_present && !needing.is_empty() {
            issues.push(
                IssueDraft::new(
                    Severity::Critical,
                    "No cookie consent banner",
                    3000,
                    LEGAL_BASIS,
                )
                .with_description(format!(
                    "{} consent-requiring service(s) detected but no consent mechanism found.",
                    needing.len()
                ))
                .with_locator(IssueLocator::Page {
                    url: ctx.page.final_url.clone(),
                })
                .with_hint(RemediationHint::ConsentGate {
                    service_keys: Self::service_keys(&needing),
                })
                .missing()
                .auto_fixable()
                .finish(&ctx.scan_id, Pillar::Cookie),
            );
        }

        // (2) Prior consent
        let pre_consent = Self::pre_consent_services(ctx, &needing, consent_present);
        if !pre_consent.is_empty() {
            let names: Vec<&str> = pre_consent.iter().map(|s| s.name.as_str()).collect();
            let first_element = pre_consent
                .first()
                .and_then(|s| s.evidence.first())
                .map(|e| e.element.clone())
                .unwrap_or_default();
            issues.push(
                IssueDraft::new(
                    Severity::Critical,
                    "Tracking without consent",
                    5000,
                    "TTDSG §25 Abs. 1, DSGVO Art. 6 Abs. 1",
                )
                .with_description(format!(
                    "These services load before any consent is given: {}.",
                    names.join(", ")
                ))
                .with_locator(IssueLocator::Element {
                    outer_html: first_element,
                })
                .with_hint(RemediationHint::ConsentGate {
                    service_keys: Self::service_keys(&pre_consent),
                })
                .auto_fixable()
                .finish(&ctx.scan_id, Pillar::Cookie),
            );
        }

        // (3) Reject option
        if has_banner_markup {
            let has_reject = ctx
                .snapshot
                .banner_regions
                .iter()
                .flat_map(|b| b.button_names.iter())
                .any(|name| REJECT_BUTTON.is_match(name));
            if !has_reject {
                let marker = ctx
                    .snapshot
                    .banner_regions
                    .first()
                    .map(|b| b.marker.clone())
                    .unwrap_or_default();
                issues.push(
                    IssueDraft::new(Severity::Critical, "No reject option", 2500, "DSGVO Art. 7 Abs. 3")
                        .with_description(
                            "The consent banner offers no reject button of equal prominence.",
                        )
                        .with_locator(IssueLocator::Selector { selector: marker })
                        .auto_fixable()
                        .finish(&ctx.scan_id, Pillar::Cookie),
                );
            }
        } else if !consent_present && !needing.is_empty() {
            issues.push(
                IssueDraft::new(Severity::Critical, "No reject option", 2500, "DSGVO Art. 7 Abs. 3")
                    .with_description(
                        "Without a consent banner, visitors have no way to refuse tracking.",
                    )
                    .with_locator(IssueLocator::Page {
                        url: ctx.page.final_url.clone(),
                    })
                    .missing()
                    .auto_fixable()
                    .finish(&ctx.scan_id, Pillar::Cookie),
            );
        }

        // (4) Cookie documentation cross-check against the privacy page
        let documented_services: Vec<&ClassifiedService> = needing
            .iter()
            .filter(|s| !s.evidence.is_empty())
            .copied()
            .collect();
        if !documented_services.is_empty() {
            if let Some(doc) = ctx.locate_page(&PRIVACY_LINK, PRIVACY_FALLBACKS).await? {
                let text = PageSnapshot::parse(&doc.body, &doc.final_url)
                    .text
                    .to_lowercase();
                let undocumented: Vec<&str> = documented_services
                    .iter()
                    .filter(|s| {
                        let name_hit = text.contains(&s.name.to_lowercase());
                        let cookie_hit = s.evidence.iter().any(|e| {
                            e.kind == MatchKind::Cookie
                                && text.contains(&e.element.to_lowercase())
                        });
                        !(name_hit || cookie_hit)
                    })
                    .map(|s| s.name.as_str())
                    .collect();
                if !undocumented.is_empty() {
                    issues.push(
                        IssueDraft::new(
                            Severity::Warning,
                            "Cookie details missing in privacy policy",
                            1000,
                            "DSGVO Art. 13 Abs. 1",
                        )
                        .with_description(format!(
                            "Cookies of these services are not documented with purpose and \
                             duration: {}.",
                            undocumented.join(", ")
                        ))
                        .with_locator(IssueLocator::Page { url: doc.final_url })
                        .auto_fixable()
                        .finish(&ctx.scan_id, Pillar::Cookie),
                    );
                }
            }
        }

        Ok(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_button_names() {
        for name in [
            "Alle ablehnen",
            "Reject all",
            "Nur notwendige Cookies",
            "Accept necessary only",
            "Decline",
        ] {
            assert!(REJECT_BUTTON.is_match(name), "should match: {name}");
        }
        for name in ["Alle akzeptieren", "Accept all", "Einstellungen"] {
            assert!(!REJECT_BUTTON.is_match(name), "should not match: {name}");
        }
    }
}
