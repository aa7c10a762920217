//! Konform Checks: Privacy Policy (GDPR)
//!
//! Mirrors the imprint structure: locate the policy page, then verify the
//! GDPR Art. 13/14 disclosure battery and that every detected tracking
//! service has its own section.

use crate::context::{CheckContext, CheckError, ComplianceCheck, IssueDraft};
use async_trait::async_trait;
use konform_catalog::ClassifiedService;
use konform_core::{Issue, IssueLocator, Pillar, RemediationHint, Severity};
use konform_fetch::PageSnapshot;
use once_cell::sync::Lazy;
use regex::Regex;

static LINK_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)datenschutz|privacy|datenschutzerklärung").expect("static regex")
});

const FALLBACK_PATHS: &[&str] = &["/datenschutz", "/privacy", "/datenschutzerklaerung"];

static CONTROLLER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)verantwortliche[r]?\s+(im\s+sinne|für\s+die)|verantwortliche\s+stelle|data\s+controller")
        .expect("static regex")
});
static PURPOSES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)zweck|processing\s+purpose").expect("static regex"));
static ART6: Lazy<Regex> = Lazy::new(|| Regex::new(r"Art\.?\s*6").expect("static regex"));
static RETENTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)speicherdauer|aufbewahrung|gespeichert|gelöscht|retention").expect("static regex")
});
static SUPERVISORY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)aufsichtsbehörde|beschwerderecht|supervisory\s+authority").expect("static regex")
});

/// The enumerated data-subject rights (Art. 15-21), German and English.
const RIGHTS: &[(&str, &str)] = &[
    ("access", r"(?i)auskunft|right\s+of\s+access"),
    ("rectification", r"(?i)berichtigung|rectification"),
    ("erasure", r"(?i)löschung|erasure"),
    ("restriction", r"(?i)einschränkung|restriction"),
    ("portability", r"(?i)übertragbarkeit|portability"),
    ("objection", r"(?i)widerspruch|objection"),
    ("withdrawal", r"(?i)widerruf|withdraw"),
];

static RIGHT_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    RIGHTS
        .iter()
        .map(|(name, pattern)| (*name, Regex::new(pattern).expect("static regex")))
        .collect()
});

const LEGAL_BASIS: &str = "DSGVO Art. 13";

/// Privacy-policy disclosure check.
#[derive(Debug, Default)]
pub struct PrivacyCheck;

impl PrivacyCheck {
    pub fn new() -> Self {
        Self
    }

    /// Services that need their own policy section.
    fn tracked_services(services: &[ClassifiedService]) -> Vec<&ClassifiedService> {
        services
            .iter()
            .filter(|s| s.requires_consent && s.key != konform_catalog::UNCLASSIFIED_KEY)
            .collect()
    }

    /// Is the service recognizably covered by the policy text?
    fn mentioned(text_lower: &str, service: &ClassifiedService) -> bool {
        let name = service.name.to_lowercase();
        let provider = service.provider.to_lowercase();
        if text_lower.contains(&name) || (!provider.is_empty() && text_lower.contains(&provider)) {
            return true;
        }
        let parts: Vec<&str> = service
            .key
            .split('_')
            .filter(|part| part.len() > 3)
            .collect();
        !parts.is_empty() && parts.iter().all(|part| text_lower.contains(part))
    }

    fn missing_service_issue(
        ctx: &CheckContext,
        service: &ClassifiedService,
        page_url: &str,
    ) -> Issue {
        IssueDraft::new(
            Severity::Critical,
            format!("No {} section in privacy policy", service.name),
            2500,
            "DSGVO Art. 13 Abs. 1",
        )
        .with_description(format!(
            "{} ({}) was detected on the site but the privacy policy does not disclose it.",
            service.name, service.provider
        ))
        .with_locator(IssueLocator::Page {
            url: page_url.to_string(),
        })
        .with_hint(RemediationHint::ServiceSection {
            service_key: service.key.clone(),
        })
        .auto_fixable()
        .finish(&ctx.scan_id, Pillar::Privacy)
    }

    fn analyze(ctx: &CheckContext, url: &str, text: &str) -> Vec<Issue> {
        let mut issues = Vec::new();
        let locator = IssueLocator::Page {
            url: url.to_string(),
        };
        let mut push = |draft: IssueDraft| {
            issues.push(
                draft
                    .with_locator(locator.clone())
                    .finish(&ctx.scan_id, Pillar::Privacy),
            );
        };

        if !CONTROLLER.is_match(text) {
            push(
                IssueDraft::new(
                    Severity::Warning,
                    "Controller identity not stated",
                    2000,
                    "DSGVO Art. 13 Abs. 1 lit. a",
                )
                .with_description(
                    "The policy must name the controller and their contact details.",
                )
                .with_hint(RemediationHint::MissingField {
                    field: "controller".into(),
                })
                .auto_fixable(),
            );
        }

        if !PURPOSES.is_match(text) {
            push(
                IssueDraft::new(
                    Severity::Warning,
                    "Processing purposes not enumerated",
                    1500,
                    "DSGVO Art. 13 Abs. 1 lit. c",
                )
                .with_hint(RemediationHint::MissingField {
                    field: "purposes".into(),
                })
                .auto_fixable(),
            );
        }

        if !ART6.is_match(text) {
            push(
                IssueDraft::new(
                    Severity::Warning,
                    "No legal bases cited",
                    2500,
                    "DSGVO Art. 6 Abs. 1",
                )
                .with_description(
                    "Processing must cite its legal basis under GDPR Art. 6 (e.g. Art. 6 Abs. 1 lit. a).",
                )
                .with_hint(RemediationHint::MissingField {
                    field: "legal_bases".into(),
                })
                .auto_fixable(),
            );
        }

        if !RETENTION.is_match(text) {
            push(
                IssueDraft::new(
                    Severity::Warning,
                    "No retention statements",
                    1500,
                    "DSGVO Art. 13 Abs. 2 lit. a",
                )
                .with_hint(RemediationHint::MissingField {
                    field: "retention".into(),
                })
                .auto_fixable(),
            );
        }

        let missing_rights: Vec<&str> = RIGHT_PATTERNS
            .iter()
            .filter(|(_, re)| !re.is_match(text))
            .map(|(name, _)| *name)
            .collect();
        if !missing_rights.is_empty() {
            push(
                IssueDraft::new(
                    Severity::Warning,
                    "Data-subject rights incomplete",
                    2000,
                    "DSGVO Art. 13 Abs. 2 lit. b",
                )
                .with_description(format!(
                    "Rights not mentioned: {}.",
                    missing_rights.join(", ")
                ))
                .with_hint(RemediationHint::MissingField {
                    field: "rights".into(),
                })
                .auto_fixable(),
            );
        }

        if !SUPERVISORY.is_match(text) {
            push(
                IssueDraft::new(
                    Severity::Warning,
                    "Complaint right not mentioned",
                    1500,
                    "DSGVO Art. 13 Abs. 2 lit. d",
                )
                .with_description(
                    "The right to lodge a complaint with a supervisory authority must be stated.",
                )
                .with_hint(RemediationHint::MissingField {
                    field: "supervisory_authority".into(),
                })
                .auto_fixable(),
            );
        }

        issues
    }
}

#[async_trait]
impl ComplianceCheck for PrivacyCheck {
    fn pillar(&self) -> Pillar {
        Pillar::Privacy
    }

    async fn run(&self, ctx: &CheckContext) -> Result<Vec<Issue>, CheckError> {
        let services = ctx.classifier.services();
        let tracked = Self::tracked_services(&services);
        let located = ctx.locate_page(&LINK_KEYWORDS, FALLBACK_PATHS).await?;

        let Some(doc) = located else {
            tracing::debug!(url = %ctx.page.final_url, "no privacy policy found");
            let mut issues = vec![IssueDraft::new(
                Severity::Critical,
                "Missing privacy policy",
                5000,
                LEGAL_BASIS,
            )
            .with_description(
                "No privacy policy page could be found via links or well-known paths.",
            )
            .with_locator(IssueLocator::Page {
                url: ctx.page.final_url.clone(),
            })
            .missing()
            .auto_fixable()
            .finish(&ctx.scan_id, Pillar::Privacy)];

            // Detected trackers still need disclosure, policy or not
            for service in tracked {
                issues.push(Self::missing_service_issue(ctx, service, &ctx.page.final_url));
            }
            return Ok(issues);
        };

        let text = PageSnapshot::parse(&doc.body, &doc.final_url).text;
        let mut issues = Self::analyze(ctx, &doc.final_url, &text);

        let text_lower = text.to_lowercase();
        for service in tracked {
            if !Self::mentioned(&text_lower, service) {
                issues.push(Self::missing_service_issue(ctx, service, &doc.final_url));
            }
        }

        Ok(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPLETE_POLICY: &str = "Datenschutzerklärung. Verantwortliche Stelle ist die \
        Musterfirma GmbH. Zwecke der Verarbeitung: Betrieb der Website. Rechtsgrundlage ist \
        Art. 6 Abs. 1 lit. f DSGVO. Ihre Daten werden gespeichert, bis der Zweck entfällt \
        (Speicherdauer). Sie haben das Recht auf Auskunft, Berichtigung, Löschung, \
        Einschränkung der Verarbeitung, Datenübertragbarkeit, Widerspruch sowie Widerruf \
        erteilter Einwilligungen. Es besteht ein Beschwerderecht bei einer Aufsichtsbehörde.";

    #[test]
    fn test_complete_policy_battery() {
        assert!(CONTROLLER.is_match(COMPLETE_POLICY));
        assert!(ART6.is_match(COMPLETE_POLICY));
        assert!(RETENTION.is_match(COMPLETE_POLICY));
        assert!(SUPERVISORY.is_match(COMPLETE_POLICY));
        for (name, re) in RIGHT_PATTERNS.iter() {
            assert!(re.is_match(COMPLETE_POLICY), "right not found: {name}");
        }
    }

    #[test]
    fn test_art6_variants() {
        assert!(ART6.is_match("Art. 6 Abs. 1 lit. a DSGVO"));
        assert!(ART6.is_match("Art 6 DSGVO"));
        assert!(ART6.is_match("gemäß Art.6"));
        assert!(!ART6.is_match("Artikel sechs"));
    }

    #[test]
    fn test_service_mention_by_name_and_provider() {
        let service = ClassifiedService {
            key: "google_analytics_ga4".into(),
            name: "Google Analytics 4".into(),
            category: konform_catalog::ServiceCategory::Analytics,
            provider: "Google Ireland Limited".into(),
            requires_consent: true,
            block_method: konform_catalog::BlockMethod::ScriptRewrite,
            privacy_policy_url: None,
            purpose: None,
            default_retention: None,
            evidence: vec![],
            tags: vec![],
        };
        assert!(PrivacyCheck::mentioned(
            "wir nutzen google analytics 4 zur reichweitenmessung",
            &service
        ));
        assert!(PrivacyCheck::mentioned(
            "anbieter ist die google ireland limited",
            &service
        ));
        assert!(!PrivacyCheck::mentioned(
            "wir verwenden keine trackingdienste",
            &service
        ));
    }
}
