//! Konform Fixes: Per-Issue Dispatch
//!
//! Maps an issue to a concrete remediation artifact. Template-driven where
//! possible, LLM-assisted for alt text, guide fallback for everything the
//! generator cannot produce code for. Failed validation downgrades a fix
//! to a guide instead of shipping a broken artifact.

use crate::alttext::{AltTextModel, AltTextRequest, LegalTextModel, AUTO_FIX_CONFIDENCE};
use crate::banner::banner_bundle;
use crate::cssfix::{contrast_fix_css, focus_fix_css, DEFAULT_FOCUS_ACCENT};
use crate::templates::{
    imprint_template, privacy_template_with_paragraphs, service_paragraph, RenderedTemplate,
};
use crate::validate::validate_files;
use chrono::Utc;
use konform_catalog::{Catalog, ServiceEntry};
use konform_core::{
    CompanyInfo, FixArtifact, FixSource, FixType, GeneratedFix, Issue, IssueLocator, Pillar,
    RemediationHint, ScanResult,
};
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

/// Per-issue generation failures. These surface in the response's failure
/// map; they never abort the whole request.
#[derive(Debug, Error)]
pub enum FixError {
    #[error("template error: {0}")]
    Template(String),
    #[error("alt-text model failed: {0}")]
    Llm(String),
    #[error("no generator for this issue: {0}")]
    Unsupported(String),
    #[error("generation cancelled")]
    Cancelled,
}

impl FixError {
    pub fn code(&self) -> &'static str {
        match self {
            FixError::Template(_) => "template_error",
            FixError::Llm(_) => "llm_error",
            FixError::Unsupported(_) => "unsupported",
            FixError::Cancelled => "cancelled",
        }
    }
}

/// Fix generator with its collaborators wired in explicitly.
pub struct FixGenerator {
    catalog: Arc<Catalog>,
    alt_text: Option<Arc<dyn AltTextModel>>,
    /// Optional legal-text enrichment; template paragraphs otherwise
    legal_text: Option<Arc<dyn LegalTextModel>>,
    /// Bounds simultaneous outbound model calls
    llm_slots: Arc<Semaphore>,
    consent_endpoint: Option<String>,
}

impl FixGenerator {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            alt_text: None,
            legal_text: None,
            llm_slots: Arc::new(Semaphore::new(8)),
            consent_endpoint: None,
        }
    }

    pub fn with_alt_text_model(mut self, model: Arc<dyn AltTextModel>) -> Self {
        self.alt_text = Some(model);
        self
    }

    pub fn with_legal_text_model(mut self, model: Arc<dyn LegalTextModel>) -> Self {
        self.legal_text = Some(model);
        self
    }

    pub fn with_llm_concurrency(mut self, max: usize) -> Self {
        self.llm_slots = Arc::new(Semaphore::new(max.max(1)));
        self
    }

    pub fn with_consent_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.consent_endpoint = Some(endpoint.into());
        self
    }

    /// Service keys referenced by the scan's issues, deduplicated.
    fn detected_service_keys(scan: &ScanResult) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for issue in &scan.issues {
            match &issue.hint {
                Some(RemediationHint::ServiceSection { service_key }) => {
                    keys.push(service_key.clone());
                }
                Some(RemediationHint::ConsentGate { service_keys }) => {
                    keys.extend(service_keys.iter().cloned());
                }
                _ => {}
            }
        }
        keys.sort_unstable();
        keys.dedup();
        keys
    }

    fn entries_for(&self, keys: &[String]) -> Vec<ServiceEntry> {
        keys.iter().filter_map(|k| self.catalog.get(k)).collect()
    }

    /// Deterministic per-site widget id from the scanned host.
    fn site_id(url: &str) -> String {
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| url.to_string());
        let mut hasher = Sha1::new();
        hasher.update(host.as_bytes());
        hex::encode(hasher.finalize())[..16].to_string()
    }

    fn assemble(
        scan: &ScanResult,
        issue: &Issue,
        fix_type: FixType,
        source: FixSource,
        artifact: FixArtifact,
        auto_fixable: bool,
    ) -> GeneratedFix {
        let validation = validate_files(artifact.files.iter());
        if !validation.passed() {
            tracing::warn!(issue = %issue.id, "artifact failed validation, downgrading to guide");
            let diagnostic = artifact
                .files
                .iter()
                .map(|(name, content)| format!("==== {name} ====\n{content}"))
                .collect::<Vec<_>>()
                .join("\n\n");
            let downgraded = FixArtifact {
                files: BTreeMap::new(),
                explanation: artifact.explanation.clone(),
                integration: "Automatic generation failed validation; follow the steps manually."
                    .to_string(),
                placeholders: artifact.placeholders.clone(),
                estimated_time: artifact.estimated_time.clone(),
                steps: vec![
                    "Review the diagnostic artifact attached to this fix.".to_string(),
                    "Apply the intended change manually.".to_string(),
                    "Re-run the scan to confirm the issue is resolved.".to_string(),
                ],
                diagnostic: Some(diagnostic),
            };
            return GeneratedFix {
                fix_id: Uuid::new_v4(),
                scan_id: scan.scan_id,
                user_id: scan.user_id,
                issue_id: issue.id.clone(),
                category: issue.pillar,
                fix_type: FixType::Guide,
                source,
                generated_at: Utc::now(),
                artifact: downgraded,
                validation,
                auto_fixable: false,
            };
        }
        GeneratedFix {
            fix_id: Uuid::new_v4(),
            scan_id: scan.scan_id,
            user_id: scan.user_id,
            issue_id: issue.id.clone(),
            category: issue.pillar,
            fix_type,
            source,
            generated_at: Utc::now(),
            artifact,
            validation,
            auto_fixable,
        }
    }

    fn text_fix(
        scan: &ScanResult,
        issue: &Issue,
        filename: &str,
        rendered: RenderedTemplate,
        explanation: &str,
        integration: &str,
    ) -> GeneratedFix {
        let artifact = FixArtifact {
            files: BTreeMap::from([(filename.to_string(), rendered.text)]),
            explanation: explanation.to_string(),
            integration: integration.to_string(),
            placeholders: rendered.placeholders.clone(),
            estimated_time: "15 Minuten".to_string(),
            steps: Vec::new(),
            diagnostic: None,
        };
        let auto = rendered.placeholders.is_empty();
        Self::assemble(scan, issue, FixType::Text, FixSource::Template, artifact, auto)
    }

    fn imprint_fix(&self, scan: &ScanResult, issue: &Issue, company: &CompanyInfo) -> GeneratedFix {
        Self::text_fix(
            scan,
            issue,
            "impressum.txt",
            imprint_template(company),
            "Complete imprint text per TMG §5, filled with your company profile.",
            "Publish the text on a page reachable as /impressum and link it from the footer.",
        )
    }

    async fn privacy_fix(
        &self,
        scan: &ScanResult,
        issue: &Issue,
        company: &CompanyInfo,
    ) -> GeneratedFix {
        let services = self.entries_for(&Self::detected_service_keys(scan));

        let mut enriched = false;
        let mut paragraphs = Vec::with_capacity(services.len());
        for entry in &services {
            let template = service_paragraph(entry);
            match &self.legal_text {
                Some(model) => {
                    let purpose = entry.purpose.as_deref().unwrap_or("");
                    match model.generate_legal_paragraph(&entry.name, purpose).await {
                        Ok(text) if !text.trim().is_empty() => {
                            enriched = true;
                            paragraphs.push(text);
                        }
                        Ok(_) => paragraphs.push(template),
                        Err(err) => {
                            tracing::debug!(
                                service = %entry.key,
                                error = %err,
                                "legal-text enrichment unavailable, template paragraph used"
                            );
                            paragraphs.push(template);
                        }
                    }
                }
                None => paragraphs.push(template),
            }
        }

        let rendered = privacy_template_with_paragraphs(company, &paragraphs);
        let auto = rendered.placeholders.is_empty();
        let artifact = FixArtifact {
            files: BTreeMap::from([("datenschutzerklaerung.txt".to_string(), rendered.text)]),
            explanation: "Privacy policy per DSGVO Art. 13/14 including a section for every \
                          detected service."
                .to_string(),
            integration: "Publish the text on a page reachable as /datenschutz and link it \
                          from the footer."
                .to_string(),
            placeholders: rendered.placeholders,
            estimated_time: "15 Minuten".to_string(),
            steps: Vec::new(),
            diagnostic: None,
        };
        let source = if enriched {
            FixSource::Hybrid
        } else {
            FixSource::Template
        };
        Self::assemble(scan, issue, FixType::Text, source, artifact, auto)
    }

    fn cookie_fix(&self, scan: &ScanResult, issue: &Issue) -> GeneratedFix {
        let keys = match &issue.hint {
            Some(RemediationHint::ConsentGate { service_keys }) => service_keys.clone(),
            _ => Self::detected_service_keys(scan),
        };
        let services = self.entries_for(&keys);
        let files = banner_bundle(&services, self.consent_endpoint.as_deref());
        let artifact = FixArtifact {
            files,
            explanation: "Consent banner with equal accept/reject prominence, category \
                          toggles and conditional activation of the detected services."
                .to_string(),
            integration: "Include cookie-banner.css and cookie-banner.js on every page, paste \
                          the cookie-banner.html markup before </body>, and change blocked \
                          script tags to type=\"text/plain\" with data-konform-service set."
                .to_string(),
            placeholders: Vec::new(),
            estimated_time: "30 Minuten".to_string(),
            steps: Vec::new(),
            diagnostic: None,
        };
        Self::assemble(scan, issue, FixType::Widget, FixSource::Template, artifact, true)
    }

    async fn alt_text_fix(
        &self,
        scan: &ScanResult,
        issue: &Issue,
        cancel: &CancellationToken,
    ) -> Result<GeneratedFix, FixError> {
        let Some(model) = &self.alt_text else {
            return Ok(Self::guide_fix(
                scan,
                issue,
                "No alt-text model configured; write the alt attributes manually.",
            ));
        };
        let src = match &issue.locator {
            Some(IssueLocator::Image { src }) => src.as_str(),
            _ => {
                return Err(FixError::Unsupported(
                    "alt-text fix requires an image locator".into(),
                ))
            }
        };

        let _permit = tokio::select! {
            _ = cancel.cancelled() => return Err(FixError::Cancelled),
            permit = self.llm_slots.clone().acquire_owned() => {
                permit.map_err(|_| FixError::Llm("model slots closed".into()))?
            }
        };

        let request = AltTextRequest {
            image_url: src,
            surrounding_text: &issue.description,
            page_title: &scan.url,
        };
        let suggestion = tokio::select! {
            _ = cancel.cancelled() => return Err(FixError::Cancelled),
            result = model.generate_alt_text(&request) => match result {
                Ok(s) => s,
                Err(err) => {
                    tracing::warn!(error = %err, "alt-text model failed, degrading to guide");
                    return Ok(Self::guide_fix(
                        scan,
                        issue,
                        "The alt-text model was unavailable; write the alt attributes manually.",
                    ));
                }
            },
        };

        let auto = suggestion.confidence >= AUTO_FIX_CONFIDENCE;
        let artifact = FixArtifact {
            files: BTreeMap::from([(
                "alt-text.txt".to_string(),
                format!("{src}\nalt=\"{}\"", suggestion.text),
            )]),
            explanation: format!(
                "Suggested alt text (model confidence {:.2}): \"{}\"",
                suggestion.confidence, suggestion.text
            ),
            integration: "Set the alt attribute of the listed image to the suggested text."
                .to_string(),
            placeholders: Vec::new(),
            estimated_time: "5 Minuten".to_string(),
            steps: Vec::new(),
            diagnostic: None,
        };
        Ok(Self::assemble(
            scan,
            issue,
            FixType::Text,
            FixSource::Llm,
            artifact,
            auto,
        ))
    }

    fn contrast_fix(scan: &ScanResult, issue: &Issue) -> Result<GeneratedFix, FixError> {
        let Some(RemediationHint::SuggestedColor { foreground, ratio }) = &issue.hint else {
            return Err(FixError::Unsupported("contrast fix requires a color hint".into()));
        };
        let selector = match &issue.locator {
            Some(IssueLocator::ColorPair { selector, .. }) => selector.clone(),
            _ => "body".to_string(),
        };
        let artifact = FixArtifact {
            files: BTreeMap::from([(
                "contrast-fix.css".to_string(),
                contrast_fix_css(&selector, foreground),
            )]),
            explanation: format!(
                "Overrides the foreground of {selector} with {foreground} \
                 (contrast ratio {ratio:.2})."
            ),
            integration: "Load contrast-fix.css after your existing stylesheets.".to_string(),
            placeholders: Vec::new(),
            estimated_time: "5 Minuten".to_string(),
            steps: Vec::new(),
            diagnostic: None,
        };
        Ok(Self::assemble(
            scan,
            issue,
            FixType::Code,
            FixSource::Template,
            artifact,
            true,
        ))
    }

    fn focus_fix(scan: &ScanResult, issue: &Issue) -> GeneratedFix {
        let artifact = FixArtifact {
            files: BTreeMap::from([(
                "focus-visible.css".to_string(),
                focus_fix_css(DEFAULT_FOCUS_ACCENT),
            )]),
            explanation: "Restores a visible focus indicator for keyboard navigation."
                .to_string(),
            integration: "Load focus-visible.css after your existing stylesheets and remove \
                          the outline suppression where feasible."
                .to_string(),
            placeholders: Vec::new(),
            estimated_time: "5 Minuten".to_string(),
            steps: Vec::new(),
            diagnostic: None,
        };
        Self::assemble(scan, issue, FixType::Code, FixSource::Template, artifact, true)
    }

    fn widget_fix(scan: &ScanResult, issue: &Issue) -> GeneratedFix {
        let site_id = Self::site_id(&scan.url);
        let snippet = format!(
            "<script src=\"https://widget.konform-scan.de/a11y.js\" \
             data-site-id=\"{site_id}\" defer></script>\n"
        );
        let artifact = FixArtifact {
            files: BTreeMap::from([("accessibility-widget.html".to_string(), snippet)]),
            explanation: "Loads the accessibility widget (contrast modes, font scaling, \
                          keyboard aids) with your per-site id."
                .to_string(),
            integration: "Paste the snippet before </body> on every page.".to_string(),
            placeholders: Vec::new(),
            estimated_time: "5 Minuten".to_string(),
            steps: Vec::new(),
            diagnostic: None,
        };
        Self::assemble(scan, issue, FixType::Code, FixSource::Template, artifact, true)
    }

    fn guide_fix(scan: &ScanResult, issue: &Issue, note: &str) -> GeneratedFix {
        let artifact = FixArtifact {
            files: BTreeMap::new(),
            explanation: format!("Manual remediation for: {}", issue.title),
            integration: note.to_string(),
            placeholders: Vec::new(),
            estimated_time: "variabel".to_string(),
            steps: vec![
                issue.description.clone(),
                format!("Legal basis: {}", issue.legal_basis),
                "Apply the change and re-run the scan.".to_string(),
            ],
            diagnostic: None,
        };
        Self::assemble(scan, issue, FixType::Guide, FixSource::Template, artifact, false)
    }

    fn accessibility_fix(
        &self,
        scan: &ScanResult,
        issue: &Issue,
    ) -> Option<Result<GeneratedFix, FixError>> {
        match (&issue.hint, &issue.locator) {
            (Some(RemediationHint::SuggestedColor { .. }), _) => {
                Some(Self::contrast_fix(scan, issue))
            }
            (_, Some(IssueLocator::Image { .. })) => None, // async path
            _ if issue.title.starts_with("Focus outline removed") => {
                Some(Ok(Self::focus_fix(scan, issue)))
            }
            _ if issue.title == "No accessibility widget" => {
                Some(Ok(Self::widget_fix(scan, issue)))
            }
            _ => Some(Ok(Self::guide_fix(
                scan,
                issue,
                "No automated artifact exists for this finding.",
            ))),
        }
    }

    /// Generate one fix for one issue.
    pub async fn generate(
        &self,
        scan: &ScanResult,
        issue: &Issue,
        company: &CompanyInfo,
        cancel: &CancellationToken,
    ) -> Result<GeneratedFix, FixError> {
        if cancel.is_cancelled() {
            return Err(FixError::Cancelled);
        }
        let fix = match issue.pillar {
            Pillar::Imprint => self.imprint_fix(scan, issue, company),
            Pillar::Privacy => self.privacy_fix(scan, issue, company).await,
            Pillar::Cookie => self.cookie_fix(scan, issue),
            Pillar::Accessibility => match self.accessibility_fix(scan, issue) {
                Some(result) => result?,
                None => self.alt_text_fix(scan, issue, cancel).await?,
            },
        };
        tracing::info!(
            issue = %issue.id,
            fix = %fix.fix_id,
            fix_type = ?fix.fix_type,
            "fix generated"
        );
        Ok(fix)
    }
}

impl std::fmt::Debug for FixGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixGenerator")
            .field("catalog", &self.catalog.len())
            .field("alt_text", &self.alt_text.is_some())
            .finish()
    }
}
