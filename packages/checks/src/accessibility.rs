//! Konform Checks: Accessibility (BFSG / WCAG 2.1 AA)
//!
//! Fixed battery: image alt text, color contrast, focus visibility,
//! keyboard reachability, widget presence and ARIA labelling. Static
//! heuristics over the normalized snapshot; rendered scans feed the same
//! battery a hydrated DOM.

use crate::context::{CheckContext, CheckError, ComplianceCheck, IssueDraft};
use crate::contrast::{
    contrast_ratio, required_ratio, suggest_foreground, Rgb, RATIO_SUGGESTION_LARGE,
    RATIO_SUGGESTION_NORMAL,
};
use crate::cssscan::{color_pairs, focus_suppressions, inline_color_pair};
use async_trait::async_trait;
use konform_core::{Issue, IssueLocator, Pillar, RemediationHint, Severity};
use std::collections::HashSet;

const LEGAL_BASIS: &str = "BFSG §3, WCAG 2.1 AA";

/// Risk per image without alt text, and the aggregate cap.
const ALT_RISK_PER_IMAGE: u32 = 500;
const ALT_RISK_CAP: u32 = 2500;
/// Risk per failing contrast pair; the pair count is capped so the pillar
/// total stays within 6000.
const CONTRAST_RISK_PER_PAIR: u32 = 1500;
const CONTRAST_MAX_PAIRS: usize = 4;

/// One contrast finding before issue conversion.
#[derive(Debug)]
struct ContrastFinding {
    selector: String,
    foreground: Rgb,
    background: Rgb,
    ratio: f64,
    large_text: bool,
}

/// Accessibility battery.
#[derive(Debug, Default)]
pub struct AccessibilityCheck;

impl AccessibilityCheck {
    pub fn new() -> Self {
        Self
    }

    fn alt_text_issue(ctx: &CheckContext) -> Option<Issue> {
        let missing: Vec<&str> = ctx
            .snapshot
            .images
            .iter()
            .filter(|img| !img.decorative())
            .filter(|img| img.alt.as_deref().map(str::trim).unwrap_or("").is_empty())
            .map(|img| img.src.as_str())
            .collect();
        if missing.is_empty() {
            return None;
        }

        let examples: Vec<&str> = missing.iter().take(5).copied().collect();
        let risk = (ALT_RISK_PER_IMAGE * missing.len() as u32).min(ALT_RISK_CAP);
        Some(
            IssueDraft::new(
                Severity::Info,
                format!("Images missing alt text ({})", missing.len()),
                risk,
                LEGAL_BASIS,
            )
            .with_description(format!(
                "{} image(s) carry no alternative text. Examples: {}",
                missing.len(),
                examples.join(", ")
            ))
            .with_locator(IssueLocator::Image {
                src: missing[0].to_string(),
            })
            .auto_fixable()
            .finish(&ctx.scan_id, Pillar::Accessibility),
        )
    }

    fn contrast_findings(ctx: &CheckContext) -> Vec<ContrastFinding> {
        let mut findings = Vec::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();

        for fragment in &ctx.snapshot.styled_fragments {
            if fragment.text_sample.trim().is_empty() {
                continue;
            }
            if let Some((fg, bg, large)) = inline_color_pair(&fragment.style) {
                if seen.insert((fg.to_hex(), bg.to_hex())) {
                    findings.push(ContrastFinding {
                        selector: fragment.selector_hint.clone(),
                        foreground: fg,
                        background: bg,
                        ratio: contrast_ratio(fg, bg),
                        large_text: large,
                    });
                }
            }
        }

        for source in &ctx.snapshot.css_sources {
            for pair in color_pairs(&source.text) {
                if seen.insert((pair.foreground.to_hex(), pair.background.to_hex())) {
                    findings.push(ContrastFinding {
                        selector: pair.selector,
                        foreground: pair.foreground,
                        background: pair.background,
                        ratio: contrast_ratio(pair.foreground, pair.background),
                        large_text: pair.large_text,
                    });
                }
            }
        }

        findings.retain(|f| f.ratio < required_ratio(f.large_text));
        findings
    }

    fn contrast_issues(ctx: &CheckContext) -> Vec<Issue> {
        let findings = Self::contrast_findings(ctx);
        let total = findings.len();
        findings
            .into_iter()
            .take(CONTRAST_MAX_PAIRS)
            .enumerate()
            .map(|(index, finding)| {
                let target = if finding.large_text {
                    RATIO_SUGGESTION_LARGE
                } else {
                    RATIO_SUGGESTION_NORMAL
                };
                let suggestion = suggest_foreground(finding.foreground, finding.background, target);
                let mut description = format!(
                    "Text in {} has a contrast ratio of {:.2} ({} on {}), below the required {:.1}:1.",
                    finding.selector,
                    finding.ratio,
                    finding.foreground.to_hex(),
                    finding.background.to_hex(),
                    required_ratio(finding.large_text),
                );
                if index == CONTRAST_MAX_PAIRS - 1 && total > CONTRAST_MAX_PAIRS {
                    description.push_str(&format!(
                        " {} further low-contrast pair(s) not listed.",
                        total - CONTRAST_MAX_PAIRS
                    ));
                }
                let mut draft = IssueDraft::new(
                    Severity::Warning,
                    format!(
                        "Insufficient color contrast ({} on {})",
                        finding.foreground.to_hex(),
                        finding.background.to_hex()
                    ),
                    CONTRAST_RISK_PER_PAIR,
                    LEGAL_BASIS,
                )
                .with_description(description)
                .with_locator(IssueLocator::ColorPair {
                    foreground: finding.foreground.to_hex(),
                    background: finding.background.to_hex(),
                    selector: finding.selector.clone(),
                });
                if let Some(suggested) = suggestion {
                    draft = draft
                        .with_hint(RemediationHint::SuggestedColor {
                            foreground: suggested.to_hex(),
                            ratio: contrast_ratio(suggested, finding.background),
                        })
                        .auto_fixable();
                }
                draft.finish(&ctx.scan_id, Pillar::Accessibility)
            })
            .collect()
    }

    fn focus_issues(ctx: &CheckContext) -> Vec<Issue> {
        ctx.snapshot
            .css_sources
            .iter()
            .flat_map(|source| focus_suppressions(&source.text))
            .map(|rule| {
                IssueDraft::new(
                    Severity::Critical,
                    format!("Focus outline removed on {}", rule.selector),
                    1500,
                    LEGAL_BASIS,
                )
                .with_description(
                    "The rule disables the focus outline without providing a replacement \
                     focus style, leaving keyboard users without orientation.",
                )
                .with_locator(IssueLocator::Selector {
                    selector: rule.selector,
                })
                .auto_fixable()
                .finish(&ctx.scan_id, Pillar::Accessibility)
            })
            .collect()
    }

    fn keyboard_issue(ctx: &CheckContext) -> Option<Issue> {
        let removed: Vec<&str> = ctx
            .snapshot
            .interactive
            .iter()
            .filter(|el| el.tabindex == Some(-1))
            .map(|el| el.selector_hint.as_str())
            .collect();
        if removed.is_empty() {
            return None;
        }
        Some(
            IssueDraft::new(
                Severity::Warning,
                format!("Interactive elements removed from tab order ({})", removed.len()),
                500,
                LEGAL_BASIS,
            )
            .with_description(format!(
                "{} interactive element(s) carry tabindex=\"-1\" and cannot be reached by \
                 keyboard: {}",
                removed.len(),
                removed.iter().take(5).copied().collect::<Vec<_>>().join(", ")
            ))
            .with_locator(IssueLocator::Selector {
                selector: removed[0].to_string(),
            })
            .finish(&ctx.scan_id, Pillar::Accessibility),
        )
    }

    fn widget_issue(ctx: &CheckContext) -> Option<Issue> {
        let services = ctx.classifier.services();
        if services.iter().any(|s| s.has_tag("accessibility_widget")) {
            return None;
        }
        Some(
            IssueDraft::new(
                Severity::Critical,
                "No accessibility widget",
                8000,
                "BFSG §3 Abs. 1",
            )
            .with_description(
                "No assistive overlay/widget was detected. Sites in scope of the BFSG must \
                 provide accessibility aids from June 2025.",
            )
            .with_locator(IssueLocator::Page {
                url: ctx.page.final_url.clone(),
            })
            .missing()
            .auto_fixable()
            .finish(&ctx.scan_id, Pillar::Accessibility),
        )
    }

    fn aria_issue(ctx: &CheckContext) -> Option<Issue> {
        let unnamed: Vec<&str> = ctx
            .snapshot
            .interactive
            .iter()
            .filter(|el| el.input_type.as_deref() != Some("hidden"))
            .filter(|el| {
                matches!(
                    el.tag.as_str(),
                    "a" | "button" | "input" | "select" | "textarea"
                ) || el.role.as_deref() == Some("button")
            })
            .filter(|el| !el.has_accessible_name())
            .map(|el| el.selector_hint.as_str())
            .collect();
        if unnamed.is_empty() {
            return None;
        }
        let risk = if unnamed.len() > 5 { 1500 } else { 1000 };
        Some(
            IssueDraft::new(
                Severity::Warning,
                format!("Interactive elements without accessible name ({})", unnamed.len()),
                risk,
                LEGAL_BASIS,
            )
            .with_description(format!(
                "{} element(s) expose no text, aria-label, aria-labelledby or associated \
                 label: {}",
                unnamed.len(),
                unnamed.iter().take(5).copied().collect::<Vec<_>>().join(", ")
            ))
            .with_locator(IssueLocator::Selector {
                selector: unnamed[0].to_string(),
            })
            .finish(&ctx.scan_id, Pillar::Accessibility),
        )
    }
}

#[async_trait]
impl ComplianceCheck for AccessibilityCheck {
    fn pillar(&self) -> Pillar {
        Pillar::Accessibility
    }

    async fn run(&self, ctx: &CheckContext) -> Result<Vec<Issue>, CheckError> {
        let mut issues = Vec::new();
        issues.extend(Self::alt_text_issue(ctx));
        issues.extend(Self::contrast_issues(ctx));
        issues.extend(Self::focus_issues(ctx));
        issues.extend(Self::keyboard_issue(ctx));
        issues.extend(Self::widget_issue(ctx));
        issues.extend(Self::aria_issue(ctx));
        Ok(issues)
    }
}
