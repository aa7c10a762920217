//! Konform Checks: Imprint (TMG §5)
//!
//! Locates the imprint page via footer links or well-known paths and runs
//! the provider-disclosure battery: name, serviceable address, contact
//! channels, register entry, VAT id, responsible person.

use crate::context::{CheckContext, CheckError, ComplianceCheck, IssueDraft};
use async_trait::async_trait;
use konform_core::{Issue, IssueLocator, Pillar, RemediationHint, Severity};
use konform_fetch::PageSnapshot;
use once_cell::sync::Lazy;
use regex::Regex;

static LINK_KEYWORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)impressum|imprint|legal\s*notice").expect("static regex"));

const FALLBACK_PATHS: &[&str] = &["/impressum", "/legal", "/imprint"];

static STREET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[a-zäöüß\.\-]+(straße|strasse|str\.|weg|allee|platz|gasse|ring|damm|ufer)\s*\.?\s*\d+\s*[a-z]?\b")
        .expect("static regex")
});
static POSTAL_CITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{5}\s+[A-ZÄÖÜ][a-zäöüß\-]+").expect("static regex"));
static PO_BOX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)postfach").expect("static regex"));
static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").expect("static regex")
});
static PHONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(tel(efon)?|phone|fon)\s*\.?\s*:?\s*\+?[\d\s/\-()]{5,}|\+49[\d\s/\-()]{5,}")
        .expect("static regex")
});
static LEGAL_FORM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(GmbH|AG|UG|KG|OHG|GbR)\b|e\.\s?K\.|e\.\s?V\.").expect("static regex")
});
static PERSONAL_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-ZÄÖÜ][a-zäöüß]+\s+[A-ZÄÖÜ][a-zäöüß]+\b").expect("static regex")
});
static REGISTER_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(HRB|HRA|GnR|VR)\s*\.?\s*\d+").expect("static regex"));
static REGISTER_COURT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)amtsgericht|registergericht|handelsregister").expect("static regex")
});
static VAT_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bDE\s?\d{9}\b").expect("static regex"));
static RESPONSIBLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)verantwortlich|v\.\s*i\.\s*s\.\s*d\.\s*p").expect("static regex")
});

const LEGAL_BASIS: &str = "TMG §5 Abs. 1";

/// Provider-disclosure check.
#[derive(Debug, Default)]
pub struct ImprintCheck;

impl ImprintCheck {
    pub fn new() -> Self {
        Self
    }

    /// Field battery on a located imprint page.
    fn analyze(ctx: &CheckContext, url: &str, text: &str) -> Vec<Issue> {
        let mut issues = Vec::new();
        let locator = IssueLocator::Page {
            url: url.to_string(),
        };
        let mut push = |draft: IssueDraft| {
            issues.push(
                draft
                    .with_locator(locator.clone())
                    .finish(&ctx.scan_id, Pillar::Imprint),
            );
        };

        let has_street = STREET.is_match(text);
        let has_postal = POSTAL_CITY.is_match(text);
        let has_po_box = PO_BOX.is_match(text);

        if !LEGAL_FORM.is_match(text) && !PERSONAL_NAME.is_match(text) {
            push(
                IssueDraft::new(Severity::Warning, "Missing provider name", 1000, LEGAL_BASIS)
                    .with_description(
                        "The imprint does not state a company or personal name of the provider.",
                    )
                    .with_hint(RemediationHint::MissingField {
                        field: "name".into(),
                    })
                    .auto_fixable(),
            );
        }

        if has_po_box && !has_street {
            push(
                IssueDraft::new(
                    Severity::Critical,
                    "PO box given as sole address",
                    2000,
                    LEGAL_BASIS,
                )
                .with_description(
                    "A PO box is not a serviceable address (ladungsfähige Anschrift). \
                     Street, house number, postal code and city are required.",
                )
                .with_hint(RemediationHint::MissingField {
                    field: "street".into(),
                })
                .auto_fixable(),
            );
        } else if !has_street || !has_postal {
            push(
                IssueDraft::new(
                    Severity::Warning,
                    "Missing serviceable address",
                    2000,
                    LEGAL_BASIS,
                )
                .with_description(
                    "No complete postal address (street, house number, postal code, city) found.",
                )
                .with_hint(RemediationHint::MissingField {
                    field: "address".into(),
                })
                .auto_fixable(),
            );
        }

        if !EMAIL.is_match(text) {
            push(
                IssueDraft::new(Severity::Warning, "Missing email address", 1000, LEGAL_BASIS)
                    .with_description("The imprint must provide an email address for fast contact.")
                    .with_hint(RemediationHint::MissingField {
                        field: "email".into(),
                    })
                    .auto_fixable(),
            );
        }

        if !PHONE.is_match(text) {
            push(
                IssueDraft::new(Severity::Warning, "Missing phone number", 1500, LEGAL_BASIS)
                    .with_description("No phone number found on the imprint page.")
                    .with_hint(RemediationHint::MissingField {
                        field: "phone".into(),
                    })
                    .auto_fixable(),
            );
        }

        // Register entry only where the legal form implies one
        if LEGAL_FORM.is_match(text)
            && !(REGISTER_NUMBER.is_match(text) && REGISTER_COURT.is_match(text))
        {
            push(
                IssueDraft::new(
                    Severity::Warning,
                    "Missing commercial register entry",
                    1000,
                    LEGAL_BASIS,
                )
                .with_description(
                    "The stated legal form requires register court and register number.",
                )
                .with_hint(RemediationHint::MissingField {
                    field: "register".into(),
                })
                .auto_fixable(),
            );
        }

        if !VAT_ID.is_match(text) {
            push(
                IssueDraft::new(
                    Severity::Warning,
                    "Missing VAT identification number",
                    500,
                    "UStG §27a",
                )
                .with_description(
                    "No VAT id (format DE followed by nine digits) found. Required if one is assigned.",
                )
                .with_hint(RemediationHint::MissingField {
                    field: "vat_id".into(),
                })
                .auto_fixable(),
            );
        }

        if !RESPONSIBLE.is_match(text) {
            push(
                IssueDraft::new(
                    Severity::Warning,
                    "Missing responsible person",
                    500,
                    "MStV §18 Abs. 2",
                )
                .with_description(
                    "No person responsible for content (V.i.S.d.P.) is named.",
                )
                .with_hint(RemediationHint::MissingField {
                    field: "responsible_person".into(),
                })
                .auto_fixable(),
            );
        }

        issues
    }
}

#[async_trait]
impl ComplianceCheck for ImprintCheck {
    fn pillar(&self) -> Pillar {
        Pillar::Imprint
    }

    async fn run(&self, ctx: &CheckContext) -> Result<Vec<Issue>, CheckError> {
        let located = ctx.locate_page(&LINK_KEYWORDS, FALLBACK_PATHS).await?;

        let Some(doc) = located else {
            tracing::debug!(url = %ctx.page.final_url, "no imprint page found");
            return Ok(vec![IssueDraft::new(
                Severity::Critical,
                "Missing imprint",
                3000,
                LEGAL_BASIS,
            )
            .with_description(
                "No imprint page could be found via links or well-known paths. \
                 German commercial sites must provide one.",
            )
            .with_locator(IssueLocator::Page {
                url: ctx.page.final_url.clone(),
            })
            .missing()
            .auto_fixable()
            .finish(&ctx.scan_id, Pillar::Imprint)]);
        };

        let text = PageSnapshot::parse(&doc.body, &doc.final_url).text;
        Ok(Self::analyze(ctx, &doc.final_url, &text))
    }
}
