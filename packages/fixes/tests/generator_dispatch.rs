//! Integration tests for per-issue fix dispatch.

use konform_catalog::Catalog;
use konform_checks::contrast::{contrast_ratio, parse_color};
use konform_core::{
    CompanyInfo, FixType, Issue, IssueLocator, Pillar, RemediationHint, RenderMode, ScanResult,
    Severity, ValidationStatus,
};
use konform_fixes::{FixGenerator, FixedAltTextModel};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn scan_with(issues: Vec<Issue>) -> ScanResult {
    ScanResult {
        scan_id: Uuid::new_v4(),
        url: "https://www.example.com/".into(),
        user_id: Uuid::new_v4(),
        timestamp: chrono::Utc::now(),
        render_mode_used: RenderMode::Static,
        metrics: Default::default(),
        pillar_scores: BTreeMap::new(),
        overall_score: 0,
        total_risk_euro: 0,
        legal_updates_applied: false,
        legal_updates_count: 0,
        warnings: vec![],
        issues,
    }
}

fn issue(pillar: Pillar, title: &str) -> Issue {
    Issue {
        id: format!("scan:{pillar}:{title}"),
        pillar,
        severity: Severity::Critical,
        title: title.into(),
        description: String::new(),
        risk_euro: 1000,
        legal_basis: String::new(),
        auto_fixable: true,
        missing: false,
        locator: None,
        hint: None,
        legal_update_refs: vec![],
        risk_increase_reason: None,
    }
}

fn generator() -> FixGenerator {
    FixGenerator::new(Arc::new(Catalog::builtin().unwrap()))
}

#[tokio::test]
async fn test_cookie_banner_fix_three_files() {
    let mut banner_issue = issue(Pillar::Cookie, "No cookie consent banner");
    banner_issue.hint = Some(RemediationHint::ConsentGate {
        service_keys: vec!["google_analytics_ga4".into()],
    });
    let scan = scan_with(vec![banner_issue.clone()]);

    let fix = generator()
        .generate(&scan, &banner_issue, &CompanyInfo::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(fix.fix_type, FixType::Widget);
    assert_eq!(fix.validation.status, ValidationStatus::Ok);
    assert_eq!(fix.artifact.files.len(), 3);
    for name in ["cookie-banner.html", "cookie-banner.js", "cookie-banner.css"] {
        assert!(fix.artifact.files.contains_key(name), "missing {name}");
    }
    let js = &fix.artifact.files["cookie-banner.js"];
    assert!(!js.contains("eval("));
    assert!(!js.contains("new Function("));
}

#[tokio::test]
async fn test_contrast_fix_reaches_target_ratio() {
    let mut contrast_issue = issue(Pillar::Accessibility, "Insufficient color contrast");
    contrast_issue.locator = Some(IssueLocator::ColorPair {
        foreground: "#777777".into(),
        background: "#ffffff".into(),
        selector: "p.lead".into(),
    });
    contrast_issue.hint = Some(RemediationHint::SuggestedColor {
        foreground: "#595959".into(),
        ratio: 7.0,
    });
    let scan = scan_with(vec![contrast_issue.clone()]);

    let fix = generator()
        .generate(&scan, &contrast_issue, &CompanyInfo::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(fix.fix_type, FixType::Code);
    let css = &fix.artifact.files["contrast-fix.css"];
    assert!(css.contains("p.lead"));
    assert!(css.contains("#595959"));

    // Re-measure the suggested pair
    let fg = parse_color("#595959").unwrap();
    let bg = parse_color("#ffffff").unwrap();
    assert!(contrast_ratio(fg, bg) >= 4.5);
}

#[tokio::test]
async fn test_imprint_fix_placeholders_follow_company_info() {
    let imprint_issue = issue(Pillar::Imprint, "Missing imprint");
    let scan = scan_with(vec![imprint_issue.clone()]);

    let partial = CompanyInfo {
        name: Some("Musterfirma GmbH".into()),
        email: Some("info@musterfirma.de".into()),
        ..Default::default()
    };
    let fix = generator()
        .generate(&scan, &imprint_issue, &partial, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(fix.fix_type, FixType::Text);
    assert!(!fix.auto_fixable, "placeholders remain, not deployable as-is");
    assert!(fix.artifact.placeholders.contains(&"[TELEFON]".to_string()));
    let text = &fix.artifact.files["impressum.txt"];
    assert!(text.contains("Musterfirma GmbH"));
    assert!(text.contains("[STRASSE_HAUSNUMMER]"));
}

#[tokio::test]
async fn test_privacy_fix_includes_detected_services() {
    let privacy_issue = issue(Pillar::Privacy, "Missing privacy policy");
    let mut section_issue = issue(Pillar::Privacy, "No Google Analytics 4 section in privacy policy");
    section_issue.hint = Some(RemediationHint::ServiceSection {
        service_key: "google_analytics_ga4".into(),
    });
    let scan = scan_with(vec![privacy_issue.clone(), section_issue]);

    let fix = generator()
        .generate(&scan, &privacy_issue, &CompanyInfo::default(), &CancellationToken::new())
        .await
        .unwrap();

    let text = &fix.artifact.files["datenschutzerklaerung.txt"];
    assert!(text.contains("Google Analytics 4"));
    assert!(text.contains("Art. 6 Abs. 1 lit. a DSGVO"));
}

#[tokio::test]
async fn test_privacy_enrichment_degrades_to_template() {
    use async_trait::async_trait;
    use konform_core::EngineError;
    use konform_fixes::LegalTextModel;

    struct DownModel;

    #[async_trait]
    impl LegalTextModel for DownModel {
        async fn generate_legal_paragraph(
            &self,
            _service_name: &str,
            _purpose_hint: &str,
        ) -> Result<String, EngineError> {
            Err(EngineError::Dependency("enrichment feed down".into()))
        }
    }

    let privacy_issue = issue(Pillar::Privacy, "Missing privacy policy");
    let mut section_issue = issue(Pillar::Privacy, "No Google Analytics 4 section in privacy policy");
    section_issue.hint = Some(RemediationHint::ServiceSection {
        service_key: "google_analytics_ga4".into(),
    });
    let scan = scan_with(vec![privacy_issue.clone(), section_issue]);

    let fix = generator()
        .with_legal_text_model(Arc::new(DownModel))
        .generate(&scan, &privacy_issue, &CompanyInfo::default(), &CancellationToken::new())
        .await
        .unwrap();

    // Enrichment failure never fails the fix; the template paragraph lands
    assert_eq!(fix.source, konform_core::FixSource::Template);
    assert!(fix.artifact.files["datenschutzerklaerung.txt"].contains("Google Analytics 4"));
}

#[tokio::test]
async fn test_alt_text_confidence_gates_auto_fix() {
    let mut alt_issue = issue(Pillar::Accessibility, "Images missing alt text (1)");
    alt_issue.locator = Some(IssueLocator::Image {
        src: "/team.jpg".into(),
    });
    let scan = scan_with(vec![alt_issue.clone()]);

    let confident = generator().with_alt_text_model(Arc::new(FixedAltTextModel {
        text: "Teamfoto im Büro".into(),
        confidence: 0.92,
    }));
    let fix = confident
        .generate(&scan, &alt_issue, &CompanyInfo::default(), &CancellationToken::new())
        .await
        .unwrap();
    assert!(fix.auto_fixable);
    assert!(fix.artifact.explanation.contains("Teamfoto"));

    let unsure = generator().with_alt_text_model(Arc::new(FixedAltTextModel {
        text: "Bild".into(),
        confidence: 0.4,
    }));
    let fix = unsure
        .generate(&scan, &alt_issue, &CompanyInfo::default(), &CancellationToken::new())
        .await
        .unwrap();
    assert!(!fix.auto_fixable);
}

#[tokio::test]
async fn test_alt_text_without_model_degrades_to_guide() {
    let mut alt_issue = issue(Pillar::Accessibility, "Images missing alt text (1)");
    alt_issue.locator = Some(IssueLocator::Image {
        src: "/team.jpg".into(),
    });
    let scan = scan_with(vec![alt_issue.clone()]);

    let fix = generator()
        .generate(&scan, &alt_issue, &CompanyInfo::default(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(fix.fix_type, FixType::Guide);
    assert!(!fix.auto_fixable);
}

#[tokio::test]
async fn test_widget_fix_site_id_is_deterministic() {
    let widget_issue = issue(Pillar::Accessibility, "No accessibility widget");
    let scan_a = scan_with(vec![widget_issue.clone()]);
    let scan_b = scan_with(vec![widget_issue.clone()]);

    let gen = generator();
    let company = CompanyInfo::default();
    let cancel = CancellationToken::new();
    let a = gen.generate(&scan_a, &widget_issue, &company, &cancel).await.unwrap();
    let b = gen.generate(&scan_b, &widget_issue, &company, &cancel).await.unwrap();

    // Same host -> same embedded site id
    assert_eq!(
        a.artifact.files["accessibility-widget.html"],
        b.artifact.files["accessibility-widget.html"]
    );
    assert!(a.artifact.files["accessibility-widget.html"].contains("data-site-id"));
}

#[tokio::test]
async fn test_unknown_accessibility_issue_yields_guide() {
    let other = issue(Pillar::Accessibility, "Interactive elements without accessible name (3)");
    let scan = scan_with(vec![other.clone()]);
    let fix = generator()
        .generate(&scan, &other, &CompanyInfo::default(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(fix.fix_type, FixType::Guide);
    assert!(!fix.artifact.steps.is_empty());
}
