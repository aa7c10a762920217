//! Konform Fixes: Legal Text Templates
//!
//! Canonical German templates for imprint (TMG §5) and privacy policy
//! (DSGVO Art. 13/14). Unprovided company fields stay as `[PLACEHOLDER]`
//! tokens and are reported so the user knows what to fill in.

use konform_catalog::{ServiceCategory, ServiceEntry};
use konform_core::CompanyInfo;

/// A filled template plus the placeholders left open.
#[derive(Debug, Clone)]
pub struct RenderedTemplate {
    pub text: String,
    pub placeholders: Vec<String>,
}

struct Filler<'a> {
    company: &'a CompanyInfo,
    placeholders: Vec<String>,
}

impl<'a> Filler<'a> {
    fn new(company: &'a CompanyInfo) -> Self {
        Self {
            company,
            placeholders: Vec::new(),
        }
    }

    fn value(&mut self, field: &Option<String>, token: &str) -> String {
        match field.as_deref().map(str::trim) {
            Some(value) if !value.is_empty() => value.to_string(),
            _ => {
                let token = format!("[{token}]");
                if !self.placeholders.contains(&token) {
                    self.placeholders.push(token.clone());
                }
                token
            }
        }
    }
}

/// TMG §5 imprint template.
pub fn imprint_template(company: &CompanyInfo) -> RenderedTemplate {
    let mut filler = Filler::new(company);
    let name = filler.value(&company.name, "FIRMENNAME");
    let street = filler.value(&company.street, "STRASSE_HAUSNUMMER");
    let postal = filler.value(&company.postal_code, "PLZ");
    let city = filler.value(&company.city, "ORT");
    let phone = filler.value(&company.phone, "TELEFON");
    let email = filler.value(&company.email, "EMAIL");
    let vat = filler.value(&company.vat_id, "UST_ID");
    let responsible = filler.value(&company.responsible_person, "VERANTWORTLICHE_PERSON");

    let mut text = format!(
        "Impressum\n\n\
         Angaben gemäß § 5 TMG\n\n\
         {name}\n{street}\n{postal} {city}\n\n\
         Kontakt\n\
         Telefon: {phone}\n\
         E-Mail: {email}\n\n"
    );

    // Register block only when either register field was provided
    if company.register_court.is_some() || company.register_number.is_some() {
        let court = filler.value(&company.register_court, "REGISTERGERICHT");
        let number = filler.value(&company.register_number, "REGISTERNUMMER");
        text.push_str(&format!(
            "Registereintrag\n\
             Eintragung im Handelsregister.\n\
             Registergericht: {court}\n\
             Registernummer: {number}\n\n"
        ));
    }

    text.push_str(&format!(
        "Umsatzsteuer-ID\n\
         Umsatzsteuer-Identifikationsnummer gemäß § 27a Umsatzsteuergesetz:\n\
         {vat}\n\n\
         Verantwortlich für den Inhalt nach § 18 Abs. 2 MStV\n\
         {responsible}\n{street}\n{postal} {city}\n"
    ));

    RenderedTemplate {
        text,
        placeholders: filler.placeholders,
    }
}

/// Default legal basis for a service category, as cited in the policy.
pub fn service_legal_basis(category: ServiceCategory) -> &'static str {
    match category {
        ServiceCategory::Analytics | ServiceCategory::Marketing => {
            "Art. 6 Abs. 1 lit. a DSGVO (Einwilligung)"
        }
        _ => "Art. 6 Abs. 1 lit. f DSGVO (berechtigtes Interesse)",
    }
}

/// Policy paragraph for one detected service.
pub fn service_paragraph(entry: &ServiceEntry) -> String {
    let purpose = entry
        .purpose
        .as_deref()
        .unwrap_or("Bereitstellung der Funktion");
    let retention = entry
        .default_retention
        .as_deref()
        .unwrap_or("bis zum Wegfall des Zwecks");
    let mut paragraph = format!(
        "{name}\n\
         Diese Website nutzt {name} von {provider}. \
         Zweck: {purpose}. \
         Rechtsgrundlage: {basis}. \
         Speicherdauer: {retention}.",
        name = entry.name,
        provider = entry.provider,
        purpose = purpose,
        basis = service_legal_basis(entry.category),
        retention = retention,
    );
    if let Some(policy_url) = &entry.privacy_policy_url {
        paragraph.push_str(&format!(
            " Weitere Informationen: {policy_url}"
        ));
    }
    paragraph
}

/// DSGVO Art. 13/14 privacy-policy template, with one section per
/// detected service appended.
pub fn privacy_template(company: &CompanyInfo, services: &[ServiceEntry]) -> RenderedTemplate {
    let paragraphs: Vec<String> = services.iter().map(service_paragraph).collect();
    privacy_template_with_paragraphs(company, &paragraphs)
}

/// Variant taking prebuilt service paragraphs (template or enriched).
pub fn privacy_template_with_paragraphs(
    company: &CompanyInfo,
    paragraphs: &[String],
) -> RenderedTemplate {
    let mut filler = Filler::new(company);
    let name = filler.value(&company.name, "FIRMENNAME");
    let street = filler.value(&company.street, "STRASSE_HAUSNUMMER");
    let postal = filler.value(&company.postal_code, "PLZ");
    let city = filler.value(&company.city, "ORT");
    let email = filler.value(&company.email, "EMAIL");

    let mut text = format!(
        "Datenschutzerklärung\n\n\
         1. Verantwortliche Stelle\n\
         Verantwortlich für die Datenverarbeitung auf dieser Website ist:\n\
         {name}\n{street}\n{postal} {city}\n\
         E-Mail: {email}\n\n\
         2. Zwecke und Rechtsgrundlagen der Verarbeitung\n\
         Wir verarbeiten personenbezogene Daten zum Betrieb dieser Website \
         (Server-Logdateien) auf Grundlage von Art. 6 Abs. 1 lit. f DSGVO sowie \
         zu den nachfolgend genannten Zwecken auf den jeweils genannten \
         Rechtsgrundlagen.\n\n\
         3. Speicherdauer\n\
         Personenbezogene Daten werden gelöscht, sobald der Zweck der \
         Verarbeitung entfällt und keine gesetzlichen Aufbewahrungspflichten \
         entgegenstehen.\n\n\
         4. Ihre Rechte\n\
         Sie haben das Recht auf Auskunft (Art. 15 DSGVO), Berichtigung \
         (Art. 16 DSGVO), Löschung (Art. 17 DSGVO), Einschränkung der \
         Verarbeitung (Art. 18 DSGVO), Datenübertragbarkeit (Art. 20 DSGVO) \
         sowie Widerspruch gegen die Verarbeitung (Art. 21 DSGVO). Erteilte \
         Einwilligungen können Sie jederzeit mit Wirkung für die Zukunft \
         widerrufen (Art. 7 Abs. 3 DSGVO).\n\n\
         5. Beschwerderecht\n\
         Ihnen steht ein Beschwerderecht bei einer Datenschutz-Aufsichtsbehörde \
         zu (Art. 77 DSGVO).\n"
    );

    if !paragraphs.is_empty() {
        text.push_str("\n6. Eingesetzte Dienste\n");
        for paragraph in paragraphs {
            text.push('\n');
            text.push_str(paragraph);
            text.push('\n');
        }
    }

    RenderedTemplate {
        text,
        placeholders: filler.placeholders,
    }
}
