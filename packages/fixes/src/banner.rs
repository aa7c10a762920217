//! Konform Fixes: Cookie Banner Bundle
//!
//! Emits a three-file consent widget: first-visit modal with equally
//! prominent accept/reject, category toggles (necessary pre-checked and
//! disabled), persisted consent keyed on a random visitor id, a settings
//! reopener and per-service conditional activation following the blocking
//! recipe of each matched service.

use konform_catalog::{BlockMethod, ServiceEntry};
use serde::Serialize;
use std::collections::BTreeMap;

/// Service descriptor embedded into the banner script.
#[derive(Debug, Serialize)]
struct BannerService<'a> {
    key: &'a str,
    name: &'a str,
    category: &'a str,
    method: &'a str,
}

fn method_tag(method: BlockMethod) -> &'static str {
    match method {
        BlockMethod::ScriptRewrite => "script_rewrite",
        BlockMethod::IframePlaceholder => "iframe_placeholder",
        BlockMethod::NoBlocking => "no_blocking",
    }
}

fn category_tag(entry: &ServiceEntry) -> &'static str {
    match entry.category {
        konform_catalog::ServiceCategory::Necessary => "necessary",
        konform_catalog::ServiceCategory::Functional => "functional",
        konform_catalog::ServiceCategory::Analytics => "analytics",
        konform_catalog::ServiceCategory::Marketing => "marketing",
    }
}

const BANNER_HTML: &str = r#"<div id="konform-consent" class="konform-consent" role="dialog" aria-modal="true" aria-labelledby="konform-consent-title" hidden>
  <div class="konform-consent__box">
    <h2 id="konform-consent-title">Wir verwenden Cookies</h2>
    <p>
      Einige Cookies sind für den Betrieb der Seite notwendig. Andere helfen uns,
      die Seite zu verbessern oder Inhalte zu personalisieren. Sie können Ihre
      Auswahl jederzeit über "Cookie-Einstellungen" ändern.
    </p>
    <div class="konform-consent__categories">
      <label><input type="checkbox" data-category="necessary" checked disabled> Notwendig</label>
      <label><input type="checkbox" data-category="functional"> Funktional</label>
      <label><input type="checkbox" data-category="analytics"> Statistik</label>
      <label><input type="checkbox" data-category="marketing"> Marketing</label>
    </div>
    <div class="konform-consent__actions">
      <button type="button" class="konform-consent__btn" data-action="accept-all">Alle akzeptieren</button>
      <button type="button" class="konform-consent__btn" data-action="reject-all">Alle ablehnen</button>
      <button type="button" class="konform-consent__btn konform-consent__btn--ghost" data-action="save">Auswahl speichern</button>
    </div>
  </div>
</div>
<button type="button" id="konform-consent-reopen" class="konform-consent__reopen" hidden>Cookie-Einstellungen</button>
"#;

const BANNER_CSS: &str = r#".konform-consent {
  position: fixed;
  inset: 0;
  display: flex;
  align-items: center;
  justify-content: center;
  background: rgba(17, 24, 39, 0.6);
  z-index: 99999;
}
.konform-consent[hidden] { display: none; }
.konform-consent__box {
  background: #ffffff;
  color: #111827;
  max-width: 480px;
  width: calc(100% - 2rem);
  padding: 1.5rem;
  border-radius: 8px;
  box-shadow: 0 10px 30px rgba(0, 0, 0, 0.25);
  font-family: system-ui, sans-serif;
}
.konform-consent__categories {
  display: grid;
  gap: 0.5rem;
  margin: 1rem 0;
}
.konform-consent__actions {
  display: flex;
  flex-wrap: wrap;
  gap: 0.5rem;
}
.konform-consent__btn {
  flex: 1 1 auto;
  padding: 0.6rem 1rem;
  font-size: 1rem;
  border: 1px solid #1d4ed8;
  border-radius: 6px;
  background: #1d4ed8;
  color: #ffffff;
  cursor: pointer;
}
.konform-consent__btn--ghost {
  background: #ffffff;
  color: #1d4ed8;
}
.konform-consent__btn:focus-visible {
  outline: 3px solid #93c5fd;
  outline-offset: 2px;
}
.konform-consent__reopen {
  position: fixed;
  left: 1rem;
  bottom: 1rem;
  padding: 0.4rem 0.8rem;
  border-radius: 6px;
  border: 1px solid #d1d5db;
  background: #ffffff;
  cursor: pointer;
  z-index: 99998;
}
.konform-iframe-placeholder {
  display: flex;
  align-items: center;
  justify-content: center;
  min-height: 180px;
  background: #f3f4f6;
  border: 1px dashed #9ca3af;
  border-radius: 6px;
  cursor: pointer;
  font-family: system-ui, sans-serif;
}
"#;

/// Build the banner script with the matched services baked in.
fn banner_js(services_json: &str, consent_endpoint: Option<&str>) -> String {
    let endpoint = consent_endpoint.unwrap_or("");
    format!(
        r#"(function () {{
  "use strict";

  var SERVICES = {services_json};
  var STORAGE_KEY = "konform_consent";
  var ENDPOINT = "{endpoint}";
  var CATEGORIES = ["necessary", "functional", "analytics", "marketing"];

  function randomId() {{
    var bytes = new Uint8Array(16);
    (window.crypto || window.msCrypto).getRandomValues(bytes);
    return Array.prototype.map
      .call(bytes, function (b) {{ return ("0" + b.toString(16)).slice(-2); }})
      .join("");
  }}

  function loadConsent() {{
    try {{
      var raw = window.localStorage.getItem(STORAGE_KEY);
      return raw ? JSON.parse(raw) : null;
    }} catch (err) {{
      return null;
    }}
  }}

  function saveConsent(categories) {{
    var existing = loadConsent();
    var consent = {{
      visitorId: existing && existing.visitorId ? existing.visitorId : randomId(),
      categories: categories,
      updatedAt: new Date().toISOString()
    }};
    window.localStorage.setItem(STORAGE_KEY, JSON.stringify(consent));
    sendReceipt(consent);
    return consent;
  }}

  function sendReceipt(consent) {{
    if (!ENDPOINT || !window.fetch) {{ return; }}
    try {{
      window.fetch(ENDPOINT, {{
        method: "POST",
        headers: {{ "Content-Type": "application/json" }},
        body: JSON.stringify(consent),
        keepalive: true
      }});
    }} catch (err) {{ /* receipts are best effort */ }}
  }}

  function allowed(consent, category) {{
    if (category === "necessary") {{ return true; }}
    return !!(consent && consent.categories && consent.categories.indexOf(category) !== -1);
  }}

  function activateScripts(service) {{
    var blocked = document.querySelectorAll(
      'script[type="text/plain"][data-konform-service="' + service.key + '"]'
    );
    Array.prototype.forEach.call(blocked, function (node) {{
      var script = document.createElement("script");
      if (node.dataset.src) {{ script.src = node.dataset.src; }}
      script.text = node.text || "";
      node.parentNode.replaceChild(script, node);
    }});
  }}

  function activateIframes(service) {{
    var placeholders = document.querySelectorAll(
      '.konform-iframe-placeholder[data-konform-service="' + service.key + '"]'
    );
    Array.prototype.forEach.call(placeholders, function (node) {{
      var iframe = document.createElement("iframe");
      iframe.src = node.dataset.src;
      iframe.width = node.dataset.width || "560";
      iframe.height = node.dataset.height || "315";
      iframe.setAttribute("frameborder", "0");
      node.parentNode.replaceChild(iframe, node);
    }});
  }}

  function applyConsent(consent) {{
    SERVICES.forEach(function (service) {{
      if (!allowed(consent, service.category)) {{ return; }}
      if (service.method === "script_rewrite") {{ activateScripts(service); }}
      if (service.method === "iframe_placeholder") {{ activateIframes(service); }}
    }});
  }}

  function selectedCategories(root) {{
    var picked = ["necessary"];
    CATEGORIES.forEach(function (category) {{
      var box = root.querySelector('input[data-category="' + category + '"]');
      if (box && box.checked && picked.indexOf(category) === -1) {{ picked.push(category); }}
    }});
    return picked;
  }}

  function wireBanner() {{
    var banner = document.getElementById("konform-consent");
    var reopen = document.getElementById("konform-consent-reopen");
    if (!banner || !reopen) {{ return; }}

    function close(consent) {{
      banner.hidden = true;
      reopen.hidden = false;
      applyConsent(consent);
    }}

    banner.addEventListener("click", function (event) {{
      var action = event.target && event.target.dataset ? event.target.dataset.action : null;
      if (action === "accept-all") {{
        close(saveConsent(CATEGORIES.slice()));
      }} else if (action === "reject-all") {{
        close(saveConsent(["necessary"]));
      }} else if (action === "save") {{
        close(saveConsent(selectedCategories(banner)));
      }}
    }});

    reopen.addEventListener("click", function () {{
      banner.hidden = false;
    }});

    var consent = loadConsent();
    if (consent) {{
      close(consent);
    }} else {{
      banner.hidden = false;
    }}
  }}

  if (document.readyState === "loading") {{
    document.addEventListener("DOMContentLoaded", wireBanner);
  }} else {{
    wireBanner();
  }}
}})();
"#
    )
}

/// Assemble the three-file bundle for the given services.
pub fn banner_bundle(
    services: &[ServiceEntry],
    consent_endpoint: Option<&str>,
) -> BTreeMap<String, String> {
    let descriptors: Vec<BannerService<'_>> = services
        .iter()
        .filter(|s| s.effective_block_method() != BlockMethod::NoBlocking)
        .map(|s| BannerService {
            key: &s.key,
            name: &s.name,
            category: category_tag(s),
            method: method_tag(s.effective_block_method()),
        })
        .collect();
    let services_json =
        serde_json::to_string_pretty(&descriptors).unwrap_or_else(|_| "[]".to_string());

    let mut files = BTreeMap::new();
    files.insert("cookie-banner.html".to_string(), BANNER_HTML.to_string());
    files.insert("cookie-banner.css".to_string(), BANNER_CSS.to_string());
    files.insert(
        "cookie-banner.js".to_string(),
        banner_js(&services_json, consent_endpoint),
    );
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use konform_catalog::Catalog;

    #[test]
    fn test_bundle_has_three_files() {
        let catalog = Catalog::builtin().unwrap();
        let ga4 = catalog.get("google_analytics_ga4").unwrap();
        let files = banner_bundle(&[ga4], None);
        assert_eq!(files.len(), 3);
        assert!(files.contains_key("cookie-banner.html"));
        assert!(files.contains_key("cookie-banner.js"));
        assert!(files.contains_key("cookie-banner.css"));
    }

    #[test]
    fn test_js_carries_service_recipes() {
        let catalog = Catalog::builtin().unwrap();
        let ga4 = catalog.get("google_analytics_ga4").unwrap();
        let yt = catalog.get("youtube").unwrap();
        let files = banner_bundle(&[ga4, yt], Some("https://consent.example.com/log"));
        let js = &files["cookie-banner.js"];
        assert!(js.contains("google_analytics_ga4"));
        assert!(js.contains("script_rewrite"));
        assert!(js.contains("iframe_placeholder"));
        assert!(js.contains("https://consent.example.com/log"));
    }

    #[test]
    fn test_js_avoids_disallowed_constructs() {
        let files = banner_bundle(&[], None);
        let js = &files["cookie-banner.js"];
        assert!(!js.contains("eval("));
        assert!(!js.contains("new Function("));
        assert!(!js.contains("document.write("));
    }

    #[test]
    fn test_necessary_services_not_gated() {
        let catalog = Catalog::builtin().unwrap();
        let cmp = catalog.get("cookiebot").unwrap();
        let files = banner_bundle(&[cmp], None);
        assert!(!files["cookie-banner.js"].contains("cookiebot"));
    }

    #[test]
    fn test_html_has_equal_buttons_and_disabled_necessary() {
        let files = banner_bundle(&[], None);
        let html = &files["cookie-banner.html"];
        assert!(html.contains("Alle akzeptieren"));
        assert!(html.contains("Alle ablehnen"));
        assert!(html.contains(r#"data-category="necessary" checked disabled"#));
    }
}
