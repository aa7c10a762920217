//! Konform Fetch: DOM Normalization
//!
//! Parses the fetched HTML once and extracts everything the check modules
//! need into an owned, `Send` snapshot. The checks never touch a parser:
//! they fan out across tasks with plain data.

use konform_catalog::{PageSignals, ScriptSignal};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("static selector"));
static SCRIPT: Lazy<Selector> = Lazy::new(|| Selector::parse("script").expect("static selector"));
static IFRAME: Lazy<Selector> = Lazy::new(|| Selector::parse("iframe").expect("static selector"));
static IMG: Lazy<Selector> = Lazy::new(|| Selector::parse("img").expect("static selector"));
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("static selector"));
static STYLE: Lazy<Selector> = Lazy::new(|| Selector::parse("style").expect("static selector"));
static STYLESHEET: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"link[rel="stylesheet"]"#).expect("static selector"));
static STYLED: Lazy<Selector> = Lazy::new(|| Selector::parse("[style]").expect("static selector"));
static LABEL_FOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("label[for]").expect("static selector"));
static INTERACTIVE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"a[href], button, [role="button"], input, select, textarea, [tabindex]"#)
        .expect("static selector")
});
static BUTTONISH: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"button, a, [role="button"], input[type="button"], input[type="submit"]"#)
        .expect("static selector")
});

static BANNER_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)cookie|consent|banner").expect("static regex"));
static SPA_MOUNT: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("#root, #app, #__next, [data-reactroot], [ng-version], [data-v-app]")
        .expect("static selector")
});

/// One image element as found on the page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageInfo {
    pub src: String,
    /// `alt` attribute; `None` when absent, `Some("")` when empty
    pub alt: Option<String>,
    pub role: Option<String>,
    pub aria_hidden: bool,
    pub outer_html: String,
}

impl ImageInfo {
    /// Decorative images are exempt from the alt-text requirement.
    pub fn decorative(&self) -> bool {
        self.aria_hidden || self.role.as_deref() == Some("presentation")
    }
}

/// One anchor with visible text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkInfo {
    pub href: String,
    pub text: String,
    pub in_footer: bool,
}

/// One interactive element, with what is needed for name/keyboard checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractiveElement {
    pub tag: String,
    pub text: String,
    pub aria_label: Option<String>,
    pub aria_labelledby: Option<String>,
    pub title_attr: Option<String>,
    pub value_attr: Option<String>,
    pub input_type: Option<String>,
    pub role: Option<String>,
    pub tabindex: Option<i32>,
    /// True for inputs that a `<label for>` points at
    pub labelled: bool,
    pub selector_hint: String,
    pub outer_html: String,
}

impl InteractiveElement {
    /// Accessible-name approximation: text, aria-label, value, title.
    pub fn accessible_name(&self) -> String {
        if !self.text.trim().is_empty() {
            return self.text.trim().to_string();
        }
        for candidate in [&self.aria_label, &self.value_attr, &self.title_attr] {
            if let Some(name) = candidate {
                if !name.trim().is_empty() {
                    return name.trim().to_string();
                }
            }
        }
        String::new()
    }

    /// Whether the element has any accessible name at all.
    pub fn has_accessible_name(&self) -> bool {
        !self.accessible_name().is_empty() || self.aria_labelledby.is_some() || self.labelled
    }
}

/// A fragment carrying an inline `style` attribute and visible text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyledFragment {
    pub selector_hint: String,
    pub style: String,
    pub text_sample: String,
}

/// One CSS source: a `<style>` block or a fetched linked stylesheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CssSource {
    /// "inline" or the stylesheet URL
    pub origin: String,
    pub text: String,
}

/// A DOM region that looks like a cookie/consent banner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BannerRegion {
    /// The id/class that marked the region, e.g. "#cookie-banner"
    pub marker: String,
    pub text: String,
    /// Accessible names of buttons inside the region
    pub button_names: Vec<String>,
}

/// Normalized, owned view of a fetched page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub page_host: String,
    pub title: String,
    pub lang: Option<String>,
    /// Visible text, whitespace-collapsed, script/style content excluded
    pub text: String,
    pub scripts: Vec<ScriptSignal>,
    pub iframe_srcs: Vec<String>,
    pub images: Vec<ImageInfo>,
    pub links: Vec<LinkInfo>,
    pub interactive: Vec<InteractiveElement>,
    pub styled_fragments: Vec<StyledFragment>,
    pub css_sources: Vec<CssSource>,
    /// Hrefs of linked stylesheets found in the document head
    pub stylesheet_hrefs: Vec<String>,
    pub banner_regions: Vec<BannerRegion>,
    /// A framework mount point (`#root`, `data-reactroot`, ...) with little
    /// or no server-rendered content inside
    pub spa_mount_marker: bool,
    pub size_bytes: u64,
}

fn collapse_ws(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate(input: &str, max: usize) -> String {
    input.chars().take(max).collect()
}

fn selector_hint(el: &ElementRef<'_>) -> String {
    let elem = el.value();
    let mut hint = elem.name().to_string();
    if let Some(id) = elem.id() {
        hint.push('#');
        hint.push_str(id);
    }
    for class in elem.classes().take(2) {
        hint.push('.');
        hint.push_str(class);
    }
    hint
}

fn element_text(el: &ElementRef<'_>) -> String {
    collapse_ws(&el.text().collect::<Vec<_>>().join(" "))
}

/// Visible page text, skipping script/style/noscript content.
fn visible_text(doc: &Html) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for node in doc.root_element().descendants() {
        if let Some(text) = node.value().as_text() {
            let parent_name = node
                .parent()
                .and_then(|p| p.value().as_element().map(|e| e.name().to_string()));
            if matches!(
                parent_name.as_deref(),
                Some("script") | Some("style") | Some("noscript")
            ) {
                continue;
            }
            parts.push(text);
        }
    }
    collapse_ws(&parts.join(" "))
}

fn in_footer(el: &ElementRef<'_>) -> bool {
    el.ancestors().any(|node| {
        node.value().as_element().is_some_and(|e| {
            e.name() == "footer"
                || e.id().is_some_and(|id| id.to_lowercase().contains("footer"))
                || e.classes().any(|c| c.to_lowercase().contains("footer"))
        })
    })
}

fn marker_of(el: &ElementRef<'_>) -> Option<String> {
    let elem = el.value();
    if let Some(id) = elem.id() {
        if BANNER_MARKER.is_match(id) {
            return Some(format!("#{id}"));
        }
    }
    elem.classes()
        .find(|c| BANNER_MARKER.is_match(c))
        .map(|c| format!(".{c}"))
}

impl PageSnapshot {
    /// Parse and normalize a document. `final_url` anchors host resolution.
    pub fn parse(html: &str, final_url: &str) -> Self {
        let doc = Html::parse_document(html);
        let page_host = Url::parse(final_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();

        let title = doc
            .select(&TITLE)
            .next()
            .map(|el| element_text(&el))
            .unwrap_or_default();

        let lang = doc
            .root_element()
            .value()
            .attr("lang")
            .map(str::to_string);

        let scripts = doc
            .select(&SCRIPT)
            .map(|el| match el.value().attr("src") {
                Some(src) => ScriptSignal::external(src),
                None => ScriptSignal::inline(el.inner_html()),
            })
            .collect();

        let iframe_srcs = doc
            .select(&IFRAME)
            .filter_map(|el| el.value().attr("src").map(str::to_string))
            .collect();

        let images = doc
            .select(&IMG)
            .map(|el| ImageInfo {
                src: el.value().attr("src").unwrap_or_default().to_string(),
                alt: el.value().attr("alt").map(str::to_string),
                role: el.value().attr("role").map(str::to_string),
                aria_hidden: el.value().attr("aria-hidden") == Some("true"),
                outer_html: truncate(&el.html(), 300),
            })
            .collect();

        let links = doc
            .select(&LINK)
            .map(|el| LinkInfo {
                href: el.value().attr("href").unwrap_or_default().to_string(),
                text: element_text(&el),
                in_footer: in_footer(&el),
            })
            .collect();

        let labelled_ids: HashSet<String> = doc
            .select(&LABEL_FOR)
            .filter_map(|el| el.value().attr("for").map(str::to_string))
            .collect();

        let interactive = doc
            .select(&INTERACTIVE)
            .map(|el| {
                let elem = el.value();
                InteractiveElement {
                    tag: elem.name().to_string(),
                    text: truncate(&element_text(&el), 120),
                    aria_label: elem.attr("aria-label").map(str::to_string),
                    aria_labelledby: elem.attr("aria-labelledby").map(str::to_string),
                    title_attr: elem.attr("title").map(str::to_string),
                    value_attr: elem.attr("value").map(str::to_string),
                    input_type: elem.attr("type").map(str::to_string),
                    role: elem.attr("role").map(str::to_string),
                    tabindex: elem.attr("tabindex").and_then(|t| t.parse().ok()),
                    labelled: elem.id().is_some_and(|id| labelled_ids.contains(id)),
                    selector_hint: selector_hint(&el),
                    outer_html: truncate(&el.html(), 200),
                }
            })
            .collect();

        let styled_fragments = doc
            .select(&STYLED)
            .filter_map(|el| {
                let style = el.value().attr("style")?.to_string();
                let text_sample = truncate(&element_text(&el), 80);
                Some(StyledFragment {
                    selector_hint: selector_hint(&el),
                    style,
                    text_sample,
                })
            })
            .collect();

        let css_sources = doc
            .select(&STYLE)
            .map(|el| CssSource {
                origin: "inline".to_string(),
                text: el.inner_html(),
            })
            .collect();

        let stylesheet_hrefs = doc
            .select(&STYLESHEET)
            .filter_map(|el| el.value().attr("href").map(str::to_string))
            .collect();

        // Top-most banner-marked regions only
        let mut banner_regions = Vec::new();
        let mut claimed = HashSet::new();
        for node in doc.root_element().descendants() {
            let Some(el) = ElementRef::wrap(node) else {
                continue;
            };
            let Some(marker) = marker_of(&el) else {
                continue;
            };
            if el.ancestors().any(|a| claimed.contains(&a.id())) {
                continue;
            }
            claimed.insert(node.id());
            let button_names = el
                .select(&BUTTONISH)
                .map(|b| {
                    let text = element_text(&b);
                    if !text.is_empty() {
                        text
                    } else {
                        b.value()
                            .attr("aria-label")
                            .or_else(|| b.value().attr("value"))
                            .unwrap_or_default()
                            .to_string()
                    }
                })
                .filter(|name| !name.is_empty())
                .collect();
            banner_regions.push(BannerRegion {
                marker,
                text: truncate(&element_text(&el), 500),
                button_names,
            });
        }

        let spa_mount_marker = doc
            .select(&SPA_MOUNT)
            .next()
            .is_some_and(|el| element_text(&el).len() < 200);

        Self {
            page_host,
            title,
            lang,
            text: visible_text(&doc),
            scripts,
            iframe_srcs,
            images,
            links,
            interactive,
            styled_fragments,
            css_sources,
            stylesheet_hrefs,
            banner_regions,
            spa_mount_marker,
            size_bytes: html.len() as u64,
        }
    }

    /// Append a fetched linked stylesheet to the CSS sources.
    pub fn add_linked_css(&mut self, href: &str, css: String) {
        self.css_sources.push(CssSource {
            origin: href.to_string(),
            text: css,
        });
    }

    /// Matching inputs for the service classifier.
    pub fn signals(
        &self,
        cookie_names: Vec<String>,
        storage_keys: Option<Vec<String>>,
    ) -> PageSignals {
        PageSignals {
            page_host: self.page_host.clone(),
            scripts: self.scripts.clone(),
            iframe_srcs: self.iframe_srcs.clone(),
            cookie_names,
            storage_keys,
        }
    }

    /// Skeleton-SPA heuristic used by `auto` render escalation: a small
    /// document whose markup is a framework mount point, or a near-empty
    /// body with a single bundle script.
    pub fn skeleton_spa_signal(&self) -> bool {
        const SIZE_THRESHOLD: u64 = 50_000;
        if self.size_bytes >= SIZE_THRESHOLD {
            return false;
        }
        let framework_bootstrap = self.scripts.iter().any(|s| {
            s.inline
                .as_deref()
                .is_some_and(|body| body.contains("__NEXT_DATA__") || body.contains("window.__NUXT__"))
        });
        if self.spa_mount_marker || framework_bootstrap {
            return true;
        }
        let external: Vec<&str> = self
            .scripts
            .iter()
            .filter_map(|s| s.src.as_deref())
            .collect();
        let bundle_script = external
            .iter()
            .any(|src| src.contains("bundle") || src.contains("chunk") || src.contains("main."));
        external.len() <= 2 && bundle_script && self.text.len() < 600
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"<!DOCTYPE html>
<html lang="de">
<head>
  <title>Beispiel GmbH</title>
  <link rel="stylesheet" href="/assets/site.css">
  <style>.low { color: #777777; background-color: #ffffff; }</style>
</head>
<body>
  <div id="cookie-banner" class="overlay">
    Wir verwenden Cookies.
    <button>Alle akzeptieren</button>
    <button>Nur notwendige</button>
  </div>
  <p style="color:#777; background:#fff">Kontrastarmer Text</p>
  <img src="/logo.png" alt="Beispiel GmbH Logo">
  <img src="/deko.png" role="presentation">
  <img src="/team.jpg">
  <a href="/impressum">Impressum</a>
  <script src="https://www.googletagmanager.com/gtag/js?id=G-X"></script>
  <script>console.log("inline");</script>
  <footer><a href="/datenschutz">Datenschutz</a></footer>
</body>
</html>"#;

    #[test]
    fn test_basic_extraction() {
        let snap = PageSnapshot::parse(FIXTURE, "https://www.example.com/");
        assert_eq!(snap.page_host, "www.example.com");
        assert_eq!(snap.title, "Beispiel GmbH");
        assert_eq!(snap.lang.as_deref(), Some("de"));
        assert_eq!(snap.scripts.len(), 2);
        assert_eq!(snap.images.len(), 3);
        assert_eq!(snap.stylesheet_hrefs, vec!["/assets/site.css".to_string()]);
        assert!(snap.text.contains("Kontrastarmer Text"));
        assert!(!snap.text.contains("console.log"));
    }

    #[test]
    fn test_footer_links_flagged() {
        let snap = PageSnapshot::parse(FIXTURE, "https://www.example.com/");
        let datenschutz = snap
            .links
            .iter()
            .find(|l| l.href == "/datenschutz")
            .unwrap();
        assert!(datenschutz.in_footer);
        let impressum = snap.links.iter().find(|l| l.href == "/impressum").unwrap();
        assert!(!impressum.in_footer);
    }

    #[test]
    fn test_banner_region_with_buttons() {
        let snap = PageSnapshot::parse(FIXTURE, "https://www.example.com/");
        assert_eq!(snap.banner_regions.len(), 1);
        let banner = &snap.banner_regions[0];
        assert_eq!(banner.marker, "#cookie-banner");
        assert!(banner
            .button_names
            .iter()
            .any(|n| n.contains("Nur notwendige")));
    }

    #[test]
    fn test_decorative_images() {
        let snap = PageSnapshot::parse(FIXTURE, "https://www.example.com/");
        let deko = snap.images.iter().find(|i| i.src == "/deko.png").unwrap();
        assert!(deko.decorative());
        let team = snap.images.iter().find(|i| i.src == "/team.jpg").unwrap();
        assert!(!team.decorative());
        assert!(team.alt.is_none());
    }

    #[test]
    fn test_styled_fragments() {
        let snap = PageSnapshot::parse(FIXTURE, "https://www.example.com/");
        let styled = snap
            .styled_fragments
            .iter()
            .find(|f| f.style.contains("#777"))
            .unwrap();
        assert!(styled.text_sample.contains("Kontrastarmer"));
    }

    #[test]
    fn test_skeleton_spa_signal() {
        let spa = r#"<html><head><title>x</title></head>
<body><div id="root"></div><script src="/static/js/main.3f2a1.js"></script></body></html>"#;
        let snap = PageSnapshot::parse(spa, "https://spa.example.com/");
        assert!(snap.spa_mount_marker);
        assert!(snap.skeleton_spa_signal());

        let full = PageSnapshot::parse(FIXTURE, "https://www.example.com/");
        assert!(!full.skeleton_spa_signal());
    }

    #[test]
    fn test_signals_roundtrip() {
        let snap = PageSnapshot::parse(FIXTURE, "https://www.example.com/");
        let signals = snap.signals(vec!["_ga".into()], None);
        assert_eq!(signals.page_host, "www.example.com");
        assert_eq!(signals.scripts.len(), 2);
        assert_eq!(signals.cookie_names, vec!["_ga".to_string()]);
    }
}
