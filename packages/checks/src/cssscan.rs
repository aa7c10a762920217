//! Konform Checks: Heuristic CSS Scanning
//!
//! Lightweight rule extraction for static analysis. This is not a CSS
//! parser; it splits `selector { declarations }` pairs with regexes, which
//! is sufficient for color pairs and focus-suppression rules.

use crate::contrast::{parse_color, Rgb};
use once_cell::sync::Lazy;
use regex::Regex;

static MEDIA_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@media[^{]*\{").expect("static regex"));
static RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)([^{}]+)\{([^{}]*)\}").expect("static regex"));
static COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("static regex"));

/// One flattened CSS rule.
#[derive(Debug, Clone)]
pub struct CssRule {
    pub selector: String,
    /// property -> value, lowercased keys, insertion order lost
    pub declarations: Vec<(String, String)>,
}

impl CssRule {
    pub fn get(&self, property: &str) -> Option<&str> {
        self.declarations
            .iter()
            .find(|(k, _)| k == property)
            .map(|(_, v)| v.as_str())
    }
}

/// Split a declaration block into (property, value) pairs.
pub fn parse_declarations(block: &str) -> Vec<(String, String)> {
    block
        .split(';')
        .filter_map(|decl| {
            let (key, value) = decl.split_once(':')?;
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim().to_string();
            if key.is_empty() || value.is_empty() {
                None
            } else {
                Some((key, value))
            }
        })
        .collect()
}

/// Flatten a stylesheet into rules. `@media` wrappers are stripped so
/// nested rules surface; at-rules themselves are skipped.
pub fn parse_rules(css: &str) -> Vec<CssRule> {
    let without_comments = COMMENT.replace_all(css, "");
    let flattened = MEDIA_HEADER.replace_all(&without_comments, "");
    RULE.captures_iter(&flattened)
        .filter_map(|cap| {
            let selector = cap[1].trim().to_string();
            if selector.is_empty() || selector.starts_with('@') {
                return None;
            }
            Some(CssRule {
                selector,
                declarations: parse_declarations(&cap[2]),
            })
        })
        .collect()
}

/// First parseable color inside a value (handles `background` shorthand).
pub fn extract_color(value: &str) -> Option<Rgb> {
    if let Some(color) = parse_color(value) {
        return Some(color);
    }
    value.split_whitespace().find_map(parse_color)
}

/// A declared foreground/background pair applied to some selector.
#[derive(Debug, Clone)]
pub struct ColorPairRule {
    pub selector: String,
    pub foreground: Rgb,
    pub foreground_css: String,
    pub background: Rgb,
    pub background_css: String,
    pub large_text: bool,
}

/// Font-size/weight heuristic for the WCAG large-text class:
/// >= 18 pt (24 px), or >= 14 pt (~18.7 px) when bold.
fn is_large_text(rule_font_size: Option<&str>, rule_font_weight: Option<&str>) -> bool {
    let Some(size) = rule_font_size else {
        return false;
    };
    let px = if let Some(pt) = size.strip_suffix("pt") {
        pt.trim().parse::<f64>().ok().map(|v| v * 4.0 / 3.0)
    } else if let Some(px) = size.strip_suffix("px") {
        px.trim().parse::<f64>().ok()
    } else {
        None
    };
    let Some(px) = px else {
        return false;
    };
    let bold = rule_font_weight.is_some_and(|w| {
        let w = w.trim();
        w == "bold" || w == "bolder" || w.parse::<u32>().map(|n| n >= 700).unwrap_or(false)
    });
    px >= 24.0 || (bold && px >= 18.66)
}

/// Color pairs from rules that declare both a foreground and a background.
pub fn color_pairs(css: &str) -> Vec<ColorPairRule> {
    parse_rules(css)
        .into_iter()
        .filter_map(|rule| {
            let fg_css = rule.get("color")?.to_string();
            let bg_css = rule
                .get("background-color")
                .or_else(|| rule.get("background"))?
                .to_string();
            let foreground = parse_color(&fg_css)?;
            let background = extract_color(&bg_css)?;
            let large_text = is_large_text(rule.get("font-size"), rule.get("font-weight"));
            Some(ColorPairRule {
                selector: rule.selector.clone(),
                foreground,
                foreground_css: fg_css,
                background,
                background_css: bg_css,
                large_text,
            })
        })
        .collect()
}

/// Color pair from one inline `style` attribute, if it declares both.
pub fn inline_color_pair(style: &str) -> Option<(Rgb, Rgb, bool)> {
    let decls = parse_declarations(style);
    let get = |key: &str| {
        decls
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    };
    let foreground = parse_color(get("color")?)?;
    let background = extract_color(get("background-color").or_else(|| get("background"))?)?;
    let large = is_large_text(get("font-size"), get("font-weight"));
    Some((foreground, background, large))
}

/// A `:focus` rule that removes the outline without a replacement.
#[derive(Debug, Clone)]
pub struct FocusSuppression {
    pub selector: String,
}

const FOCUS_REPLACEMENTS: &[&str] = &["box-shadow", "border", "border-color", "background", "background-color", "text-decoration"];

/// Rules on `:focus`/`:focus-visible` that set `outline: none`/`0` with no
/// replacement indicator in the same rule.
pub fn focus_suppressions(css: &str) -> Vec<FocusSuppression> {
    parse_rules(css)
        .into_iter()
        .filter(|rule| {
            let selector = rule.selector.to_ascii_lowercase();
            if !selector.contains(":focus") {
                return false;
            }
            let suppressed = rule.get("outline").is_some_and(|v| {
                let v = v.trim().to_ascii_lowercase();
                v == "none" || v == "0" || v.starts_with("0 ") || v.starts_with("0px")
            });
            if !suppressed {
                return false;
            }
            !FOCUS_REPLACEMENTS
                .iter()
                .any(|prop| rule.get(prop).is_some())
        })
        .map(|rule| FocusSuppression {
            selector: rule.selector,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_parsing() {
        let css = "body { color: #333; } /* note */ .low { color:#777777; background-color:#ffffff }";
        let rules = parse_rules(css);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].selector, ".low");
        assert_eq!(rules[1].get("color"), Some("#777777"));
    }

    #[test]
    fn test_media_blocks_flattened() {
        let css = "@media (max-width: 600px) { .m { color: #777; background: #fff } }";
        let pairs = color_pairs(css);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].selector, ".m");
    }

    #[test]
    fn test_color_pairs_and_large_text() {
        let css = r#"
.small { color: #777777; background-color: #ffffff; }
.big { color: #777777; background-color: #ffffff; font-size: 24px; }
.boldish { color: #777777; background: #fff url(x.png); font-size: 14pt; font-weight: 700; }
.no-bg { color: #777777; }
"#;
        let pairs = color_pairs(css);
        assert_eq!(pairs.len(), 3);
        assert!(!pairs[0].large_text);
        assert!(pairs[1].large_text);
        assert!(pairs[2].large_text);
    }

    #[test]
    fn test_inline_pair() {
        let (fg, bg, large) = inline_color_pair("color:#777; background:#fff").unwrap();
        assert_eq!(fg.to_hex(), "#777777");
        assert_eq!(bg.to_hex(), "#ffffff");
        assert!(!large);
        assert!(inline_color_pair("color:#777").is_none());
    }

    #[test]
    fn test_focus_suppression_detection() {
        let css = r#"
a:focus { outline: none; }
button:focus-visible { outline: 0; box-shadow: 0 0 0 2px #005fcc; }
input:focus { outline: none; border-color: #005fcc; }
.plain { outline: none; }
"#;
        let found = focus_suppressions(css);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].selector, "a:focus");
    }
}
