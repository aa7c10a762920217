//! Konform Fixes: Artifact Validators
//!
//! Every emitted artifact passes a type-specific validator before the fix
//! leaves the generator. A failing validation downgrades the fix to a
//! guide, with the artifact preserved in a diagnostic field.

use konform_core::{ValidationReport, ValidationStatus};
use once_cell::sync::Lazy;
use regex::Regex;

static TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<\s*(/?)\s*([a-zA-Z][a-zA-Z0-9-]*)[^>]*?(/?)>").expect("static regex"));

/// Elements that never take a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Tag-balance well-formedness check. Deliberately strict: generated
/// markup is fully under our control, so any imbalance is a generator bug.
pub fn validate_html(html: &str) -> ValidationReport {
    let mut stack: Vec<String> = Vec::new();
    let mut messages = Vec::new();

    for capture in TAG.captures_iter(html) {
        let closing = &capture[1] == "/";
        let name = capture[2].to_ascii_lowercase();
        let self_closing = &capture[3] == "/";
        if VOID_ELEMENTS.contains(&name.as_str()) || self_closing {
            continue;
        }
        if closing {
            match stack.pop() {
                Some(open) if open == name => {}
                Some(open) => {
                    messages.push(format!("mismatched tag: expected </{open}>, found </{name}>"));
                }
                None => messages.push(format!("unexpected closing tag </{name}>")),
            }
        } else {
            stack.push(name);
        }
    }
    for unclosed in &stack {
        messages.push(format!("unclosed tag <{unclosed}>"));
    }

    if messages.is_empty() {
        ValidationReport::ok()
    } else {
        ValidationReport {
            status: ValidationStatus::Errors,
            messages,
        }
    }
}

/// CSS validator: no dynamic expressions, no script URLs, balanced braces.
pub fn validate_css(css: &str) -> ValidationReport {
    let lower = css.to_ascii_lowercase();
    let mut messages = Vec::new();
    if lower.contains("expression(") {
        messages.push("css contains expression()".to_string());
    }
    if lower.contains("javascript:") {
        messages.push("css contains javascript: url".to_string());
    }
    if !messages.is_empty() {
        return ValidationReport {
            status: ValidationStatus::Errors,
            messages,
        };
    }
    let open = css.matches('{').count();
    let close = css.matches('}').count();
    if open != close {
        return ValidationReport {
            status: ValidationStatus::Warnings,
            messages: vec![format!("unbalanced braces: {open} open, {close} close")],
        };
    }
    ValidationReport::ok()
}

/// JS validator: reject dynamic code execution and document.write.
pub fn validate_js(js: &str) -> ValidationReport {
    let mut messages = Vec::new();
    for construct in ["eval(", "new Function(", "document.write("] {
        if js.contains(construct) {
            messages.push(format!("disallowed construct: {construct}"));
        }
    }
    if messages.is_empty() {
        ValidationReport::ok()
    } else {
        ValidationReport {
            status: ValidationStatus::Errors,
            messages,
        }
    }
}

/// Validate every file of an artifact by extension; plain-text files pass.
pub fn validate_files<'a>(
    files: impl IntoIterator<Item = (&'a String, &'a String)>,
) -> ValidationReport {
    let mut status = ValidationStatus::Ok;
    let mut messages = Vec::new();
    for (name, content) in files {
        let report = if name.ends_with(".html") || name.ends_with(".htm") {
            validate_html(content)
        } else if name.ends_with(".css") {
            validate_css(content)
        } else if name.ends_with(".js") {
            validate_js(content)
        } else {
            ValidationReport::ok()
        };
        match report.status {
            ValidationStatus::Errors => status = ValidationStatus::Errors,
            ValidationStatus::Warnings if status == ValidationStatus::Ok => {
                status = ValidationStatus::Warnings
            }
            _ => {}
        }
        for message in report.messages {
            messages.push(format!("{name}: {message}"));
        }
    }
    ValidationReport { status, messages }
}
