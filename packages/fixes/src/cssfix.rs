//! Konform Fixes: CSS Patches
//!
//! Override rules for failing contrast pairs and a focus-visibility layer.

/// Override a selector's foreground with the suggested color.
pub fn contrast_fix_css(selector: &str, foreground_hex: &str) -> String {
    format!(
        "/* Kontrast-Korrektur */\n\
         {selector} {{\n\
         \x20 color: {foreground_hex} !important;\n\
         }}\n"
    )
}

/// Focus-visibility layer: a universal `:focus-visible` outline plus
/// explicit rules for the common interactive elements.
pub fn focus_fix_css(accent: &str) -> String {
    format!(
        "*:focus-visible {{\n\
         \x20 outline: 3px solid {accent};\n\
         \x20 outline-offset: 2px;\n\
         }}\n\n\
         a:focus-visible,\n\
         button:focus-visible,\n\
         input:focus-visible,\n\
         select:focus-visible,\n\
         textarea:focus-visible {{\n\
         \x20 outline: 3px solid {accent};\n\
         \x20 outline-offset: 2px;\n\
         }}\n"
    )
}

/// Default accent used when the site gives no brand color.
pub const DEFAULT_FOCUS_ACCENT: &str = "#1d4ed8";
