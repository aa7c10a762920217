//! Konform Catalog: Matching Inputs
//!
//! The normalized slice of a fetched page that catalog matching consumes.
//! Built by the fetcher so that matching itself stays synchronous and pure.

use serde::{Deserialize, Serialize};

/// One `<script>` element, external or inline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptSignal {
    /// `src` attribute, absent for inline scripts
    pub src: Option<String>,
    /// Inline body, absent for external scripts
    pub inline: Option<String>,
}

impl ScriptSignal {
    pub fn external(src: impl Into<String>) -> Self {
        Self {
            src: Some(src.into()),
            inline: None,
        }
    }

    pub fn inline(body: impl Into<String>) -> Self {
        Self {
            src: None,
            inline: Some(body.into()),
        }
    }

    /// Short evidence string for match reporting.
    pub fn evidence(&self) -> String {
        if let Some(src) = &self.src {
            return src.clone();
        }
        let body = self.inline.as_deref().unwrap_or("");
        let snippet: String = body.chars().take(120).collect();
        format!("inline: {snippet}")
    }
}

/// Everything catalog matching needs from a page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageSignals {
    /// Host of the final page URL, used for third-party detection
    pub page_host: String,
    pub scripts: Vec<ScriptSignal>,
    /// `src` attributes of all iframes
    pub iframe_srcs: Vec<String>,
    /// Cookie names from Set-Cookie headers and, if rendered, the browser
    pub cookie_names: Vec<String>,
    /// Local-storage keys; `None` when the page was not rendered
    pub storage_keys: Option<Vec<String>>,
}

impl PageSignals {
    /// External script sources only.
    pub fn external_script_srcs(&self) -> impl Iterator<Item = &str> {
        self.scripts.iter().filter_map(|s| s.src.as_deref())
    }
}
