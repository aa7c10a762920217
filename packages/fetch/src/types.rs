//! Konform Fetch: Response Types & Errors

use konform_core::{PageMetrics, RenderMode, ScanWarning};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Where a cookie was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CookieSource {
    /// `Set-Cookie` response header
    Header,
    /// Browsing context after render
    Browser,
}

/// A cookie observed during retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedCookie {
    pub name: String,
    pub source: CookieSource,
}

/// One request recorded by the renderer's network log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRequest {
    pub url: String,
    /// True when the request fired before any user interaction
    pub pre_interaction: bool,
}

/// A secondary document fetched statically (imprint page, stylesheet).
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub requested_url: String,
    pub final_url: String,
    pub status: u16,
    pub body: String,
}

/// The fully retrieved target page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub requested_url: String,
    /// URL after redirects
    pub final_url: String,
    pub status: u16,
    /// Response headers, keys lowercased; repeated headers keep the first value
    pub headers: BTreeMap<String, String>,
    /// Body as fetched
    pub raw_html: String,
    /// DOM after rendering; equals `raw_html` in static mode
    pub dom_html: String,
    pub cookies: Vec<ObservedCookie>,
    /// Local-storage snapshot; `None` when not rendered
    pub local_storage: Option<BTreeMap<String, String>>,
    /// Renderer network log; empty in static mode
    pub network_log: Vec<NetworkRequest>,
    /// Same-origin linked stylesheets fetched alongside the page
    pub linked_css: Vec<(String, String)>,
    pub size_bytes: u64,
    pub fetch_ms: u64,
    /// Mode actually used after `auto` resolution and render fallback
    pub render_mode_used: RenderMode,
    /// Non-fatal degradations (render fallback etc.)
    pub warnings: Vec<ScanWarning>,
}

impl FetchedPage {
    /// Raw page metrics for the scan record.
    pub fn metrics(&self) -> PageMetrics {
        PageMetrics {
            size_bytes: self.size_bytes,
            http_status: self.status,
            content_encoding: self.headers.get("content-encoding").cloned(),
            fetch_ms: self.fetch_ms,
        }
    }

    /// Distinct cookie names, header and browser sources merged.
    pub fn cookie_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.cookies.iter().map(|c| c.name.clone()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

/// Retrieval failures.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("target responded with status {0}")]
    Status(u16),
    #[error("too many redirects")]
    TooManyRedirects,
    #[error("render failed: {0}")]
    Render(String),
    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Faults of the target site, reported as a synthetic scan rather than
    /// an engine error.
    pub fn is_target_fault(&self) -> bool {
        matches!(
            self,
            FetchError::Timeout
                | FetchError::Connect(_)
                | FetchError::Transport(_)
                | FetchError::Status(_)
                | FetchError::TooManyRedirects
        )
    }

    /// Transient network faults worth one retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Timeout | FetchError::Connect(_))
    }
}

impl From<FetchError> for konform_core::EngineError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::InvalidUrl(u) => konform_core::EngineError::InvalidInput(u),
            FetchError::Cancelled => konform_core::EngineError::Cancelled,
            FetchError::Render(msg) => konform_core::EngineError::RenderFailure(msg),
            other => konform_core::EngineError::Unreachable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_fault_classification() {
        assert!(FetchError::Status(503).is_target_fault());
        assert!(FetchError::Timeout.is_target_fault());
        assert!(!FetchError::Cancelled.is_target_fault());
        assert!(!FetchError::InvalidUrl("x".into()).is_target_fault());
    }

    #[test]
    fn test_retry_only_on_transient() {
        assert!(FetchError::Timeout.is_retryable());
        assert!(FetchError::Connect("refused".into()).is_retryable());
        assert!(!FetchError::Status(500).is_retryable());
    }

    #[test]
    fn test_cookie_names_deduped() {
        let page = FetchedPage {
            requested_url: "https://example.com".into(),
            final_url: "https://example.com".into(),
            status: 200,
            headers: BTreeMap::new(),
            raw_html: String::new(),
            dom_html: String::new(),
            cookies: vec![
                ObservedCookie {
                    name: "_ga".into(),
                    source: CookieSource::Header,
                },
                ObservedCookie {
                    name: "_ga".into(),
                    source: CookieSource::Browser,
                },
            ],
            local_storage: None,
            network_log: vec![],
            linked_css: vec![],
            size_bytes: 0,
            fetch_ms: 0,
            render_mode_used: konform_core::RenderMode::Static,
            warnings: vec![],
        };
        assert_eq!(page.cookie_names(), vec!["_ga".to_string()]);
    }
}
