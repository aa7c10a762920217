//! Konform Fetch: HTTP Retrieval
//!
//! Static fetch with timeout, bounded redirects and one jittered retry on
//! transient faults; optional render escalation through the headless
//! collaborator, bounded by a semaphore.

use crate::renderer::{HeadlessRenderer, RenderOptions, RenderOutcome};
use crate::snapshot::PageSnapshot;
use crate::types::{
    CookieSource, FetchError, FetchedDocument, FetchedPage, ObservedCookie,
};
use async_trait::async_trait;
use konform_core::{RenderMode, ScanWarning};
use rand::Rng;
use reqwest::header::SET_COOKIE;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Fetcher tuning knobs.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Whole-request timeout for one GET
    pub timeout: Duration,
    pub max_redirects: usize,
    pub user_agent: String,
    /// Base delay before the single retry; jitter is added on top
    pub retry_base: Duration,
    /// Simultaneous headless renders across all scans
    pub max_concurrent_renders: usize,
    /// Same-origin stylesheets fetched per page
    pub max_linked_stylesheets: usize,
    /// Per-stylesheet size cap in bytes
    pub max_stylesheet_bytes: usize,
    pub render: RenderOptions,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_redirects: 10,
            user_agent: format!("konform-scan/{}", env!("CARGO_PKG_VERSION")),
            retry_base: Duration::from_millis(500),
            max_concurrent_renders: 4,
            max_linked_stylesheets: 5,
            max_stylesheet_bytes: 200 * 1024,
            render: RenderOptions::default(),
        }
    }
}

/// Retrieval collaborator used by the orchestrator and the checks.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Retrieve and normalize the target page.
    async fn fetch(
        &self,
        url: &str,
        mode: RenderMode,
        cancel: &CancellationToken,
    ) -> Result<FetchedPage, FetchError>;

    /// Static GET of a secondary document (imprint page, stylesheet).
    /// Non-2xx statuses are returned, not raised: the caller decides what a
    /// missing page means.
    async fn fetch_document(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchedDocument, FetchError>;
}

/// Production fetcher over a pooled reqwest client.
pub struct HttpFetcher {
    client: reqwest::Client,
    config: FetchConfig,
    renderer: Option<Arc<dyn HeadlessRenderer>>,
    render_slots: Arc<Semaphore>,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let render_slots = Arc::new(Semaphore::new(config.max_concurrent_renders.max(1)));
        Ok(Self {
            client,
            config,
            renderer: None,
            render_slots,
        })
    }

    /// Attach the headless collaborator enabling `rendered`/`auto` modes.
    pub fn with_renderer(mut self, renderer: Arc<dyn HeadlessRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    fn validate(url: &str) -> Result<Url, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            other => Err(FetchError::InvalidUrl(format!("unsupported scheme: {other}"))),
        }
    }

    async fn get_once(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, FetchError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            res = self.client.get(url).send() => res.map_err(map_reqwest_error),
        }
    }

    /// One GET with a single jittered retry on transient faults.
    async fn get_with_retry(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, FetchError> {
        match self.get_once(url, cancel).await {
            Err(err) if err.is_retryable() => {
                let jitter = Duration::from_millis(rand::rng().random_range(0..250));
                let delay = self.config.retry_base + jitter;
                tracing::debug!(url = %url, delay_ms = delay.as_millis() as u64, "retrying fetch");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                self.get_once(url, cancel).await
            }
            other => other,
        }
    }

    async fn read_body(
        resp: reqwest::Response,
        cancel: &CancellationToken,
    ) -> Result<String, FetchError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            body = resp.text() => body.map_err(map_reqwest_error),
        }
    }

    async fn render_page(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<RenderOutcome, FetchError> {
        let renderer = self
            .renderer
            .as_ref()
            .ok_or_else(|| FetchError::Render("no renderer configured".into()))?;
        let _permit = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            permit = self.render_slots.clone().acquire_owned() => {
                permit.map_err(|_| FetchError::Render("render slots closed".into()))?
            }
        };
        tokio::select! {
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            res = tokio::time::timeout(self.config.render.hard_cap, renderer.render(url, &self.config.render)) => {
                match res {
                    Ok(outcome) => outcome,
                    Err(_) => Err(FetchError::Render("render hard cap exceeded".into())),
                }
            }
        }
    }

    /// Fetch same-origin linked stylesheets, best effort.
    async fn collect_linked_css(
        &self,
        base: &Url,
        hrefs: &[String],
        cancel: &CancellationToken,
    ) -> Vec<(String, String)> {
        let mut collected = Vec::new();
        for href in hrefs.iter().take(self.config.max_linked_stylesheets) {
            let Ok(resolved) = base.join(href) else {
                continue;
            };
            if resolved.host_str() != base.host_str() {
                continue;
            }
            match self.fetch_document(resolved.as_str(), cancel).await {
                Ok(doc) if doc.status < 400 => {
                    let mut css = doc.body;
                    css.truncate(self.config.max_stylesheet_bytes);
                    collected.push((href.clone(), css));
                }
                Ok(_) => {}
                Err(FetchError::Cancelled) => break,
                Err(err) => {
                    tracing::debug!(href = %href, error = %err, "stylesheet fetch skipped");
                }
            }
        }
        collected
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else if err.is_redirect() {
        FetchError::TooManyRedirects
    } else if err.is_connect() {
        FetchError::Connect(err.to_string())
    } else {
        FetchError::Transport(err.to_string())
    }
}

/// Cookie name from a Set-Cookie header value.
fn set_cookie_name(value: &str) -> Option<String> {
    let pair = value.split(';').next()?;
    let name = pair.split('=').next()?.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Fold a successful render into the page.
fn merge_render_outcome(page: &mut FetchedPage, outcome: RenderOutcome) {
    if !outcome.dom.is_empty() {
        page.dom_html = outcome.dom;
    }
    for cookie in outcome.cookies {
        if !page.cookies.iter().any(|c| c.name == cookie.name) {
            page.cookies.push(cookie);
        }
    }
    page.local_storage = Some(outcome.local_storage);
    page.network_log = outcome.network_log;
    page.render_mode_used = RenderMode::Rendered;
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        mode: RenderMode,
        cancel: &CancellationToken,
    ) -> Result<FetchedPage, FetchError> {
        let started = Instant::now();
        Self::validate(url)?;

        let resp = self.get_with_retry(url, cancel).await?;
        let status = resp.status();
        let final_url = resp.url().to_string();

        let mut headers = BTreeMap::new();
        for (key, value) in resp.headers() {
            if let Ok(v) = value.to_str() {
                headers.entry(key.as_str().to_lowercase()).or_insert_with(|| v.to_string());
            }
        }
        let cookies: Vec<ObservedCookie> = resp
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(set_cookie_name)
            .map(|name| ObservedCookie {
                name,
                source: CookieSource::Header,
            })
            .collect();

        if !status.is_success() {
            tracing::info!(url = %url, status = status.as_u16(), "target returned non-success");
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = Self::read_body(resp, cancel).await?;
        let size_bytes = body.len() as u64;

        let mut page = FetchedPage {
            requested_url: url.to_string(),
            final_url: final_url.clone(),
            status: status.as_u16(),
            headers,
            raw_html: body.clone(),
            dom_html: body,
            cookies,
            local_storage: None,
            network_log: Vec::new(),
            linked_css: Vec::new(),
            size_bytes,
            fetch_ms: 0,
            render_mode_used: RenderMode::Static,
            warnings: Vec::new(),
        };

        let wants_render = match mode {
            RenderMode::Static => false,
            RenderMode::Rendered => true,
            RenderMode::Auto => {
                PageSnapshot::parse(&page.raw_html, &final_url).skeleton_spa_signal()
            }
        };

        if wants_render {
            if self.renderer.is_none() {
                page.warnings.push(ScanWarning::new(
                    "render_unavailable",
                    "no headless renderer configured, analyzed static DOM",
                ));
            } else {
                match self.render_page(url, cancel).await {
                    Ok(outcome) => merge_render_outcome(&mut page, outcome),
                    Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
                    Err(err) => {
                        tracing::warn!(url = %url, error = %err, "render failed, static fallback");
                        page.warnings.push(ScanWarning::new(
                            "render_fallback",
                            format!("render failed ({err}), analyzed static DOM"),
                        ));
                    }
                }
            }
        }

        // Same-origin stylesheets for the contrast/focus analysis
        if let Ok(base) = Url::parse(&final_url) {
            let hrefs = PageSnapshot::parse(&page.dom_html, &final_url).stylesheet_hrefs;
            page.linked_css = self.collect_linked_css(&base, &hrefs, cancel).await;
        }

        page.fetch_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(
            url = %url,
            status = page.status,
            bytes = page.size_bytes,
            mode = %page.render_mode_used,
            elapsed_ms = page.fetch_ms,
            "page fetched"
        );
        Ok(page)
    }

    async fn fetch_document(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchedDocument, FetchError> {
        Self::validate(url)?;
        let resp = self.get_with_retry(url, cancel).await?;
        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let body = Self::read_body(resp, cancel).await?;
        Ok(FetchedDocument {
            requested_url: url.to_string(),
            final_url,
            status,
            body,
        })
    }
}
