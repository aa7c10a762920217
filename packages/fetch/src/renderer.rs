//! Konform Fetch: Headless Renderer Collaborator
//!
//! The engine does not ship a browser. Rendering is a collaborator behind
//! this trait; deployments wire a CDP-backed implementation, tests wire a
//! canned one.

use crate::types::{FetchError, NetworkRequest, ObservedCookie};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

/// Render parameters.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Consider the page settled after this long without network activity
    pub network_idle: Duration,
    /// Absolute navigation cap
    pub hard_cap: Duration,
    pub user_agent: Option<String>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            network_idle: Duration::from_millis(500),
            hard_cap: Duration::from_secs(15),
            user_agent: None,
        }
    }
}

/// What the browser saw.
#[derive(Debug, Clone, Default)]
pub struct RenderOutcome {
    /// Serialized DOM after settling
    pub dom: String,
    /// Cookies from the browsing context
    pub cookies: Vec<ObservedCookie>,
    pub local_storage: BTreeMap<String, String>,
    /// Requests observed during navigation, pre-interaction flagged
    pub network_log: Vec<NetworkRequest>,
}

/// Headless browser collaborator.
#[async_trait]
pub trait HeadlessRenderer: Send + Sync {
    async fn render(&self, url: &str, opts: &RenderOptions) -> Result<RenderOutcome, FetchError>;
}
