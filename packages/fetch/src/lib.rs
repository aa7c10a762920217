//! Konform Fetch: Retrieval & DOM Normalization
//!
//! Retrieves a target URL, optionally renders JavaScript through a headless
//! collaborator, and normalizes the DOM into an owned, thread-safe
//! `PageSnapshot` the check modules consume:
//! - `static`: one HTTP GET, 30 s timeout, up to 10 redirects
//! - `rendered`: headless navigation, network-idle wait, cookie/storage capture
//! - `auto`: static first, escalating on a skeleton-SPA signal
//!
//! All suspensions honor the ambient cancellation token.

pub mod fetcher;
pub mod renderer;
pub mod snapshot;
pub mod types;

pub use fetcher::{FetchConfig, HttpFetcher, PageFetcher};
pub use renderer::{HeadlessRenderer, RenderOptions, RenderOutcome};
pub use snapshot::{
    BannerRegion, CssSource, ImageInfo, InteractiveElement, LinkInfo, PageSnapshot, StyledFragment,
};
pub use types::{CookieSource, FetchError, FetchedDocument, FetchedPage, NetworkRequest, ObservedCookie};
