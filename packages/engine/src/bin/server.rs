//! Konform Server
//!
//! HTTP surface for the scan-and-remediate engine. Axum router over the
//! orchestrator; SIGHUP reloads the service catalog in place.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use uuid::Uuid;

use konform_catalog::Catalog;
use konform_checks::standard_checks;
use konform_core::{CompanyInfo, EngineError, GeneratedFix, RenderMode, ScanResult};
use konform_engine::{EngineConfig, MemoryStore, Orchestrator, ScanOptions};
use konform_fetch::{FetchConfig, HttpFetcher};
use konform_fixes::{AltTextConfig, FixGenerator, HttpAltTextModel};
use konform_ledger::MemoryAuditLog;
use konform_legal::StaticLegalSource;

struct AppState {
    orchestrator: Orchestrator,
    catalog: Arc<Catalog>,
    catalog_path: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    catalog_services: usize,
}

#[derive(Debug, Deserialize)]
struct ScanRequest {
    url: String,
    #[serde(default)]
    render_mode: RenderMode,
    user_id: Uuid,
    #[serde(default)]
    plan: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FixesRequest {
    scan_id: Uuid,
    issue_ids: Vec<String>,
    #[serde(default)]
    company_info: Option<CompanyInfo>,
    user_id: Uuid,
    #[serde(default)]
    plan: Option<String>,
}

#[derive(Debug, Serialize)]
struct FixesResponse {
    fixes: Vec<GeneratedFix>,
    failed: BTreeMap<String, String>,
    quota_remaining: i64,
}

#[derive(Debug, Deserialize)]
struct FeedbackRequest {
    fix_id: Uuid,
    user_id: Uuid,
    rating: u8,
    #[serde(default)]
    comment: Option<String>,
}

/// Engine error as an HTTP response with a stable code.
struct ApiError(EngineError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            EngineError::Unreachable(_) => StatusCode::BAD_GATEWAY,
            EngineError::RenderFailure(_) => StatusCode::BAD_GATEWAY,
            EngineError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            EngineError::Busy => StatusCode::CONFLICT,
            EngineError::Dependency(_) => StatusCode::BAD_GATEWAY,
            EngineError::Cancelled => StatusCode::REQUEST_TIMEOUT,
            EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({
            "code": self.0.code(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        catalog_services: state.catalog.len(),
    })
}

async fn scan(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScanRequest>,
) -> Result<Json<ScanResult>, ApiError> {
    let plan = request.plan.as_deref().unwrap_or("free");
    let cancel = CancellationToken::new();
    let result = state
        .orchestrator
        .scan(
            &cancel,
            &request.url,
            request.user_id,
            plan,
            ScanOptions {
                render_mode: request.render_mode,
            },
        )
        .await?;
    Ok(Json(result))
}

async fn fixes(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FixesRequest>,
) -> Result<Json<FixesResponse>, ApiError> {
    let plan = request.plan.as_deref().unwrap_or("free");
    let company = request.company_info.unwrap_or_default();
    let cancel = CancellationToken::new();
    let outcome = state
        .orchestrator
        .generate_fixes(
            &cancel,
            request.scan_id,
            &request.issue_ids,
            &company,
            request.user_id,
            plan,
        )
        .await?;
    Ok(Json(FixesResponse {
        fixes: outcome.fixes,
        failed: outcome.failed,
        quota_remaining: outcome.quota_remaining,
    }))
}

async fn feedback(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FeedbackRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .orchestrator
        .record_feedback(request.fix_id, request.user_id, request.rating, request.comment)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Reload the catalog on SIGHUP (unix only).
#[cfg(unix)]
fn spawn_catalog_reload(state: Arc<AppState>) {
    use tokio::signal::unix::{signal, SignalKind};
    tokio::spawn(async move {
        let Ok(mut hangup) = signal(SignalKind::hangup()) else {
            tracing::warn!("could not install SIGHUP handler, catalog reload disabled");
            return;
        };
        while hangup.recv().await.is_some() {
            match &state.catalog_path {
                Some(path) => match state.catalog.reload_from_path(path) {
                    Ok(count) => tracing::info!(services = count, "catalog reloaded on SIGHUP"),
                    Err(err) => tracing::error!(error = %err, "catalog reload failed"),
                },
                None => tracing::warn!("SIGHUP received but no catalog path configured"),
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_catalog_reload(_state: Arc<AppState>) {}

fn build_state() -> anyhow::Result<Arc<AppState>> {
    let catalog_path = std::env::var("KONFORM_CATALOG_PATH").ok();
    let catalog = Arc::new(match &catalog_path {
        Some(path) => Catalog::from_path(path)?,
        None => Catalog::builtin()?,
    });

    let fetcher = Arc::new(HttpFetcher::new(FetchConfig::default())?);

    let legal = match std::env::var("KONFORM_LEGAL_UPDATES_PATH").ok() {
        Some(path) => {
            let yaml = std::fs::read_to_string(&path)?;
            Arc::new(StaticLegalSource::from_yaml_str(&yaml)?)
        }
        None => Arc::new(StaticLegalSource::default()),
    };

    let mut generator = FixGenerator::new(catalog.clone());
    if let Ok(endpoint) = std::env::var("KONFORM_ALTTEXT_ENDPOINT") {
        let model = HttpAltTextModel::new(AltTextConfig {
            endpoint,
            api_key: std::env::var("KONFORM_ALTTEXT_API_KEY").ok(),
            ..Default::default()
        })?;
        generator = generator.with_alt_text_model(Arc::new(model));
    }
    if let Ok(endpoint) = std::env::var("KONFORM_CONSENT_LOG_ENDPOINT") {
        generator = generator.with_consent_endpoint(endpoint);
    }

    let orchestrator = Orchestrator::new(
        fetcher,
        standard_checks(),
        catalog.clone(),
        legal,
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryAuditLog::new()),
        Arc::new(generator),
        EngineConfig::from_env(),
    );

    Ok(Arc::new(AppState {
        orchestrator,
        catalog,
        catalog_path,
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new("info,konform_engine=debug")
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let state = build_state()?;
    spawn_catalog_reload(state.clone());

    let app = Router::new()
        .route("/health", get(health))
        .route("/scan", post(scan))
        .route("/fixes", post(fixes))
        .route("/feedback", post(feedback))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = std::env::var("KONFORM_LISTEN").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    tracing::info!(addr = %addr, "konform server listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
