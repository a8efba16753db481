use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    error::ScanError,
    matcher::split_keywords,
    scanner::ScanService,
    types::{ScanRecord, ScanStatus, ScanSummary},
};

#[derive(Clone)]
pub struct AppState {
    service: ScanService,
}

impl AppState {
    pub fn new(service: ScanService) -> Self {
        Self { service }
    }
}

/// Keywords as a JSON list or as one comma-separated string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum KeywordsInput {
    List(Vec<String>),
    Csv(String),
}

impl KeywordsInput {
    fn into_vec(self) -> Vec<String> {
        match self {
            KeywordsInput::List(list) => list,
            KeywordsInput::Csv(raw) => split_keywords(&raw),
        }
    }
}

/// A target given either as a bare string or as a stored URL record.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TargetInput {
    Url(String),
    Record { url: String },
}

impl TargetInput {
    fn into_url(self) -> String {
        match self {
            TargetInput::Url(url) | TargetInput::Record { url } => url,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    #[serde(default)]
    pub keywords: Option<KeywordsInput>,
    #[serde(default)]
    pub urls: Option<Vec<TargetInput>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScanAccepted {
    pub scan_id: String,
    pub status: ScanStatus,
}

impl IntoResponse for ScanError {
    fn into_response(self) -> Response {
        let status = match &self {
            ScanError::Validation(_) => StatusCode::BAD_REQUEST,
            ScanError::NotFound(_) => StatusCode::NOT_FOUND,
            ScanError::Store(_) | ScanError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Routes for the scan API, without binding a socket.
pub fn create_app(state: AppState) -> Router {
    let api = Router::new()
        .route("/scan", post(post_scan))
        .route("/scan-status/{id}", get(get_status))
        .route("/scans", get(list_scans))
        .route("/history", get(get_history))
        .route("/health", get(health))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

/// Serve the API on `bind` until `shutdown` is cancelled.
pub async fn spawn_server(bind: &str, state: AppState, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!("serving scan API on http://{}", listener.local_addr()?);
    axum::serve(listener, create_app(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn post_scan(
    State(app): State<AppState>,
    Json(req): Json<ScanRequest>,
) -> Result<impl IntoResponse, ScanError> {
    let keywords = req.keywords.map(KeywordsInput::into_vec).unwrap_or_default();
    let urls = req
        .urls
        .map(|targets| targets.into_iter().map(TargetInput::into_url).collect());

    let scan_id = app.service.trigger(keywords, urls).await?;
    let status = app.service.status(&scan_id).await?.status;
    Ok((StatusCode::ACCEPTED, Json(ScanAccepted { scan_id, status })))
}

async fn get_status(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ScanRecord>, ScanError> {
    Ok(Json(app.service.status(&id).await?))
}

async fn list_scans(State(app): State<AppState>) -> Json<Vec<ScanRecord>> {
    Json(app.service.registry().list().await)
}

async fn get_history(State(app): State<AppState>) -> Result<Json<Vec<ScanSummary>>, ScanError> {
    let history = app
        .service
        .store()
        .history()
        .await
        .map_err(|e| ScanError::Store(format!("{e:#}")))?;
    Ok(Json(history))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}
