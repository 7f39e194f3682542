//! JSON HTTP API.
//!
//! Exposes the same operations as the CLI over axum. One [`AppState`] is
//! built at startup: it owns the record tracker, the embedder and a cached
//! handle to the loaded index. The index is reloaded when its descriptor
//! shows a newer build.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/sync` | Reconcile a directory (`{"dir", "recursive"}`) |
//! | `POST` | `/search` | Query the index (`{"query", "top_k"}`) |
//! | `POST` | `/delete` | Delete a record (`{"identity"}` or `{"path"}`) |
//! | `GET`  | `/files` | List records (`?all&query&limit&offset`) |
//! | `GET`  | `/status` | Store and index overview |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "index_unavailable", "message": "index is not built at ..." } }
//! ```
//!
//! `bad_request` (400), `not_found` (404), `unsupported` (400),
//! `index_unavailable` (503), everything else 500.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};

use filevault_core::identity::ContentIdentity;

use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::error::VaultError;
use crate::files::{delete_record, list_files, DeleteTarget, FilesPage, FilesQuery};
use crate::index::{self, FlatIndex};
use crate::progress::NoProgress;
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::search::{search, SearchResponse};
use crate::status::{collect_status, VaultStatus};
use crate::tracker::FileTracker;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    tracker: FileTracker,
    embedder: Arc<dyn Embedder>,
    index: Arc<RwLock<Option<Arc<FlatIndex>>>>,
}

impl AppState {
    /// The loaded index, (re)loading it if a newer build is on disk.
    async fn index(&self) -> Result<Arc<FlatIndex>, AppError> {
        let path = &self.config.index.path;
        if !index::is_ready(path) {
            return Err(VaultError::IndexUnavailable { path: path.clone() }.into());
        }
        let on_disk = index::read_descriptor(path)?;

        if let Some(loaded) = self.index.read().await.as_ref() {
            if loaded.descriptor().built_at == on_disk.built_at {
                return Ok(Arc::clone(loaded));
            }
        }

        let mut slot = self.index.write().await;
        let fresh = Arc::new(FlatIndex::open(path, Arc::clone(&self.embedder))?);
        tracing::info!(entries = fresh.descriptor().entry_count, "index loaded");
        *slot = Some(Arc::clone(&fresh));
        Ok(fresh)
    }
}

/// Starts the HTTP server on `[server].bind` and runs until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = router(config).await?;

    println!("filevault listening on http://{}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the application router with its state.
pub async fn router(config: &Config) -> anyhow::Result<Router> {
    let state = AppState {
        config: Arc::new(config.clone()),
        tracker: FileTracker::open(config).await?,
        embedder: create_embedder(&config.embedding)?,
        index: Arc::new(RwLock::new(None)),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Ok(Router::new()
        .route("/sync", post(handle_sync))
        .route("/search", post(handle_search))
        .route("/delete", post(handle_delete))
        .route("/files", get(handle_files))
        .route("/status", get(handle_status))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state))
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<VaultError> for AppError {
    fn from(err: VaultError) -> Self {
        let status = match &err {
            VaultError::NotFound(_) => StatusCode::NOT_FOUND,
            VaultError::Unsupported(_) => StatusCode::BAD_REQUEST,
            VaultError::IndexUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<VaultError>() {
            Ok(vault) => vault.into(),
            Err(other) => {
                tracing::error!(error = %format!("{:#}", other), "request failed");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal".to_string(),
                    message: format!("{:#}", other),
                }
            }
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /sync ============

#[derive(Deserialize)]
struct SyncRequest {
    dir: PathBuf,
    #[serde(default = "default_true")]
    recursive: bool,
}

fn default_true() -> bool {
    true
}

async fn handle_sync(
    State(state): State<AppState>,
    Json(req): Json<SyncRequest>,
) -> Result<Json<ReconcileReport>, AppError> {
    if !req.dir.is_dir() {
        return Err(bad_request(format!(
            "dir is not an existing directory: {}",
            req.dir.display()
        )));
    }
    let reconciler = Reconciler::new(state.tracker.clone(), state.config.scan.clone());
    let report = reconciler
        .reconcile(&req.dir, req.recursive, &NoProgress)
        .await?;
    Ok(Json(report))
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    top_k: Option<usize>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let top_k = req.top_k.unwrap_or(state.config.index.default_top_k);
    if top_k == 0 {
        return Err(bad_request("top_k must be at least 1"));
    }
    let index = state.index().await?;
    let response = search(&state.tracker, &*index, &req.query, top_k).await?;
    Ok(Json(response))
}

// ============ POST /delete ============

#[derive(Deserialize)]
struct DeleteRequest {
    identity: Option<String>,
    path: Option<PathBuf>,
}

#[derive(Serialize)]
struct DeleteResponse {
    deleted: bool,
}

async fn handle_delete(
    State(state): State<AppState>,
    Json(req): Json<DeleteRequest>,
) -> Result<Json<DeleteResponse>, AppError> {
    let target = match (req.identity, req.path) {
        (Some(id), None) => DeleteTarget::Identity(
            id.parse::<ContentIdentity>()
                .map_err(|e| bad_request(e.to_string()))?,
        ),
        (None, Some(path)) => DeleteTarget::Path(path),
        _ => return Err(bad_request("exactly one of identity or path is required")),
    };
    delete_record(&state.tracker, &target).await?;
    Ok(Json(DeleteResponse { deleted: true }))
}

// ============ GET /files ============

async fn handle_files(
    State(state): State<AppState>,
    Query(q): Query<FilesQuery>,
) -> Result<Json<FilesPage>, AppError> {
    Ok(Json(list_files(&state.tracker, &q).await?))
}

// ============ GET /status ============

async fn handle_status(State(state): State<AppState>) -> Result<Json<VaultStatus>, AppError> {
    Ok(Json(collect_status(&state.config, &state.tracker).await?))
}
