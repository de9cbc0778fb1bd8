//! HTTP server implementation using Axum.

use crate::backend::BackendHealth;
use crate::error::{ApiError, ApiResult};
use crate::executor::{ExecuteRequest, ExecuteResponse, FileRef};
use crate::languages::Language;
use crate::state::AppState;
use crate::store::{FileInfo, StoreStats};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Request, State},
    http::header,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::info;

const API_KEY_HEADER: &str = "x-api-key";

// Request/Response types
#[derive(Deserialize)]
struct ExecRequest {
    lang: String,
    code: String,
    #[serde(default)]
    files: Vec<FileRef>,
    #[serde(default)]
    args: Vec<String>,
}

#[derive(Serialize)]
struct UploadedFile {
    id: String,
    name: String,
    size: u64,
}

#[derive(Serialize)]
struct UploadResponse {
    session_id: String,
    files: Vec<UploadedFile>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    backend: BackendHealth,
    store: StoreStats,
}

/// Build the router. `max_upload_bytes` bounds the upload body.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let protected = Router::new()
        .route("/exec", post(exec))
        .route(
            "/upload",
            post(upload).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/files/:session_id", get(list_files))
        .route("/download/:session_id/:file_id", get(download))
        .route("/stats", get(stats))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .merge(protected)
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn run_server(
    addr: SocketAddr,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = &state.api_key {
        let provided = request
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_ref()) {
            return Err(ApiError::Unauthorized);
        }
    }
    Ok(next.run(request).await)
}

async fn health(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let backend = state.executor.health().await;
    let store = state.store.stats().await?;
    Ok(Json(HealthResponse {
        status: if backend.healthy { "ok" } else { "degraded" },
        backend,
        store,
    }))
}

async fn stats(State(state): State<AppState>) -> ApiResult<Json<StoreStats>> {
    Ok(Json(state.store.stats().await?))
}

async fn exec(
    State(state): State<AppState>,
    Json(req): Json<ExecRequest>,
) -> ApiResult<Json<ExecuteResponse>> {
    let language = Language::from_code(&req.lang)
        .ok_or_else(|| ApiError::bad_request(format!("Unsupported language: {}", req.lang)))?;
    if req.code.trim().is_empty() {
        return Err(ApiError::bad_request("No code provided"));
    }

    info!(
        "POST /exec - lang: {} files: {} args: {}",
        language.code,
        req.files.len(),
        req.args.len()
    );
    let response = state
        .executor
        .execute(ExecuteRequest {
            language,
            code: req.code,
            files: req.files,
            args: req.args,
        })
        .await?;
    Ok(Json(response))
}

async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut session_id: Option<String> = None;
    let mut display_name: Option<String> = None;
    let mut uploads: Vec<(String, Vec<u8>)> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("file") => {
                let name = field.file_name().unwrap_or("file").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(e.to_string()))?;
                uploads.push((name, bytes.to_vec()));
            }
            Some("name") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(e.to_string()))?;
                display_name = Some(text).filter(|t| !t.is_empty());
            }
            Some("session_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(e.to_string()))?;
                session_id = Some(text).filter(|t| !t.is_empty());
            }
            _ => {}
        }
    }

    if uploads.is_empty() {
        return Err(ApiError::bad_request("No file provided"));
    }
    if let (Some(name), [(first, _)]) = (display_name, uploads.as_mut_slice()) {
        *first = name;
    }
    if let Some(id) = &session_id {
        if id.contains('/') {
            return Err(ApiError::bad_request("Invalid session id"));
        }
    }

    let session_id = match session_id {
        Some(id) => id,
        None => state.store.create_session().await?,
    };

    let mut files = Vec::with_capacity(uploads.len());
    for (name, content) in uploads {
        let size = content.len() as u64;
        let id = state.store.add_file(&session_id, &name, content).await?;
        info!("Uploaded file {} ({} bytes) to session {}", name, size, session_id);
        files.push(UploadedFile { id, name, size });
    }

    Ok(Json(UploadResponse { session_id, files }))
}

async fn list_files(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Vec<FileInfo>>> {
    Ok(Json(state.store.list_files(&session_id).await?))
}

async fn download(
    State(state): State<AppState>,
    Path((session_id, file_id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let file = state
        .store
        .get_file(&session_id, &file_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("{session_id}/{file_id}")))?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        file.name.replace(['"', '\\', '\r', '\n'], "_")
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        file.content,
    )
        .into_response())
}
