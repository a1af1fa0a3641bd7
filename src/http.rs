//! JSON HTTP API over the index, mounted under `/api/v1/tools`.

use crate::config::HttpServerConfig;
use crate::error::{Result, SheetIndexError};
use crate::index::IndexService;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// HTTP server wrapper
pub struct HttpServer {
    service: IndexService,
    api_key: Option<String>,
    allowed_origins: Vec<String>,
}

impl HttpServer {
    /// Create the server. When `api_key_env` is configured the variable must
    /// be set; requests then need `Authorization: Bearer <key>`.
    pub fn new(service: IndexService, config: &HttpServerConfig) -> Result<Self> {
        let api_key = match &config.api_key_env {
            Some(var) => Some(std::env::var(var).map_err(|_| {
                SheetIndexError::Config(format!(
                    "Environment variable {} not set. Set it in your .env file or remove http_server.api_key_env.",
                    var
                ))
            })?),
            None => None,
        };
        Ok(Self {
            service,
            api_key,
            allowed_origins: config.allowed_origins.clone(),
        })
    }

    /// Bind 127.0.0.1:`port` and serve until the process exits
    pub async fn run(&self, port: u16) -> Result<()> {
        let app = self.create_router();
        let addr = format!("127.0.0.1:{}", port);
        log::info!("Starting HTTP API on http://{}/api/v1/tools", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            SheetIndexError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to bind to {}: {}", addr, e),
            ))
        })?;

        axum::serve(listener, app).await.map_err(|e| {
            SheetIndexError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("HTTP server error: {}", e),
            ))
        })?;
        Ok(())
    }

    /// Create the axum router
    pub fn create_router(&self) -> Router {
        let cors = if self.allowed_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<axum::http::HeaderValue> = self
                .allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        let state = AppState {
            service: self.service.clone(),
            api_key: self.api_key.clone(),
            allowed_origins: self.allowed_origins.clone(),
        };

        let tools = Router::new()
            .route("/excel/files", get(handle_files))
            .route("/excel/search", post(handle_search))
            .route("/excel/read", post(handle_read))
            .route("/excel/preview/:filename", get(handle_preview))
            .route("/excel/refresh", post(handle_refresh));

        Router::new()
            .nest("/api/v1/tools", tools)
            .route("/health", get(handle_health))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors),
            )
            .with_state(state)
    }
}

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    service: IndexService,
    api_key: Option<String>,
    allowed_origins: Vec<String>,
}

impl AppState {
    fn guard(&self, headers: &HeaderMap) -> std::result::Result<(), Response> {
        validate_origin(headers, &self.allowed_origins)?;
        if let Some(key) = &self.api_key {
            validate_auth(headers, key)?;
        }
        Ok(())
    }
}

/// Unexpected failure, reported as 500 `{"detail": ...}`
struct ApiError(SheetIndexError);

impl From<SheetIndexError> for ApiError {
    fn from(err: SheetIndexError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        log::error!("HTTP handler failed: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": self.0.to_string() })),
        )
            .into_response()
    }
}

type ApiResult = std::result::Result<Response, ApiError>;

async fn handle_files(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    if let Err(resp) = state.guard(&headers) {
        return Ok(resp);
    }
    let listing = state.service.call(|m| m.list_files()).await?;
    Ok(Json(json!({ "files": listing.files })).into_response())
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
}

async fn handle_search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SearchRequest>,
) -> ApiResult {
    if let Err(resp) = state.guard(&headers) {
        return Ok(resp);
    }
    let results = state
        .service
        .call(move |m| Ok(m.search(&request.query)))
        .await?;
    Ok(Json(json!({ "results": results })).into_response())
}

#[derive(Debug, Deserialize)]
struct ReadRequest {
    filename: String,
    sheet_name: String,
    #[serde(default)]
    max_rows: Option<i64>,
}

async fn handle_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ReadRequest>,
) -> ApiResult {
    if let Err(resp) = state.guard(&headers) {
        return Ok(resp);
    }
    let rows = state
        .service
        .call(move |m| {
            let requested = request
                .max_rows
                .map(|n| n.max(0) as usize)
                .unwrap_or(m.read_config().default_rows);
            Ok(m.read_sheet(&request.filename, &request.sheet_name, requested))
        })
        .await?;
    Ok(Json(json!({ "data": rows })).into_response())
}

async fn handle_preview(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(filename): Path<String>,
) -> ApiResult {
    if let Err(resp) = state.guard(&headers) {
        return Ok(resp);
    }
    let name = filename.clone();
    let preview = state.service.call(move |m| Ok(m.file_preview(&name))).await?;
    let body = match preview {
        Some(preview) => json!({ "preview": preview }),
        None => json!({ "preview": { "error": format!("File {} not found", filename) } }),
    };
    Ok(Json(body).into_response())
}

async fn handle_refresh(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    if let Err(resp) = state.guard(&headers) {
        return Ok(resp);
    }
    let changes = state.service.call(|m| m.refresh()).await?;
    Ok(Json(json!({ "changes": changes })).into_response())
}

async fn handle_health(State(state): State<AppState>) -> ApiResult {
    let files = state.service.call(|m| Ok(m.file_count())).await?;
    Ok((
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "sheetindex",
            "version": env!("CARGO_PKG_VERSION"),
            "files": files
        })),
    )
        .into_response())
}

/// Validate Authorization header
fn validate_auth(headers: &HeaderMap, expected_key: &str) -> std::result::Result<(), Response> {
    let unauthorized = |error: &str| {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "detail": error,
                "message": "Use 'Authorization: Bearer <api-key>' header"
            })),
        )
            .into_response()
    };

    let auth_header = headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| unauthorized("Missing Authorization header"))?;

    match auth_header.strip_prefix("Bearer ") {
        Some(provided) if provided == expected_key => Ok(()),
        Some(_) => Err(unauthorized("Invalid API key")),
        None => Err(unauthorized("Invalid Authorization header format")),
    }
}

/// Validate Origin header against the configured list. Requests without an
/// Origin (non-browser clients) pass.
fn validate_origin(headers: &HeaderMap, allowed_origins: &[String]) -> std::result::Result<(), Response> {
    if allowed_origins.is_empty() {
        return Ok(());
    }

    let origin = match headers.get("origin").and_then(|h| h.to_str().ok()) {
        Some(o) => o,
        None => return Ok(()),
    };

    if allowed_origins.iter().any(|allowed| origin == allowed) {
        Ok(())
    } else {
        Err((
            StatusCode::FORBIDDEN,
            Json(json!({
                "detail": format!("Origin '{}' is not in the allowed origins list", origin)
            })),
        )
            .into_response())
    }
}
