use crate::config::{ApiConfig, EnvSnapshot};
use crate::engine::Database;
use crate::image_provider::{is_image_generation_disabled, selected_image_provider, ImageProvider};
use crate::object_storage::{Publisher, StorageError};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service_name: String,
    pub database: Arc<Database>,
    pub publisher: Arc<Publisher>,
    pub env: Arc<EnvSnapshot>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: &str, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            code: code.to_string(),
        }),
    )
}

/// Image settings response
#[derive(Debug, Serialize)]
pub struct ImageSettingsResponse {
    pub provider: Option<ImageProvider>,
    /// Whether the provider serves stock photos rather than generating images
    pub stock_photos: bool,
    pub generation_disabled: bool,
}

/// Publish request for a file in the app data directory
#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    /// Path relative to the app data directory, or absolute inside it
    pub path: String,
    /// Object name below the prefix (defaults to `path`)
    pub relative_path: Option<String>,
}

/// Publish response
#[derive(Debug, Serialize)]
pub struct PublishResponse {
    /// Public URL, `None` when no bucket is configured
    pub url: Option<String>,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        let origin = if config.cors_origins.is_empty() {
            AllowOrigin::mirror_request()
        } else {
            let origins: Vec<HeaderValue> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            AllowOrigin::list(origins)
        };
        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
    };

    let app_data = ServeDir::new(state.publisher.app_data_directory());

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/api/v1/images/provider", get(image_settings))
        .route("/api/v1/app_data/publish", post(publish_app_data))
        .nest_service("/app_data", app_data)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": state.service_name,
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let backend = state.database.backend().to_string();

    match state.database.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": backend,
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": backend,
                "error": e.to_string(),
            })),
        ),
    }
}

/// Selected image provider and generation switch
async fn image_settings(
    State(state): State<AppState>,
) -> Result<Json<ImageSettingsResponse>, ApiError> {
    let provider = selected_image_provider(&state.env).map_err(|e| {
        error!(error = %e, "Invalid image provider configuration");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string(), "CONFIG_ERROR")
    })?;

    Ok(Json(ImageSettingsResponse {
        provider,
        stock_photos: provider.is_some_and(|p| p.is_stock()),
        generation_disabled: is_image_generation_disabled(&state.env),
    }))
}

/// Upload a file from the app data directory to the public bucket
#[instrument(skip(state))]
async fn publish_app_data(
    State(state): State<AppState>,
    Json(request): Json<PublishRequest>,
) -> Result<Json<PublishResponse>, ApiError> {
    let app_data = Path::new(state.publisher.app_data_directory());
    let local_path = resolve_app_data_path(app_data, &request.path)
        .ok_or_else(|| invalid_path(&request.path))?;
    let inside = confine_to_app_data(app_data, &local_path)
        .await
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => not_found(),
            _ => invalid_path(&request.path),
        })?;
    if !inside {
        return Err(invalid_path(&request.path));
    }

    let url = state
        .publisher
        .maybe_upload_file(&local_path, request.relative_path.as_deref())
        .await
        .map_err(|e| match e {
            StorageError::Read { ref source, .. } if source.kind() == ErrorKind::NotFound => {
                not_found()
            }
            e => {
                error!(error = %e, "Failed to publish file");
                api_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to publish file",
                    "UPLOAD_ERROR",
                )
            }
        })?;

    let published = url.is_some();
    Ok(Json(PublishResponse {
        url,
        published,
        published_at: published.then(Utc::now),
    }))
}

/// Join `requested` onto `app_data`, refusing `..` and absolute paths
/// that point elsewhere
pub fn resolve_app_data_path(app_data: &Path, requested: &str) -> Option<PathBuf> {
    let requested = Path::new(requested);
    if requested.components().any(|c| matches!(c, Component::ParentDir)) {
        return None;
    }

    if requested.is_absolute() {
        return requested.starts_with(app_data).then(|| requested.to_path_buf());
    }

    Some(app_data.join(requested))
}

/// Whether `local_path`, with every symlink resolved, still lies inside
/// `app_data`
pub async fn confine_to_app_data(app_data: &Path, local_path: &Path) -> std::io::Result<bool> {
    let base = tokio::fs::canonicalize(app_data).await?;
    let target = tokio::fs::canonicalize(local_path).await?;
    Ok(target.starts_with(base))
}

fn not_found() -> ApiError {
    api_error(StatusCode::NOT_FOUND, "File not found", "NOT_FOUND")
}

fn invalid_path(path: &str) -> ApiError {
    warn!(path = %path, "Rejected path outside app data directory");
    api_error(
        StatusCode::BAD_REQUEST,
        "Path must stay inside the app data directory",
        "INVALID_PATH",
    )
}

/// Start the API server
pub async fn start_api_server(state: AppState, config: &ApiConfig) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}
