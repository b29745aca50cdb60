//! API route definitions

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::{handlers, state::AppState, ServerConfig};

async fn handle_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": true,
            "message": "Not found. Try /health to check API status.",
        })),
    )
}

async fn handle_405() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({
            "error": true,
            "message": "Method not allowed.",
        })),
    )
}

/// Create the main application router
pub fn create_router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    let app = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/models", get(handlers::list_models))
        .route("/metrics", get(handlers::get_metrics))
        .route("/features", get(handlers::get_features))
        .route("/predict", post(handlers::predict))
        .route("/predict-csv", post(handlers::predict_csv))
        .route("/dataset", get(handlers::get_dataset))
        .fallback(handle_404)
        .method_not_allowed_fallback(handle_405)
        .layer(DefaultBodyLimit::max(config.max_upload_size))
        .with_state(state);

    // CORS_ORIGIN pins a single origin; unset or "*" allows any
    let cors = match config.cors_origin.as_deref() {
        Some(origin) if !origin.is_empty() && origin != "*" => CorsLayer::new()
            .allow_origin(
                origin
                    .parse::<HeaderValue>()
                    .unwrap_or_else(|_| HeaderValue::from_static("*")),
            )
            .allow_methods(Any)
            .allow_headers(Any),
        _ => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    app.layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
