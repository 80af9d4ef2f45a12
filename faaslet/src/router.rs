//! HTTP router for faaslet

use axum::{http::header, response::IntoResponse, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use faaslet_functions::{functions_router, FunctionsState};

/// Create the main application router
pub fn create_router(state: Arc<FunctionsState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(functions_router(state))
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/json")],
        r#"{"status":"running"}"#,
    )
}
