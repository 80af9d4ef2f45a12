//! Routes for the functions API

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers::{self, FunctionsState};

/// Build the functions router with its state applied
pub fn functions_router(state: Arc<FunctionsState>) -> Router {
    let upload_limit = state.config.max_upload_bytes;

    Router::new()
        .route(
            "/functions",
            get(handlers::list_functions).post(handlers::register_function),
        )
        .route(
            "/functions/images",
            get(handlers::list_images)
                .post(handlers::upload_image)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/functions/:id", get(handlers::get_function))
        .route("/invoke/:id", post(handlers::invoke_function))
        .route("/invoke/:id/async", post(handlers::invoke_function_async))
        .route("/invocations/:id", get(handlers::get_invocation))
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
}
