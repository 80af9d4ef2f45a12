//! Functions HTTP API handlers

use axum::{
    body::Body,
    extract::{multipart::MultipartError, rejection::JsonRejection, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use faaslet_core::ApiError;
use prometheus_client::registry::Registry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

use crate::function::Function;
use crate::invocation::InvocationError;
use crate::metrics::{self, InvocationMetrics};
use crate::orchestrator::{Invoker, InvokerConfig};
use crate::registry::{FunctionRegistry, FunctionStore, StoreError};
use crate::runtime::ContainerRuntime;
use crate::tracker::AsyncTracker;

/// Settings for the functions service
#[derive(Debug, Clone)]
pub struct FunctionsConfig {
    /// Used when a request gives no timeout, or zero
    pub default_timeout: Duration,
    /// Largest accepted image upload
    pub max_upload_bytes: usize,
    pub invoker: InvokerConfig,
}

impl Default for FunctionsConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(120),
            max_upload_bytes: 512 * 1024 * 1024,
            invoker: InvokerConfig::default(),
        }
    }
}

/// Shared state for functions handlers
pub struct FunctionsState {
    pub registry: FunctionRegistry,
    pub invoker: Arc<Invoker>,
    pub tracker: AsyncTracker,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub metrics: Arc<Registry>,
    pub config: FunctionsConfig,
}

impl FunctionsState {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        store: Arc<dyn FunctionStore>,
        config: FunctionsConfig,
    ) -> Self {
        let mut metrics = Registry::default();
        let sink = Arc::new(InvocationMetrics::new(&mut metrics));

        let registry = FunctionRegistry::new(store);
        let invoker = Arc::new(Invoker::new(runtime.clone(), sink, config.invoker.clone()));
        let tracker = AsyncTracker::new(registry.clone(), invoker.clone());

        Self {
            registry,
            invoker,
            tracker,
            runtime,
            metrics: Arc::new(metrics),
            config,
        }
    }

    /// Absent or zero falls back to the default; negative is rejected
    fn invocation_timeout(&self, requested: Option<i64>) -> Result<Duration, ApiError> {
        match requested {
            None | Some(0) => Ok(self.config.default_timeout),
            Some(secs) if secs < 0 => Err(ApiError::validation(format!(
                "timeout must not be negative, got {}",
                secs
            ))),
            Some(secs) => Ok(Duration::from_secs(secs.unsigned_abs())),
        }
    }
}

/// Register function request
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub image: String,
}

/// Invoke request, for both sync and async invocations
#[derive(Debug, Deserialize)]
pub struct InvokeRequest {
    #[serde(default)]
    pub event: serde_json::Value,
    #[serde(default)]
    pub timeout: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct InvokeResponse {
    pub result: String,
    /// Milliseconds
    pub duration: u64,
    pub timestamp: chrono::DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub file_size: u64,
}

// Response helpers

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_string(body) {
        Ok(json) => (status, [(header::CONTENT_TYPE, "application/json")], json).into_response(),
        Err(e) => error_response(&ApiError::internal(format!("Failed to encode response: {}", e))),
    }
}

fn error_response(error: &ApiError) -> Response {
    let status =
        StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        error.to_json(),
    )
        .into_response()
}

fn bad_json(rejection: JsonRejection) -> Response {
    error_response(&ApiError::validation(format!(
        "invalid body: {}",
        rejection.body_text()
    )))
}

fn store_error(e: StoreError) -> Response {
    let error = match e {
        StoreError::NotFound(id) => ApiError::not_found(format!("Function not found: {}", id)),
        StoreError::Invalid(message) => ApiError::validation(message),
        e => ApiError::internal(e.to_string()),
    };
    error_response(&error)
}

fn invocation_error(e: &InvocationError) -> Response {
    error_response(&ApiError::new(e.error_code(), e.to_string()))
}

// === Handler functions ===

/// POST /functions
pub async fn register_function(
    State(state): State<Arc<FunctionsState>>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_json(rejection),
    };

    info!(function = %req.name, image = %req.image, "RegisterFunction");

    // The file store rewrites its file synchronously
    let registry = state.registry.clone();
    match tokio::task::spawn_blocking(move || registry.register(req.name, req.image)).await {
        Ok(Ok(function)) => json_response(StatusCode::OK, &function),
        Ok(Err(e)) => store_error(e),
        Err(e) => {
            error!(error = %e, "Registration task failed");
            error_response(&ApiError::internal("Failed to register function"))
        }
    }
}

/// GET /functions
pub async fn list_functions(State(state): State<Arc<FunctionsState>>) -> Response {
    debug!("ListFunctions");

    let mut functions: Vec<Function> = state.registry.list();
    functions.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    json_response(StatusCode::OK, &functions)
}

/// GET /functions/:id
pub async fn get_function(
    State(state): State<Arc<FunctionsState>>,
    Path(function_id): Path<String>,
) -> Response {
    debug!(function_id = %function_id, "GetFunction");

    match state.registry.get(&function_id) {
        Ok(function) => json_response(StatusCode::OK, &function),
        Err(e) => store_error(e),
    }
}

/// POST /invoke/:id
/// Run the function and wait for its output
pub async fn invoke_function(
    State(state): State<Arc<FunctionsState>>,
    Path(function_id): Path<String>,
    body: Result<Json<InvokeRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_json(rejection),
    };

    info!(function_id = %function_id, "Invoke");

    let timeout = match state.invocation_timeout(req.timeout) {
        Ok(timeout) => timeout,
        Err(e) => return error_response(&e),
    };

    let function = match state.registry.get(&function_id) {
        Ok(function) => function,
        Err(e) => return store_error(e),
    };

    match state.invoker.invoke(&function, &req.event, timeout).await {
        Ok(result) => json_response(
            StatusCode::OK,
            &InvokeResponse {
                duration: result.duration_ms(),
                result: result.output,
                timestamp: Utc::now(),
            },
        ),
        Err(e) => invocation_error(&e),
    }
}

/// POST /invoke/:id/async
/// Start the function in the background and return a pollable handle
pub async fn invoke_function_async(
    State(state): State<Arc<FunctionsState>>,
    Path(function_id): Path<String>,
    body: Result<Json<InvokeRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_json(rejection),
    };

    info!(function_id = %function_id, "InvokeAsync");

    let timeout = match state.invocation_timeout(req.timeout) {
        Ok(timeout) => timeout,
        Err(e) => return error_response(&e),
    };

    if let Err(e) = state.registry.get(&function_id) {
        return store_error(e);
    }

    let invocation = state.tracker.dispatch(&function_id, req.event, timeout);
    json_response(StatusCode::ACCEPTED, &invocation)
}

/// GET /invocations/:id
pub async fn get_invocation(
    State(state): State<Arc<FunctionsState>>,
    Path(invocation_id): Path<String>,
) -> Response {
    debug!(invocation_id = %invocation_id, "GetInvocation");

    match state.tracker.status(&invocation_id) {
        Ok(invocation) => json_response(StatusCode::OK, &invocation),
        Err(e) => error_response(&ApiError::not_found(e.to_string())),
    }
}

/// GET /functions/images
pub async fn list_images(State(state): State<Arc<FunctionsState>>) -> Response {
    debug!("ListImages");

    match state.runtime.list_images().await {
        Ok(images) => json_response(StatusCode::OK, &images),
        Err(e) => {
            error!(error = %e, "Failed to list images");
            error_response(&ApiError::internal("Failed to load images"))
        }
    }
}

/// POST /functions/images
/// Load an image archive sent as the multipart field `image`
pub async fn upload_image(
    State(state): State<Arc<FunctionsState>>,
    mut multipart: Multipart,
) -> Response {
    info!("UploadImage");

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return multipart_error(e),
        };
        if field.name() != Some("image") {
            continue;
        }

        // Removed when dropped, whatever happens below
        let spool = match tempfile::Builder::new()
            .prefix("faaslet-image-")
            .suffix(".tar")
            .tempfile()
        {
            Ok(spool) => spool,
            Err(e) => {
                error!(error = %e, "Failed to create spool file");
                return error_response(&ApiError::internal("Failed to create a temporary file"));
            }
        };

        let file_size = match spool_field(field, &spool).await {
            Ok(size) => size,
            Err(SpoolError::Multipart(e)) => return multipart_error(e),
            Err(SpoolError::Io(e)) => {
                error!(error = %e, path = %spool.path().display(), "Failed to save image");
                return error_response(&ApiError::internal("Failed to save file"));
            }
        };

        if let Err(e) = state.runtime.load_image(spool.path()).await {
            error!(error = %e, "Failed to load image");
            return error_response(&ApiError::internal(format!("Failed to load image: {}", e)));
        }

        info!(file_size, "Loaded image archive");
        return json_response(
            StatusCode::OK,
            &UploadResponse {
                message: "Image uploaded successfully".to_string(),
                file_size,
            },
        );
    }

    error_response(&ApiError::validation("no image file provided"))
}

enum SpoolError {
    Multipart(MultipartError),
    Io(std::io::Error),
}

/// Copy one multipart field into the spool file, returning the byte count
async fn spool_field(
    mut field: axum::extract::multipart::Field<'_>,
    spool: &tempfile::NamedTempFile,
) -> Result<u64, SpoolError> {
    let file = spool.as_file().try_clone().map_err(SpoolError::Io)?;
    let mut file = tokio::fs::File::from_std(file);
    let mut size = 0u64;

    while let Some(chunk) = field.chunk().await.map_err(SpoolError::Multipart)? {
        file.write_all(&chunk).await.map_err(SpoolError::Io)?;
        size += chunk.len() as u64;
    }
    file.flush().await.map_err(SpoolError::Io)?;

    Ok(size)
}

fn multipart_error(e: MultipartError) -> Response {
    let status = e.status();
    let error = if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::validation("image exceeds the upload size limit")
    } else {
        ApiError::validation(format!("invalid multipart body: {}", e.body_text()))
    };

    let mut response = error_response(&error);
    *response.status_mut() = status;
    response
}

/// GET /metrics
pub async fn metrics(State(state): State<Arc<FunctionsState>>) -> Response {
    match metrics::encode(&state.metrics) {
        Ok(text) => Response::builder()
            .status(StatusCode::OK)
            .header(
                header::CONTENT_TYPE,
                "application/openmetrics-text; version=1.0.0; charset=utf-8",
            )
            .body(Body::from(text))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(e) => error_response(&ApiError::internal(format!(
            "Failed to encode metrics: {}",
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::InvocationStatus;
    use crate::registry::MemoryStore;
    use crate::router::functions_router;
    use crate::test_support::{ScriptedRuntime, Step};
    use axum::{body::to_bytes, http::Request, Router};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct TestApp {
        runtime: Arc<ScriptedRuntime>,
        state: Arc<FunctionsState>,
    }

    impl TestApp {
        fn new(runtime: ScriptedRuntime) -> Self {
            Self::with_config(runtime, FunctionsConfig::default())
        }

        fn with_config(runtime: ScriptedRuntime, config: FunctionsConfig) -> Self {
            let runtime = Arc::new(runtime);
            let state = Arc::new(FunctionsState::new(
                runtime.clone(),
                Arc::new(MemoryStore::new()),
                config,
            ));
            Self { runtime, state }
        }

        fn router(&self) -> Router {
            functions_router(self.state.clone())
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, String) {
            let response = self.router().oneshot(request).await.unwrap();
            let status = response.status();
            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            (status, String::from_utf8(body.to_vec()).unwrap())
        }

        async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
            let (status, body) = self
                .send(
                    Request::post(uri)
                        .header(header::CONTENT_TYPE, "application/json")
                        .body(Body::from(body.to_string()))
                        .unwrap(),
                )
                .await;
            (status, serde_json::from_str(&body).unwrap())
        }

        async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
            let (status, body) = self
                .send(Request::get(uri).body(Body::empty()).unwrap())
                .await;
            (status, serde_json::from_str(&body).unwrap())
        }

        async fn register(&self, name: &str, image: &str) -> String {
            let (status, body) = self
                .post_json("/functions", json!({"name": name, "image": image}))
                .await;
            assert_eq!(status, StatusCode::OK);
            body["id"].as_str().unwrap().to_string()
        }
    }

    fn multipart_request(field: &str, content: &[u8]) -> Request<Body> {
        let boundary = "faaslet-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"image.tar\"\r\nContent-Type: application/x-tar\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Request::post("/functions/images")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_function() {
        let app = TestApp::new(ScriptedRuntime::new());

        let (status, body) = app
            .post_json("/functions", json!({"name": "echo", "image": "echo:latest"}))
            .await;

        assert_eq!(status, StatusCode::OK);
        assert!(!body["id"].as_str().unwrap().is_empty());
        assert_eq!(body["name"], "echo");
        assert_eq!(body["image"], "echo:latest");
        assert!(body["created_at"].is_string());
    }

    #[tokio::test]
    async fn test_register_rejects_malformed_body() {
        let app = TestApp::new(ScriptedRuntime::new());

        let (status, body) = app
            .send(
                Request::post("/functions")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["code"], "ValidationError");

        let (status, _) = app.post_json("/functions", json!({"name": "echo"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .post_json("/functions", json!({"name": "", "image": "echo:latest"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_and_get_functions() {
        let app = TestApp::new(ScriptedRuntime::new());
        let first = app.register("a", "image-a:1").await;
        let second = app.register("b", "image-b:1").await;

        let (status, body) = app.get_json("/functions").await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&first.as_str()));
        assert!(ids.contains(&second.as_str()));

        let (status, body) = app.get_json(&format!("/functions/{}", first)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "a");

        let (status, body) = app.get_json("/functions/unknown").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NotFoundError");
    }

    #[tokio::test]
    async fn test_invoke_returns_output() {
        let app = TestApp::new(ScriptedRuntime::new());
        let id = app.register("echo", "echo:latest").await;

        let (status, body) = app
            .post_json(
                &format!("/invoke/{}", id),
                json!({"event": {"x": 1}, "timeout": 5}),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], r#"{"x":1}"#);
        assert!(body["duration"].as_u64().unwrap() < 5000);
        assert!(body["timestamp"].is_string());
        assert_eq!(app.runtime.count(Step::Remove), 1);
    }

    #[tokio::test]
    async fn test_invoke_unknown_function() {
        let app = TestApp::new(ScriptedRuntime::new());

        let (status, body) = app
            .post_json("/invoke/missing", json!({"event": {}}))
            .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("missing"));
        assert!(app.runtime.steps().is_empty());
    }

    #[tokio::test]
    async fn test_invoke_rejects_negative_timeout() {
        let app = TestApp::new(ScriptedRuntime::new());
        let id = app.register("echo", "echo:latest").await;

        let (status, body) = app
            .post_json(&format!("/invoke/{}", id), json!({"event": {}, "timeout": -1}))
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "ValidationError");
        assert!(app.runtime.steps().is_empty());
    }

    #[tokio::test]
    async fn test_invoke_rejects_out_of_range_timeout() {
        let app = TestApp::new(ScriptedRuntime::new());
        let id = app.register("echo", "echo:latest").await;

        let (status, body) = app
            .post_json(
                &format!("/invoke/{}", id),
                json!({"event": {"x": 1}, "timeout": i64::MAX}),
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "ValidationError");
        assert!(body["error"].as_str().unwrap().contains("out of range"));
        assert!(app.runtime.steps().is_empty());
    }

    #[tokio::test]
    async fn test_async_out_of_range_timeout_fails_entry() {
        let app = TestApp::new(ScriptedRuntime::new());
        let id = app.register("echo", "echo:latest").await;

        let (status, body) = app
            .post_json(
                &format!("/invoke/{}/async", id),
                json!({"event": {}, "timeout": i64::MAX}),
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let invocation_id = body["id"].as_str().unwrap().to_string();

        let mut last = Value::Null;
        for _ in 0..200 {
            let (_, body) = app
                .get_json(&format!("/invocations/{}", invocation_id))
                .await;
            if body["status"] == "COMPLETED" || body["status"] == "FAILED" {
                last = body;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(last["status"], "FAILED");
        assert!(last["error"].as_str().unwrap().contains("out of range"));
        assert!(app.runtime.steps().is_empty());
    }

    #[tokio::test]
    async fn test_invoke_failure_is_500() {
        let app = TestApp::new(ScriptedRuntime::new().failing_at(Step::Create));
        let id = app.register("echo", "echo:latest").await;

        let (status, body) = app
            .post_json(&format!("/invoke/{}", id), json!({"event": {}}))
            .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "CreateError");
        assert!(body["error"].is_string());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_timeout_is_500() {
        let app = TestApp::new(ScriptedRuntime::new().hanging());
        let id = app.register("sleepy", "sleep:latest").await;

        let (status, body) = app
            .post_json(&format!("/invoke/{}", id), json!({"event": {}, "timeout": 1}))
            .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "TimeoutError");
        assert_eq!(app.runtime.count(Step::Stop), 1);
        assert_eq!(app.runtime.count(Step::Remove), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_uses_default_timeout() {
        let config = FunctionsConfig {
            default_timeout: Duration::from_secs(3),
            ..Default::default()
        };
        let app = TestApp::with_config(ScriptedRuntime::new().hanging(), config);
        let id = app.register("sleepy", "sleep:latest").await;

        let started = tokio::time::Instant::now();
        let (status, body) = app
            .post_json(&format!("/invoke/{}", id), json!({"event": {}, "timeout": 0}))
            .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Invocation timed out after 3s");
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_async_invoke_and_poll() {
        let app = TestApp::new(ScriptedRuntime::new());
        let id = app.register("echo", "echo:latest").await;

        let (status, body) = app
            .post_json(
                &format!("/invoke/{}/async", id),
                json!({"event": {"x": 1}, "timeout": 5}),
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "PENDING");
        assert_eq!(body["function_id"], id);
        let invocation_id = body["id"].as_str().unwrap().to_string();

        let mut last = Value::Null;
        for _ in 0..200 {
            let (status, body) = app
                .get_json(&format!("/invocations/{}", invocation_id))
                .await;
            assert_eq!(status, StatusCode::OK);
            if body["status"] == "COMPLETED" || body["status"] == "FAILED" {
                last = body;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(last["status"], "COMPLETED");
        assert_eq!(last["result"]["output"], r#"{"x":1}"#);
        assert!(last.get("error").is_none());
    }

    #[tokio::test]
    async fn test_async_invoke_unknown_function() {
        let app = TestApp::new(ScriptedRuntime::new());

        let (status, _) = app
            .post_json("/invoke/missing/async", json!({"event": {}}))
            .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(app.state.tracker.table().is_empty());
    }

    #[tokio::test]
    async fn test_get_unknown_invocation() {
        let app = TestApp::new(ScriptedRuntime::new());

        let (status, body) = app.get_json("/invocations/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NotFoundError");
    }

    #[tokio::test]
    async fn test_async_snapshot_reflects_tracker() {
        let app = TestApp::new(ScriptedRuntime::new().failing_at(Step::Start));
        let function = app.state.registry.register("echo", "echo:latest").unwrap();

        let handle = app
            .state
            .tracker
            .dispatch(&function.id, json!({}), Duration::from_secs(5));

        for _ in 0..200 {
            if app.state.tracker.status(&handle.id).unwrap().status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let (status, body) = app.get_json(&format!("/invocations/{}", handle.id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            app.state.tracker.status(&handle.id).unwrap().status,
            InvocationStatus::Failed
        );
        assert_eq!(body["status"], "FAILED");
        assert!(body["error"].is_string());
        assert!(body.get("result").is_none());
    }

    #[tokio::test]
    async fn test_list_images() {
        let app = TestApp::new(ScriptedRuntime::new().with_images(&["echo:latest", "sleep:latest"]));

        let (status, body) = app.get_json("/functions/images").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(["echo:latest", "sleep:latest"]));
    }

    #[tokio::test]
    async fn test_upload_image() {
        let app = TestApp::new(ScriptedRuntime::new());

        let (status, body) = app
            .send(multipart_request("image", b"fake image archive"))
            .await;

        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["file_size"], 18);
        assert_eq!(app.runtime.loaded_archives(), vec![b"fake image archive".to_vec()]);
    }

    #[tokio::test]
    async fn test_upload_without_image_field() {
        let app = TestApp::new(ScriptedRuntime::new());

        let (status, _) = app.send(multipart_request("other", b"data")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(app.runtime.loaded_archives().is_empty());
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let app = TestApp::new(ScriptedRuntime::new());
        let id = app.register("echo", "echo:latest").await;
        app.post_json(&format!("/invoke/{}", id), json!({"event": {}}))
            .await;

        let (status, body) = app
            .send(Request::get("/metrics").body(Body::empty()).unwrap())
            .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(r#"function_invocations_total{function="echo"} 1"#));
        assert!(body.contains("function_invocation_duration_milliseconds"));
    }
}
