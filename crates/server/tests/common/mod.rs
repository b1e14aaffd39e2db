use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use comfymcp_server::config::ServerConfig;
use comfymcp_server::startup::build_tool_set;
use comfymcp_server::state::AppState;
use comfymcp_server::transport::http::router;
use comfymcp_tools::envelope::RecordingSink;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::MockServer;

/// Build a test `ServerConfig` pointing at `backend` with the shipped
/// templates and a throwaway capability cache directory.
pub fn test_config(backend: &MockServer, cache_dir: &Path) -> ServerConfig {
    let addr = backend.address();
    let templates = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../templates");

    let vars: HashMap<&str, String> = HashMap::from([
        ("COMFYUI_HOST", addr.ip().to_string()),
        ("COMFYUI_PORT", addr.port().to_string()),
        ("COMFYUI_POLL_INTERVAL_MS", "10".to_string()),
        ("COMFYUI_JOB_DEADLINE_SECS", "5".to_string()),
        ("MCP_REQUEST_TIMEOUT_SECS", "30".to_string()),
        ("MCP_TEMPLATE_DIR", templates.display().to_string()),
        ("MCP_OBJECT_INFO_DIR", cache_dir.display().to_string()),
        ("LOG_FILE", String::new()),
    ]);
    ServerConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

pub struct TestApp {
    pub app: Router,
    pub sink: Arc<RecordingSink>,
    _cache_dir: TempDir,
}

/// Run the real startup sequence against `backend` and wrap the result in
/// the production router and middleware stack.
pub async fn build_test_app(backend: &MockServer) -> TestApp {
    let cache_dir = tempfile::tempdir().unwrap();
    let config = test_config(backend, cache_dir.path());
    let sink = Arc::new(RecordingSink::new());

    let startup = build_tool_set(&config, sink.clone(), CancellationToken::new())
        .await
        .unwrap();

    let state = AppState {
        tools: Arc::new(startup.tools),
        config: Arc::new(config),
    };

    TestApp {
        app: router(state),
        sink,
        _cache_dir: cache_dir,
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
