//! JSON over HTTP.
//!
//! | Method | Path                        | Response                          |
//! |--------|-----------------------------|-----------------------------------|
//! | GET    | `/health`                   | [`HealthResponse`]                |
//! | GET    | `/tools`                    | `{ "data": [ToolDescriptor] }`    |
//! | POST   | `/tools/{name}`             | `{ "data": "<tool output>" }`     |
//! | GET    | `/resources`                | `{ "data": [ResourceDescriptor] }`|
//! | GET    | `/resources/read?uri=<uri>` | `{ "data": "<resource text>" }`   |
//!
//! Failures use the `{ "error", "code" }` body from [`AppError`].

use std::io;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use comfymcp_tools::handler::{ResourceDescriptor, ToolDescriptor};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Health check response payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    pub tools: usize,
    pub resources: usize,
}

#[derive(Debug, Deserialize)]
pub struct ReadResourceQuery {
    pub uri: Option<String>,
}

/// Build the full router with its middleware stack.
pub fn router(state: AppState) -> Router {
    let request_id_header = HeaderName::from_static("x-request-id");
    let timeout = Duration::from_secs(state.config.request_timeout_secs);

    Router::new()
        .route("/health", get(health_check))
        .route("/tools", get(list_tools))
        .route("/tools/{name}", post(call_tool))
        .route("/resources", get(list_resources))
        .route("/resources/read", get(read_resource))
        // -- Middleware stack (applied bottom-up) --
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors_layer())
        .with_state(state)
}

/// Bind the configured address and serve until `cancel` fires.
pub async fn serve(state: AppState, cancel: CancellationToken) -> io::Result<()> {
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Serving tools over HTTP");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    tracing::info!("HTTP transport stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        tools: state.tools.tool_count(),
        resources: state.tools.resource_count(),
    })
}

/// GET /tools
async fn list_tools(State(state): State<AppState>) -> Json<DataResponse<Vec<ToolDescriptor>>> {
    Json(DataResponse {
        data: state.tools.list_tools(),
    })
}

/// POST /tools/{name}
///
/// The body is the argument object; an empty body means no arguments.
async fn call_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> AppResult<Json<DataResponse<String>>> {
    let args = parse_arguments(&body)?;
    let data = state.tools.call_tool(&name, args).await?;
    Ok(Json(DataResponse { data }))
}

/// GET /resources
async fn list_resources(
    State(state): State<AppState>,
) -> Json<DataResponse<Vec<ResourceDescriptor>>> {
    Json(DataResponse {
        data: state.tools.list_resources(),
    })
}

/// GET /resources/read?uri=
async fn read_resource(
    State(state): State<AppState>,
    Query(query): Query<ReadResourceQuery>,
) -> AppResult<Json<DataResponse<String>>> {
    let uri = query
        .uri
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing 'uri' query parameter".to_string()))?;
    let data = state.tools.read_resource(&uri).await?;
    Ok(Json(DataResponse { data }))
}

// ---- private helpers ----

fn parse_arguments(body: &[u8]) -> AppResult<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    let args: Value = serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Request body is not valid JSON: {e}")))?;
    match args {
        Value::Object(_) | Value::Null => Ok(args),
        _ => Err(AppError::BadRequest(
            "Tool arguments must be a JSON object".to_string(),
        )),
    }
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(3600))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn empty_body_means_no_arguments() {
        assert_eq!(parse_arguments(b"").unwrap(), Value::Null);
        assert_eq!(parse_arguments(b" \n").unwrap(), Value::Null);
        assert_eq!(
            parse_arguments(br#"{"prompt":"p"}"#).unwrap(),
            json!({ "prompt": "p" })
        );
    }

    #[test]
    fn non_object_bodies_are_rejected() {
        assert_matches!(parse_arguments(b"{nope"), Err(AppError::BadRequest(_)));
        assert_matches!(parse_arguments(b"[1, 2]"), Err(AppError::BadRequest(msg)) if msg.contains("object"));
    }
}
