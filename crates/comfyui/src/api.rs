//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps workflow submission, history retrieval, the node capability
//! description and artifact view URLs using [`reqwest`].

use std::time::Duration;

use serde_json::Value;

use crate::history::ArtifactRef;

/// Workflow submission endpoint.
pub const SUBMIT_PATH: &str = "/api/prompt";
/// Per-prompt history endpoint (`{HISTORY_PATH}/{prompt_id}`).
pub const HISTORY_PATH: &str = "/api/history";
/// Node capability description endpoint.
pub const OBJECT_INFO_PATH: &str = "/api/object_info";
/// Artifact download endpoint.
pub const VIEW_PATH: &str = "/api/view";

/// Type tag used when building artifact view URLs.
const VIEW_TYPE_OUTPUT: &str = "output";

/// HTTP client for a single ComfyUI instance.
#[derive(Debug, Clone)]
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response returned by the submission endpoint after queuing a workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    pub prompt_id: String,
    /// Position in the execution queue, when reported.
    pub number: Option<i64>,
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A 2xx response whose body did not have the expected shape.
    #[error("Malformed ComfyUI response: {0}")]
    MalformedResponse(String),

    /// The base URL could not be combined into a request URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ComfyUIApi {
    /// Create a new API client for a ComfyUI instance.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8188`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (useful for connection pooling or custom timeouts).
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    /// Create an API client whose individual requests time out after
    /// `request_timeout`.
    pub fn with_timeout(
        api_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, ComfyUIApiError> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self::with_client(client, api_url))
    }

    /// Base HTTP URL without a trailing slash.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Submit a workflow for execution.
    ///
    /// Sends `POST /api/prompt` with `{ client_id, prompt }`. Returns the
    /// server-assigned `prompt_id` and queue position.
    pub async fn submit_workflow(
        &self,
        workflow: &Value,
        client_id: &str,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        let body = serde_json::json!({
            "client_id": client_id,
            "prompt": workflow,
        });

        let response = self
            .client
            .post(format!("{}{SUBMIT_PATH}", self.api_url))
            .json(&body)
            .send()
            .await?;

        let json: Value = Self::parse_response(response).await?;
        let prompt_id = match json.get("prompt_id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(ComfyUIApiError::MalformedResponse(format!(
                    "submission response has no prompt_id: {json}"
                )))
            }
        };

        Ok(SubmitResponse {
            prompt_id,
            number: json.get("number").and_then(Value::as_i64),
        })
    }

    /// Retrieve execution history for a specific prompt.
    ///
    /// Sends `GET /api/history/{prompt_id}`. The returned JSON is keyed by
    /// prompt ID and is empty until the backend has recorded the job.
    pub async fn get_history(&self, prompt_id: &str) -> Result<Value, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}{HISTORY_PATH}/{prompt_id}", self.api_url))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Fetch the description of every node type the backend supports.
    pub async fn get_object_info(&self) -> Result<Value, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}{OBJECT_INFO_PATH}", self.api_url))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Retrievable URL for an artifact produced by a job.
    pub fn view_url(&self, artifact: &ArtifactRef) -> Result<String, ComfyUIApiError> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}{VIEW_PATH}", self.api_url),
            &[
                ("filename", artifact.filename.as_str()),
                ("subfolder", artifact.subfolder.as_str()),
                ("type", VIEW_TYPE_OUTPUT),
            ],
        )
        .map_err(|e| ComfyUIApiError::InvalidUrl(format!("{}: {e}", self.api_url)))?;
        Ok(url.into())
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComfyUIApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ComfyUIApiError::MalformedResponse(format!("invalid JSON body: {e}")))
    }
}
