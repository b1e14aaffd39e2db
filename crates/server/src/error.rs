use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use comfymcp_tools::error::ToolError;
use serde_json::json;

/// Error type for HTTP handlers.
///
/// Wraps [`ToolError`] for everything a tool or resource can report and adds
/// request-shape failures the transport detects itself.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// The request body or query could not be understood.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// HTTP status, stable code and message for this error.
    pub fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Tool(err) => {
                let status = match err {
                    ToolError::InvalidArguments(_) => StatusCode::BAD_REQUEST,
                    ToolError::UnknownTool(_) | ToolError::UnknownResource(_) => {
                        StatusCode::NOT_FOUND
                    }
                    ToolError::Request(_) | ToolError::DataFormat(_) => StatusCode::BAD_GATEWAY,
                    ToolError::Service { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.code(), err.to_string())
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_failure_origin() {
        let cases = [
            (ToolError::InvalidArguments("x".into()), StatusCode::BAD_REQUEST),
            (ToolError::UnknownTool("x".into()), StatusCode::NOT_FOUND),
            (ToolError::Request("x".into()), StatusCode::BAD_GATEWAY),
            (ToolError::DataFormat("x".into()), StatusCode::BAD_GATEWAY),
            (ToolError::service("Text-to-image", "x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(AppError::from(err).parts().0, expected);
        }
    }

    #[test]
    fn message_keeps_the_origin_prefix() {
        let (_, code, message) = AppError::from(ToolError::Request("refused".into())).parts();
        assert_eq!(code, "UPSTREAM_REQUEST_FAILED");
        assert_eq!(message, "API request failed: refused");
    }
}
