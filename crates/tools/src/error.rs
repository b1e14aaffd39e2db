use comfymcp_comfyui::orchestrator::JobError;
use comfymcp_core::error::CoreError;

/// The single user-facing error returned by a tool or resource.
///
/// The `Display` prefix tells callers where a failure came from:
/// the transport, the shape of a backend response, or anything else.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The backend could not be reached or answered with a non-2xx status.
    #[error("API request failed: {0}")]
    Request(String),

    /// The backend answered, but not in the shape expected.
    #[error("Response data format error: {0}")]
    DataFormat(String),

    /// Any other failure, prefixed with the tool's service description.
    #[error("{service} service error: {message}")]
    Service { service: String, message: String },

    /// The caller's arguments were missing or out of range.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Unknown resource: {0}")]
    UnknownResource(String),
}

impl ToolError {
    /// Classify a job failure for the tool described by `service`.
    pub fn from_job(service: &str, err: JobError) -> Self {
        if err.is_transport() {
            Self::Request(err.to_string())
        } else if err.is_protocol() {
            Self::DataFormat(err.to_string())
        } else {
            Self::service(service, err)
        }
    }

    /// Classify a template or parameter failure for the tool described by
    /// `service`.
    pub fn from_core(service: &str, err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => Self::InvalidArguments(msg),
            other => Self::service(service, other),
        }
    }

    pub fn service(service: &str, message: impl ToString) -> Self {
        Self::Service {
            service: service.to_string(),
            message: message.to_string(),
        }
    }

    /// Stable machine-readable code for transports.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Request(_) => "UPSTREAM_REQUEST_FAILED",
            Self::DataFormat(_) => "UPSTREAM_BAD_RESPONSE",
            Self::Service { .. } => "SERVICE_ERROR",
            Self::InvalidArguments(_) => "INVALID_ARGUMENTS",
            Self::UnknownTool(_) | Self::UnknownResource(_) => "NOT_FOUND",
        }
    }
}

/// Why one module could not be registered.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    /// A tool name, resource URI or module name is already taken.
    #[error("Duplicate {kind} '{name}'")]
    Duplicate { kind: &'static str, name: String },

    /// The module's template is missing, malformed or does not match its
    /// node bindings.
    #[error("Template for '{tool}' is unusable: {source}")]
    Template {
        tool: String,
        #[source]
        source: CoreError,
    },

    /// The registration hook panicked.
    #[error("Registration hook panicked: {0}")]
    Panicked(String),
}
