use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Template not found for tool '{tool}' (looked for {})", path.display())]
    TemplateNotFound { tool: String, path: PathBuf },

    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    #[error("Invalid binding for {field}: {reason}")]
    InvalidBinding { field: &'static str, reason: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}
