//! Error types for platform providers.

use sfai_context::{ContextError, OperationResponse};
use thiserror::Error;

/// Result type alias for platform operations.
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Errors raised at the provider boundary.
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("{program} not installed. {hint}")]
    ToolNotInstalled { program: String, hint: String },

    #[error("`{command}` failed{}: {message}", .code.map(|c| format!(" with exit code {c}")).unwrap_or_default())]
    ToolFailed {
        command: String,
        code: Option<i32>,
        message: String,
    },

    #[error("Unsupported provider: {name}. Available providers: {}", .available.join(", "))]
    UnknownPlatform { name: String, available: Vec<String> },

    #[error("{0}")]
    MissingConfig(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("No free port found between {start} and {end}")]
    NoFreePort { start: u16, end: u16 },

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PlatformError {
    pub fn missing(message: impl Into<String>) -> Self {
        Self::MissingConfig(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

impl From<PlatformError> for OperationResponse {
    fn from(error: PlatformError) -> Self {
        match error {
            PlatformError::Context(e) => e.into(),
            other => OperationResponse::failure(other.to_string()),
        }
    }
}
