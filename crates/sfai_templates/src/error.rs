//! Error types for templates.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Errors that can occur while scaffolding a template.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Template '{name}' not found. Available templates: {}", .available.join(", "))]
    NotFound { name: String, available: Vec<String> },

    #[error("Destination is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Variable not provided: {0}")]
    MissingVariable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
