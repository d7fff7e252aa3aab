//! Error types for the context module.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for context operations.
pub type ContextResult<T> = Result<T, ContextError>;

/// Errors that can occur while reading, writing or resolving context.
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("No app context found. Run `sfai app init` to initialize an app.")]
    NoContext,

    #[error("Invalid context data in {path}: {message}")]
    InvalidDocument { path: PathBuf, message: String },

    #[error("Invalid context data: {0}")]
    Validation(String),

    #[error("{}", not_initialized_message(.platform, .environment, .available_platforms, .available_environments))]
    NotInitialized {
        platform: String,
        environment: String,
        available_platforms: Vec<String>,
        available_environments: Vec<String>,
    },

    #[error("Invalid service: {0}")]
    UnknownService(String),

    #[error("No profiles found for service: {0}")]
    NoProfiles(String),

    #[error("Profile '{profile}' not found for service '{service}'")]
    ProfileNotFound { service: String, profile: String },

    #[error("Invalid configuration for {service}: {}", .errors.join("; "))]
    InvalidProfile { service: String, errors: Vec<String> },

    #[error("Home directory could not be determined")]
    NoHomeDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ContextError {
    /// The command that would initialize the missing target, if any.
    pub fn remedy(&self) -> Option<String> {
        match self {
            Self::NoContext => Some("sfai app init".to_string()),
            Self::NotInitialized {
                platform,
                environment,
                ..
            } => Some(init_command(platform, environment)),
            _ => None,
        }
    }
}

/// The command that initializes a platform environment.
pub fn init_command(platform: &str, environment: &str) -> String {
    format!("sfai platform init --platform {platform} --environment {environment}")
}

fn not_initialized_message(
    platform: &str,
    environment: &str,
    available_platforms: &[String],
    available_environments: &[String],
) -> String {
    let mut message = if available_platforms.iter().any(|p| p == platform) {
        format!(
            "Environment '{environment}' not found for platform '{platform}'. Available environments: {}",
            list_or_none(available_environments)
        )
    } else {
        format!(
            "Platform '{platform}' not initialized. Available platforms: {}",
            list_or_none(available_platforms)
        )
    };
    message.push_str(&format!(". Run: {}", init_command(platform, environment)));
    message
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_initialized_lists_environments() {
        let err = ContextError::NotInitialized {
            platform: "heroku".to_string(),
            environment: "staging".to_string(),
            available_platforms: vec!["local".to_string(), "heroku".to_string()],
            available_environments: vec!["default".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("'staging' not found"));
        assert!(message.contains("Available environments: default"));
        assert!(message.contains("sfai platform init --platform heroku --environment staging"));
    }

    #[test]
    fn test_not_initialized_lists_platforms() {
        let err = ContextError::NotInitialized {
            platform: "eks".to_string(),
            environment: "default".to_string(),
            available_platforms: vec!["local".to_string()],
            available_environments: Vec::new(),
        };
        assert!(err.to_string().contains("Platform 'eks' not initialized. Available platforms: local"));
        assert_eq!(
            err.remedy().as_deref(),
            Some("sfai platform init --platform eks --environment default")
        );
    }
}
