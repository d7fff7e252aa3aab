//! Uniform result envelope for user-facing operations.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ContextError;
use crate::models::ConfigMap;

/// Outcome of an operation as reported to the user.
///
/// Operations above the store never return errors to the CLI; failures are
/// reported with `success == false` and an `error` message. Operation-specific
/// data travels in `extra` and is flattened on output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(flatten)]
    pub extra: ConfigMap,
}

impl OperationResponse {
    /// A successful response with no message.
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    /// A successful response with a message.
    pub fn success(message: impl Into<String>) -> Self {
        Self::ok().with_message(message)
    }

    /// A failed response.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Attach an operation-specific field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Fill in target identification without overwriting what a provider
    /// already reported.
    pub fn annotate(mut self, app_name: &str, platform: &str, environment: &str) -> Self {
        self.app_name.get_or_insert_with(|| app_name.to_string());
        self.platform.get_or_insert_with(|| platform.to_string());
        self.environment.get_or_insert_with(|| environment.to_string());
        self
    }

    /// An operation-specific field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// A string-valued operation-specific field.
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.field(key).and_then(Value::as_str)
    }
}

impl From<ContextError> for OperationResponse {
    fn from(error: ContextError) -> Self {
        let response = Self::failure(error.to_string());
        match error.remedy() {
            Some(remedy) => response.with_field("remedy", remedy),
            None => response,
        }
    }
}
