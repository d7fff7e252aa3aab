//! Credential schemas for external services.
//!
//! Each service declares the fields a profile must carry. Profiles are
//! checked against a JSON Schema generated from that declaration.

use indexmap::IndexMap;
use jsonschema::JSONSchema;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{ContextError, ContextResult};
use crate::models::ConfigMap;

/// Key fragments that mark a profile value as secret.
const SECRET_MARKERS: [&str; 3] = ["secret", "password", "key"];

/// Declared fields of one service, in display order.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSchema {
    name: String,
    fields: IndexMap<String, String>,
}

impl ServiceSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
        }
    }

    /// Declare a required string field.
    pub fn with_field(mut self, field: impl Into<String>, description: impl Into<String>) -> Self {
        self.fields.insert(field.into(), description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field name to description.
    pub fn fields(&self) -> &IndexMap<String, String> {
        &self.fields
    }

    /// The JSON Schema a profile must satisfy.
    pub fn json_schema(&self) -> Value {
        let properties: ConfigMap = self
            .fields
            .iter()
            .map(|(field, description)| {
                (
                    field.clone(),
                    json!({"type": "string", "description": description}),
                )
            })
            .collect();

        json!({
            "type": "object",
            "required": self.fields.keys().collect::<Vec<_>>(),
            "properties": properties,
        })
    }

    /// Check a profile, collecting every violation.
    pub fn validate(&self, config: &ConfigMap) -> ContextResult<()> {
        let schema = self.json_schema();
        let compiled = JSONSchema::compile(&schema).map_err(|e| ContextError::InvalidProfile {
            service: self.name.clone(),
            errors: vec![e.to_string()],
        })?;

        let instance = Value::Object(config.clone());
        let errors: Vec<String> = match compiled.validate(&instance) {
            Ok(()) => Vec::new(),
            Err(errors) => errors.map(|e| describe_error(&e)).collect(),
        };

        if errors.is_empty() {
            return Ok(());
        }

        debug!("Profile for {} failed validation: {:?}", self.name, errors);
        Err(ContextError::InvalidProfile {
            service: self.name.clone(),
            errors,
        })
    }
}

fn describe_error(error: &jsonschema::ValidationError<'_>) -> String {
    let path = error.instance_path.to_string();
    if path.is_empty() {
        error.to_string()
    } else {
        format!("{}: {}", path.trim_start_matches('/'), error)
    }
}

/// Explicit table of known services.
#[derive(Debug, Clone, Default)]
pub struct ServiceSchemaRegistry {
    schemas: IndexMap<String, ServiceSchema>,
}

impl ServiceSchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in service.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(
            ServiceSchema::new("mulesoft")
                .with_field("org_id", "MuleSoft Organization ID")
                .with_field("environment_id", "MuleSoft Environment ID")
                .with_field("client_id", "MuleSoft Client ID")
                .with_field("client_secret", "MuleSoft Client Secret"),
        );
        registry
    }

    pub fn register(&mut self, schema: ServiceSchema) {
        debug!("Registering service schema: {}", schema.name);
        self.schemas.insert(schema.name.clone(), schema);
    }

    pub fn get(&self, service: &str) -> Option<&ServiceSchema> {
        self.schemas.get(service)
    }

    /// Look up a service, failing for unknown names.
    pub fn get_required(&self, service: &str) -> ContextResult<&ServiceSchema> {
        self.get(service)
            .ok_or_else(|| ContextError::UnknownService(service.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.schemas.keys().map(String::as_str).collect()
    }

    /// Validate a profile for a service.
    pub fn validate(&self, service: &str, config: &ConfigMap) -> ContextResult<()> {
        self.get_required(service)?.validate(config)
    }
}

/// Whether a profile key holds a secret.
pub fn is_secret_key(key: &str) -> bool {
    let key = key.to_lowercase();
    SECRET_MARKERS.iter().any(|marker| key.contains(marker))
}

/// Mask a secret, keeping the first and last character of longer values.
pub fn mask_value(value: &Value) -> Value {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= 4 {
        return Value::String("****".to_string());
    }

    let mut masked = String::with_capacity(text.len());
    masked.push(chars[0]);
    masked.extend(std::iter::repeat('*').take(chars.len() - 2));
    masked.push(chars[chars.len() - 1]);
    Value::String(masked)
}

/// A copy of the profile with secret values masked.
pub fn mask_profile(profile: &ConfigMap) -> ConfigMap {
    profile
        .iter()
        .map(|(key, value)| {
            let shown = if is_secret_key(key) {
                mask_value(value)
            } else {
                value.clone()
            };
            (key.clone(), shown)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(value: Value) -> ConfigMap {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_builtin_mulesoft_fields() {
        let registry = ServiceSchemaRegistry::builtin();
        let schema = registry.get_required("mulesoft").unwrap();
        let fields: Vec<_> = schema.fields().keys().map(String::as_str).collect();
        assert_eq!(fields, vec!["org_id", "environment_id", "client_id", "client_secret"]);
    }

    #[test]
    fn test_unknown_service() {
        let registry = ServiceSchemaRegistry::builtin();
        let err = registry.validate("salesforce", &ConfigMap::new()).unwrap_err();
        assert!(matches!(err, ContextError::UnknownService(_)));
    }

    #[test]
    fn test_valid_profile() {
        let registry = ServiceSchemaRegistry::builtin();
        let profile = config(json!({
            "org_id": "o", "environment_id": "e", "client_id": "c", "client_secret": "s",
            "note": "extra keys are allowed"
        }));
        assert!(registry.validate("mulesoft", &profile).is_ok());
    }

    #[test]
    fn test_missing_and_mistyped_fields() {
        let registry = ServiceSchemaRegistry::builtin();
        let profile = config(json!({"org_id": 42, "environment_id": "e", "client_id": "c"}));
        match registry.validate("mulesoft", &profile).unwrap_err() {
            ContextError::InvalidProfile { service, errors } => {
                assert_eq!(service, "mulesoft");
                assert_eq!(errors.len(), 2);
                assert!(errors.iter().any(|e| e.contains("client_secret")));
                assert!(errors.iter().any(|e| e.contains("org_id") && e.contains("string")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_masking() {
        assert!(is_secret_key("client_secret"));
        assert!(is_secret_key("API_KEY"));
        assert!(!is_secret_key("client_id"));
        assert_eq!(mask_value(&json!("abcdef")), json!("a****f"));
        assert_eq!(mask_value(&json!("abcd")), json!("****"));

        let masked = mask_profile(&config(json!({"client_id": "cid", "client_secret": "s3cr3t!"})));
        assert_eq!(Value::Object(masked), json!({"client_id": "cid", "client_secret": "s*****!"}));
    }
}
