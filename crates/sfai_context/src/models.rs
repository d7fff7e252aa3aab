//! Data models for application and global context documents.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{ContextError, ContextResult};
use crate::merge::deep_merge;
use crate::migration::migrate_document;

/// Environment used when none has been selected.
pub const DEFAULT_ENVIRONMENT: &str = "default";

/// Platform selected for a freshly initialized application.
pub const DEFAULT_PLATFORM: &str = "local";

/// Free-form JSON object.
pub type ConfigMap = Map<String, Value>;

/// Environment name to configuration, in insertion order.
pub type EnvironmentMap = IndexMap<String, EnvironmentConfig>;

/// Profile name to credentials, in insertion order.
pub type ProfileMap = IndexMap<String, ConfigMap>;

fn default_environment() -> String {
    DEFAULT_ENVIRONMENT.to_string()
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Timestamp parsing that also accepts the naive `YYYY-MM-DD HH:MM:SS.ffffff`
/// form written by older releases.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer};

    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}")))
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
            .map(|naive| naive.and_utc())
    }
}

/// Keys with a typed field on [`EnvironmentConfig`].
pub const TYPED_KEYS: [&str; 6] = ["app_name", "public_url", "port", "namespace", "region", "cluster_name"];

/// Configuration for one platform environment.
///
/// Keys shared by several providers are typed; anything else a provider
/// stores lands in `extra` and round-trips untouched. A stored known key with
/// the wrong type is kept in `extra` too, so one bad value never makes the
/// document unreadable.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnvironmentConfig {
    /// Provider-side application name (Heroku app, container, release)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    /// Public URL of the deployed application
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    /// Local port the application is published on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Kubernetes namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Cloud region
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Kubernetes cluster name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
    /// Provider-specific keys
    #[serde(flatten)]
    pub extra: ConfigMap,
}

impl<'de> Deserialize<'de> for EnvironmentConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        ConfigMap::deserialize(deserializer).map(Self::from_stored)
    }
}

impl EnvironmentConfig {
    /// Build a configuration from a JSON object, rejecting mistyped known keys.
    pub fn from_map(map: ConfigMap) -> ContextResult<Self> {
        let config = Self::from_stored(map);
        config.check_typed(TYPED_KEYS)?;
        Ok(config)
    }

    /// Build a configuration from stored data. Mistyped known keys stay in `extra`.
    fn from_stored(mut map: ConfigMap) -> Self {
        Self {
            app_name: take_typed(&mut map, "app_name"),
            public_url: take_typed(&mut map, "public_url"),
            port: take_typed(&mut map, "port"),
            namespace: take_typed(&mut map, "namespace"),
            region: take_typed(&mut map, "region"),
            cluster_name: take_typed(&mut map, "cluster_name"),
            extra: map,
        }
    }

    /// Fail when any of `keys` is a known key that did not fit its type.
    fn check_typed<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> ContextResult<()> {
        for key in keys {
            if let Some(value) = self.extra.get(key).filter(|_| TYPED_KEYS.contains(&key)) {
                return Err(ContextError::Validation(format!(
                    "invalid value for '{key}': {value}"
                )));
            }
        }
        Ok(())
    }

    /// Flatten the configuration into a JSON object.
    pub fn to_map(&self) -> ContextResult<ConfigMap> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(ContextError::Validation(format!(
                "environment configuration serialized to {other}"
            ))),
        }
    }

    /// Deep-merge `values` into this configuration.
    pub fn merge(&mut self, values: &ConfigMap) -> ContextResult<()> {
        let mut map = self.to_map()?;
        deep_merge(&mut map, values);
        let merged = Self::from_stored(map);
        // Only the keys being written must fit; older stored values are kept as is
        merged.check_typed(values.keys().map(String::as_str))?;
        *self = merged;
        Ok(())
    }

    /// Remove a key, typed or extra. Returns whether it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        let typed = match key {
            "app_name" => self.app_name.take().is_some(),
            "public_url" => self.public_url.take().is_some(),
            "port" => self.port.take().is_some(),
            "namespace" => self.namespace.take().is_some(),
            "region" => self.region.take().is_some(),
            "cluster_name" => self.cluster_name.take().is_some(),
            _ => false,
        };
        // A mistyped known key lives in extra
        let extra = self.extra.remove(key).is_some();
        typed || extra
    }

    /// A string-valued provider-specific key.
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }

    /// The profile name this environment uses for an external service.
    pub fn service_profile(&self, service: &str) -> Option<&str> {
        self.extra
            .get(service)
            .and_then(|entry| entry.get("profile"))
            .and_then(Value::as_str)
    }
}

fn take_typed<T: DeserializeOwned>(map: &mut ConfigMap, key: &str) -> Option<T> {
    match map.get(key)? {
        Value::Null => {
            map.remove(key);
            None
        }
        value => match serde_json::from_value(value.clone()) {
            Ok(typed) => {
                map.remove(key);
                Some(typed)
            }
            Err(e) => {
                warn!("Keeping stored '{}' as is: {}", key, e);
                None
            }
        },
    }
}

/// Per-project application context (`.sfai/context.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationContext {
    pub app_name: String,
    pub active_platform: String,
    #[serde(default = "default_environment", deserialize_with = "null_as_default")]
    pub active_environment: String,
    #[serde(default)]
    pub platform: IndexMap<String, EnvironmentMap>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub integrations: ConfigMap,
    #[serde(default = "Utc::now", deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now", deserialize_with = "timestamp::deserialize")]
    pub updated_at: DateTime<Utc>,
    /// Unknown top-level keys
    #[serde(flatten)]
    pub extra: ConfigMap,
}

impl ApplicationContext {
    /// Create a context on the default platform and environment.
    pub fn new(app_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            app_name: app_name.into(),
            active_platform: DEFAULT_PLATFORM.to_string(),
            active_environment: DEFAULT_ENVIRONMENT.to_string(),
            platform: IndexMap::new(),
            integrations: ConfigMap::new(),
            created_at: now,
            updated_at: now,
            extra: ConfigMap::new(),
        }
    }

    /// Migrate, deserialize and validate a raw document.
    pub fn from_document(mut document: ConfigMap) -> ContextResult<Self> {
        migrate_document(&mut document);
        let context: Self = serde_json::from_value(Value::Object(document))
            .map_err(|e| ContextError::Validation(e.to_string()))?;
        context.validate()?;
        Ok(context)
    }

    /// Check the invariants that serde cannot express.
    pub fn validate(&self) -> ContextResult<()> {
        if self.app_name.trim().is_empty() {
            return Err(ContextError::Validation(
                "app_name must not be empty".to_string(),
            ));
        }
        if self.active_environment.trim().is_empty() {
            return Err(ContextError::Validation(
                "active_environment must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Record a mutation.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Configuration of one platform environment.
    pub fn environment(&self, platform: &str, environment: &str) -> Option<&EnvironmentConfig> {
        self.platform.get(platform)?.get(environment)
    }

    /// Mutable configuration of one platform environment, created on demand.
    pub fn environment_entry(&mut self, platform: &str, environment: &str) -> &mut EnvironmentConfig {
        self.platform
            .entry(platform.to_string())
            .or_default()
            .entry(environment.to_string())
            .or_default()
    }

    /// Names of every initialized platform.
    pub fn platform_names(&self) -> Vec<String> {
        self.platform.keys().cloned().collect()
    }

    /// Names of every environment initialized for a platform.
    pub fn environment_names(&self, platform: &str) -> Vec<String> {
        self.platform
            .get(platform)
            .map(|envs| envs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether the given pair is the active selection.
    pub fn is_active(&self, platform: &str, environment: &str) -> bool {
        self.active_platform == platform && self.active_environment == environment
    }

    /// Look up a pair, falling back to the active selection.
    pub fn lookup(&self, platform: Option<&str>, environment: Option<&str>) -> ContextLookup {
        let platform = platform.unwrap_or(self.active_platform.as_str());
        let environment = environment.unwrap_or(self.active_environment.as_str());

        let Some(environments) = self.platform.get(platform) else {
            return ContextLookup::NoSuchPlatform {
                platform: platform.to_string(),
                available_platforms: self.platform_names(),
            };
        };
        let Some(config) = environments.get(environment) else {
            return ContextLookup::NoSuchEnvironment {
                platform: platform.to_string(),
                environment: environment.to_string(),
                available_environments: environments.keys().cloned().collect(),
            };
        };

        ContextLookup::Found(ResolvedContext {
            app_name: self.app_name.clone(),
            platform: platform.to_string(),
            environment: environment.to_string(),
            config: config.clone(),
            integrations: self.integrations.clone(),
        })
    }
}

/// Outcome of reading the context for a platform environment.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextLookup {
    /// No context file, or an empty one
    NotFound,
    /// The platform has never been initialized
    NoSuchPlatform {
        platform: String,
        available_platforms: Vec<String>,
    },
    /// The platform exists but not this environment
    NoSuchEnvironment {
        platform: String,
        environment: String,
        available_environments: Vec<String>,
    },
    Found(ResolvedContext),
}

impl ContextLookup {
    pub fn found(self) -> Option<ResolvedContext> {
        match self {
            Self::Found(context) => Some(context),
            _ => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// The context as seen by one platform environment.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedContext {
    pub app_name: String,
    pub platform: String,
    pub environment: String,
    pub config: EnvironmentConfig,
    pub integrations: ConfigMap,
}

impl ResolvedContext {
    /// Name the provider deploys under: the environment's own `app_name`
    /// when set, else the application name.
    pub fn target_name(&self) -> &str {
        self.config.app_name.as_deref().unwrap_or(&self.app_name)
    }

    /// Flat JSON view: application fields overlaid by environment keys.
    pub fn to_value(&self) -> ContextResult<Value> {
        let mut map = ConfigMap::new();
        map.insert("app_name".to_string(), Value::String(self.app_name.clone()));
        map.insert("active_platform".to_string(), Value::String(self.platform.clone()));
        map.insert(
            "active_environment".to_string(),
            Value::String(self.environment.clone()),
        );
        map.extend(self.config.to_map()?);
        if !self.integrations.is_empty() {
            map.insert(
                "integrations".to_string(),
                Value::Object(self.integrations.clone()),
            );
        }
        Ok(Value::Object(map))
    }
}

/// Read-only diagnostic for a platform environment pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnvironmentCheck {
    pub exists: bool,
    pub platform_exists: bool,
    pub available_platforms: Vec<String>,
    pub available_environments: Vec<String>,
    pub error: Option<String>,
}

/// An application registered in the global document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredApp {
    pub app_name: String,
    pub path: PathBuf,
    #[serde(default = "Utc::now", deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now", deserialize_with = "timestamp::deserialize")]
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: ConfigMap,
}

impl RegisteredApp {
    pub fn new(app_name: impl Into<String>, path: PathBuf, extra: ConfigMap) -> Self {
        let now = Utc::now();
        Self {
            app_name: app_name.into(),
            path,
            created_at: now,
            updated_at: now,
            extra,
        }
    }
}

/// Cross-project document (`~/.sfai/apps.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalContext {
    #[serde(default, deserialize_with = "null_as_default")]
    pub applications: Vec<RegisteredApp>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub service_profiles: IndexMap<String, ProfileMap>,
    #[serde(flatten)]
    pub extra: ConfigMap,
}

impl GlobalContext {
    /// Deserialize and validate a raw document.
    pub fn from_document(document: ConfigMap) -> ContextResult<Self> {
        let global: Self = serde_json::from_value(Value::Object(document))
            .map_err(|e| ContextError::Validation(e.to_string()))?;
        global.validate()?;
        Ok(global)
    }

    pub fn validate(&self) -> ContextResult<()> {
        if let Some(app) = self.applications.iter().find(|a| a.app_name.trim().is_empty()) {
            return Err(ContextError::Validation(format!(
                "registered app at {} has an empty app_name",
                app.path.display()
            )));
        }
        if self.service_profiles.keys().any(|s| s.trim().is_empty()) {
            return Err(ContextError::Validation(
                "service name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Profiles stored for a service.
    pub fn profiles(&self, service: &str) -> Option<&ProfileMap> {
        self.service_profiles.get(service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(value: Value) -> ConfigMap {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_from_document_migrates_flat_platforms() {
        let context = ApplicationContext::from_document(document(json!({
            "app_name": "demo",
            "active_platform": "heroku",
            "platform": {"heroku": {"app_name": "demo-heroku", "routing": "public"}}
        })))
        .unwrap();

        assert_eq!(context.active_environment, "default");
        let heroku = context.environment("heroku", "default").unwrap();
        assert_eq!(heroku.app_name.as_deref(), Some("demo-heroku"));
        assert_eq!(heroku.extra_str("routing"), Some("public"));
    }

    #[test]
    fn test_empty_app_name_is_rejected() {
        let err = ApplicationContext::from_document(document(json!({
            "app_name": "",
            "active_platform": "local"
        })))
        .unwrap_err();
        assert!(matches!(err, ContextError::Validation(_)));
    }

    #[test]
    fn test_missing_app_name_is_rejected() {
        let err = ApplicationContext::from_document(document(json!({"active_platform": "local"})))
            .unwrap_err();
        assert!(err.to_string().contains("app_name"));
    }

    #[test]
    fn test_non_object_platform_value_is_rejected() {
        let err = ApplicationContext::from_document(document(json!({
            "app_name": "demo",
            "active_platform": "local",
            "platform": {"local": "oops"}
        })))
        .unwrap_err();
        assert!(matches!(err, ContextError::Validation(_)));
    }

    #[test]
    fn test_legacy_timestamps_are_accepted() {
        let context = ApplicationContext::from_document(document(json!({
            "app_name": "demo",
            "active_platform": "local",
            "created_at": "2025-03-01 10:15:30.123456",
            "updated_at": "2025-03-01T10:15:30Z"
        })))
        .unwrap();
        assert_eq!(context.created_at.format("%Y-%m-%d").to_string(), "2025-03-01");
    }

    #[test]
    fn test_unknown_keys_round_trip() {
        let context = ApplicationContext::from_document(document(json!({
            "app_name": "demo",
            "active_platform": "local",
            "owner": "team-a",
            "platform": {"local": {"default": {"port": 8081, "helm_set": {"replicas": "2"}}}}
        })))
        .unwrap();
        let value = serde_json::to_value(&context).unwrap();
        assert_eq!(value["owner"], json!("team-a"));
        assert_eq!(value["platform"]["local"]["default"]["port"], json!(8081));
        assert_eq!(
            value["platform"]["local"]["default"]["helm_set"],
            json!({"replicas": "2"})
        );
    }

    #[test]
    fn test_environment_merge_keeps_siblings() {
        let mut config = EnvironmentConfig::default();
        config.app_name = Some("demo".to_string());
        config
            .merge(&document(json!({"mulesoft": {"profile": "default"}, "port": 9000})))
            .unwrap();
        assert_eq!(config.app_name.as_deref(), Some("demo"));
        assert_eq!(config.port, Some(9000));
        assert_eq!(config.service_profile("mulesoft"), Some("default"));
    }

    #[test]
    fn test_environment_merge_rejects_bad_types() {
        let mut config = EnvironmentConfig::default();
        let err = config.merge(&document(json!({"port": "eighty"}))).unwrap_err();
        assert!(matches!(err, ContextError::Validation(_)));
    }

    #[test]
    fn test_mistyped_stored_value_does_not_block_document() {
        let context = ApplicationContext::from_document(document(json!({
            "app_name": "demo",
            "active_platform": "heroku",
            "platform": {
                "local": {"default": {"port": "8080", "public_url": "http://localhost:8080"}},
                "heroku": {"default": {"app_name": "demo-heroku"}}
            }
        })))
        .unwrap();

        let heroku = context.environment("heroku", "default").unwrap();
        assert_eq!(heroku.app_name.as_deref(), Some("demo-heroku"));

        let local = context.environment("local", "default").unwrap();
        assert_eq!(local.port, None);
        assert_eq!(local.extra_str("port"), Some("8080"));
        assert_eq!(local.public_url.as_deref(), Some("http://localhost:8080"));

        let value = serde_json::to_value(&context).unwrap();
        assert_eq!(value["platform"]["local"]["default"]["port"], json!("8080"));
    }

    #[test]
    fn test_merge_checks_only_written_keys() {
        let mut config: EnvironmentConfig =
            serde_json::from_value(json!({"port": "8080"})).unwrap();

        config
            .merge(&document(json!({"public_url": "http://localhost:8081"})))
            .unwrap();
        assert_eq!(config.extra_str("port"), Some("8080"));

        config.merge(&document(json!({"port": 8081}))).unwrap();
        assert_eq!(config.port, Some(8081));
        assert!(config.extra.get("port").is_none());

        assert!(config.remove("port"));
        let mut config: EnvironmentConfig =
            serde_json::from_value(json!({"port": "8080"})).unwrap();
        assert!(config.remove("port"));
        assert!(config.extra.is_empty());
    }

    #[test]
    fn test_lookup_variants() {
        let mut context = ApplicationContext::new("demo");
        context.environment_entry("local", "default");

        assert!(context.lookup(None, None).is_found());
        assert_eq!(
            context.lookup(Some("heroku"), None),
            ContextLookup::NoSuchPlatform {
                platform: "heroku".to_string(),
                available_platforms: vec!["local".to_string()],
            }
        );
        assert_eq!(
            context.lookup(None, Some("staging")),
            ContextLookup::NoSuchEnvironment {
                platform: "local".to_string(),
                environment: "staging".to_string(),
                available_environments: vec!["default".to_string()],
            }
        );
    }

    #[test]
    fn test_resolved_target_name_prefers_environment() {
        let mut context = ApplicationContext::new("demo");
        context.environment_entry("heroku", "default").app_name = Some("demo-heroku".to_string());
        let resolved = context.lookup(Some("heroku"), Some("default")).found().unwrap();
        assert_eq!(resolved.target_name(), "demo-heroku");
        assert_eq!(resolved.to_value().unwrap()["app_name"], json!("demo-heroku"));
    }
}
