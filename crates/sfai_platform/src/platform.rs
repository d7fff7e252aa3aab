//! The provider contract.
//!
//! Providers receive the resolved context and typed options, run their
//! external tools, and describe what should change in the environment's
//! configuration. They never write the context files themselves; the
//! dispatcher applies every [`PlatformOutcome`].

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use sfai_context::{ConfigMap, EnvironmentConfig, OperationResponse, ResolvedContext};

use crate::error::PlatformResult;

/// Default port the built-in templates listen on.
pub const APP_PORT: u16 = 8080;

/// What a provider operation produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlatformOutcome {
    pub response: OperationResponse,
    /// Deep-merged into the environment configuration
    pub updates: ConfigMap,
    /// Removed from the environment configuration
    pub cleared: Vec<String>,
}

impl PlatformOutcome {
    pub fn new(response: OperationResponse) -> Self {
        Self {
            response,
            ..Self::default()
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(OperationResponse::success(message))
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self::new(OperationResponse::failure(error))
    }

    /// Record a configuration key to store.
    pub fn with_update(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.updates.insert(key.into(), value.into());
        self
    }

    pub fn with_updates(mut self, updates: ConfigMap) -> Self {
        self.updates.extend(updates);
        self
    }

    /// Record configuration keys to remove.
    pub fn with_cleared<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cleared.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Attach a field to the response.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.response = self.response.with_field(key, value);
        self
    }

    pub fn is_success(&self) -> bool {
        self.response.success
    }
}

/// Options for `init`.
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Provider settings given on the command line
    pub values: ConfigMap,
    /// Re-initialize an already configured environment
    pub force: bool,
}

impl InitOptions {
    pub fn new(values: ConfigMap) -> Self {
        Self {
            values,
            force: false,
        }
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// A non-empty string option.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }

    /// An option, falling back to what the environment already stores.
    pub fn setting(&self, key: &str, config: &EnvironmentConfig) -> Option<String> {
        self.value(key)
            .map(str::to_string)
            .or_else(|| config_str(config, key))
    }
}

/// Options for `deploy`.
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Application source directory
    pub path: PathBuf,
    /// Helm `key=value` overrides
    pub set_values: Vec<String>,
    /// Extra Helm values file
    pub values_file: Option<PathBuf>,
    /// Helm chart directory, `<path>/helm-chart` when unset
    pub chart: Option<PathBuf>,
    pub commit_message: Option<String>,
    pub branch: Option<String>,
}

impl DeployOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            set_values: Vec::new(),
            values_file: None,
            chart: None,
            commit_message: None,
            branch: None,
        }
    }

    pub fn with_set_values(mut self, values: Vec<String>) -> Self {
        self.set_values = values;
        self
    }

    pub fn with_values_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.values_file = Some(file.into());
        self
    }

    pub fn with_chart(mut self, chart: impl Into<PathBuf>) -> Self {
        self.chart = Some(chart.into());
        self
    }

    pub fn with_commit_message(mut self, message: impl Into<String>) -> Self {
        self.commit_message = Some(message.into());
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// The Helm chart directory to install.
    pub fn chart_dir(&self) -> PathBuf {
        self.chart
            .clone()
            .unwrap_or_else(|| self.path.join("helm-chart"))
    }
}

/// Options for `open`.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// URL path appended to the base URL
    pub path: String,
    /// Explicit URL, bypassing the stored one
    pub url: Option<String>,
    /// Local port for port-forwarding and tunnels
    pub port: u16,
    pub tunnel: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            path: "/docs".to_string(),
            url: None,
            port: APP_PORT,
            tunnel: false,
        }
    }
}

impl OpenOptions {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_tunnel(mut self, tunnel: bool) -> Self {
        self.tunnel = tunnel;
        self
    }

    /// Join a base URL and the requested path.
    pub fn join(&self, base: &str) -> String {
        format!("{}{}", base.trim_end_matches('/'), self.path)
    }
}

/// A deployment target.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Registry key, e.g. `heroku`
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn init(&self, context: &ResolvedContext, options: &InitOptions) -> PlatformResult<PlatformOutcome>;

    async fn deploy(&self, context: &ResolvedContext, options: &DeployOptions) -> PlatformResult<PlatformOutcome>;

    async fn delete(&self, context: &ResolvedContext) -> PlatformResult<PlatformOutcome>;

    async fn open(&self, context: &ResolvedContext, options: &OpenOptions) -> PlatformResult<PlatformOutcome>;

    async fn status(&self, context: &ResolvedContext) -> PlatformResult<PlatformOutcome>;

    async fn logs(&self, context: &ResolvedContext) -> PlatformResult<PlatformOutcome>;
}

/// A stored configuration value rendered as a string.
pub fn config_str(config: &EnvironmentConfig, key: &str) -> Option<String> {
    match key {
        "app_name" => config.app_name.clone(),
        "public_url" => config.public_url.clone(),
        "port" => config.port.map(|port| port.to_string()),
        "namespace" => config.namespace.clone(),
        "region" => config.region.clone(),
        "cluster_name" => config.cluster_name.clone(),
        other => config.extra_str(other).map(str::to_string),
    }
}
