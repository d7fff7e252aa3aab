//! Persistence of the application and global context documents.
//!
//! Nothing is cached: every operation reads the document from disk, applies
//! its change in memory and writes the whole document back. Writes go to a
//! sibling temporary file that is renamed over the target, so a crash never
//! leaves a truncated document. There is no locking; two concurrent
//! invocations writing the same file are last-writer-wins.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{ContextError, ContextResult};
use crate::models::{
    ApplicationContext, ConfigMap, ContextLookup, EnvironmentCheck, GlobalContext, RegisteredApp,
};
use crate::paths::ContextPaths;

/// Reads and writes the context documents.
#[derive(Debug, Clone)]
pub struct ContextStore {
    paths: ContextPaths,
}

impl ContextStore {
    pub fn new(paths: ContextPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ContextPaths {
        &self.paths
    }

    pub fn context_file(&self) -> &Path {
        &self.paths.context_file
    }

    pub fn global_file(&self) -> &Path {
        &self.paths.global_file
    }

    // =========================================================================
    // Raw JSON
    // =========================================================================

    /// Load a JSON object. Missing and blank files read as `None`.
    pub(crate) fn load_json(path: &Path) -> ContextResult<Option<ConfigMap>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(None);
        }

        match serde_json::from_str::<Value>(&content)? {
            Value::Object(map) => Ok(Some(map)),
            other => Err(ContextError::InvalidDocument {
                path: path.to_path_buf(),
                message: format!("expected a JSON object, found {}", json_kind(&other)),
            }),
        }
    }

    /// Write a value as pretty-printed JSON, replacing the file atomically.
    pub(crate) fn save_json<T: Serialize>(path: &Path, value: &T) -> ContextResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(value)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, path)?;
        debug!("Wrote {:?}", path);
        Ok(())
    }

    // =========================================================================
    // Application context
    // =========================================================================

    /// Load the whole application document, migrated and validated.
    pub fn load_application(&self) -> ContextResult<Option<ApplicationContext>> {
        let path = self.context_file();
        let Some(document) = Self::load_json(path)? else {
            return Ok(None);
        };
        if document.is_empty() {
            return Ok(None);
        }

        ApplicationContext::from_document(document)
            .map(Some)
            .map_err(|e| invalid_document(path, e))
    }

    /// Load the application document or fail with [`ContextError::NoContext`].
    pub fn require_application(&self) -> ContextResult<ApplicationContext> {
        self.load_application()?.ok_or(ContextError::NoContext)
    }

    /// Validate and write the application document.
    pub fn save_application(&self, context: &ApplicationContext) -> ContextResult<()> {
        context.validate()?;
        Self::save_json(self.context_file(), context)
    }

    /// Read the context for a platform environment.
    ///
    /// Omitted arguments fall back to the active selection.
    pub fn read(&self, platform: Option<&str>, environment: Option<&str>) -> ContextResult<ContextLookup> {
        Ok(match self.load_application()? {
            Some(context) => context.lookup(platform, environment),
            None => ContextLookup::NotFound,
        })
    }

    /// Deep-merge `values` into one environment and make it active.
    ///
    /// Creates the document when none exists, in which case `app_name` is
    /// required.
    pub fn update_platform(
        &self,
        platform: &str,
        environment: &str,
        values: &ConfigMap,
        app_name: Option<&str>,
    ) -> ContextResult<ApplicationContext> {
        let mut context = match (self.load_application()?, app_name) {
            (Some(context), _) => context,
            (None, Some(name)) => ApplicationContext::new(name),
            (None, None) => return Err(ContextError::NoContext),
        };

        if let Some(name) = app_name {
            context.app_name = name.to_string();
        }

        context.environment_entry(platform, environment).merge(values)?;
        context.active_platform = platform.to_string();
        context.active_environment = environment.to_string();
        context.touch();

        self.save_application(&context)?;
        info!("Updated {}/{} for {}", platform, environment, context.app_name);
        Ok(context)
    }

    /// Deep-merge `values` into an existing environment without changing the
    /// active selection.
    pub fn merge_environment(
        &self,
        platform: &str,
        environment: &str,
        values: &ConfigMap,
    ) -> ContextResult<ApplicationContext> {
        let mut context = self.require_application()?;
        let available_platforms = context.platform_names();
        let available_environments = context.environment_names(platform);

        let Some(config) = context
            .platform
            .get_mut(platform)
            .and_then(|envs| envs.get_mut(environment))
        else {
            return Err(ContextError::NotInitialized {
                platform: platform.to_string(),
                environment: environment.to_string(),
                available_platforms,
                available_environments,
            });
        };

        config.merge(values)?;
        context.touch();
        self.save_application(&context)?;
        debug!("Merged {} keys into {}/{}", values.len(), platform, environment);
        Ok(context)
    }

    /// Persist a new active selection. The pair must already exist.
    pub fn set_active(&self, platform: &str, environment: &str) -> ContextResult<ApplicationContext> {
        let mut context = self.require_application()?;

        if context.environment(platform, environment).is_none() {
            return Err(ContextError::NotInitialized {
                platform: platform.to_string(),
                environment: environment.to_string(),
                available_platforms: context.platform_names(),
                available_environments: context.environment_names(platform),
            });
        }

        if !context.is_active(platform, environment) {
            context.active_platform = platform.to_string();
            context.active_environment = environment.to_string();
            context.touch();
            self.save_application(&context)?;
            info!("Active selection is now {}/{}", platform, environment);
        }

        Ok(context)
    }

    /// Remove keys from one environment's configuration.
    ///
    /// Missing context, platform or environment is a no-op. Returns the keys
    /// that were actually removed.
    pub fn clear_platform_keys(
        &self,
        platform: &str,
        environment: &str,
        keys: &[&str],
    ) -> ContextResult<Vec<String>> {
        let Some(mut context) = self.load_application()? else {
            return Ok(Vec::new());
        };
        let Some(config) = context
            .platform
            .get_mut(platform)
            .and_then(|envs| envs.get_mut(environment))
        else {
            return Ok(Vec::new());
        };

        let removed: Vec<String> = keys
            .iter()
            .filter(|key| config.remove(key))
            .map(|key| key.to_string())
            .collect();

        if !removed.is_empty() {
            context.touch();
            self.save_application(&context)?;
            debug!("Cleared {:?} from {}/{}", removed, platform, environment);
        }

        Ok(removed)
    }

    /// Delete the application document. Returns whether a file was removed.
    pub fn delete_application(&self) -> ContextResult<bool> {
        let path = self.context_file();
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path)?;
        info!("Deleted {:?}", path);
        Ok(true)
    }

    /// Describe whether a platform environment exists and what does.
    pub fn check_platform_environment(&self, platform: &str, environment: &str) -> EnvironmentCheck {
        let context = match self.load_application() {
            Ok(Some(context)) => context,
            Ok(None) => {
                return EnvironmentCheck {
                    error: Some("No app context found".to_string()),
                    ..EnvironmentCheck::default()
                }
            }
            Err(e) => {
                return EnvironmentCheck {
                    error: Some(format!("Context validation error: {e}")),
                    ..EnvironmentCheck::default()
                }
            }
        };

        let available_platforms = context.platform_names();
        if !context.platform.contains_key(platform) {
            return EnvironmentCheck {
                available_platforms,
                error: Some(format!("Platform '{platform}' not initialized")),
                ..EnvironmentCheck::default()
            };
        }

        let available_environments = context.environment_names(platform);
        let exists = available_environments.iter().any(|e| e == environment);
        EnvironmentCheck {
            exists,
            platform_exists: true,
            available_platforms,
            available_environments,
            error: (!exists).then(|| {
                format!("Environment '{environment}' not found for platform '{platform}'")
            }),
        }
    }

    // =========================================================================
    // Global registry
    // =========================================================================

    /// Load the global document. A missing file reads as empty.
    pub fn load_global(&self) -> ContextResult<GlobalContext> {
        let path = self.global_file();
        match Self::load_json(path)? {
            Some(document) => {
                GlobalContext::from_document(document).map_err(|e| invalid_document(path, e))
            }
            None => Ok(GlobalContext::default()),
        }
    }

    /// Validate and write the global document.
    pub fn save_global(&self, global: &GlobalContext) -> ContextResult<()> {
        global.validate()?;
        Self::save_json(self.global_file(), global)
    }

    /// Register an application by its resolved path.
    ///
    /// Returns `false` when an application with the same path is already
    /// registered.
    pub fn register_app(&self, app_name: &str, path: &Path, extra: ConfigMap) -> ContextResult<bool> {
        let mut global = self.load_global()?;
        let path = resolve_path(path)?;

        if global.applications.iter().any(|app| app.path == path) {
            debug!("App already registered at {:?}", path);
            return Ok(false);
        }

        let app = RegisteredApp::new(app_name, path, extra);
        if app.app_name.trim().is_empty() {
            return Err(ContextError::Validation(
                "app_name must not be empty".to_string(),
            ));
        }

        info!("Registering app '{}' at {:?}", app.app_name, app.path);
        global.applications.push(app);
        self.save_global(&global)?;
        Ok(true)
    }

    /// Remove every registration with this name. Returns whether any existed.
    pub fn unregister_app(&self, app_name: &str) -> ContextResult<bool> {
        let mut global = self.load_global()?;
        let before = global.applications.len();
        global.applications.retain(|app| app.app_name != app_name);

        if global.applications.len() == before {
            return Ok(false);
        }

        self.save_global(&global)?;
        info!("Unregistered app '{}'", app_name);
        Ok(true)
    }

    /// Every registered application, in registration order.
    pub fn list_apps(&self) -> ContextResult<Vec<RegisteredApp>> {
        Ok(self.load_global()?.applications)
    }
}

/// Absolute, symlink-free form of `path` when it exists, absolute otherwise.
pub fn resolve_path(path: &Path) -> ContextResult<PathBuf> {
    match fs::canonicalize(path) {
        Ok(resolved) => Ok(resolved),
        Err(_) => Ok(std::path::absolute(path)?),
    }
}

fn invalid_document(path: &Path, error: ContextError) -> ContextError {
    match error {
        ContextError::Validation(message) => ContextError::InvalidDocument {
            path: path.to_path_buf(),
            message,
        },
        other => other,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
