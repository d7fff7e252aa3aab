//! Resolution of the effective platform and environment for a command.
//!
//! Explicit overrides that differ from the active selection switch it, and
//! the switch is persisted even when the command itself only reads. An
//! uninitialized target is always an error; there is no fallback to the
//! default environment or the local platform.

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{ContextError, ContextResult};
use crate::models::DEFAULT_ENVIRONMENT;
use crate::response::OperationResponse;
use crate::store::ContextStore;

/// The pair a command should run against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub app_name: String,
    pub platform: String,
    pub environment: String,
    /// Whether the active selection was changed
    pub switched: bool,
}

/// Resolves and switches the active selection.
#[derive(Debug, Clone)]
pub struct Resolver {
    store: ContextStore,
}

impl Resolver {
    pub fn new(store: ContextStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ContextStore {
        &self.store
    }

    /// Compute the effective pair, switching when it differs from the active one.
    ///
    /// A platform given without an environment keeps the active environment
    /// when that platform has it, and uses the default environment otherwise.
    pub fn resolve(&self, platform: Option<&str>, environment: Option<&str>) -> ContextResult<Resolution> {
        let context = self.store.require_application()?;

        let (platform, environment) = match (platform, environment) {
            (Some(platform), Some(environment)) => (platform.to_string(), environment.to_string()),
            (Some(platform), None) => {
                let environment = if context
                    .environment(platform, &context.active_environment)
                    .is_some()
                {
                    context.active_environment.clone()
                } else {
                    DEFAULT_ENVIRONMENT.to_string()
                };
                (platform.to_string(), environment)
            }
            (None, Some(environment)) => (context.active_platform.clone(), environment.to_string()),
            (None, None) => (
                context.active_platform.clone(),
                context.active_environment.clone(),
            ),
        };

        if context.is_active(&platform, &environment) {
            debug!("Using active selection {}/{}", platform, environment);
            return Ok(Resolution {
                app_name: context.app_name,
                platform,
                environment,
                switched: false,
            });
        }

        let context = self.store.set_active(&platform, &environment)?;
        info!("Switched to {}/{}", platform, environment);
        Ok(Resolution {
            app_name: context.app_name,
            platform,
            environment,
            switched: true,
        })
    }

    /// Make a pair active, reporting the outcome.
    pub fn switch(&self, platform: &str, environment: Option<&str>) -> OperationResponse {
        match self.resolve(Some(platform), environment) {
            Ok(resolution) => {
                let message = if resolution.switched {
                    format!(
                        "Switched to {} platform ({} environment)",
                        resolution.platform, resolution.environment
                    )
                } else {
                    format!(
                        "Already on {} platform ({} environment)",
                        resolution.platform, resolution.environment
                    )
                };
                OperationResponse::success(message)
                    .with_app_name(resolution.app_name)
                    .with_platform(resolution.platform)
                    .with_environment(resolution.environment)
                    .with_field("switched", resolution.switched)
            }
            Err(e) => switch_failure(e, platform),
        }
    }
}

fn switch_failure(error: ContextError, platform: &str) -> OperationResponse {
    let available = match &error {
        ContextError::NotInitialized {
            available_platforms,
            available_environments,
            ..
        } => Some((available_platforms.clone(), available_environments.clone())),
        _ => None,
    };

    let response = OperationResponse::from(error).with_platform(platform);
    match available {
        Some((platforms, environments)) => response
            .with_field("available_platforms", platforms)
            .with_field("available_environments", environments),
        None => response,
    }
}
