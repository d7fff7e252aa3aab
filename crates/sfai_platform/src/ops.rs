//! Application operations dispatched to platform providers.
//!
//! Every operation resolves the target platform environment (switching the
//! active selection when it changes), reads its configuration, runs the
//! provider, then persists the configuration changes the provider reported.
//! Failures are returned as unsuccessful responses rather than errors.

use std::sync::Arc;

use tracing::{debug, info, warn};

use sfai_context::{
    ApplicationContext, ContextError, ContextLookup, ContextStore, OperationResponse,
    ResolvedContext, Resolver, DEFAULT_ENVIRONMENT,
};

use crate::platform::{DeployOptions, InitOptions, OpenOptions, PlatformOutcome};
use crate::registry::PlatformRegistry;

/// Provider operation requested for the resolved target.
#[derive(Debug, Clone, Copy)]
enum Action<'a> {
    Deploy(&'a DeployOptions),
    Delete,
    Logs,
    Status,
    Open(&'a OpenOptions),
}

impl Action<'_> {
    fn name(&self) -> &'static str {
        match self {
            Self::Deploy(_) => "deploy",
            Self::Delete => "delete",
            Self::Logs => "logs",
            Self::Status => "status",
            Self::Open(_) => "open",
        }
    }
}

/// Dispatcher between the context store and the platform registry.
#[derive(Debug, Clone)]
pub struct AppOperations {
    store: ContextStore,
    resolver: Resolver,
    registry: Arc<PlatformRegistry>,
}

impl AppOperations {
    pub fn new(store: ContextStore, registry: PlatformRegistry) -> Self {
        Self {
            resolver: Resolver::new(store.clone()),
            store,
            registry: Arc::new(registry),
        }
    }

    pub fn store(&self) -> &ContextStore {
        &self.store
    }

    pub fn registry(&self) -> &PlatformRegistry {
        &self.registry
    }

    /// Initialize a platform environment and make it active.
    ///
    /// The platform defaults to the active one and the environment to
    /// `default`. Whatever configuration the provider reports is merged into
    /// the environment, which is created when new.
    pub async fn init_platform(
        &self,
        platform: Option<&str>,
        environment: Option<&str>,
        options: &InitOptions,
    ) -> OperationResponse {
        let context = match self.store.require_application() {
            Ok(context) => context,
            Err(e) => return e.into(),
        };
        let platform = platform.unwrap_or(context.active_platform.as_str()).to_string();
        let environment = environment.unwrap_or(DEFAULT_ENVIRONMENT).to_string();

        let provider = match self.registry.get_required(&platform) {
            Ok(provider) => provider,
            Err(e) => return OperationResponse::from(e).with_app_name(&context.app_name),
        };

        let target = target_of(&context, &platform, &environment);
        info!("Initializing {}/{} for {}", platform, environment, context.app_name);
        let outcome = match provider.init(&target, options).await {
            Ok(outcome) => outcome,
            Err(e) => PlatformOutcome::new(e.into()),
        };

        let mut response = outcome.response;
        if response.success {
            if let Err(e) = self
                .store
                .update_platform(&platform, &environment, &outcome.updates, None)
            {
                warn!("Failed to store {}/{}: {}", platform, environment, e);
                response = e.into();
            }
        }
        response.annotate(&context.app_name, &platform, &environment)
    }

    /// Make a platform environment active.
    pub fn switch(&self, platform: &str, environment: Option<&str>) -> OperationResponse {
        self.resolver.switch(platform, environment)
    }

    pub async fn deploy(
        &self,
        platform: Option<&str>,
        environment: Option<&str>,
        options: &DeployOptions,
    ) -> OperationResponse {
        self.dispatch(platform, environment, Action::Deploy(options)).await
    }

    pub async fn delete(&self, platform: Option<&str>, environment: Option<&str>) -> OperationResponse {
        self.dispatch(platform, environment, Action::Delete).await
    }

    pub async fn logs(&self, platform: Option<&str>, environment: Option<&str>) -> OperationResponse {
        self.dispatch(platform, environment, Action::Logs).await
    }

    pub async fn status(&self, platform: Option<&str>, environment: Option<&str>) -> OperationResponse {
        self.dispatch(platform, environment, Action::Status).await
    }

    /// Open the application. Tunnels are only available on `local`.
    pub async fn open(
        &self,
        platform: Option<&str>,
        environment: Option<&str>,
        options: &OpenOptions,
    ) -> OperationResponse {
        self.dispatch(platform, environment, Action::Open(options)).await
    }

    /// The stored application context.
    pub fn get_context(&self) -> OperationResponse {
        let context = match self.store.load_application() {
            Ok(Some(context)) => context,
            Ok(None) => return OperationResponse::failure("No app context found"),
            Err(e) => return e.into(),
        };
        match serde_json::to_value(&context) {
            Ok(value) => OperationResponse::ok()
                .with_app_name(&context.app_name)
                .with_platform(&context.active_platform)
                .with_environment(&context.active_environment)
                .with_field("context", value),
            Err(e) => OperationResponse::failure(e.to_string()),
        }
    }

    /// Delete the context file, then unregister the application.
    ///
    /// A failed unregistration is reported but the file stays deleted.
    pub fn delete_context(&self) -> OperationResponse {
        let app_name = match self.store.load_application() {
            Ok(Some(context)) => context.app_name,
            Ok(None) => return OperationResponse::failure("No app context found"),
            Err(e) => return e.into(),
        };

        match self.store.delete_application() {
            Ok(true) => {}
            Ok(false) => {
                return OperationResponse::failure(format!("Context for {app_name} not found"))
                    .with_app_name(app_name)
            }
            Err(e) => return OperationResponse::from(e).with_app_name(app_name),
        }

        match self.store.unregister_app(&app_name) {
            Ok(_) => OperationResponse::success(format!("Context for {app_name} deleted and unregistered"))
                .with_app_name(app_name),
            Err(e) => OperationResponse::failure(format!(
                "Context for {app_name} deleted but unregistering failed: {e}"
            ))
            .with_app_name(app_name)
            .with_field("deleted", true),
        }
    }

    async fn dispatch(
        &self,
        platform: Option<&str>,
        environment: Option<&str>,
        action: Action<'_>,
    ) -> OperationResponse {
        let resolution = match self.resolver.resolve(platform, environment) {
            Ok(resolution) => resolution,
            Err(e) => return e.into(),
        };

        let context = match self
            .store
            .read(Some(&resolution.platform), Some(&resolution.environment))
        {
            Ok(ContextLookup::Found(context)) => context,
            Ok(_) => {
                return OperationResponse::failure(format!(
                    "Failed to read context for platform '{}' and environment '{}'",
                    resolution.platform, resolution.environment
                ))
            }
            Err(e) => return e.into(),
        };

        let provider = match self.registry.get_required(&context.platform) {
            Ok(provider) => provider,
            Err(e) => return annotate(e.into(), &context),
        };

        if let Action::Open(options) = action {
            if options.tunnel && context.platform != "local" {
                return annotate(
                    OperationResponse::failure("Tunneling is only supported in local environment."),
                    &context,
                );
            }
        }

        debug!("Dispatching {} to {}/{}", action.name(), context.platform, context.environment);
        let result = match action {
            Action::Deploy(options) => provider.deploy(&context, options).await,
            Action::Delete => provider.delete(&context).await,
            Action::Logs => provider.logs(&context).await,
            Action::Status => provider.status(&context).await,
            Action::Open(options) => provider.open(&context, options).await,
        };
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("{} on {} failed: {}", action.name(), context.platform, e);
                PlatformOutcome::new(e.into())
            }
        };

        self.apply(&context, outcome)
    }

    /// Persist what a provider reported and tag the response with its target.
    fn apply(&self, context: &ResolvedContext, outcome: PlatformOutcome) -> OperationResponse {
        let PlatformOutcome {
            mut response,
            updates,
            cleared,
        } = outcome;

        if !updates.is_empty() {
            if let Err(e) = self
                .store
                .merge_environment(&context.platform, &context.environment, &updates)
            {
                warn!("Failed to store provider updates: {}", e);
                response = unsaved(response, e);
            }
        }

        if !cleared.is_empty() {
            let keys: Vec<&str> = cleared.iter().map(String::as_str).collect();
            if let Err(e) = self
                .store
                .clear_platform_keys(&context.platform, &context.environment, &keys)
            {
                warn!("Failed to clear {:?}: {}", keys, e);
                response = unsaved(response, e);
            }
        }

        annotate(response, context)
    }
}

/// Mark a provider result as failed because the context write failed.
///
/// The provider's message and fields are kept.
fn unsaved(mut response: OperationResponse, error: ContextError) -> OperationResponse {
    response.success = false;
    response.error = Some(format!(
        "Operation completed but the context could not be updated: {error}"
    ));
    response
}

fn annotate(response: OperationResponse, context: &ResolvedContext) -> OperationResponse {
    response.annotate(&context.app_name, &context.platform, &context.environment)
}

/// The target a provider sees during init, possibly not stored yet.
fn target_of(context: &ApplicationContext, platform: &str, environment: &str) -> ResolvedContext {
    ResolvedContext {
        app_name: context.app_name.clone(),
        platform: platform.to_string(),
        environment: environment.to_string(),
        config: context
            .environment(platform, environment)
            .cloned()
            .unwrap_or_default(),
        integrations: context.integrations.clone(),
    }
}
