//! User-facing management of service credential profiles.
//!
//! Every operation reports through [`OperationResponse`]; nothing here
//! returns an error to the caller.

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::{ContextError, ContextResult};
use crate::models::{ConfigMap, ProfileMap};
use crate::response::OperationResponse;
use crate::schema::{mask_profile, ServiceSchemaRegistry};
use crate::store::ContextStore;

/// Profile name used when none is given.
pub const DEFAULT_PROFILE: &str = "default";

/// Service profile operations over a store and a schema table.
#[derive(Debug, Clone)]
pub struct ConfigService {
    store: ContextStore,
    schemas: ServiceSchemaRegistry,
}

impl ConfigService {
    pub fn new(store: ContextStore, schemas: ServiceSchemaRegistry) -> Self {
        Self { store, schemas }
    }

    pub fn schemas(&self) -> &ServiceSchemaRegistry {
        &self.schemas
    }

    /// Validate and save a profile, then link it into an environment.
    ///
    /// The environment defaults to the active selection and must already be
    /// initialized.
    pub fn init(
        &self,
        service: &str,
        config: ConfigMap,
        profile: &str,
        platform: Option<&str>,
        environment: Option<&str>,
    ) -> OperationResponse {
        let tagged = |response: OperationResponse| {
            response
                .with_field("service", service)
                .with_field("profile_name", profile)
        };

        let context = match self.store.load_application() {
            Ok(Some(context)) => context,
            Ok(None) => return tagged(ContextError::NoContext.into()),
            Err(e) => return tagged(e.into()),
        };
        if config.is_empty() {
            return tagged(OperationResponse::failure("No configuration provided."));
        }
        if let Err(e) = self.schemas.validate(service, &config) {
            return tagged(e.into());
        }

        let platform = platform.unwrap_or(context.active_platform.as_str());
        let environment = environment.unwrap_or(context.active_environment.as_str());
        if context.environment(platform, environment).is_none() {
            return tagged(
                ContextError::NotInitialized {
                    platform: platform.to_string(),
                    environment: environment.to_string(),
                    available_platforms: context.platform_names(),
                    available_environments: context.environment_names(platform),
                }
                .into(),
            );
        }
        let link = reference(service, profile);

        let result = self
            .store
            .add_service_profile(service, profile, config)
            .and_then(|()| self.store.merge_environment(platform, environment, &link));

        match result {
            Ok(context) => {
                info!("Linked {} profile '{}' to {}/{}", service, profile, platform, environment);
                tagged(
                    OperationResponse::success(format!(
                        "Profile '{profile}' for service '{service}' saved and linked to {platform}/{environment}"
                    ))
                    .annotate(&context.app_name, platform, environment),
                )
            }
            Err(e) => tagged(OperationResponse::failure(format!(
                "Failed to save credentials: {e}"
            ))),
        }
    }

    /// Overwrite keys of an existing profile. The merged profile must still
    /// satisfy the service schema.
    pub fn update(&self, service: &str, updates: ConfigMap, profile: &str) -> OperationResponse {
        let tagged = |response: OperationResponse| {
            response
                .with_field("service", service)
                .with_field("profile_name", profile)
        };

        let existing = match self.require_profile(service, profile) {
            Ok(existing) => existing,
            Err(e) => return tagged(e.into()),
        };
        if updates.is_empty() {
            return tagged(OperationResponse::failure("No updates provided."));
        }

        let mut merged = existing;
        merged.extend(updates.clone());
        if let Err(e) = self.schemas.validate(service, &merged) {
            return tagged(e.into());
        }

        match self.store.update_service_profile(service, profile, &updates) {
            Ok(_) => {
                let fields: Vec<Value> = updates.keys().cloned().map(Value::String).collect();
                tagged(
                    OperationResponse::success(format!(
                        "Profile '{profile}' for service '{service}' updated"
                    ))
                    .with_field("updated_fields", fields),
                )
            }
            Err(e) => tagged(OperationResponse::failure(format!(
                "Failed to update configuration: {e}"
            ))),
        }
    }

    /// Profiles of one service, or of every service. Secrets are masked.
    pub fn list(&self, service: Option<&str>) -> OperationResponse {
        match service {
            Some(service) => match self.store.list_service_profiles(service) {
                Ok(profiles) if profiles.is_empty() => {
                    ContextError::NoProfiles(service.to_string()).into()
                }
                Ok(profiles) => OperationResponse::ok()
                    .with_field("service", service)
                    .with_field("profiles", masked(&profiles)),
                Err(e) => failed_listing(e),
            },
            None => {
                let global = match self.store.load_global() {
                    Ok(global) => global,
                    Err(e) => return failed_listing(e),
                };
                let all: ConfigMap = global
                    .service_profiles
                    .iter()
                    .map(|(service, profiles)| (service.clone(), masked(profiles)))
                    .collect();
                OperationResponse::ok().with_field("profiles", Value::Object(all))
            }
        }
    }

    /// One profile with secrets masked.
    pub fn view(&self, service: &str, profile: &str) -> OperationResponse {
        let tagged = |response: OperationResponse| {
            response
                .with_field("service", service)
                .with_field("profile_name", profile)
        };

        match self.require_profile(service, profile) {
            Ok(data) => tagged(
                OperationResponse::success(format!(
                    "Profile '{profile}' for service '{service}' is shown below"
                ))
                .with_field("data", Value::Object(mask_profile(&data))),
            ),
            Err(e) => tagged(e.into()),
        }
    }

    /// Delete a profile and unlink it from every environment that uses it.
    pub fn delete(&self, service: &str, profile: &str) -> OperationResponse {
        let tagged = |response: OperationResponse| {
            response
                .with_field("service", service)
                .with_field("profile_name", profile)
        };

        if let Err(e) = self.require_profile(service, profile) {
            return tagged(e.into());
        }
        if let Err(e) = self.store.delete_service_profile(service, profile) {
            return tagged(OperationResponse::failure(format!(
                "Failed to delete profile: {e}"
            )));
        }

        let unlinked = match self.unlink(service, profile) {
            Ok(unlinked) => unlinked,
            Err(e) => {
                warn!("Profile deleted but references were not cleared: {}", e);
                return tagged(OperationResponse::failure(format!(
                    "Profile deleted, but clearing environment references failed: {e}"
                )));
            }
        };

        tagged(
            OperationResponse::success(format!(
                "Profile '{profile}' for service '{service}' has been deleted."
            ))
            .with_field("unlinked_environments", unlinked),
        )
    }

    fn require_profile(&self, service: &str, profile: &str) -> ContextResult<ConfigMap> {
        let profiles = self.store.list_service_profiles(service)?;
        if profiles.is_empty() {
            return Err(ContextError::NoProfiles(service.to_string()));
        }
        profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| ContextError::ProfileNotFound {
                service: service.to_string(),
                profile: profile.to_string(),
            })
    }

    /// Clear `service` from every environment referencing `profile`.
    fn unlink(&self, service: &str, profile: &str) -> ContextResult<Vec<String>> {
        let Some(context) = self.store.load_application()? else {
            return Ok(Vec::new());
        };

        let mut unlinked = Vec::new();
        for (platform, environments) in &context.platform {
            for (environment, config) in environments {
                if config.service_profile(service) != Some(profile) {
                    continue;
                }
                self.store.clear_platform_keys(platform, environment, &[service])?;
                unlinked.push(format!("{platform}/{environment}"));
            }
        }
        Ok(unlinked)
    }
}

fn reference(service: &str, profile: &str) -> ConfigMap {
    let mut link = ConfigMap::new();
    link.insert(service.to_string(), json!({ "profile": profile }));
    link
}

fn masked(profiles: &ProfileMap) -> Value {
    Value::Object(
        profiles
            .iter()
            .map(|(name, profile)| (name.clone(), Value::Object(mask_profile(profile))))
            .collect(),
    )
}

fn failed_listing(error: ContextError) -> OperationResponse {
    OperationResponse::failure(format!("Failed to list profiles: {error}"))
}
