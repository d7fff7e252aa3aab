//! Named service profiles kept in the global document.

use tracing::{debug, info};

use crate::error::{ContextError, ContextResult};
use crate::models::{ConfigMap, ProfileMap};
use crate::store::ContextStore;

impl ContextStore {
    /// Store a profile, replacing any profile of the same name.
    pub fn add_service_profile(
        &self,
        service: &str,
        profile: &str,
        config: ConfigMap,
    ) -> ContextResult<()> {
        require_name("service", service)?;
        require_name("profile", profile)?;

        let mut global = self.load_global()?;
        global
            .service_profiles
            .entry(service.to_string())
            .or_default()
            .insert(profile.to_string(), config);
        self.save_global(&global)?;

        info!("Saved profile '{}' for {}", profile, service);
        Ok(())
    }

    /// Overwrite individual keys of an existing profile.
    ///
    /// Returns the updated profile.
    pub fn update_service_profile(
        &self,
        service: &str,
        profile: &str,
        updates: &ConfigMap,
    ) -> ContextResult<ConfigMap> {
        let mut global = self.load_global()?;
        let existing = global
            .service_profiles
            .get_mut(service)
            .and_then(|profiles| profiles.get_mut(profile))
            .ok_or_else(|| profile_not_found(service, profile))?;

        for (key, value) in updates {
            existing.insert(key.clone(), value.clone());
        }
        let updated = existing.clone();
        self.save_global(&global)?;

        info!("Updated profile '{}' for {}", profile, service);
        Ok(updated)
    }

    /// One profile, if it exists.
    pub fn get_service_profile(&self, service: &str, profile: &str) -> ContextResult<Option<ConfigMap>> {
        Ok(self
            .load_global()?
            .profiles(service)
            .and_then(|profiles| profiles.get(profile))
            .cloned())
    }

    /// Every profile of a service. Unknown services yield an empty map.
    pub fn list_service_profiles(&self, service: &str) -> ContextResult<ProfileMap> {
        Ok(self
            .load_global()?
            .profiles(service)
            .cloned()
            .unwrap_or_default())
    }

    /// Services that have at least one stored profile.
    pub fn list_services(&self) -> ContextResult<Vec<String>> {
        Ok(self
            .load_global()?
            .service_profiles
            .into_iter()
            .filter(|(_, profiles)| !profiles.is_empty())
            .map(|(service, _)| service)
            .collect())
    }

    /// Remove a profile. Returns whether it existed.
    ///
    /// A service left without profiles is dropped from the document.
    pub fn delete_service_profile(&self, service: &str, profile: &str) -> ContextResult<bool> {
        let mut global = self.load_global()?;
        let Some(profiles) = global.service_profiles.get_mut(service) else {
            return Ok(false);
        };
        if profiles.shift_remove(profile).is_none() {
            return Ok(false);
        }
        if profiles.is_empty() {
            debug!("Last profile of {} removed", service);
            global.service_profiles.shift_remove(service);
        }

        self.save_global(&global)?;
        info!("Deleted profile '{}' for {}", profile, service);
        Ok(true)
    }
}

fn require_name(kind: &str, value: &str) -> ContextResult<()> {
    if value.trim().is_empty() {
        return Err(ContextError::Validation(format!("{kind} name must not be empty")));
    }
    Ok(())
}

fn profile_not_found(service: &str, profile: &str) -> ContextError {
    ContextError::ProfileNotFound {
        service: service.to_string(),
        profile: profile.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::ContextPaths;
    use serde_json::{json, Value};
    use tempfile::tempdir;

    fn config(value: Value) -> ConfigMap {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn store_in(dir: &std::path::Path) -> ContextStore {
        ContextStore::new(ContextPaths::rooted(dir, dir))
    }

    #[test]
    fn test_add_and_get_profile() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path());
        store
            .add_service_profile("mulesoft", "default", config(json!({"org_id": "o"})))
            .unwrap();

        let profile = store.get_service_profile("mulesoft", "default").unwrap().unwrap();
        assert_eq!(profile["org_id"], json!("o"));
        assert!(store.get_service_profile("mulesoft", "prod").unwrap().is_none());
        assert_eq!(store.list_services().unwrap(), vec!["mulesoft".to_string()]);
    }

    #[test]
    fn test_empty_names_are_rejected() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path());
        let err = store
            .add_service_profile("mulesoft", " ", ConfigMap::new())
            .unwrap_err();
        assert!(matches!(err, ContextError::Validation(_)));
    }

    #[test]
    fn test_update_is_shallow_and_requires_existing() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path());
        let err = store
            .update_service_profile("mulesoft", "default", &ConfigMap::new())
            .unwrap_err();
        assert!(matches!(err, ContextError::ProfileNotFound { .. }));

        store
            .add_service_profile(
                "mulesoft",
                "default",
                config(json!({"org_id": "o", "client_id": "c"})),
            )
            .unwrap();
        let updated = store
            .update_service_profile("mulesoft", "default", &config(json!({"client_id": "c2"})))
            .unwrap();
        assert_eq!(Value::Object(updated), json!({"org_id": "o", "client_id": "c2"}));
    }

    #[test]
    fn test_delete_profile() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path());
        assert!(!store.delete_service_profile("mulesoft", "default").unwrap());

        store
            .add_service_profile("mulesoft", "default", ConfigMap::new())
            .unwrap();
        store
            .add_service_profile("mulesoft", "prod", ConfigMap::new())
            .unwrap();

        assert!(store.delete_service_profile("mulesoft", "default").unwrap());
        let remaining: Vec<_> = store
            .list_service_profiles("mulesoft")
            .unwrap()
            .into_keys()
            .collect();
        assert_eq!(remaining, vec!["prod".to_string()]);

        assert!(store.delete_service_profile("mulesoft", "prod").unwrap());
        assert!(store.list_services().unwrap().is_empty());
    }
}
