//! Upgrades of older on-disk context layouts.
//!
//! Early context files stored provider configuration directly under the
//! platform key (`platform.heroku.app_name`). The current layout nests one
//! more level for the environment (`platform.heroku.default.app_name`).

use serde_json::{Map, Value};
use tracing::debug;

use crate::models::DEFAULT_ENVIRONMENT;

/// Migrate a raw application context document in place.
///
/// Returns `true` when anything changed.
pub fn migrate_document(document: &mut Map<String, Value>) -> bool {
    let mut changed = false;

    if let Some(Value::Object(platforms)) = document.get_mut("platform") {
        changed |= migrate_platform_map(platforms);
    }

    if matches!(document.get("active_environment"), None | Some(Value::Null)) {
        document.insert(
            "active_environment".to_string(),
            Value::String(DEFAULT_ENVIRONMENT.to_string()),
        );
        changed = true;
    }

    changed
}

/// Wrap every legacy flat platform entry under the default environment.
///
/// An entry is already nested when it is a non-empty object whose values are
/// all objects. Other objects are wrapped; non-object values are left alone.
pub fn migrate_platform_map(platforms: &mut Map<String, Value>) -> bool {
    let mut changed = false;

    for (name, value) in platforms.iter_mut() {
        let Value::Object(entry) = value else {
            continue;
        };
        if is_nested(entry) {
            continue;
        }

        debug!("Migrating flat platform entry '{}' under '{}'", name, DEFAULT_ENVIRONMENT);
        let flat = std::mem::take(entry);
        let mut nested = Map::new();
        nested.insert(DEFAULT_ENVIRONMENT.to_string(), Value::Object(flat));
        *entry = nested;
        changed = true;
    }

    changed
}

fn is_nested(entry: &Map<String, Value>) -> bool {
    !entry.is_empty() && entry.values().all(Value::is_object)
}
