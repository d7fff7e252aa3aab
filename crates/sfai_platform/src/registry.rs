//! Registry of deployment platforms.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{PlatformError, PlatformResult};
use crate::platform::Platform;
use crate::providers::{EksPlatform, HerokuPlatform, LocalPlatform, MinikubePlatform};
use crate::tool::ToolRunner;

/// Maps platform names to their providers.
///
/// Built once at startup and handed to the dispatcher; names keep their
/// registration order.
#[derive(Default)]
pub struct PlatformRegistry {
    platforms: IndexMap<String, Arc<dyn Platform>>,
}

impl PlatformRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in provider sharing one tool runner.
    pub fn builtin(runner: Arc<dyn ToolRunner>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(LocalPlatform::new(runner.clone())));
        registry.register(Arc::new(MinikubePlatform::new(runner.clone())));
        registry.register(Arc::new(EksPlatform::new(runner.clone())));
        registry.register(Arc::new(HerokuPlatform::new(runner)));
        registry
    }

    /// Register a provider under its `name()`, replacing any previous one.
    pub fn register(&mut self, platform: Arc<dyn Platform>) {
        let name = platform.name().to_string();
        debug!("Registering platform: {}", name);
        self.platforms.insert(name, platform);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Platform>> {
        self.platforms.get(name).cloned()
    }

    /// Get a provider, failing with the list of known ones.
    pub fn get_required(&self, name: &str) -> PlatformResult<Arc<dyn Platform>> {
        self.get(name).ok_or_else(|| PlatformError::UnknownPlatform {
            name: name.to_string(),
            available: self.names().into_iter().map(String::from).collect(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.platforms.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.platforms.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.platforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }
}

impl std::fmt::Debug for PlatformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformRegistry")
            .field("platforms", &self.names())
            .finish()
    }
}
