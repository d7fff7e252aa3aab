//! Locations of the context documents.

use std::path::{Path, PathBuf};

use crate::error::{ContextError, ContextResult};

/// Directory holding sfai state, both per project and per user.
pub const CONTEXT_DIR: &str = ".sfai";

/// Project-local context file name.
pub const CONTEXT_FILE: &str = "context.json";

/// Global application registry file name.
pub const GLOBAL_APPS_FILE: &str = "apps.json";

/// Paths of the project-local and global documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextPaths {
    /// Project context, `./.sfai/context.json` by default
    pub context_file: PathBuf,
    /// Global registry, `~/.sfai/apps.json` by default
    pub global_file: PathBuf,
}

impl ContextPaths {
    pub fn new(context_file: impl Into<PathBuf>, global_file: impl Into<PathBuf>) -> Self {
        Self {
            context_file: context_file.into(),
            global_file: global_file.into(),
        }
    }

    /// Default locations relative to the working directory and home directory.
    pub fn discover() -> ContextResult<Self> {
        let home = dirs::home_dir().ok_or(ContextError::NoHomeDir)?;
        Ok(Self::rooted(Path::new("."), &home))
    }

    /// Locations under explicit project and home directories.
    pub fn rooted(project_dir: &Path, home_dir: &Path) -> Self {
        Self {
            context_file: project_dir.join(CONTEXT_DIR).join(CONTEXT_FILE),
            global_file: home_dir.join(CONTEXT_DIR).join(GLOBAL_APPS_FILE),
        }
    }

    /// Override the project context file.
    pub fn with_context_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.context_file = path.into();
        self
    }

    /// Override the global registry file.
    pub fn with_global_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_file = path.into();
        self
    }
}
