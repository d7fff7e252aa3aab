//! Variable substitution in template files.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::{TemplateError, TemplateResult};

static VARIABLE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    // {{variable_name}}
    Regex::new(r"\{\{([a-zA-Z_][a-zA-Z0-9_]*)\}\}").expect("variable pattern is valid")
});

/// Replaces `{{name}}` placeholders with variable values.
#[derive(Debug, Clone, Default)]
pub struct TemplateRenderer {
    variables: HashMap<String, String>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Renderer for an application, exposing `app_name` and `app_name_snake`.
    pub fn for_app(app_name: &str) -> Self {
        Self::new()
            .with_variable("app_name", app_name)
            .with_variable("app_name_snake", to_snake_case(app_name))
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Render content, leaving unknown placeholders untouched.
    pub fn render(&self, content: &str) -> String {
        VARIABLE_PATTERN
            .replace_all(content, |caps: &Captures| {
                let name = &caps[1];
                self.variables
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    /// Render content, failing on the first unknown placeholder.
    pub fn render_strict(&self, content: &str) -> TemplateResult<String> {
        if let Some(missing) = VARIABLE_PATTERN
            .captures_iter(content)
            .map(|caps| caps[1].to_string())
            .find(|name| !self.variables.contains_key(name))
        {
            return Err(TemplateError::MissingVariable(missing));
        }
        Ok(self.render(content))
    }
}

/// Convert an application name to snake_case.
pub fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() && i > 0 {
            result.push('_');
        }
        result.push(c.to_lowercase().next().unwrap_or(c));
    }
    result.replace(['-', ' '], "_")
}
