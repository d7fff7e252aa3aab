//! Writing embedded templates into an application directory.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{TemplateError, TemplateResult};
use crate::renderer::TemplateRenderer;

/// Template used when none is requested.
pub const DEFAULT_TEMPLATE: &str = "fastapi_hello";

/// Directory the Helm chart is written to, relative to the application.
pub const HELM_CHART_DIR: &str = "helm-chart";

/// A template compiled into the binary.
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedTemplate {
    pub name: &'static str,
    pub description: &'static str,
    /// Relative path and raw content of every file
    pub files: &'static [(&'static str, &'static str)],
}

macro_rules! template_files {
    ($dir:literal: $($file:literal),+ $(,)?) => {
        &[$(($file, include_str!(concat!("../templates/", $dir, "/", $file)))),+]
    };
}

/// Every built-in template.
pub static TEMPLATES: &[EmbeddedTemplate] = &[
    EmbeddedTemplate {
        name: "fastapi_hello",
        description: "FastAPI hello-world service",
        files: template_files!("fastapi_hello":
            "app.py", "requirements.txt", "Dockerfile", "Procfile", "version.json"),
    },
    EmbeddedTemplate {
        name: "flask_hello",
        description: "Flask hello-world service",
        files: template_files!("flask_hello":
            "app.py", "requirements.txt", "Dockerfile", "Procfile", "version.json"),
    },
];

/// Default Helm chart used by the Kubernetes platforms.
///
/// Chart expressions are written as `{{ .Values.x }}` so the renderer
/// leaves them alone.
pub static HELM_CHART: EmbeddedTemplate = EmbeddedTemplate {
    name: "helm_chart",
    description: "Helm chart with deployment, service and optional ingress",
    files: template_files!("helm_chart":
        "Chart.yaml", "values.yaml",
        "templates/deployment.yaml", "templates/service.yaml", "templates/ingress.yaml"),
};

/// Look up a built-in template by name.
pub fn find_template(name: &str) -> TemplateResult<&'static EmbeddedTemplate> {
    TEMPLATES
        .iter()
        .find(|template| template.name == name)
        .ok_or_else(|| TemplateError::NotFound {
            name: name.to_string(),
            available: template_names().into_iter().map(String::from).collect(),
        })
}

/// Names of every built-in template.
pub fn template_names() -> Vec<&'static str> {
    TEMPLATES.iter().map(|template| template.name).collect()
}

/// Files written and kept by a scaffold run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScaffoldReport {
    pub template: String,
    pub written: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

/// Renders templates into a destination directory.
#[derive(Debug, Clone)]
pub struct Scaffolder {
    renderer: TemplateRenderer,
}

impl Scaffolder {
    pub fn new(renderer: TemplateRenderer) -> Self {
        Self { renderer }
    }

    /// Scaffolder for an application name.
    pub fn for_app(app_name: &str) -> Self {
        Self::new(TemplateRenderer::for_app(app_name))
    }

    /// Write a template into `dest`.
    ///
    /// Existing files are left alone unless `force` is set.
    pub fn scaffold(&self, dest: &Path, template: &str, force: bool) -> TemplateResult<ScaffoldReport> {
        self.write(dest, find_template(template)?, force)
    }

    /// Write the default Helm chart into `<app_dir>/helm-chart`.
    pub fn write_helm_chart(&self, app_dir: &Path, force: bool) -> TemplateResult<ScaffoldReport> {
        self.write(&app_dir.join(HELM_CHART_DIR), &HELM_CHART, force)
    }

    fn write(&self, dest: &Path, template: &EmbeddedTemplate, force: bool) -> TemplateResult<ScaffoldReport> {
        if dest.exists() && !dest.is_dir() {
            return Err(TemplateError::NotADirectory(dest.to_path_buf()));
        }
        fs::create_dir_all(dest)?;

        info!("Scaffolding template {} into {:?}", template.name, dest);
        let mut report = ScaffoldReport {
            template: template.name.to_string(),
            ..ScaffoldReport::default()
        };

        for (relative, content) in template.files {
            let target = dest.join(relative);
            if target.exists() && !force {
                debug!("Keeping existing {:?}", target);
                report.skipped.push(target);
                continue;
            }

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, self.renderer.render_strict(content)?)?;
            debug!("Rendered: {:?}", relative);
            report.written.push(target);
        }

        Ok(report)
    }
}
