//! # sfai_templates
//!
//! Application templates scaffolded by `sfai app init`.
//!
//! Templates are compiled into the binary. Each one carries the files needed
//! to run locally, in a container and on Heroku (`app.py`,
//! `requirements.txt`, `Dockerfile`, `Procfile`, `version.json`), with
//! `{{app_name}}` placeholders filled in at scaffold time.
//!
//! A default Helm chart for the Kubernetes platforms is embedded the same
//! way and written to `helm-chart/` on request.

pub mod error;
pub mod renderer;
pub mod scaffold;

pub use error::{TemplateError, TemplateResult};
pub use renderer::{to_snake_case, TemplateRenderer};
pub use scaffold::{
    find_template, template_names, EmbeddedTemplate, ScaffoldReport, Scaffolder, DEFAULT_TEMPLATE,
    HELM_CHART, HELM_CHART_DIR, TEMPLATES,
};
