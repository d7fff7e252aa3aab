//! CLI command definitions.
//!
//! Commands are grouped the way users think about an application: the app
//! itself, the platforms it is initialized on, and the external service
//! profiles it uses.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use thiserror::Error;

use sfai_context::{ConfigMap, ConfigService, ContextPaths, ContextStore, OperationResponse, ServiceSchemaRegistry};
use sfai_platform::{AppOperations, PlatformRegistry, SystemToolRunner};

pub mod app;
pub mod config;
pub mod platform;

/// sfai - deploy one application to many platforms and environments
#[derive(Parser)]
#[command(name = "sfai")]
#[command(version, about = "sfai - deploy one application to many platforms and environments")]
#[command(long_about = r#"
sfai scaffolds an application and keeps track of every platform and
environment it has been initialized on. Commands run against the active
platform/environment unless --platform or --environment select another one,
in which case the selection is switched and remembered.

PLATFORMS:
  local     → Docker on this machine
  minikube  → Local Kubernetes cluster via Helm
  eks       → AWS EKS with images pushed to ECR
  heroku    → Heroku buildpack or container deploys

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Validation failure
  4 - Context or platform environment not initialized
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Project context file (defaults to ./.sfai/context.json)
    #[arg(long, global = true, env = "SFAI_CONTEXT_FILE")]
    pub context_file: Option<PathBuf>,

    /// Global application registry (defaults to ~/.sfai/apps.json)
    #[arg(long, global = true, env = "SFAI_GLOBAL_FILE")]
    pub global_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scaffold, deploy and inspect the application
    App(app::AppArgs),

    /// Initialize and switch platform environments
    Platform(platform::PlatformArgs),

    /// Manage external service profiles
    Config(config::ConfigArgs),
}

/// Platform and environment overrides shared by app commands.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Platform to run against (switches the active platform)
    #[arg(short, long)]
    pub platform: Option<String>,

    /// Environment to run against (switches the active environment)
    #[arg(short, long)]
    pub environment: Option<String>,
}

impl TargetArgs {
    pub fn platform(&self) -> Option<&str> {
        self.platform.as_deref()
    }

    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }
}

/// A failed operation, carrying the command that would fix it when known.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct CommandFailure {
    pub message: String,
    pub remedy: Option<String>,
}

/// Stores and services shared by every command of one invocation.
pub struct Session {
    store: ContextStore,
    json: bool,
    quiet: bool,
}

impl Session {
    /// Build a session from the global flags.
    pub fn from_args(args: &GlobalArgs) -> Result<Self> {
        let mut paths = ContextPaths::discover()?;
        if let Some(file) = &args.context_file {
            paths = paths.with_context_file(file);
        }
        if let Some(file) = &args.global_file {
            paths = paths.with_global_file(file);
        }
        Ok(Self::new(ContextStore::new(paths), args.json, args.quiet))
    }

    pub fn new(store: ContextStore, json: bool, quiet: bool) -> Self {
        Self { store, json, quiet }
    }

    pub fn store(&self) -> &ContextStore {
        &self.store
    }

    pub fn json(&self) -> bool {
        self.json
    }

    /// App operations backed by the real external tools.
    pub fn operations(&self) -> AppOperations {
        let registry = PlatformRegistry::builtin(Arc::new(SystemToolRunner::new()));
        AppOperations::new(self.store.clone(), registry)
    }

    pub fn config_service(&self) -> ConfigService {
        ConfigService::new(self.store.clone(), ServiceSchemaRegistry::builtin())
    }

    /// Print a response and turn a failure into an error.
    pub fn report(&self, response: OperationResponse) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(&response)?);
        } else if !self.quiet || !response.success {
            print_response(&response);
        }

        if response.success {
            return Ok(());
        }
        Err(CommandFailure {
            remedy: response.field_str("remedy").map(String::from),
            message: response
                .error
                .unwrap_or_else(|| "Operation failed".to_string()),
        }
        .into())
    }
}

fn print_response(response: &OperationResponse) {
    if response.success {
        if let Some(message) = &response.message {
            println!("✅ {}", message);
        }
    }
    if let (Some(platform), Some(environment)) = (&response.platform, &response.environment) {
        match &response.app_name {
            Some(app_name) => println!("   {} on {}/{}", app_name, platform, environment),
            None => println!("   {}/{}", platform, environment),
        }
    }

    for (key, value) in &response.extra {
        if key == "remedy" {
            continue;
        }
        match value {
            Value::String(text) => println!("   {}: {}", key, text),
            Value::Array(_) | Value::Object(_) => {
                let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
                println!("   {}:", key);
                for line in pretty.lines() {
                    println!("     {}", line);
                }
            }
            other => println!("   {}: {}", key, other),
        }
    }
}

/// Parse a `key=value` argument.
pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

/// Collect named optional values into a configuration map, skipping unset ones.
pub fn collect_values<'a, I>(values: I) -> ConfigMap
where
    I: IntoIterator<Item = (&'a str, Option<&'a String>)>,
{
    values
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key.to_string(), Value::String(value.clone()))))
        .collect()
}
