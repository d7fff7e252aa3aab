//! App commands - scaffold, deploy and inspect the application.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde_json::Value;
use tracing::{info, warn};

use sfai_context::{ConfigMap, ContextStore, OperationResponse, DEFAULT_ENVIRONMENT};
use sfai_platform::{DeployOptions, OpenOptions, SystemToolRunner, ToolCommand, ToolRunner, APP_PORT};
use sfai_templates::{Scaffolder, DEFAULT_TEMPLATE, HELM_CHART_DIR};

use super::{Session, TargetArgs};

/// Platform every new application starts on.
const INITIAL_PLATFORM: &str = "local";

#[cfg(target_os = "macos")]
const BROWSER_OPENER: &str = "open";
#[cfg(target_os = "windows")]
const BROWSER_OPENER: &str = "explorer";
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const BROWSER_OPENER: &str = "xdg-open";

#[derive(Args)]
pub struct AppArgs {
    #[command(subcommand)]
    command: AppCommand,
}

#[derive(Subcommand)]
enum AppCommand {
    /// Scaffold an application in the current directory and create its context
    Init(InitArgs),

    /// Build and deploy the application
    Deploy(DeployArgs),

    /// Stream application logs
    Logs(TargetArgs),

    /// Show deployment status
    Status(TargetArgs),

    /// Remove the deployment from the platform
    Delete(TargetArgs),

    /// Open the deployed application
    Open(OpenArgs),

    /// Show or delete the stored context
    Context(ContextArgs),

    /// Write the default Helm chart to ./helm-chart
    Helm(HelmArgs),

    /// List applications registered on this machine
    List,
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Application name (defaults to the directory name)
    #[arg(short, long)]
    name: Option<String>,

    /// Template to scaffold
    #[arg(short, long, default_value = DEFAULT_TEMPLATE)]
    template: String,

    /// Reinitialize an existing context and overwrite template files
    #[arg(short, long)]
    force: bool,
}

impl Default for InitArgs {
    fn default() -> Self {
        Self {
            name: None,
            template: DEFAULT_TEMPLATE.to_string(),
            force: false,
        }
    }
}

#[derive(Args)]
pub struct DeployArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Application source directory
    #[arg(long, default_value = ".")]
    path: PathBuf,

    /// Extra Helm values file
    #[arg(long)]
    values_file: Option<PathBuf>,

    /// Helm value override, repeatable or comma separated
    #[arg(long = "set", value_name = "KEY=VALUE")]
    set_values: Vec<String>,

    /// Helm chart directory (defaults to <path>/helm-chart)
    #[arg(long)]
    chart: Option<PathBuf>,

    /// Commit message for git based deploys
    #[arg(short, long = "commit-message")]
    message: Option<String>,

    /// Branch to push for git based deploys
    #[arg(short, long)]
    branch: Option<String>,
}

#[derive(Args)]
pub struct OpenArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Path appended to the application URL
    #[arg(long, default_value = "/docs")]
    path: String,

    /// Open this URL instead of the stored one
    #[arg(long)]
    url: Option<String>,

    /// Local port to use when no URL is stored
    #[arg(long, default_value_t = APP_PORT)]
    port: u16,

    /// Expose the local deployment through a tunnel
    #[arg(long)]
    tunnel: bool,

    /// Print the URL without launching a browser
    #[arg(long)]
    no_browser: bool,
}

#[derive(Args)]
pub struct ContextArgs {
    #[command(subcommand)]
    action: Option<ContextAction>,
}

#[derive(Subcommand)]
enum ContextAction {
    /// Show the stored context (default)
    Show,

    /// Delete the context file and unregister the application
    Delete,
}

#[derive(Args)]
pub struct HelmArgs {
    /// Application directory
    #[arg(long, default_value = ".")]
    path: PathBuf,

    /// Overwrite existing chart files
    #[arg(short, long)]
    force: bool,
}

pub async fn execute(args: AppArgs, session: &Session) -> Result<()> {
    match args.command {
        AppCommand::Init(args) => {
            let dir = std::env::current_dir()?;
            session.report(init_app(session.store(), &dir, &args)?)
        }
        AppCommand::Deploy(args) => deploy(args, session).await,
        AppCommand::Logs(target) => {
            let response = session
                .operations()
                .logs(target.platform(), target.environment())
                .await;
            session.report(response)
        }
        AppCommand::Status(target) => {
            let response = session
                .operations()
                .status(target.platform(), target.environment())
                .await;
            session.report(response)
        }
        AppCommand::Delete(target) => {
            let response = session
                .operations()
                .delete(target.platform(), target.environment())
                .await;
            session.report(response)
        }
        AppCommand::Open(args) => open(args, session).await,
        AppCommand::Context(args) => {
            let operations = session.operations();
            let response = match args.action.unwrap_or(ContextAction::Show) {
                ContextAction::Show => operations.get_context(),
                ContextAction::Delete => operations.delete_context(),
            };
            session.report(response)
        }
        AppCommand::Helm(args) => session.report(write_helm_chart(session.store(), &args)?),
        AppCommand::List => session.report(list_apps(session.store())?),
    }
}

/// Scaffold the template into `dir`, create the context on `local/default`
/// and register the application.
fn init_app(store: &ContextStore, dir: &Path, args: &InitArgs) -> Result<OperationResponse> {
    let name = match &args.name {
        Some(name) => name.trim().to_string(),
        None => directory_name(dir)?,
    };
    if name.is_empty() {
        anyhow::bail!("Invalid app name: name must not be empty");
    }

    // With --force the old context is replaced unread, so a damaged file can be recovered
    if !args.force {
        if let Some(existing) = store.load_application()? {
            anyhow::bail!(
                "App context already exists for {}. Use --force to reinitialize.",
                existing.app_name
            );
        }
    }

    let report = Scaffolder::for_app(&name)
        .scaffold(dir, &args.template, args.force)
        .context("Failed to scaffold template")?;

    if args.force && store.delete_application()? {
        warn!("Replaced existing context with a new one for {}", name);
    }

    let mut values = ConfigMap::new();
    values.insert("app_name".to_string(), Value::String(name.clone()));
    store.update_platform(INITIAL_PLATFORM, DEFAULT_ENVIRONMENT, &values, Some(&name))?;
    let registered = store.register_app(&name, dir, ConfigMap::new())?;
    info!("Initialized {} with template {}", name, report.template);

    Ok(
        OperationResponse::success(format!("App {} initialized from {}", name, report.template))
            .annotate(&name, INITIAL_PLATFORM, DEFAULT_ENVIRONMENT)
            .with_field("files_written", report.written.len())
            .with_field("files_kept", display_paths(&report.skipped))
            .with_field("registered", registered),
    )
}

async fn deploy(args: DeployArgs, session: &Session) -> Result<()> {
    let mut options = DeployOptions::new(args.path).with_set_values(args.set_values);
    if let Some(file) = args.values_file {
        options = options.with_values_file(file);
    }
    if let Some(chart) = args.chart {
        options = options.with_chart(chart);
    }
    if let Some(message) = args.message {
        options = options.with_commit_message(message);
    }
    if let Some(branch) = args.branch {
        options = options.with_branch(branch);
    }

    let response = session
        .operations()
        .deploy(args.target.platform(), args.target.environment(), &options)
        .await;
    session.report(response)
}

async fn open(args: OpenArgs, session: &Session) -> Result<()> {
    let mut options = OpenOptions::new(args.path)
        .with_port(args.port)
        .with_tunnel(args.tunnel);
    if let Some(url) = args.url {
        options = options.with_url(url);
    }

    let response = session
        .operations()
        .open(args.target.platform(), args.target.environment(), &options)
        .await;

    // Tunnels and port-forwards have already ended when the response arrives
    let closed = response.field("closed") == Some(&Value::Bool(true));
    let url = match (response.success, closed) {
        (true, false) if !args.no_browser && !session.json() => response.field_str("url").map(String::from),
        _ => None,
    };

    session.report(response)?;
    if let Some(url) = url {
        launch_browser(&url).await;
    }
    Ok(())
}

async fn launch_browser(url: &str) {
    let command = ToolCommand::new(BROWSER_OPENER).arg(url);
    match SystemToolRunner::new().run(&command).await {
        Ok(output) if output.is_success() => {}
        Ok(output) => warn!("Could not open a browser: {}", output.stderr.trim()),
        Err(e) => warn!("Could not open a browser: {}", e),
    }
}

fn write_helm_chart(store: &ContextStore, args: &HelmArgs) -> Result<OperationResponse> {
    let name = match store.load_application()? {
        Some(context) => context.app_name,
        None => directory_name(&args.path)?,
    };

    let report = Scaffolder::for_app(&name)
        .write_helm_chart(&args.path, args.force)
        .context("Failed to write Helm chart")?;
    let chart_dir = args.path.join(HELM_CHART_DIR);

    Ok(
        OperationResponse::success(format!("Helm chart written to {}", chart_dir.display()))
            .with_app_name(name)
            .with_field("files_written", report.written.len())
            .with_field("files_kept", display_paths(&report.skipped)),
    )
}

fn list_apps(store: &ContextStore) -> Result<OperationResponse> {
    let apps = store.list_apps()?;
    let message = match apps.len() {
        0 => "No registered apps".to_string(),
        1 => "1 registered app".to_string(),
        count => format!("{} registered apps", count),
    };
    Ok(OperationResponse::success(message).with_field("apps", serde_json::to_value(&apps)?))
}

fn directory_name(dir: &Path) -> Result<String> {
    let resolved = fs::canonicalize(dir).with_context(|| format!("Failed to resolve {:?}", dir))?;
    resolved
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow::anyhow!("Invalid app name: cannot derive a name from {:?}", resolved))
}

fn display_paths(paths: &[PathBuf]) -> Vec<String> {
    paths.iter().map(|path| path.display().to_string()).collect()
}
