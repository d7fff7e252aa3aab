//! Heroku platform.

use std::path::Path;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use chrono::Local;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use sfai_context::{ConfigMap, ResolvedContext};

use crate::error::{PlatformError, PlatformResult};
use crate::platform::{DeployOptions, InitOptions, OpenOptions, Platform, PlatformOutcome};
use crate::providers::require_tool;
use crate::tool::{ToolCommand, ToolRunner};

static COLOR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").expect("color pattern is valid")
});

/// Attempts at `heroku create` before giving up on name conflicts.
const CREATE_ATTEMPTS: usize = 3;

/// Keys removed from the environment when the app is destroyed.
const APP_KEYS: [&str; 3] = ["app_name", "public_url", "git_url"];

/// Strip ANSI color sequences from CLI output.
pub fn strip_colors(text: &str) -> String {
    COLOR_PATTERN.replace_all(text, "").into_owned()
}

/// Random lowercase suffix for a taken app name.
fn name_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..6].to_string()
}

/// A name, or the `name` of an object, as Heroku JSON reports teams and spaces.
fn name_of(value: Option<&Value>) -> Value {
    match value {
        Some(Value::String(name)) => Value::String(name.clone()),
        Some(Value::Object(object)) => object.get("name").cloned().unwrap_or_default(),
        _ => Value::String(String::new()),
    }
}

/// Environment configuration from a Heroku app description.
fn app_config(app: &Value) -> ConfigMap {
    let routing = match app.get("internal_routing").and_then(Value::as_bool) {
        Some(true) => "internal",
        _ => "public",
    };
    let text = |key: &str| app.get(key).cloned().unwrap_or_else(|| Value::String(String::new()));

    let mut config = ConfigMap::new();
    config.insert("app_name".to_string(), text("name"));
    config.insert("public_url".to_string(), text("web_url"));
    config.insert("git_url".to_string(), text("git_url"));
    config.insert("team_name".to_string(), name_of(app.get("team")));
    config.insert("private_space".to_string(), name_of(app.get("space")));
    config.insert("stack".to_string(), name_of(app.get("build_stack")));
    config.insert("routing".to_string(), Value::String(routing.to_string()));
    config
}

/// Heroku apps deployed by git push or container registry.
pub struct HerokuPlatform {
    runner: Arc<dyn ToolRunner>,
}

impl HerokuPlatform {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self { runner }
    }

    fn heroku<I, S>(args: I) -> ToolCommand
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ToolCommand::new("heroku").args(args)
    }

    async fn ensure_logged_in(&self) -> PlatformResult<()> {
        let whoami = self.runner.run(&Self::heroku(["auth:whoami"])).await?;
        if whoami.is_success() {
            info!("Authenticated as {}", whoami.stdout_trimmed());
            return Ok(());
        }

        info!("Not logged in to Heroku, starting login");
        let login = self.runner.run(&Self::heroku(["login"]).streamed()).await?;
        if login.is_success() {
            Ok(())
        } else {
            Err(PlatformError::invalid(format!(
                "Heroku login failed: {}",
                strip_colors(login.stderr.trim())
            )))
        }
    }

    /// Create an app, retrying with a random suffix while the name is taken.
    async fn create_app(&self, base_name: &str, options: &InitOptions, context: &ResolvedContext) -> PlatformResult<PlatformOutcome> {
        let config = &context.config;
        let team = options.setting("team_name", config);
        let space = options.setting("private_space", config);
        let routing = options.setting("routing", config);
        let deployment_type = deployment_type(options, context);

        let mut name = base_name.to_string();
        for attempt in 1..=CREATE_ATTEMPTS {
            let mut command = Self::heroku(["create", name.as_str(), "--json"]);
            if let Some(team) = &team {
                command = command.arg(format!("--team={team}"));
            }
            if let Some(space) = &space {
                command = command.arg(format!("--space={space}"));
            }
            if deployment_type == "container" {
                command = command.arg("--stack=container");
            }
            if routing.as_deref() == Some("internal") {
                command = command.arg("--internal-routing");
            }

            info!("Attempt {} of {}: creating Heroku app {}", attempt, CREATE_ATTEMPTS, name);
            let output = self.runner.run(&command).await?;
            if output.is_success() {
                let app: Value = serde_json::from_str(&strip_colors(&output.stdout)).map_err(|_| {
                    PlatformError::invalid("Failed to parse JSON response from heroku")
                })?;
                return Ok(PlatformOutcome::success(format!("Initialized with Heroku app {name}."))
                    .with_updates(app_config(&app))
                    .with_update("deployment_type", deployment_type));
            }

            let error = strip_colors(output.stderr.trim());
            let lowered = error.to_lowercase();
            if !(lowered.contains("name is already taken") || lowered.contains("name is taken")) {
                return Ok(PlatformOutcome::failure(error));
            }
            warn!("Name {} is already taken", name);
            name = format!("{base_name}-{}", name_suffix());
        }

        Ok(PlatformOutcome::failure(format!(
            "Failed to create Heroku app after {CREATE_ATTEMPTS} attempts due to name conflict"
        )))
    }

    async fn git_output(&self, path: &Path, args: &[&str]) -> PlatformResult<Option<String>> {
        let output = self
            .runner
            .run(&ToolCommand::new("git").args(args.iter().copied()).current_dir(path))
            .await?;
        Ok(output
            .is_success()
            .then(|| output.stdout_trimmed().to_string()))
    }

    async fn is_heroku_repo(&self, path: &Path) -> PlatformResult<bool> {
        if self.git_output(path, &["rev-parse", "--is-inside-work-tree"]).await?.is_none() {
            return Ok(false);
        }
        let remotes = self.git_output(path, &["remote", "-v"]).await?.unwrap_or_default();
        Ok(remotes.contains("git.heroku.com"))
    }

    async fn default_branch(&self, path: &Path) -> PlatformResult<String> {
        if let Some(branch) = self
            .git_output(path, &["rev-parse", "--abbrev-ref", "HEAD"])
            .await?
            .filter(|b| !b.is_empty())
        {
            return Ok(branch);
        }
        Ok(self
            .git_output(path, &["config", "--get", "init.defaultBranch"])
            .await?
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| "main".to_string()))
    }

    async fn deploy_buildpack(&self, context: &ResolvedContext, options: &DeployOptions) -> PlatformResult<PlatformOutcome> {
        let path = &options.path;
        if !self.is_heroku_repo(path).await? {
            return Ok(PlatformOutcome::failure("The current directory is not a Heroku repository.")
                .with_field("remedy", format!("heroku git:remote --app {}", context.target_name())));
        }

        let branch = match &options.branch {
            Some(branch) => branch.clone(),
            None => self.default_branch(path).await?,
        };
        let message = options.commit_message.clone().unwrap_or_else(|| {
            format!(
                "Deploy {} to Heroku at {}",
                context.app_name,
                Local::now().format("%Y-%m-%d %H:%M:%S")
            )
        });

        let changes = self.git_output(path, &["status", "--porcelain"]).await?.unwrap_or_default();
        if changes.is_empty() {
            info!("No changes to commit");
        } else {
            let git = |args: Vec<&str>| ToolCommand::new("git").args(args).current_dir(path);
            self.runner.run_checked(&git(vec!["add", "."])).await?;
            self.runner
                .run_checked(&git(vec!["commit", "-m", message.as_str()]))
                .await?;
        }

        self.runner
            .run_checked(
                &ToolCommand::new("git")
                    .args(["push", "heroku", branch.as_str()])
                    .current_dir(path)
                    .streamed(),
            )
            .await?;
        Ok(PlatformOutcome::success("Deployed to Heroku"))
    }

    async fn deploy_container(&self, context: &ResolvedContext, options: &DeployOptions) -> PlatformResult<PlatformOutcome> {
        let app = context.target_name();
        let path = &options.path;
        let in_app = |command: ToolCommand| command.current_dir(path).streamed();

        // Stale local registry images make Heroku reject the manifest
        let images = ToolCommand::new("docker").args([
            "images",
            "--filter",
            "reference=registry.heroku.com/*",
            "--quiet",
        ]);
        if let Ok(output) = self.runner.run(&images).await {
            let ids: Vec<&str> = output.stdout.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
            if !ids.is_empty() {
                let rmi = ToolCommand::new("docker").args(["rmi", "-f"]).args(ids);
                match self.runner.run(&rmi).await {
                    Ok(output) if !output.is_success() => {
                        debug!("Registry image cleanup failed: {}", output.stderr.trim())
                    }
                    Err(e) => debug!("Registry image cleanup failed: {}", e),
                    _ => {}
                }
            }
        }

        self.runner
            .run_checked(&in_app(Self::heroku(["stack:set", "container", "--app", app])))
            .await?;
        self.runner
            .run_checked(&in_app(Self::heroku(["container:login"])))
            .await?;

        if std::env::consts::ARCH == "aarch64" {
            info!("ARM host detected, pushing a linux/amd64 image with buildx");
            let tag = format!("registry.heroku.com/{app}/web");
            self.runner
                .run_checked(&in_app(ToolCommand::new("docker").args([
                    "buildx",
                    "build",
                    "--platform",
                    "linux/amd64",
                    "--push",
                    "--no-cache",
                    "--provenance=false",
                    "-t",
                    tag.as_str(),
                    ".",
                ])))
                .await?;
        } else {
            self.runner
                .run_checked(&in_app(Self::heroku(["container:push", "web", "--app", app])))
                .await?;
        }
        self.runner
            .run_checked(&in_app(Self::heroku(["container:release", "web", "--app", app])))
            .await?;

        Ok(PlatformOutcome::success("Container deployed successfully"))
    }
}

/// `buildpack` unless the options or stored configuration say otherwise.
fn deployment_type(options: &InitOptions, context: &ResolvedContext) -> String {
    options
        .setting("deployment_type", &context.config)
        .unwrap_or_else(|| "buildpack".to_string())
}

#[async_trait]
impl Platform for HerokuPlatform {
    fn name(&self) -> &str {
        "heroku"
    }

    fn description(&self) -> &str {
        "Heroku app deployed from git or a container image"
    }

    async fn init(&self, context: &ResolvedContext, options: &InitOptions) -> PlatformResult<PlatformOutcome> {
        require_tool(self.runner.as_ref(), "heroku", &["--version"], "Please install the Heroku CLI.").await?;

        let app_name = options
            .setting("app_name", &context.config)
            .unwrap_or_else(|| context.app_name.clone())
            .to_lowercase();

        self.ensure_logged_in().await?;

        let info = self
            .runner
            .run(&Self::heroku(["apps:info", "--app", app_name.as_str(), "--json"]))
            .await?;
        if !info.is_success() || info.stderr.contains("forbidden") {
            if info.stderr.contains("forbidden") {
                warn!("App {} exists but is not accessible, creating a new one", app_name);
            }
            return self.create_app(&app_name, options, context).await;
        }

        let description: Value = serde_json::from_str(&strip_colors(&info.stdout))?;
        let app = description.get("app").unwrap_or(&description);
        info!("Using existing Heroku app {}", app_name);
        Ok(PlatformOutcome::success(format!("Initialized with existing Heroku app {app_name}."))
            .with_updates(app_config(app))
            .with_update("deployment_type", deployment_type(options, context)))
    }

    async fn deploy(&self, context: &ResolvedContext, options: &DeployOptions) -> PlatformResult<PlatformOutcome> {
        let deployment_type = context
            .config
            .extra_str("deployment_type")
            .unwrap_or("buildpack");
        info!("Deploying {} to Heroku as {}", context.target_name(), deployment_type);

        let outcome = match deployment_type {
            "buildpack" => self.deploy_buildpack(context, options).await?,
            "container" => self.deploy_container(context, options).await?,
            other => return Ok(PlatformOutcome::failure(format!("Invalid deployment type: {other}"))),
        };
        Ok(match &context.config.public_url {
            Some(url) => outcome.with_field("public_url", url.as_str()),
            None => outcome,
        })
    }

    async fn delete(&self, context: &ResolvedContext) -> PlatformResult<PlatformOutcome> {
        let app = context.target_name();
        let output = self
            .runner
            .run(&Self::heroku(["apps:destroy", "--app", app, "--confirm", app]))
            .await?;
        if !output.is_success() {
            let message = strip_colors(output.stderr.trim());
            warn!("heroku apps:destroy {} failed: {}", app, message);
            return Ok(PlatformOutcome::failure(format!("Failed to delete app {app}: {message}")));
        }
        Ok(PlatformOutcome::success("App deleted successfully").with_cleared(APP_KEYS))
    }

    async fn open(&self, context: &ResolvedContext, options: &OpenOptions) -> PlatformResult<PlatformOutcome> {
        let Some(base) = options.url.as_ref().or(context.config.public_url.as_ref()) else {
            return Ok(PlatformOutcome::failure("No public URL found."));
        };
        let url = options.join(base);
        Ok(PlatformOutcome::success(format!("App opened successfully: {url}")).with_field("url", url))
    }

    async fn status(&self, context: &ResolvedContext) -> PlatformResult<PlatformOutcome> {
        self.runner
            .run(&Self::heroku(["ps", "--app", context.target_name()]).streamed())
            .await?;
        Ok(PlatformOutcome::success("App status checked successfully"))
    }

    async fn logs(&self, context: &ResolvedContext) -> PlatformResult<PlatformOutcome> {
        self.runner
            .run(&Self::heroku(["logs", "--app", context.target_name()]).streamed())
            .await?;
        Ok(PlatformOutcome::success("Logs fetched successfully"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockToolRunner;
    use crate::tool::ToolOutput;
    use sfai_context::EnvironmentConfig;
    use serde_json::json;

    fn context(config: EnvironmentConfig) -> ResolvedContext {
        ResolvedContext {
            app_name: "Demo".to_string(),
            platform: "heroku".to_string(),
            environment: "default".to_string(),
            config,
            integrations: ConfigMap::new(),
        }
    }

    const APP_JSON: &str = r#"{"name": "demo", "web_url": "https://demo.herokuapp.com/", "git_url": "https://git.heroku.com/demo.git", "team": null, "space": null, "build_stack": {"name": "heroku-24"}, "internal_routing": null}"#;

    #[test]
    fn test_strip_colors() {
        assert_eq!(strip_colors("\x1b[32m{\"a\": 1}\x1b[0m"), "{\"a\": 1}");
    }

    #[tokio::test]
    async fn test_init_reuses_existing_app() {
        let runner = Arc::new(MockToolRunner::new().add_response(
            "heroku apps:info --app demo",
            ToolOutput::success(format!("\x1b[0m{{\"app\": {APP_JSON}}}")),
        ));
        let platform = HerokuPlatform::new(runner.clone());
        let outcome = platform
            .init(&context(EnvironmentConfig::default()), &InitOptions::default())
            .await
            .unwrap();

        assert!(outcome.is_success(), "{:?}", outcome.response);
        assert_eq!(outcome.updates["git_url"], json!("https://git.heroku.com/demo.git"));
        assert_eq!(outcome.updates["routing"], json!("public"));
        assert_eq!(outcome.updates["deployment_type"], json!("buildpack"));
        assert!(!runner.was_called("heroku create"));
    }

    #[tokio::test]
    async fn test_init_retries_taken_name() {
        let runner = Arc::new(
            MockToolRunner::new()
                .add_response("heroku apps:info", ToolOutput::failure(1, "Couldn't find that app."))
                .add_response("heroku create", ToolOutput::success(APP_JSON))
                .add_response(
                    "heroku create demo --json",
                    ToolOutput::failure(1, "\x1b[31mName demo is already taken\x1b[0m"),
                ),
        );
        let platform = HerokuPlatform::new(runner.clone());
        let outcome = platform
            .init(&context(EnvironmentConfig::default()), &InitOptions::default())
            .await
            .unwrap();

        assert!(outcome.is_success(), "{:?}", outcome.response);
        let creates: Vec<String> = runner
            .command_lines()
            .into_iter()
            .filter(|line| line.starts_with("heroku create"))
            .collect();
        assert_eq!(creates.len(), 2);
        assert!(creates[1].starts_with("heroku create demo-"));
    }

    #[tokio::test]
    async fn test_init_reports_other_create_errors() {
        let runner = Arc::new(
            MockToolRunner::new()
                .add_response("heroku apps:info", ToolOutput::failure(1, "not found"))
                .add_response("heroku create", ToolOutput::failure(1, "Account verification required")),
        );
        let platform = HerokuPlatform::new(runner);
        let outcome = platform
            .init(&context(EnvironmentConfig::default()), &InitOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.response.error.as_deref(), Some("Account verification required"));
    }

    #[tokio::test]
    async fn test_buildpack_deploy_requires_heroku_remote() {
        let runner = Arc::new(
            MockToolRunner::new().add_response("git remote -v", ToolOutput::success("origin git@github.com:x/y.git")),
        );
        let platform = HerokuPlatform::new(runner.clone());
        let outcome = platform
            .deploy(&context(EnvironmentConfig::default()), &DeployOptions::new("."))
            .await
            .unwrap();
        assert!(!outcome.is_success());
        assert!(!runner.was_called("git push"));
    }

    #[tokio::test]
    async fn test_buildpack_deploy_commits_and_pushes() {
        let runner = Arc::new(
            MockToolRunner::new()
                .add_response("git remote -v", ToolOutput::success("heroku https://git.heroku.com/demo.git"))
                .add_response("git rev-parse --abbrev-ref", ToolOutput::success("trunk\n"))
                .add_response("git status", ToolOutput::success(" M app.py\n")),
        );
        let platform = HerokuPlatform::new(runner.clone());
        let options = DeployOptions::new(".").with_commit_message("ship it");
        let outcome = platform
            .deploy(&context(EnvironmentConfig::default()), &options)
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert!(runner.was_called("git commit -m ship it"));
        assert!(runner.was_called("git push heroku trunk"));
    }

    #[tokio::test]
    async fn test_container_deploy_survives_image_cleanup_failure() {
        let runner = Arc::new(
            MockToolRunner::new()
                .add_response("docker images", ToolOutput::success("abc123\ndef456\n"))
                .add_response("docker rmi", ToolOutput::failure(1, "image is being used by a container")),
        );
        let platform = HerokuPlatform::new(runner.clone());
        let mut config = EnvironmentConfig::default();
        config.extra.insert("deployment_type".to_string(), json!("container"));

        let outcome = platform
            .deploy(&context(config), &DeployOptions::new("."))
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert!(runner.was_called("docker rmi -f abc123 def456"));
        assert!(runner.was_called("heroku container:release web --app Demo"));
    }

    #[tokio::test]
    async fn test_delete_clears_app_keys() {
        let platform = HerokuPlatform::new(Arc::new(MockToolRunner::new()));
        let outcome = platform
            .delete(&context(EnvironmentConfig::default()))
            .await
            .unwrap();
        assert_eq!(outcome.cleared, vec!["app_name", "public_url", "git_url"]);
    }

    #[tokio::test]
    async fn test_failed_destroy_keeps_app_keys() {
        let runner = MockToolRunner::new()
            .add_response("heroku apps:destroy", ToolOutput::failure(1, "Couldn't find that app."));
        let platform = HerokuPlatform::new(Arc::new(runner));
        let outcome = platform
            .delete(&context(EnvironmentConfig::default()))
            .await
            .unwrap();
        assert!(!outcome.is_success());
        assert!(outcome.cleared.is_empty());
        assert_eq!(
            outcome.response.error.as_deref(),
            Some("Failed to delete app Demo: Couldn't find that app.")
        );
    }

    #[tokio::test]
    async fn test_open_without_url() {
        let platform = HerokuPlatform::new(Arc::new(MockToolRunner::new()));
        let outcome = platform
            .open(&context(EnvironmentConfig::default()), &OpenOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.response.error.as_deref(), Some("No public URL found."));

        let config = EnvironmentConfig {
            public_url: Some("https://demo.herokuapp.com/".to_string()),
            ..EnvironmentConfig::default()
        };
        let outcome = platform.open(&context(config), &OpenOptions::default()).await.unwrap();
        assert_eq!(outcome.response.field_str("url"), Some("https://demo.herokuapp.com/docs"));
    }
}
