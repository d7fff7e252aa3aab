//! Local Docker platform.

use std::net::{Ipv4Addr, TcpListener};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use sfai_context::ResolvedContext;

use crate::error::{PlatformError, PlatformResult};
use crate::platform::{DeployOptions, InitOptions, OpenOptions, Platform, PlatformOutcome, APP_PORT};
use crate::providers::require_tool;
use crate::tool::{ToolCommand, ToolRunner};

/// Host ports tried for a local deployment, end exclusive.
pub const PORT_RANGE: (u16, u16) = (8080, 8100);

/// First port in `start..end` nothing is listening on.
pub fn find_free_port(start: u16, end: u16) -> PlatformResult<u16> {
    (start..end)
        .find(|port| TcpListener::bind((Ipv4Addr::LOCALHOST, *port)).is_ok())
        .ok_or(PlatformError::NoFreePort { start, end })
}

/// Image and container name. Docker repository names must be lowercase.
fn container_name(context: &ResolvedContext) -> String {
    context.target_name().to_lowercase()
}

/// Runs the application as a Docker container on this machine.
pub struct LocalPlatform {
    runner: Arc<dyn ToolRunner>,
}

impl LocalPlatform {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self { runner }
    }

    async fn remove_container(&self, name: &str) {
        for action in ["stop", "rm"] {
            match self.runner.run(&ToolCommand::new("docker").args([action, name])).await {
                Ok(output) if !output.is_success() => {
                    info!("docker {} {}: {}", action, name, output.stderr.trim())
                }
                Err(e) => warn!("docker {} {} failed: {}", action, name, e),
                _ => {}
            }
        }
    }
}

#[async_trait]
impl Platform for LocalPlatform {
    fn name(&self) -> &str {
        "local"
    }

    fn description(&self) -> &str {
        "Docker container on this machine"
    }

    async fn init(&self, context: &ResolvedContext, _options: &InitOptions) -> PlatformResult<PlatformOutcome> {
        require_tool(
            self.runner.as_ref(),
            "docker",
            &["--version"],
            "Please install Docker to run apps locally.",
        )
        .await?;
        Ok(PlatformOutcome::success(format!(
            "Local platform initialized for {}",
            context.target_name()
        )))
    }

    async fn deploy(&self, context: &ResolvedContext, options: &DeployOptions) -> PlatformResult<PlatformOutcome> {
        let name = container_name(context);
        let name = name.as_str();
        let path = &options.path;

        if !path.join("Dockerfile").exists() {
            return Err(PlatformError::missing(format!(
                "Dockerfile not found in {}",
                path.display()
            )));
        }

        info!("Cleaning up existing container: {}", name);
        self.remove_container(name).await;

        info!("Building Docker image: {}", name);
        self.runner
            .run_checked(
                &ToolCommand::new("docker")
                    .args(["build", "-t", name, "."])
                    .current_dir(path)
                    .streamed(),
            )
            .await?;

        let port = find_free_port(PORT_RANGE.0, PORT_RANGE.1)?;
        info!("Starting container {} on port {}", name, port);
        self.runner
            .run_checked(&ToolCommand::new("docker").args([
                "run".to_string(),
                "-d".to_string(),
                "--name".to_string(),
                name.to_string(),
                "-p".to_string(),
                format!("{port}:{APP_PORT}"),
                "-e".to_string(),
                format!("PORT={APP_PORT}"),
                name.to_string(),
            ]))
            .await?;

        let url = format!("http://localhost:{port}");
        Ok(PlatformOutcome::success("Deployment successful")
            .with_field("url", url.as_str())
            .with_update("public_url", url)
            .with_update("port", port))
    }

    async fn delete(&self, context: &ResolvedContext) -> PlatformResult<PlatformOutcome> {
        let name = container_name(context);
        let name = name.as_str();
        self.remove_container(name).await;
        Ok(PlatformOutcome::success(format!("Container {name} stopped and removed"))
            .with_cleared(["public_url", "port"]))
    }

    async fn open(&self, context: &ResolvedContext, options: &OpenOptions) -> PlatformResult<PlatformOutcome> {
        let port = context.config.port.unwrap_or(options.port);
        let url = match (&options.url, &context.config.public_url) {
            (Some(url), _) => url.clone(),
            (None, Some(public_url)) => options.join(public_url),
            (None, None) => options.join(&format!("http://localhost:{port}")),
        };

        if options.tunnel {
            info!("Opening a tunnel to port {}; press Ctrl+C to stop", port);
            self.runner
                .run_checked(
                    &ToolCommand::new("cloudflared")
                        .args(["tunnel", "--url"])
                        .arg(format!("http://localhost:{port}"))
                        .streamed(),
                )
                .await?;
            return Ok(PlatformOutcome::success("Tunnel closed")
                .with_field("url", url)
                .with_field("closed", true));
        }

        Ok(PlatformOutcome::success(format!("Opening {url}")).with_field("url", url))
    }

    async fn status(&self, context: &ResolvedContext) -> PlatformResult<PlatformOutcome> {
        let name = container_name(context);
        let name = name.as_str();
        let output = self
            .runner
            .run_checked(&ToolCommand::new("docker").args([
                "ps".to_string(),
                "--filter".to_string(),
                format!("name={name}"),
                "--format".to_string(),
                "{{.Names}}".to_string(),
            ]))
            .await?;

        let running = output.stdout.lines().any(|line| line.trim() == name);
        let message = if running {
            format!("Container {name} is running")
        } else {
            format!("Container {name} is not running")
        };
        Ok(PlatformOutcome::success(message).with_field("running", running))
    }

    async fn logs(&self, context: &ResolvedContext) -> PlatformResult<PlatformOutcome> {
        let name = container_name(context);
        let name = name.as_str();
        self.runner
            .run_checked(&ToolCommand::new("docker").args(["logs", name]).streamed())
            .await?;
        Ok(PlatformOutcome::success(format!("Logs for {name} retrieved")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockToolRunner;
    use crate::tool::ToolOutput;
    use sfai_context::{ConfigMap, EnvironmentConfig};
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn context(config: EnvironmentConfig) -> ResolvedContext {
        ResolvedContext {
            app_name: "demo".to_string(),
            platform: "local".to_string(),
            environment: "default".to_string(),
            config,
            integrations: ConfigMap::new(),
        }
    }

    #[test]
    fn test_find_free_port_skips_bound_port() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let taken = listener.local_addr().unwrap().port();
        if taken < u16::MAX {
            let port = find_free_port(taken, taken + 1);
            assert!(matches!(port, Err(PlatformError::NoFreePort { .. })));
        }
    }

    #[tokio::test]
    async fn test_deploy_requires_dockerfile() {
        let temp = tempdir().unwrap();
        let platform = LocalPlatform::new(Arc::new(MockToolRunner::new()));
        let err = platform
            .deploy(&context(EnvironmentConfig::default()), &DeployOptions::new(temp.path()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Dockerfile not found"));
    }

    #[tokio::test]
    async fn test_deploy_records_port_and_url() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("Dockerfile"), "FROM scratch").unwrap();
        let runner = Arc::new(MockToolRunner::new());
        let platform = LocalPlatform::new(runner.clone());

        let outcome = platform
            .deploy(&context(EnvironmentConfig::default()), &DeployOptions::new(temp.path()))
            .await
            .unwrap();

        assert!(outcome.is_success());
        let port = outcome.updates["port"].as_u64().unwrap();
        assert!((8080..8100).contains(&port));
        assert_eq!(
            outcome.updates["public_url"],
            json!(format!("http://localhost:{port}"))
        );
        assert!(runner.was_called("docker build -t demo ."));
        assert!(runner.was_called("docker run -d --name demo"));
    }

    #[tokio::test]
    async fn test_deploy_lowercases_image_name() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("Dockerfile"), "FROM scratch").unwrap();
        let runner = Arc::new(MockToolRunner::new());
        let platform = LocalPlatform::new(runner.clone());
        let config = EnvironmentConfig {
            app_name: Some("Orders-API".to_string()),
            ..EnvironmentConfig::default()
        };

        platform
            .deploy(&context(config), &DeployOptions::new(temp.path()))
            .await
            .unwrap();
        assert!(runner.was_called("docker build -t orders-api ."));
        assert!(runner.was_called("docker run -d --name orders-api"));
        assert!(!runner.command_lines().iter().any(|line| line.contains("Orders-API")));
    }

    #[tokio::test]
    async fn test_status_reports_running_container() {
        let runner = Arc::new(
            MockToolRunner::new().add_response("docker ps", ToolOutput::success("demo\n")),
        );
        let platform = LocalPlatform::new(runner);
        let outcome = platform.status(&context(EnvironmentConfig::default())).await.unwrap();
        assert_eq!(outcome.response.field("running"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_open_uses_stored_port() {
        let platform = LocalPlatform::new(Arc::new(MockToolRunner::new()));
        let config = EnvironmentConfig {
            port: Some(8083),
            ..EnvironmentConfig::default()
        };
        let outcome = platform
            .open(&context(config), &OpenOptions::new("/docs"))
            .await
            .unwrap();
        assert_eq!(outcome.response.field_str("url"), Some("http://localhost:8083/docs"));
    }
}
