//! Minikube platform.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use sfai_context::ResolvedContext;

use crate::error::{PlatformError, PlatformResult};
use crate::platform::{DeployOptions, InitOptions, OpenOptions, Platform, PlatformOutcome, APP_PORT};
use crate::providers::kubernetes::{app_version, helm_sets, namespace, KubernetesOps, DEFAULT_NAMESPACE};
use crate::providers::require_tool;
use crate::tool::{ToolCommand, ToolRunner};

/// Kubernetes running in a local minikube VM.
pub struct MinikubePlatform {
    runner: Arc<dyn ToolRunner>,
    k8s: KubernetesOps,
}

impl MinikubePlatform {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            k8s: KubernetesOps::new(runner.clone()),
            runner,
        }
    }

    /// Start minikube if needed and point kubectl at it.
    async fn ensure_running(&self) -> PlatformResult<()> {
        let status = self
            .runner
            .run(&ToolCommand::new("minikube").arg("status"))
            .await?;
        if !(status.is_success() && status.stdout.contains("Running")) {
            info!("Starting minikube");
            let started = self
                .runner
                .run(&ToolCommand::new("minikube").arg("start").streamed())
                .await?;
            if !started.is_success() {
                return Err(PlatformError::invalid(
                    "Minikube is not running and could not be started.",
                ));
            }
        }

        let current = self
            .runner
            .run(&ToolCommand::new("kubectl").args(["config", "current-context"]))
            .await?;
        if current.stdout_trimmed() != "minikube" {
            info!("Switching kubectl context to minikube");
            self.runner
                .run_checked(&ToolCommand::new("kubectl").args(["config", "use-context", "minikube"]))
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Platform for MinikubePlatform {
    fn name(&self) -> &str {
        "minikube"
    }

    fn description(&self) -> &str {
        "Local Kubernetes cluster managed by minikube"
    }

    async fn init(&self, context: &ResolvedContext, options: &InitOptions) -> PlatformResult<PlatformOutcome> {
        require_tool(
            self.runner.as_ref(),
            "minikube",
            &["version"],
            "Please install minikube for local Kubernetes development.",
        )
        .await?;
        self.k8s.require_tools().await?;
        self.ensure_running().await?;

        let namespace = options
            .setting("namespace", &context.config)
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        Ok(PlatformOutcome::success(format!(
            "Minikube platform initialized successfully in namespace {namespace}"
        ))
        .with_update("namespace", namespace))
    }

    async fn deploy(&self, context: &ResolvedContext, options: &DeployOptions) -> PlatformResult<PlatformOutcome> {
        let name = context.target_name();
        let namespace = namespace(context);
        let tag = app_version(&options.path)?;

        if let Some(image) = self.k8s.deployed_image(name, namespace).await {
            if image.ends_with(&format!(":{tag}")) {
                return Ok(PlatformOutcome::failure(format!(
                    "Deployment with tag '{tag}' already exists. Please update version in version.json to deploy a new version."
                )));
            }
        }

        self.ensure_running().await?;

        if !options.path.join("Dockerfile").exists() {
            return Err(PlatformError::missing(format!(
                "Dockerfile not found in {}. Run `sfai app init` or check your app structure.",
                options.path.display()
            )));
        }

        let image = format!("{name}:{tag}");
        info!("Building {} inside minikube", image);
        self.runner
            .run_checked(
                &ToolCommand::new("minikube")
                    .args(["image", "build", "-t"])
                    .arg(image.as_str())
                    .arg(options.path.to_string_lossy())
                    .streamed(),
            )
            .await?;

        let stored = helm_sets(context, &options.set_values)?;
        let mut sets = stored.clone();
        sets.insert("image.repository".to_string(), Value::String(name.to_string()));
        sets.insert("image.tag".to_string(), Value::String(tag.clone()));
        sets.insert("image.pullPolicy".to_string(), Value::String("Never".to_string()));
        self.k8s.helm_install(name, namespace, options, &sets).await?;

        Ok(PlatformOutcome::success("Deployment successful")
            .with_field("image", image)
            .with_update("image", name)
            .with_update("image_tag", tag)
            .with_update("port", APP_PORT)
            .with_update("helm_set", Value::Object(stored)))
    }

    async fn delete(&self, context: &ResolvedContext) -> PlatformResult<PlatformOutcome> {
        self.k8s.delete(context).await
    }

    async fn open(&self, context: &ResolvedContext, options: &OpenOptions) -> PlatformResult<PlatformOutcome> {
        self.k8s.open(context, options).await
    }

    async fn status(&self, context: &ResolvedContext) -> PlatformResult<PlatformOutcome> {
        self.k8s.status(context).await
    }

    async fn logs(&self, context: &ResolvedContext) -> PlatformResult<PlatformOutcome> {
        self.k8s.logs(context).await
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

    fn context() -> ResolvedContext {
        ResolvedContext {
            app_name: "demo".to_string(),
            platform: "minikube".to_string(),
            environment: "default".to_string(),
            config: EnvironmentConfig::default(),
            integrations: ConfigMap::new(),
        }
    }

    fn app_dir(version: &str) -> tempfile::TempDir {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("Dockerfile"), "FROM scratch").unwrap();
        fs::write(
            temp.path().join("version.json"),
            format!(r#"{{"name": "demo", "version": "{version}"}}"#),
        )
        .unwrap();
        fs::create_dir_all(temp.path().join("helm-chart")).unwrap();
        fs::write(temp.path().join("helm-chart/values.yaml"), "").unwrap();
        temp
    }

    fn running_minikube() -> MockToolRunner {
        MockToolRunner::new()
            .add_response("minikube status", ToolOutput::success("host: Running"))
            .add_response("kubectl config current-context", ToolOutput::success("minikube\n"))
    }

    #[tokio::test]
    async fn test_init_reports_missing_minikube() {
        let platform = MinikubePlatform::new(Arc::new(MockToolRunner::new().set_missing("minikube")));
        let err = platform.init(&context(), &InitOptions::default()).await.unwrap_err();
        assert!(err.to_string().starts_with("minikube not installed"));
    }

    #[tokio::test]
    async fn test_init_starts_minikube_and_records_namespace() {
        let runner = Arc::new(
            MockToolRunner::new()
                .add_response("minikube status", ToolOutput::failure(7, "Stopped"))
                .add_response("kubectl config current-context", ToolOutput::success("docker-desktop")),
        );
        let platform = MinikubePlatform::new(runner.clone());
        let outcome = platform.init(&context(), &InitOptions::default()).await.unwrap();

        assert!(runner.was_called("minikube start"));
        assert!(runner.was_called("kubectl config use-context minikube"));
        assert_eq!(outcome.updates["namespace"], json!("default"));
    }

    #[tokio::test]
    async fn test_deploy_refuses_existing_tag() {
        let app = app_dir("1.0.0");
        let runner = Arc::new(running_minikube().add_response(
            "kubectl get deployment demo",
            ToolOutput::success("demo:1.0.0"),
        ));
        let platform = MinikubePlatform::new(runner.clone());

        let outcome = platform.deploy(&context(), &DeployOptions::new(app.path())).await.unwrap();
        assert!(!outcome.is_success());
        assert!(outcome.response.error.unwrap().contains("'1.0.0' already exists"));
        assert!(!runner.was_called("minikube image build"));
    }

    #[tokio::test]
    async fn test_deploy_builds_and_installs() {
        let app = app_dir("1.1.0");
        let runner = Arc::new(running_minikube());
        let platform = MinikubePlatform::new(runner.clone());

        let options = DeployOptions::new(app.path()).with_set_values(vec!["replicas=2".to_string()]);
        let outcome = platform.deploy(&context(), &options).await.unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.updates["image_tag"], json!("1.1.0"));
        assert_eq!(outcome.updates["helm_set"], json!({"replicas": "2"}));
        assert!(runner.was_called("minikube image build -t demo:1.1.0"));
        let helm = runner
            .command_lines()
            .into_iter()
            .find(|line| line.starts_with("helm upgrade"))
            .unwrap();
        assert!(helm.contains("--set image.pullPolicy=Never"));
        assert!(helm.contains("--set replicas=2"));
    }
}
