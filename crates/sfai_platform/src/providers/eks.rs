//! AWS EKS platform.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use sfai_context::{ConfigMap, ResolvedContext};

use crate::error::{PlatformError, PlatformResult};
use crate::platform::{config_str, DeployOptions, InitOptions, OpenOptions, Platform, PlatformOutcome};
use crate::providers::kubernetes::{app_version, helm_sets, namespace, KubernetesOps, DEFAULT_NAMESPACE};
use crate::providers::require_tool;
use crate::tool::{ToolCommand, ToolRunner};

const DEFAULT_AWS_PROFILE: &str = "default";

const CREDENTIALS_ERROR: &str =
    "AWS credentials not found or expired. Please configure your credentials.";

/// An existing EKS cluster with images pushed to ECR.
pub struct EksPlatform {
    runner: Arc<dyn ToolRunner>,
    k8s: KubernetesOps,
}

impl EksPlatform {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            k8s: KubernetesOps::new(runner.clone()),
            runner,
        }
    }

    fn aws(args: &[&str], region: &str, profile: &str) -> ToolCommand {
        ToolCommand::new("aws")
            .args(args.iter().copied())
            .args(["--region", region, "--profile", profile])
    }

    async fn credentials_valid(&self, profile: &str) -> bool {
        let command = ToolCommand::new("aws").args(["sts", "get-caller-identity", "--profile", profile]);
        matches!(self.runner.run(&command).await, Ok(output) if output.is_success())
    }

    /// Run an aws command and parse its JSON output, `None` on any failure.
    async fn aws_json(&self, command: ToolCommand) -> Option<Value> {
        let output = match self.runner.run(&command.args(["--output", "json"])).await {
            Ok(output) if output.is_success() => output,
            Ok(output) => {
                warn!("aws call failed: {}", output.stderr.trim());
                return None;
            }
            Err(e) => {
                warn!("aws call failed: {}", e);
                return None;
            }
        };
        serde_json::from_str(&output.stdout).ok()
    }

    /// Log docker in to ECR, then build and push the image.
    async fn build_and_push(
        &self,
        options: &DeployOptions,
        repo_uri: &str,
        tag: &str,
        region: &str,
        profile: &str,
    ) -> PlatformResult<()> {
        let password = self
            .runner
            .run_checked(&Self::aws(&["ecr", "get-login-password"], region, profile))
            .await?;
        let registry = repo_uri.split('/').next().unwrap_or(repo_uri);
        self.runner
            .run_checked(
                &ToolCommand::new("docker")
                    .args(["login", "--username", "AWS", "--password-stdin", registry])
                    .stdin(password.stdout_trimmed()),
            )
            .await?;

        let image = format!("{repo_uri}:{tag}");
        info!("Building and pushing {}", image);
        self.runner
            .run_checked(
                &ToolCommand::new("docker")
                    .args(["build", "-t", image.as_str()])
                    .arg(options.path.to_string_lossy())
                    .streamed(),
            )
            .await?;
        self.runner
            .run_checked(&ToolCommand::new("docker").args(["push", image.as_str()]).streamed())
            .await?;
        Ok(())
    }

    fn profile(context: &ResolvedContext) -> String {
        config_str(&context.config, "profile").unwrap_or_else(|| DEFAULT_AWS_PROFILE.to_string())
    }
}

#[async_trait]
impl Platform for EksPlatform {
    fn name(&self) -> &str {
        "eks"
    }

    fn description(&self) -> &str {
        "Existing AWS EKS cluster with an ECR repository"
    }

    async fn init(&self, context: &ResolvedContext, options: &InitOptions) -> PlatformResult<PlatformOutcome> {
        require_tool(
            self.runner.as_ref(),
            "aws",
            &["--version"],
            "Please install AWS CLI and configure credentials.",
        )
        .await?;

        let config = &context.config;
        let cluster_name = options.setting("cluster_name", config).ok_or_else(|| {
            PlatformError::missing("EKS cluster name is required. Please provide --cluster-name parameter.")
        })?;
        let ecr_repo = options.setting("ecr_repo", config).ok_or_else(|| {
            PlatformError::missing("ECR repository is required. Please provide --ecr-repo parameter.")
        })?;
        let region = options.setting("region", config).ok_or_else(|| {
            PlatformError::missing("AWS region is required. Please provide --region parameter.")
        })?;
        let namespace = options
            .setting("namespace", config)
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        let profile = options
            .setting("profile", config)
            .unwrap_or_else(|| DEFAULT_AWS_PROFILE.to_string());

        if let (Some(existing), Some(_)) = (&config.cluster_name, config.extra_str("ecr_repo")) {
            if !options.force {
                return Ok(PlatformOutcome::failure(format!(
                    "AWS platform already initialized with cluster {existing}, use --force to reinitialize"
                )));
            }
        }

        if !self.credentials_valid(&profile).await {
            return Ok(PlatformOutcome::failure(CREDENTIALS_ERROR));
        }

        let Some(cluster) = self
            .aws_json(Self::aws(&["eks", "describe-cluster", "--name", cluster_name.as_str()], &region, &profile))
            .await
        else {
            return Ok(PlatformOutcome::failure(format!(
                "EKS cluster '{cluster_name}' not found or not accessible in region '{region}'"
            )));
        };

        let repo_uri = self
            .aws_json(Self::aws(
                &["ecr", "describe-repositories", "--repository-names", ecr_repo.as_str()],
                &region,
                &profile,
            ))
            .await
            .and_then(|repos| {
                repos
                    .pointer("/repositories/0/repositoryUri")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            });
        let Some(repo_uri) = repo_uri else {
            return Ok(PlatformOutcome::failure(format!(
                "ECR repository '{ecr_repo}' not found or not accessible in region '{region}'"
            )));
        };

        let kubeconfig = self
            .runner
            .run(&Self::aws(&["eks", "update-kubeconfig", "--name", cluster_name.as_str()], &region, &profile))
            .await?;
        if !kubeconfig.is_success() {
            return Ok(PlatformOutcome::failure(format!(
                "Failed to update kubeconfig for EKS cluster '{cluster_name}'"
            )));
        }

        self.k8s.require_tools().await?;
        let ns = self
            .runner
            .run(&ToolCommand::new("kubectl").args(["get", "namespace", namespace.as_str()]))
            .await?;
        if !ns.is_success() {
            return Ok(PlatformOutcome::failure(format!(
                "Failed to verify namespace '{namespace}'"
            )));
        }

        let cluster = cluster.get("cluster").cloned().unwrap_or(Value::Null);
        let mut updates = ConfigMap::new();
        updates.insert("cluster_name".to_string(), cluster_name.clone().into());
        updates.insert("namespace".to_string(), namespace.into());
        updates.insert("ecr_repo".to_string(), ecr_repo.into());
        updates.insert("ecr_repo_uri".to_string(), repo_uri.into());
        updates.insert("region".to_string(), region.clone().into());
        updates.insert("profile".to_string(), profile.into());
        for (key, field) in [
            ("cluster_endpoint", "endpoint"),
            ("cluster_arn", "arn"),
            ("cluster_version", "version"),
        ] {
            if let Some(value) = cluster.get(field).filter(|v| !v.is_null()) {
                updates.insert(key.to_string(), value.clone());
            }
        }
        if let Some(account) = options.setting("service_account", config) {
            updates.insert("service_account".to_string(), account.into());
        }

        Ok(PlatformOutcome::success(format!(
            "AWS platform initialized successfully for EKS cluster '{cluster_name}' in region '{region}'"
        ))
        .with_updates(updates))
    }

    async fn deploy(&self, context: &ResolvedContext, options: &DeployOptions) -> PlatformResult<PlatformOutcome> {
        let profile = Self::profile(context);
        if !self.credentials_valid(&profile).await {
            return Ok(PlatformOutcome::failure(CREDENTIALS_ERROR));
        }

        let config = &context.config;
        let (Some(_), Some(region), Some(ecr_repo), Some(repo_uri)) = (
            config.cluster_name.as_deref(),
            config.region.as_deref(),
            config.extra_str("ecr_repo"),
            config.extra_str("ecr_repo_uri"),
        ) else {
            return Ok(PlatformOutcome::failure(
                "EKS cluster not configured. Please run 'sfai platform init --platform eks' first.",
            ));
        };

        let name = context.target_name();
        let namespace = namespace(context);
        let tag = app_version(&options.path)?;

        let image_id = format!("imageTag={tag}");
        let existing = self
            .runner
            .run(&Self::aws(
                &[
                    "ecr",
                    "describe-images",
                    "--repository-name",
                    ecr_repo,
                    "--image-ids",
                    image_id.as_str(),
                ],
                region,
                &profile,
            ))
            .await?;
        if existing.is_success() {
            info!("Image {}:{} already in ECR, skipping build and push", repo_uri, tag);
        } else {
            self.build_and_push(options, repo_uri, &tag, region, &profile)
                .await?;
        }

        let stored = helm_sets(context, &options.set_values)?;
        let mut sets = stored.clone();
        sets.insert("image.repository".to_string(), Value::String(repo_uri.to_string()));
        sets.insert("image.tag".to_string(), Value::String(tag.clone()));
        sets.insert("image.pullPolicy".to_string(), Value::String("IfNotPresent".to_string()));
        self.k8s.helm_install(name, namespace, options, &sets).await?;

        let mut outcome = PlatformOutcome::success(format!("Deployed {name}:{tag} to {namespace}"))
            .with_update("image_tag", tag)
            .with_update("helm_set", Value::Object(stored));
        if let Some(public_url) = self.k8s.ingress_url(name, namespace).await {
            outcome = outcome
                .with_field("public_url", public_url.as_str())
                .with_update("public_url", public_url);
        }
        Ok(outcome)
    }

    async fn delete(&self, context: &ResolvedContext) -> PlatformResult<PlatformOutcome> {
        if !self.credentials_valid(&Self::profile(context)).await {
            return Ok(PlatformOutcome::failure(CREDENTIALS_ERROR));
        }
        self.k8s.delete(context).await
    }

    async fn open(&self, context: &ResolvedContext, options: &OpenOptions) -> PlatformResult<PlatformOutcome> {
        self.k8s.open(context, options).await
    }

    async fn status(&self, context: &ResolvedContext) -> PlatformResult<PlatformOutcome> {
        if !self.credentials_valid(&Self::profile(context)).await {
            return Ok(PlatformOutcome::failure(CREDENTIALS_ERROR));
        }
        self.k8s.status(context).await
    }

    async fn logs(&self, context: &ResolvedContext) -> PlatformResult<PlatformOutcome> {
        if !self.credentials_valid(&Self::profile(context)).await {
            return Ok(PlatformOutcome::failure(CREDENTIALS_ERROR));
        }
        self.k8s.logs(context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockToolRunner;
    use crate::tool::ToolOutput;
    use sfai_context::EnvironmentConfig;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn context(config: EnvironmentConfig) -> ResolvedContext {
        ResolvedContext {
            app_name: "demo".to_string(),
            platform: "eks".to_string(),
            environment: "prod".to_string(),
            config,
            integrations: ConfigMap::new(),
        }
    }

    fn init_values() -> InitOptions {
        let mut values = ConfigMap::new();
        values.insert("cluster_name".to_string(), json!("c1"));
        values.insert("ecr_repo".to_string(), json!("demo"));
        values.insert("region".to_string(), json!("eu-west-1"));
        InitOptions::new(values)
    }

    fn configured() -> EnvironmentConfig {
        let mut config = EnvironmentConfig {
            cluster_name: Some("c1".to_string()),
            region: Some("eu-west-1".to_string()),
            namespace: Some("apps".to_string()),
            ..EnvironmentConfig::default()
        };
        config.extra.insert("ecr_repo".to_string(), json!("demo"));
        config.extra.insert(
            "ecr_repo_uri".to_string(),
            json!("123.dkr.ecr.eu-west-1.amazonaws.com/demo"),
        );
        config
    }

    #[tokio::test]
    async fn test_init_requires_cluster_name() {
        let platform = EksPlatform::new(Arc::new(MockToolRunner::new()));
        let err = platform
            .init(&context(EnvironmentConfig::default()), &InitOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("--cluster-name"));
    }

    #[tokio::test]
    async fn test_init_refuses_reinit_without_force() {
        let platform = EksPlatform::new(Arc::new(MockToolRunner::new()));
        let outcome = platform.init(&context(configured()), &init_values()).await.unwrap();
        assert!(!outcome.is_success());
        assert!(outcome.response.error.unwrap().contains("already initialized"));
    }

    #[tokio::test]
    async fn test_init_records_cluster_details() {
        let runner = Arc::new(
            MockToolRunner::new()
                .add_response(
                    "aws eks describe-cluster",
                    ToolOutput::success(r#"{"cluster": {"endpoint": "https://eks", "arn": "arn:c1", "version": "1.29"}}"#),
                )
                .add_response(
                    "aws ecr describe-repositories",
                    ToolOutput::success(r#"{"repositories": [{"repositoryUri": "123.dkr.ecr.eu-west-1.amazonaws.com/demo"}]}"#),
                ),
        );
        let platform = EksPlatform::new(runner.clone());
        let outcome = platform
            .init(&context(EnvironmentConfig::default()), &init_values())
            .await
            .unwrap();

        assert!(outcome.is_success(), "{:?}", outcome.response);
        assert_eq!(outcome.updates["cluster_arn"], json!("arn:c1"));
        assert_eq!(
            outcome.updates["ecr_repo_uri"],
            json!("123.dkr.ecr.eu-west-1.amazonaws.com/demo")
        );
        assert_eq!(outcome.updates["profile"], json!("default"));
        assert!(runner.was_called("aws eks update-kubeconfig --name c1 --region eu-west-1"));
    }

    #[tokio::test]
    async fn test_deploy_pushes_missing_image() {
        let app = tempdir().unwrap();
        fs::write(app.path().join("version.json"), r#"{"version": "2.0.0"}"#).unwrap();
        fs::create_dir_all(app.path().join("helm-chart")).unwrap();
        fs::write(app.path().join("helm-chart/values.yaml"), "").unwrap();

        let runner = Arc::new(
            MockToolRunner::new()
                .add_response("aws ecr describe-images", ToolOutput::failure(254, "ImageNotFoundException"))
                .add_response("aws ecr get-login-password", ToolOutput::success("secret-token\n")),
        );
        let platform = EksPlatform::new(runner.clone());
        let outcome = platform
            .deploy(&context(configured()), &DeployOptions::new(app.path()))
            .await
            .unwrap();

        assert!(outcome.is_success(), "{:?}", outcome.response);
        let login = runner
            .get_calls()
            .into_iter()
            .find(|c| c.command_line().starts_with("docker login"))
            .unwrap();
        assert_eq!(login.stdin.as_deref(), Some("secret-token"));
        assert!(runner.was_called("docker push 123.dkr.ecr.eu-west-1.amazonaws.com/demo:2.0.0"));
        assert_eq!(outcome.updates["image_tag"], json!("2.0.0"));
    }

    #[tokio::test]
    async fn test_expired_credentials() {
        let runner = Arc::new(
            MockToolRunner::new().add_response("aws sts", ToolOutput::failure(255, "ExpiredToken")),
        );
        let platform = EksPlatform::new(runner);
        let outcome = platform.status(&context(configured())).await.unwrap();
        assert_eq!(outcome.response.error.as_deref(), Some(CREDENTIALS_ERROR));
    }
}
