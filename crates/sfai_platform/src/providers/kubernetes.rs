//! Helm and kubectl operations shared by the Kubernetes platforms.

use std::fs;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::Value;
use tracing::{debug, info};

use sfai_context::{ConfigMap, ResolvedContext};

use crate::error::{PlatformError, PlatformResult};
use crate::platform::{DeployOptions, OpenOptions, PlatformOutcome};
use crate::providers::require_tool;
use crate::tool::{ToolCommand, ToolRunner};

static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+\.\d+$").expect("version pattern is valid"));

/// Namespace used when the environment does not name one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Read the `X.Y.Z` version from `<path>/version.json`.
pub fn app_version(path: &Path) -> PlatformResult<String> {
    let file = path.join("version.json");
    if !file.exists() {
        return Err(PlatformError::missing(format!(
            "version.json not found at {}",
            file.display()
        )));
    }

    let document: Value = serde_json::from_str(&fs::read_to_string(&file)?)?;
    match document.get("version").and_then(Value::as_str) {
        Some(version) if VERSION_PATTERN.is_match(version) => Ok(version.to_string()),
        _ => Err(PlatformError::invalid(
            "Invalid or missing version in version.json (expected X.Y.Z)",
        )),
    }
}

/// Helm `--set` values: the stored `helm_set` map overlaid by new
/// `key=value` pairs. Entries may also be comma separated.
pub fn helm_sets(context: &ResolvedContext, set_values: &[String]) -> PlatformResult<ConfigMap> {
    let mut sets = context
        .config
        .extra
        .get("helm_set")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    for pair in set_values.iter().flat_map(|entry| entry.split(',')) {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| PlatformError::invalid(format!("Invalid --set value '{pair}', expected key=value")))?;
        sets.insert(key.to_string(), Value::String(value.to_string()));
    }

    Ok(sets)
}

/// Kubernetes namespace of an environment.
pub fn namespace(context: &ResolvedContext) -> &str {
    context.config.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE)
}

/// Helm and kubectl invocations.
#[derive(Clone)]
pub struct KubernetesOps {
    runner: Arc<dyn ToolRunner>,
}

impl KubernetesOps {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &dyn ToolRunner {
        self.runner.as_ref()
    }

    /// Ensure kubectl and helm are installed.
    pub async fn require_tools(&self) -> PlatformResult<()> {
        require_tool(
            self.runner(),
            "kubectl",
            &["version", "--client"],
            "Please install kubectl for Kubernetes cluster access.",
        )
        .await?;
        require_tool(
            self.runner(),
            "helm",
            &["version"],
            "Please install Helm for Kubernetes deployments.",
        )
        .await
    }

    /// `helm upgrade --install` a release from a chart directory.
    pub async fn helm_install(
        &self,
        release: &str,
        namespace: &str,
        options: &DeployOptions,
        sets: &ConfigMap,
    ) -> PlatformResult<()> {
        let chart = options.chart_dir();
        let values = chart.join("values.yaml");
        if !values.exists() {
            return Err(PlatformError::missing(format!(
                "values.yaml not found at {}",
                values.display()
            )));
        }

        let mut command = ToolCommand::new("helm")
            .args(["upgrade", "--install", release])
            .arg(chart.to_string_lossy())
            .args(["--namespace", namespace]);
        if let Some(file) = &options.values_file {
            command = command.arg("-f").arg(file.to_string_lossy());
        }
        for (key, value) in sets {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            command = command.arg("--set").arg(format!("{key}={value}"));
        }

        info!("Installing release {} into {}", release, namespace);
        self.runner.run_checked(&command.streamed()).await?;
        Ok(())
    }

    /// Image of the release's first container, if deployed.
    pub async fn deployed_image(&self, name: &str, namespace: &str) -> Option<String> {
        let command = ToolCommand::new("kubectl").args([
            "get",
            "deployment",
            name,
            "-n",
            namespace,
            "-o",
            "jsonpath={.spec.template.spec.containers[0].image}",
        ]);
        match self.runner.run(&command).await {
            Ok(output) if output.is_success() && !output.stdout_trimmed().is_empty() => {
                Some(output.stdout_trimmed().to_string())
            }
            _ => None,
        }
    }

    /// Public URL from the release ingress load balancer.
    pub async fn ingress_url(&self, name: &str, namespace: &str) -> Option<String> {
        let ingress = format!("{name}-ingress");
        let command = ToolCommand::new("kubectl").args([
            "get",
            "ingress",
            ingress.as_str(),
            "-n",
            namespace,
            "-o",
            "json",
        ]);
        let output = self.runner.run(&command).await.ok()?;
        if !output.is_success() {
            return None;
        }
        let ingress: Value = serde_json::from_str(&output.stdout).ok()?;
        let hostname = ingress
            .pointer("/status/loadBalancer/ingress/0/hostname")
            .and_then(Value::as_str)?;
        Some(format!("http://{hostname}/"))
    }

    pub async fn delete(&self, context: &ResolvedContext) -> PlatformResult<PlatformOutcome> {
        let name = context.target_name();
        let namespace = namespace(context);
        self.runner
            .run_checked(&ToolCommand::new("helm").args(["uninstall", name, "--namespace", namespace]))
            .await?;
        Ok(PlatformOutcome::success(format!("Deleted {name} from {namespace}")))
    }

    pub async fn logs(&self, context: &ResolvedContext) -> PlatformResult<PlatformOutcome> {
        let name = context.target_name();
        let namespace = namespace(context);
        let selector = format!("app={name}");
        let pod = self
            .runner
            .run(&ToolCommand::new("kubectl").args([
                "get",
                "pods",
                "-l",
                selector.as_str(),
                "-n",
                namespace,
                "-o",
                "jsonpath={.items[0].metadata.name}",
            ]))
            .await?;
        let pod = pod.stdout_trimmed();
        if pod.is_empty() {
            return Ok(PlatformOutcome::failure("No pod found."));
        }

        self.runner
            .run_checked(&ToolCommand::new("kubectl").args(["logs", pod, "-n", namespace]).streamed())
            .await?;
        Ok(PlatformOutcome::success(format!("Logs for {name} from {pod}")).with_field("pod", pod))
    }

    pub async fn status(&self, context: &ResolvedContext) -> PlatformResult<PlatformOutcome> {
        let name = context.target_name();
        let namespace = namespace(context);
        let commands = [
            vec!["get".to_string(), "pods".to_string(), "-l".to_string(), format!("app={name}")],
            vec!["get".to_string(), "svc".to_string(), format!("{name}-service")],
            vec!["get".to_string(), "deployment".to_string(), name.to_string()],
        ];
        for args in commands {
            let command = ToolCommand::new("kubectl")
                .args(args)
                .args(["-n", namespace])
                .streamed();
            self.runner.run_checked(&command).await?;
        }
        Ok(PlatformOutcome::success(format!("Status for {name} in {namespace}")))
    }

    /// Open an explicit or stored URL, port-forwarding the service otherwise.
    pub async fn open(&self, context: &ResolvedContext, options: &OpenOptions) -> PlatformResult<PlatformOutcome> {
        if let Some(url) = &options.url {
            return Ok(PlatformOutcome::success(format!("Opened {url}")).with_field("url", url.as_str()));
        }
        if let Some(public_url) = &context.config.public_url {
            let url = options.join(public_url);
            return Ok(
                PlatformOutcome::success(format!("Opened app public url at {url}")).with_field("url", url),
            );
        }

        let name = context.target_name();
        let url = options.join(&format!("http://localhost:{}", options.port));
        info!("Forwarding {} to {}; press Ctrl+C to stop", name, url);
        let command = ToolCommand::new("kubectl")
            .arg("port-forward")
            .arg(format!("svc/{name}-service"))
            .arg(format!("{}:80", options.port))
            .args(["-n", namespace(context)])
            .streamed();
        self.runner.run_checked(&command).await?;
        debug!("Port-forward for {} ended", name);
        Ok(PlatformOutcome::success(format!("Forwarded {name} at {url}"))
            .with_field("url", url)
            .with_field("closed", true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockToolRunner;
    use crate::tool::ToolOutput;
    use sfai_context::EnvironmentConfig;
    use serde_json::json;
    use tempfile::tempdir;

    fn context(extra: ConfigMap) -> ResolvedContext {
        ResolvedContext {
            app_name: "demo".to_string(),
            platform: "minikube".to_string(),
            environment: "default".to_string(),
            config: EnvironmentConfig {
                namespace: Some("apps".to_string()),
                extra,
                ..EnvironmentConfig::default()
            },
            integrations: ConfigMap::new(),
        }
    }

    #[test]
    fn test_app_version() {
        let temp = tempdir().unwrap();
        assert!(app_version(temp.path()).is_err());

        fs::write(temp.path().join("version.json"), r#"{"version": "1.2"}"#).unwrap();
        assert!(app_version(temp.path()).unwrap_err().to_string().contains("X.Y.Z"));

        fs::write(temp.path().join("version.json"), r#"{"version": "1.2.3"}"#).unwrap();
        assert_eq!(app_version(temp.path()).unwrap(), "1.2.3");
    }

    #[test]
    fn test_helm_sets_overlay_stored_values() {
        let mut extra = ConfigMap::new();
        extra.insert("helm_set".to_string(), json!({"replicas": "1", "debug": "true"}));
        let sets = helm_sets(&context(extra), &["replicas=3,ingress.enabled=true".to_string()]).unwrap();

        assert_eq!(sets["replicas"], json!("3"));
        assert_eq!(sets["debug"], json!("true"));
        assert_eq!(sets["ingress.enabled"], json!("true"));

        assert!(helm_sets(&context(ConfigMap::new()), &["broken".to_string()]).is_err());
    }

    #[tokio::test]
    async fn test_logs_without_pod() {
        let runner = Arc::new(MockToolRunner::new());
        let ops = KubernetesOps::new(runner.clone());
        let outcome = ops.logs(&context(ConfigMap::new())).await.unwrap();
        assert!(!outcome.is_success());
        assert_eq!(outcome.response.error.as_deref(), Some("No pod found."));
    }

    #[tokio::test]
    async fn test_ingress_url() {
        let runner = Arc::new(MockToolRunner::new().add_response(
            "kubectl get ingress demo-ingress",
            ToolOutput::success(r#"{"status":{"loadBalancer":{"ingress":[{"hostname":"lb.example.com"}]}}}"#),
        ));
        let ops = KubernetesOps::new(runner);
        assert_eq!(
            ops.ingress_url("demo", "apps").await.as_deref(),
            Some("http://lb.example.com/")
        );
    }

    #[tokio::test]
    async fn test_helm_install_requires_values_file() {
        let temp = tempdir().unwrap();
        let runner = Arc::new(MockToolRunner::new());
        let ops = KubernetesOps::new(runner.clone());
        let options = DeployOptions::new(temp.path());

        let err = ops
            .helm_install("demo", "apps", &options, &ConfigMap::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("values.yaml not found"));

        fs::create_dir_all(temp.path().join("helm-chart")).unwrap();
        fs::write(temp.path().join("helm-chart/values.yaml"), "").unwrap();
        let mut sets = ConfigMap::new();
        sets.insert("image.tag".to_string(), json!("1.0.0"));
        ops.helm_install("demo", "apps", &options, &sets).await.unwrap();

        let line = runner.command_lines().pop().unwrap();
        assert!(line.starts_with("helm upgrade --install demo"));
        assert!(line.ends_with("--namespace apps --set image.tag=1.0.0"));
    }
}
