//! Integration tests for platform dispatch against a real context store.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tempfile::tempdir;

use sfai_context::{ConfigMap, ContextPaths, ContextStore};
use sfai_platform::{
    AppOperations, DeployOptions, InitOptions, MockToolRunner, OpenOptions, PlatformRegistry,
    ToolOutput,
};

const HEROKU_APP: &str = r#"{"app": {"name": "demo", "web_url": "https://demo.herokuapp.com/", "git_url": "https://git.heroku.com/demo.git", "team": {"name": "acme"}, "space": null, "build_stack": {"name": "heroku-24"}, "internal_routing": false}}"#;

fn setup(root: &Path, runner: MockToolRunner) -> AppOperations {
    let store = ContextStore::new(ContextPaths::rooted(&root.join("project"), &root.join("home")));
    store
        .update_platform("local", "default", &ConfigMap::new(), Some("demo"))
        .unwrap();
    AppOperations::new(store, PlatformRegistry::builtin(Arc::new(runner)))
}

fn app_dir(root: &Path) -> std::path::PathBuf {
    let dir = root.join("project");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("Dockerfile"), "FROM python:3.12-slim").unwrap();
    dir
}

/// Test that provider init output lands in the new environment and activates it.
#[tokio::test]
async fn test_init_platform_stores_provider_config() {
    let temp = tempdir().unwrap();
    let runner = MockToolRunner::new().add_response("heroku apps:info", ToolOutput::success(HEROKU_APP));
    let ops = setup(temp.path(), runner);

    let response = ops
        .init_platform(Some("heroku"), Some("staging"), &InitOptions::default())
        .await;
    assert!(response.success, "{response:?}");
    assert_eq!(response.platform.as_deref(), Some("heroku"));
    assert_eq!(response.environment.as_deref(), Some("staging"));

    let context = ops.store().require_application().unwrap();
    assert!(context.is_active("heroku", "staging"));
    let staging = context.environment("heroku", "staging").unwrap();
    assert_eq!(staging.extra_str("git_url"), Some("https://git.heroku.com/demo.git"));
    assert_eq!(staging.extra_str("team_name"), Some("acme"));
    assert!(context.environment("local", "default").is_some());
}

/// Test that a failed provider init leaves the context untouched.
#[tokio::test]
async fn test_failed_init_does_not_create_environment() {
    let temp = tempdir().unwrap();
    let ops = setup(temp.path(), MockToolRunner::new().set_missing("aws"));

    let response = ops
        .init_platform(Some("eks"), Some("prod"), &InitOptions::default())
        .await;
    assert!(!response.success);
    assert!(response.error.unwrap().starts_with("aws not installed"));

    let context = ops.store().require_application().unwrap();
    assert!(context.environment("eks", "prod").is_none());
    assert!(context.is_active("local", "default"));
}

/// Test that deploying with an override switches and records provider output.
#[tokio::test]
async fn test_deploy_switches_and_records_outcome() {
    let temp = tempdir().unwrap();
    let dir = app_dir(temp.path());
    let runner = MockToolRunner::new().add_response("heroku apps:info", ToolOutput::success(HEROKU_APP));
    let ops = setup(temp.path(), runner.clone());
    ops.init_platform(Some("heroku"), None, &InitOptions::default()).await;

    let response = ops.deploy(Some("local"), None, &DeployOptions::new(&dir)).await;
    assert!(response.success, "{response:?}");
    assert_eq!(response.app_name.as_deref(), Some("demo"));
    assert_eq!(response.platform.as_deref(), Some("local"));

    let context = ops.store().require_application().unwrap();
    assert!(context.is_active("local", "default"));
    let local = context.environment("local", "default").unwrap();
    let port = local.port.unwrap();
    assert_eq!(local.public_url.as_deref(), Some(format!("http://localhost:{port}").as_str()));
    assert!(runner.was_called("docker build -t demo ."));
}

/// Test that deleting a Heroku app clears only the app keys.
#[tokio::test]
async fn test_delete_clears_reported_keys() {
    let temp = tempdir().unwrap();
    let runner = MockToolRunner::new().add_response("heroku apps:info", ToolOutput::success(HEROKU_APP));
    let ops = setup(temp.path(), runner.clone());
    ops.init_platform(Some("heroku"), None, &InitOptions::default()).await;

    let response = ops.delete(None, None).await;
    assert!(response.success, "{response:?}");
    assert!(runner.was_called("heroku apps:destroy --app demo --confirm demo"));

    let resolved = ops
        .store()
        .read(Some("heroku"), Some("default"))
        .unwrap()
        .found()
        .unwrap();
    assert_eq!(resolved.config.app_name, None);
    assert_eq!(resolved.config.public_url, None);
    assert_eq!(resolved.config.extra_str("git_url"), None);
    assert_eq!(resolved.config.extra_str("routing"), Some("public"));
}

/// Test that an uninitialized target fails with the init command and no switch.
#[tokio::test]
async fn test_uninitialized_target_is_reported() {
    let temp = tempdir().unwrap();
    let runner = MockToolRunner::new();
    let ops = setup(temp.path(), runner.clone());

    let response = ops.logs(Some("minikube"), None).await;
    assert!(!response.success);
    assert_eq!(
        response.field_str("remedy"),
        Some("sfai platform init --platform minikube --environment default")
    );
    assert_eq!(runner.call_count(), 0);
    assert!(ops.store().require_application().unwrap().is_active("local", "default"));
}

/// Test that provider failures surface as unsuccessful responses with the target.
#[tokio::test]
async fn test_provider_failure_is_fail_soft() {
    let temp = tempdir().unwrap();
    let runner = MockToolRunner::new().add_response("docker logs", ToolOutput::failure(1, "No such container: demo"));
    let ops = setup(temp.path(), runner);

    let response = ops.logs(None, None).await;
    assert!(!response.success);
    assert!(response.error.unwrap().contains("No such container: demo"));
    assert_eq!(response.environment.as_deref(), Some("default"));

    let response = ops.open(None, None, &OpenOptions::new("/")).await;
    assert!(response.success);
    assert_eq!(response.field("url"), Some(&json!("http://localhost:8080/")));
}
