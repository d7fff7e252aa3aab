//! Platform commands - initialize and switch platform environments.

use anyhow::Result;
use clap::{Args, Subcommand};
use tracing::debug;

use sfai_context::{ConfigMap, DEFAULT_ENVIRONMENT};
use sfai_platform::InitOptions;

use super::{collect_values, Session};

#[derive(Args)]
pub struct PlatformArgs {
    #[command(subcommand)]
    command: PlatformCommand,
}

#[derive(Subcommand)]
enum PlatformCommand {
    /// Initialize a platform environment and make it active
    Init(InitArgs),

    /// Make an initialized platform environment active
    Switch(SwitchArgs),
}

#[derive(Args)]
pub struct InitArgs {
    /// Platform to initialize (defaults to the active platform)
    #[arg(short, long)]
    platform: Option<String>,

    /// Environment to initialize
    #[arg(short, long, default_value = DEFAULT_ENVIRONMENT)]
    environment: String,

    /// Re-initialize an already configured environment
    #[arg(short, long)]
    force: bool,

    #[command(flatten)]
    provider: ProviderArgs,
}

/// Provider specific settings. Each provider reads the ones it needs.
#[derive(Args, Debug, Default)]
pub struct ProviderArgs {
    /// Heroku app name
    #[arg(long)]
    app_name: Option<String>,

    /// Heroku team
    #[arg(long)]
    team_name: Option<String>,

    /// Heroku private space
    #[arg(long)]
    private_space: Option<String>,

    /// Heroku deployment type (buildpack or container)
    #[arg(long)]
    deployment_type: Option<String>,

    /// Heroku routing (internal for private space apps)
    #[arg(long)]
    routing: Option<String>,

    /// EKS cluster name
    #[arg(long)]
    cluster_name: Option<String>,

    /// AWS region
    #[arg(long)]
    region: Option<String>,

    /// AWS CLI profile
    #[arg(long)]
    profile: Option<String>,

    /// Kubernetes namespace
    #[arg(long)]
    namespace: Option<String>,

    /// ECR repository name
    #[arg(long)]
    ecr_repo: Option<String>,

    /// Kubernetes service account
    #[arg(long)]
    service_account: Option<String>,
}

impl ProviderArgs {
    fn values(&self) -> ConfigMap {
        collect_values([
            ("app_name", self.app_name.as_ref()),
            ("team_name", self.team_name.as_ref()),
            ("private_space", self.private_space.as_ref()),
            ("deployment_type", self.deployment_type.as_ref()),
            ("routing", self.routing.as_ref()),
            ("cluster_name", self.cluster_name.as_ref()),
            ("region", self.region.as_ref()),
            ("profile", self.profile.as_ref()),
            ("namespace", self.namespace.as_ref()),
            ("ecr_repo", self.ecr_repo.as_ref()),
            ("service_account", self.service_account.as_ref()),
        ])
    }
}

#[derive(Args)]
pub struct SwitchArgs {
    /// Platform to switch to
    platform: String,

    /// Environment to switch to (keeps the active one when the platform has it)
    #[arg(short, long)]
    environment: Option<String>,
}

pub async fn execute(args: PlatformArgs, session: &Session) -> Result<()> {
    match args.command {
        PlatformCommand::Init(args) => {
            let values = args.provider.values();
            debug!("Provider settings: {:?}", values.keys().collect::<Vec<_>>());
            let options = InitOptions::new(values).with_force(args.force);
            let response = session
                .operations()
                .init_platform(args.platform.as_deref(), Some(&args.environment), &options)
                .await;
            session.report(response)
        }
        PlatformCommand::Switch(args) => {
            let response = session
                .operations()
                .switch(&args.platform, args.environment.as_deref());
            session.report(response)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Cli, Commands};
    use clap::Parser;
    use serde_json::Value;

    #[test]
    fn test_provider_flags_become_init_values() {
        let cli = Cli::try_parse_from([
            "sfai", "platform", "init", "-p", "eks", "-e", "prod", "--cluster-name", "c1", "--region",
            "eu-west-1",
        ])
        .unwrap();
        let Commands::Platform(PlatformArgs {
            command: PlatformCommand::Init(args),
        }) = cli.command
        else {
            panic!("expected platform init");
        };

        assert_eq!(args.platform.as_deref(), Some("eks"));
        assert_eq!(args.environment, "prod");
        let values = args.provider.values();
        assert_eq!(values.len(), 2);
        assert_eq!(values["cluster_name"], Value::String("c1".to_string()));
        assert_eq!(values["region"], Value::String("eu-west-1".to_string()));
    }

    #[test]
    fn test_switch_takes_positional_platform() {
        let cli = Cli::try_parse_from(["sfai", "platform", "switch", "heroku", "-e", "staging"]).unwrap();
        let Commands::Platform(PlatformArgs {
            command: PlatformCommand::Switch(args),
        }) = cli.command
        else {
            panic!("expected platform switch");
        };
        assert_eq!(args.platform, "heroku");
        assert_eq!(args.environment.as_deref(), Some("staging"));
    }
}
