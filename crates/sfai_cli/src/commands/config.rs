//! Config commands - manage external service profiles.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde_json::Value;

use sfai_context::{ConfigMap, DEFAULT_PROFILE};

use super::{collect_values, parse_key_value, Session};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Create a profile and link it to a platform environment
    Init(InitArgs),

    /// Change fields of an existing profile
    Update(UpdateArgs),

    /// List profiles with secrets masked
    List(ListArgs),

    /// Show one profile with secrets masked
    View(ProfileArgs),

    /// Delete a profile and unlink it everywhere
    Delete(ProfileArgs),
}

#[derive(Args, Debug)]
pub struct ProfileArgs {
    /// External service, e.g. mulesoft
    #[arg(short, long)]
    service: String,

    /// Profile name
    #[arg(long, default_value = DEFAULT_PROFILE)]
    profile: String,
}

/// Profile fields, as named flags or generic `--set key=value` pairs.
#[derive(Args, Debug, Default)]
pub struct FieldArgs {
    /// MuleSoft organization id
    #[arg(long)]
    org_id: Option<String>,

    /// MuleSoft environment id
    #[arg(long)]
    environment_id: Option<String>,

    /// MuleSoft connected app client id
    #[arg(long)]
    client_id: Option<String>,

    /// MuleSoft connected app client secret
    #[arg(long)]
    client_secret: Option<String>,

    /// Any other field
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    set_values: Vec<(String, String)>,
}

impl FieldArgs {
    fn values(&self) -> ConfigMap {
        let mut values = collect_values([
            ("org_id", self.org_id.as_ref()),
            ("environment_id", self.environment_id.as_ref()),
            ("client_id", self.client_id.as_ref()),
            ("client_secret", self.client_secret.as_ref()),
        ]);
        for (key, value) in &self.set_values {
            values.insert(key.clone(), Value::String(value.clone()));
        }
        values
    }
}

#[derive(Args)]
pub struct InitArgs {
    #[command(flatten)]
    target: ProfileArgs,

    /// Platform to link the profile to (defaults to the active platform)
    #[arg(short, long)]
    platform: Option<String>,

    /// Environment to link the profile to (defaults to the active environment)
    #[arg(short, long)]
    environment: Option<String>,

    #[command(flatten)]
    fields: FieldArgs,
}

#[derive(Args)]
pub struct UpdateArgs {
    #[command(flatten)]
    target: ProfileArgs,

    #[command(flatten)]
    fields: FieldArgs,
}

#[derive(Args)]
pub struct ListArgs {
    /// Only list profiles of this service
    #[arg(short, long)]
    service: Option<String>,
}

pub async fn execute(args: ConfigArgs, session: &Session) -> Result<()> {
    let service = session.config_service();
    let response = match args.command {
        ConfigCommand::Init(args) => service.init(
            &args.target.service,
            args.fields.values(),
            &args.target.profile,
            args.platform.as_deref(),
            args.environment.as_deref(),
        ),
        ConfigCommand::Update(args) => {
            service.update(&args.target.service, args.fields.values(), &args.target.profile)
        }
        ConfigCommand::List(args) => service.list(args.service.as_deref()),
        ConfigCommand::View(args) => service.view(&args.service, &args.profile),
        ConfigCommand::Delete(args) => service.delete(&args.service, &args.profile),
    };
    session.report(response)
}
