//! sfai CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Validation failure
//! - 4: Context or platform environment not initialized

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{filter::Directive, fmt, prelude::*, EnvFilter};

mod commands;

use commands::{Cli, CommandFailure, Commands, Session};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const VALIDATION_FAILURE: u8 = 3;
    pub const NOT_INITIALIZED: u8 = 4;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so --json output stays parseable
    let log_result = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(log_filter(cli.global.verbose, cli.global.quiet))
        .try_init();

    if log_result.is_err() {
        // Logging already initialized, continue
    }

    let session = match Session::from_args(&cli.global) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            return ExitCode::from(ExitCodes::GENERAL_ERROR);
        }
    };

    let result = match cli.command {
        Commands::App(args) => commands::app::execute(args, &session).await,
        Commands::Platform(args) => commands::platform::execute(args, &session).await,
        Commands::Config(args) => commands::config::execute(args, &session).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            if let Some(remedy) = e.downcast_ref::<CommandFailure>().and_then(|f| f.remedy.as_ref()) {
                eprintln!("   Run: {}", remedy);
            }
            ExitCode::from(exit_code)
        }
    }
}

fn log_filter(verbose: bool, quiet: bool) -> EnvFilter {
    let directives: &[&str] = if quiet {
        &["error"]
    } else if verbose {
        &["sfai=debug", "info"]
    } else {
        &["sfai=info", "warn"]
    };

    directives
        .iter()
        .filter_map(|directive| directive.parse::<Directive>().ok())
        .fold(EnvFilter::from_default_env(), EnvFilter::add_directive)
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    if let Some(failure) = e.downcast_ref::<CommandFailure>() {
        if failure.remedy.is_some() {
            return ExitCodes::NOT_INITIALIZED;
        }
    }

    let msg = format!("{:#}", e).to_lowercase();
    if msg.contains("validation") || msg.contains("invalid") {
        ExitCodes::VALIDATION_FAILURE
    } else if msg.contains("unsupported provider") || msg.contains("available templates") {
        ExitCodes::INVALID_ARGS
    } else {
        ExitCodes::GENERAL_ERROR
    }
}
