use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use dc_cutover::config::MigrationConfig;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

mod cli;
mod connect_cmd;
mod discover_cmd;
mod run_cmd;
mod script_cmd;

use cli::{Cli, Command};
use script_cmd::ScriptCommand;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match real_main(cli) {
        Ok(code) => exit_code(code),
        Err(e) => {
            error!("{:?}", e);
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn real_main(cli: Cli) -> anyhow::Result<i32> {
    let config = MigrationConfig::load_or_default(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    debug!(config = %cli.config.display(), "configuration ready");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async {
        match cli.command {
            Command::Precheck => script_cmd::run_precheck(&config),
            Command::SetupTrust(args) => {
                script_cmd::run_script(&config, ScriptCommand::SetupTrust, args).await
            }
            Command::EnableSidhistory(args) => {
                script_cmd::run_script(&config, ScriptCommand::EnableSidHistory, args).await
            }
            Command::MigrateGroups(args) => {
                script_cmd::run_script(&config, ScriptCommand::MigrateGroups, args).await
            }
            Command::MigrateUsers(args) => {
                script_cmd::run_script(&config, ScriptCommand::MigrateUsers, args).await
            }
            Command::MigrateComputers(args) => {
                script_cmd::run_script(&config, ScriptCommand::MigrateComputers, args).await
            }
            Command::TranslateSecurity(args) => {
                script_cmd::run_script(&config, ScriptCommand::TranslateSecurity, args).await
            }
            Command::FilesSeed(args) => {
                script_cmd::run_script(&config, ScriptCommand::FilesSeed, args).await
            }
            Command::FilesDelta(args) => {
                script_cmd::run_script(&config, ScriptCommand::FilesDelta, args).await
            }
            Command::DfsnSetup(args) => {
                script_cmd::run_script(&config, ScriptCommand::DfsnSetup, args).await
            }
            Command::DfsrSetup(args) => {
                script_cmd::run_script(&config, ScriptCommand::DfsrSetup, args).await
            }
            Command::Validate(args) => script_cmd::run_validate(&config, args.format),
            Command::Plan(args) => run_cmd::run_plan(&config, args),
            Command::Run(args) => run_cmd::run_run(&config, args).await,
            Command::Discover(args) => discover_cmd::run_discover(&config, args).await,
            Command::Connect(args) => connect_cmd::run_connect(&config, args).await,
            Command::Configure(args) => connect_cmd::run_configure(&config, args).await,
            Command::EnableWinrm(args) => connect_cmd::run_enable_winrm(&config, args).await,
        }
    })
}

/// Exit codes outside 0..=255 (signals, negative codes) collapse to 1.
fn exit_code(code: i32) -> ExitCode {
    match u8::try_from(code) {
        Ok(code) => ExitCode::from(code),
        Err(_) => ExitCode::from(1),
    }
}
