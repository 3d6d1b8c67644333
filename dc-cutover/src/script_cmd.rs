use std::path::{Path, PathBuf};

use anyhow::Result;
use colored::Colorize;
use dc_cutover::config::MigrationConfig;
use dc_cutover::orchestrate::{EXIT_LAUNCH_FAILURE, EXIT_SCRIPT_MISSING, EXIT_TIMEOUT};
use dc_cutover::plan::build_plan;
use remote_exec_core::{ExecError, ProcessExecutor};
use serde::Serialize;
use tracing::{debug, info};

use crate::cli::{OutputFormat, ScriptArgs};

/// Single-script subcommands and the script each one runs.
#[derive(Debug, Clone, Copy)]
pub enum ScriptCommand {
    SetupTrust,
    EnableSidHistory,
    MigrateGroups,
    MigrateUsers,
    MigrateComputers,
    TranslateSecurity,
    FilesSeed,
    FilesDelta,
    DfsnSetup,
    DfsrSetup,
}

impl ScriptCommand {
    fn banner(&self) -> &'static str {
        match self {
            ScriptCommand::SetupTrust => "creating two-way trust between the domains",
            ScriptCommand::EnableSidHistory => "enabling SID history and disabling trust quarantine",
            ScriptCommand::MigrateGroups => "migrating groups",
            ScriptCommand::MigrateUsers => "migrating users",
            ScriptCommand::MigrateComputers => "migrating computers",
            ScriptCommand::TranslateSecurity => "translating security",
            ScriptCommand::FilesSeed => "seed copy of file shares",
            ScriptCommand::FilesDelta => {
                "final delta copy of file shares, mirroring deletions; needs a maintenance window"
            }
            ScriptCommand::DfsnSetup => "creating the namespace",
            ScriptCommand::DfsrSetup => "setting up replication",
        }
    }

    fn script(&self, config: &MigrationConfig) -> PathBuf {
        let cross = config.files.cross_domain_dir();
        match self {
            ScriptCommand::SetupTrust => cross.join("Create-Trust.ps1"),
            ScriptCommand::EnableSidHistory => cross.join("Enable-SIDHistory.ps1"),
            ScriptCommand::MigrateGroups => cross.join("ADMT-Migrate-Groups.ps1"),
            ScriptCommand::MigrateUsers => cross.join("ADMT-Migrate-Users.ps1"),
            ScriptCommand::MigrateComputers => cross.join("ADMT-Migrate-Computers.ps1"),
            ScriptCommand::TranslateSecurity => cross.join("ADMT-Translate-Security.ps1"),
            ScriptCommand::FilesSeed | ScriptCommand::FilesDelta => {
                config.files.scripts_dir().join("30-Robocopy-Migrate.ps1")
            }
            ScriptCommand::DfsnSetup => cross.join("DFSN-Create.ps1"),
            ScriptCommand::DfsrSetup => cross.join("DFSR-Setup.ps1"),
        }
    }

    fn base_args(&self, config: &MigrationConfig) -> Vec<String> {
        let maps = config.files.maps_csv().display().to_string();
        match self {
            ScriptCommand::FilesSeed => {
                vec!["-CsvMapPath".to_string(), maps, "-NoPreCopy:$false".to_string()]
            }
            ScriptCommand::FilesDelta => {
                vec!["-CsvMapPath".to_string(), maps, "-NoPreCopy:$true".to_string()]
            }
            _ => Vec::new(),
        }
    }
}

/// Run one step script and return its exit code.
pub async fn run_script(
    config: &MigrationConfig,
    command: ScriptCommand,
    args: ScriptArgs,
) -> Result<i32> {
    let path = command.script(config);
    if !path.is_file() {
        eprintln!("script not found: {}", path.display());
        return Ok(EXIT_SCRIPT_MISSING);
    }

    let mut script_args = command.base_args(config);
    script_args.extend(args.extra);
    println!("{} {}", "==>".cyan(), command.banner());

    let spec = config
        .interpreter
        .script_command(&path, &script_args, config.timeouts.step());
    info!(command = %spec.display(), "running script");
    match ProcessExecutor::new().run(&spec).await {
        Ok(result) => {
            if !result.stdout.is_empty() {
                println!("{}", result.stdout);
            }
            if !result.stderr.is_empty() {
                eprintln!("{}", result.stderr);
            }
            debug!(exit_code = result.exit_code, "script finished");
            Ok(result.exit_code)
        }
        Err(err) => {
            eprintln!("{}", err.to_string().red());
            Ok(match err {
                ExecError::Timeout { .. } => EXIT_TIMEOUT,
                _ => EXIT_LAUNCH_FAILURE,
            })
        }
    }
}

pub fn run_precheck(config: &MigrationConfig) -> Result<i32> {
    println!("precheck scripts_root={}", config.files.scripts_root.display());
    let checks = [
        ("scripts_root", config.files.scripts_root.clone()),
        ("scripts", config.files.scripts_dir()),
        ("scripts_b", config.files.cross_domain_dir()),
    ];
    for (id, dir) in &checks {
        if !dir.is_dir() {
            println!("- {} {id}: {} not found", "[FAIL]".red(), dir.display());
            eprintln!("scripts directory not found: {}", dir.display());
            return Ok(EXIT_SCRIPT_MISSING);
        }
        println!("- {} {id}: {}", "[PASS]".green(), dir.display());
    }
    match config.interpreter.locate() {
        Some(path) => println!("- {} interpreter: {}", "[PASS]".green(), path.display()),
        None => println!(
            "- {} interpreter: {} not found; scripts cannot run from this machine",
            "[WARN]".yellow(),
            config.interpreter.program.display()
        ),
    }
    Ok(0)
}

#[derive(Debug, Serialize)]
struct ValidateItem {
    id: String,
    path: String,
    optional: bool,
    present: bool,
}

#[derive(Debug, Serialize)]
struct ValidateReport {
    pass: bool,
    missing_required: usize,
    missing_optional: usize,
    items: Vec<ValidateItem>,
}

/// Check that every script the configured plan needs is present.
pub fn run_validate(config: &MigrationConfig, format: OutputFormat) -> Result<i32> {
    let plan = build_plan(config);
    let items: Vec<ValidateItem> = plan
        .iter()
        .map(|step| ValidateItem {
            id: step.id.to_string(),
            path: step.executable.display().to_string(),
            optional: step.optional,
            present: script_present(&step.executable),
        })
        .collect();
    let missing_required = items.iter().filter(|i| !i.present && !i.optional).count();
    let missing_optional = items.iter().filter(|i| !i.present && i.optional).count();
    let report = ValidateReport {
        pass: missing_required == 0,
        missing_required,
        missing_optional,
        items,
    };

    match format {
        OutputFormat::Text => println!("{}", render_validate(&report)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(if report.pass { 0 } else { EXIT_SCRIPT_MISSING })
}

fn script_present(path: &Path) -> bool {
    path.is_file()
}

fn render_validate(report: &ValidateReport) -> String {
    let mut out = Vec::new();
    out.push(format!(
        "validate pass={} missing_required={} missing_optional={}",
        report.pass, report.missing_required, report.missing_optional
    ));
    out.push("items".to_string());
    for item in &report.items {
        let state = match (item.present, item.optional) {
            (true, _) => "[PASS]".green(),
            (false, true) => "[WARN]".yellow(),
            (false, false) => "[FAIL]".red(),
        };
        let detail = if item.present { "present" } else { "missing" };
        out.push(format!("- {state} {}: {} {}", item.id, detail, item.path));
    }
    out.join("\n")
}
