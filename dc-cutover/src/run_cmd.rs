use std::io;

use anyhow::{Context, Result};
use dc_cutover::config::MigrationConfig;
use dc_cutover::orchestrate::{LogSink, Orchestrator, OrchestratorOptions};
use dc_cutover::plan::build_plan;
use dc_cutover::report::{render_plan, render_run, TextSink};
use tokio::sync::watch;
use tracing::warn;

use crate::cli::{FormatArgs, OutputFormat, RunArgs};

pub fn run_plan(config: &MigrationConfig, args: FormatArgs) -> Result<i32> {
    let plan = build_plan(config);
    match args.format {
        OutputFormat::Text => println!("{}", render_plan(&plan)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
    }
    Ok(0)
}

pub async fn run_run(config: &MigrationConfig, args: RunArgs) -> Result<i32> {
    let plan = build_plan(config);
    let options = OrchestratorOptions {
        step_timeout: config.timeouts.step(),
        dry_run: args.dry_run,
        start_from: args.from,
    };

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping the running step");
            let _ = cancel_tx.send(true);
        }
    });

    let orchestrator = Orchestrator::new(config.interpreter.clone(), options)
        .context("cannot run the migration plan")?
        .with_cancel(cancel_rx);

    let report = match args.format {
        OutputFormat::Text => {
            let mut sink = TextSink::new(io::stdout());
            let report = orchestrator.run(&plan, &mut sink).await?;
            println!("{}", render_run(&report));
            report
        }
        OutputFormat::Json => {
            let report = orchestrator.run(&plan, &mut LogSink).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            report
        }
    };
    Ok(report.exit_code)
}
