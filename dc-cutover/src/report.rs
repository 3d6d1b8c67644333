use std::collections::BTreeSet;
use std::io::Write;
use std::net::Ipv4Addr;

use colored::Colorize;
use remote_exec_core::DiscoveryResult;

use crate::connection::ConnectionResult;
use crate::orchestrate::{ProgressEvent, ProgressSink, RunReport, RunState, StepStatus};
use crate::plan::MigrationPlan;

/// Render the ordered plan.
pub fn render_plan(plan: &MigrationPlan) -> String {
    let mut out = Vec::new();
    let optional = plan.iter().filter(|step| step.optional).count();
    out.push(format!(
        "plan steps={} required={} optional={}",
        plan.len(),
        plan.len() - optional,
        optional
    ));
    out.push("items".to_string());
    for (offset, step) in plan.iter().enumerate() {
        let kind = if step.optional { "OPT" } else { "REQ" };
        out.push(format!(
            "- [{kind}] {}: {} ({})",
            step.id,
            step.name,
            step.executable.display()
        ));
        if !step.args.is_empty() {
            out.push(format!("  {}. args: {}", offset + 1, step.args_display()));
        }
    }
    out.join("\n")
}

/// Render the final run summary.
pub fn render_run(report: &RunReport) -> String {
    let mut out = Vec::new();
    let header = format!(
        "run state={} exit_code={} dry_run={} steps={}",
        report.state.as_str(),
        report.exit_code,
        report.dry_run,
        report.steps.len()
    );
    out.push(match report.state {
        RunState::Completed => header.green().to_string(),
        RunState::PartiallyStopped => header.yellow().to_string(),
        _ => header.red().to_string(),
    });
    out.push("items".to_string());
    for record in &report.steps {
        let state = status_tag(record.status);
        if record.detail.is_empty() {
            out.push(format!("- {state} {}", record.id));
        } else {
            out.push(format!("- {state} {}: {}", record.id, record.detail));
        }
    }
    out.join("\n")
}

fn status_tag(status: StepStatus) -> String {
    let tag = format!("[{}]", status.as_str().to_uppercase());
    match status {
        StepStatus::Succeeded => tag.green().to_string(),
        StepStatus::Simulated => tag.cyan().to_string(),
        StepStatus::Skipped | StepStatus::NotRun => tag.dimmed().to_string(),
        StepStatus::TimedOut | StepStatus::Cancelled => tag.yellow().to_string(),
        StepStatus::Failed => tag.red().to_string(),
    }
}

/// Render a connection attempt.
pub fn render_connection(host: &str, result: &ConnectionResult) -> String {
    let mut out = Vec::new();
    out.push(format!(
        "connect host={} success={} method={} failure={}",
        host,
        result.success,
        result
            .method
            .map(|m| m.to_string())
            .unwrap_or_else(|| "none".to_string()),
        result
            .failure
            .map(|f| f.to_string())
            .unwrap_or_else(|| "none".to_string())
    ));
    if let Some(name) = &result.remote_hostname {
        out.push(format!(
            "remote hostname={} os={}",
            name,
            result.remote_os_version.as_deref().unwrap_or("unknown")
        ));
    }
    let message = if result.success {
        result.message.green().to_string()
    } else {
        result.message.red().to_string()
    };
    out.push(message);
    if !result.success {
        out.push(format!("hint: {}", result.hint.yellow()));
    }
    out.join("\n")
}

/// Render the outcome log of a configuration pass.
pub fn render_configure(host: &str, result: &ConnectionResult) -> String {
    let mut out = Vec::new();
    out.push(format!("configure host={} success={}", host, result.success));
    out.push("items".to_string());
    for line in result.message.lines() {
        let colored = if line.starts_with("[OK]") {
            line.green().to_string()
        } else if line.starts_with("[WARN]") {
            line.yellow().to_string()
        } else if line.starts_with("[FAIL]") {
            line.red().to_string()
        } else {
            line.to_string()
        };
        out.push(format!("- {colored}"));
    }
    if !result.success {
        out.push(format!("hint: {}", result.hint.yellow()));
    }
    out.join("\n")
}

/// Render local discovery.
pub fn render_discovery(result: &DiscoveryResult) -> String {
    let mut out = Vec::new();
    out.push(format!(
        "discover host={} ip={} joined={} domain={}",
        result.local_host,
        display_ip(result.local_ip),
        result.joined_to_domain,
        result.current_domain.as_deref().unwrap_or("none")
    ));
    out.push(format!(
        "controller name={} ip={}",
        result.current_dc_name.as_deref().unwrap_or("none"),
        display_ip(result.current_dc_ip)
    ));
    out.push("available_dcs".to_string());
    if result.available_dcs.is_empty() {
        out.push("- none".to_string());
    }
    for dc in &result.available_dcs {
        out.push(format!("- {dc}"));
    }
    if let Some(error) = &result.error_message {
        out.push(format!("notes: {}", error.yellow()));
    }
    out.join("\n")
}

/// Render a sweep result.
pub fn render_hosts(title: &str, base: Ipv4Addr, hosts: &BTreeSet<Ipv4Addr>) -> String {
    let mut out = Vec::new();
    let [a, b, c, _] = base.octets();
    out.push(format!("{title} subnet={a}.{b}.{c}.0/24 found={}", hosts.len()));
    out.push("hosts".to_string());
    if hosts.is_empty() {
        out.push("- none".to_string());
    }
    for host in hosts {
        out.push(format!("- {host}"));
    }
    out.join("\n")
}

fn display_ip(ip: Option<Ipv4Addr>) -> String {
    ip.map(|ip| ip.to_string())
        .unwrap_or_else(|| "none".to_string())
}

/// Prints step progress as it happens.
pub struct TextSink<W: Write> {
    out: W,
    total: usize,
}

impl<W: Write> TextSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, total: 0 }
    }
}

impl<W: Write> ProgressSink for TextSink<W> {
    fn report(&mut self, event: ProgressEvent) {
        // Write errors are ignored; progress never stops a run.
        let _ = match event {
            ProgressEvent::Started { total, dry_run } => {
                self.total = total;
                writeln!(self.out, "starting run steps={total} dry_run={dry_run}")
            }
            ProgressEvent::StepStarted {
                index,
                id,
                name,
                command,
            } => writeln!(
                self.out,
                "[{index}/{}] {id}: {name}\n  > {}",
                self.total,
                command.dimmed()
            ),
            ProgressEvent::StepOutput {
                stdout, stderr, ..
            } => {
                let mut text = String::new();
                for line in stdout.lines() {
                    text.push_str(&format!("  | {line}\n"));
                }
                for line in stderr.lines() {
                    text.push_str(&format!("  ! {}\n", line.red()));
                }
                write!(self.out, "{text}")
            }
            ProgressEvent::StepFinished(record) => match record.status {
                StepStatus::NotRun => Ok(()),
                StepStatus::Succeeded => writeln!(
                    self.out,
                    "[{}/{}] {} => {}",
                    record.index,
                    self.total,
                    record.id,
                    "ok".green()
                ),
                _ => writeln!(
                    self.out,
                    "[{}/{}] {} => {} {}",
                    record.index,
                    self.total,
                    record.id,
                    status_tag(record.status),
                    record.detail
                ),
            },
            ProgressEvent::Finished { .. } => writeln!(self.out),
        };
    }
}
