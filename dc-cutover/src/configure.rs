//! Applying a [`ServerConfigIntent`] to a connected server.
//!
//! Every selected part is attempted regardless of earlier outcomes; the
//! resulting message holds one `[OK]`, `[WARN]` or `[FAIL]` line per part.

use remote_exec_core::transport::AgentTransport;
use remote_exec_core::{Fact, TransportClient, TransportError};
use tracing::{debug, info, warn};

use crate::configure_script::{self, Level, Outcome, Part};
use crate::connection::ConnectionResult;
use crate::error::FailureKind;
use crate::intent::{ServerConfigIntent, ROLES};

pub const RETRY_HINT: &str =
    "review the failed items; every part can be re-applied safely once the cause is fixed";

/// The parts selected in `intent`, in application order.
pub fn selected_parts(intent: &ServerConfigIntent) -> Vec<Part> {
    let mut parts = Vec::new();
    if intent.configure_network {
        parts.push(Part::Network);
    }
    if intent.open_firewall_ports {
        parts.push(Part::Firewall);
    }
    if intent.install_roles {
        parts.push(Part::Roles);
    }
    if intent.prepare_disk {
        parts.push(Part::Disk);
    }
    parts
}

pub async fn apply(client: &TransportClient, intent: &ServerConfigIntent) -> ConnectionResult {
    let parts = selected_parts(intent);
    if parts.is_empty() {
        return ConnectionResult::success("nothing selected").with_method(client.kind());
    }

    // Refused disk work is decided locally; nothing is sent for it.
    let mut refused = None;
    let remote: Vec<Part> = parts
        .iter()
        .copied()
        .filter(|part| {
            if *part != Part::Disk {
                return true;
            }
            refused = disk_refusal(intent);
            refused.is_none()
        })
        .collect();

    let mut outcomes = match client.as_agent() {
        Some(agent) => apply_via_agent(agent, intent, &remote).await,
        None => apply_via_script(client, intent, &remote).await,
    };
    if let Some(outcome) = refused {
        outcomes.push(outcome);
    }
    outcomes.sort_by_key(|outcome| {
        outcome
            .part()
            .and_then(|part| parts.iter().position(|p| *p == part))
            .unwrap_or(usize::MAX)
    });

    summarize(client, &outcomes)
}

fn disk_refusal(intent: &ServerConfigIntent) -> Option<Outcome> {
    if intent.disk_number == 0 {
        return Some(Outcome::new(
            Level::Fail,
            Part::Disk,
            "disk 0 holds the operating system; refused",
        ));
    }
    if !intent.disk_confirmed() {
        return Some(Outcome::new(
            Level::Fail,
            Part::Disk,
            format!(
                "preparation of disk {} not confirmed; nothing done",
                intent.disk_number
            ),
        ));
    }
    None
}

async fn apply_via_agent(
    agent: &AgentTransport,
    intent: &ServerConfigIntent,
    parts: &[Part],
) -> Vec<Outcome> {
    let mut outcomes = Vec::with_capacity(parts.len());
    for part in parts {
        let outcome = match part {
            Part::Roles => install_roles(agent).await,
            Part::Disk => prepare_disk(agent, intent).await,
            Part::Network | Part::Firewall => {
                run_fragment(agent, *part, &configure_script::fragment(intent, *part)).await
            }
        };
        debug!(part = part.label(), outcome = %outcome, "agent configuration step");
        outcomes.push(outcome);
    }
    outcomes
}

async fn run_fragment(agent: &AgentTransport, part: Part, script: &str) -> Outcome {
    match agent.execute(script).await {
        Ok(result) => configure_script::parse_outcomes(&result.stdout)
            .into_iter()
            .find(|outcome| outcome.part() == Some(part))
            .unwrap_or_else(|| {
                if result.success {
                    Outcome::new(Level::Ok, part, "applied")
                } else {
                    Outcome::new(
                        Level::Fail,
                        part,
                        format!("exit code {}: {}", result.exit_code, result.stderr.trim()),
                    )
                }
            }),
        Err(err) => Outcome::new(Level::Fail, part, err.to_string()),
    }
}

async fn install_roles(agent: &AgentTransport) -> Outcome {
    let mut missing = Vec::new();
    for role in ROLES {
        match agent.install_role(role).await {
            Ok(result) if result.success => debug!(role, "role installed"),
            Ok(result) => {
                warn!(role, error = %result.error, "role install failed");
                missing.push(*role);
            }
            Err(err) => {
                warn!(role, error = %err, "role install request failed");
                missing.push(*role);
            }
        }
    }
    if missing.is_empty() {
        Outcome::new(Level::Ok, Part::Roles, format!("{} features installed", ROLES.len()))
    } else {
        Outcome::new(
            Level::Warn,
            Part::Roles,
            format!("not installed: {}", missing.join(", ")),
        )
    }
}

async fn prepare_disk(agent: &AgentTransport, intent: &ServerConfigIntent) -> Outcome {
    let number = intent.disk_number;
    let style = match agent.query_fact(Fact::DiskPartitionStyle(number)).await {
        Ok(style) => style,
        Err(err) => {
            return Outcome::new(
                Level::Fail,
                Part::Disk,
                format!("could not read disk {number}: {err}"),
            )
        }
    };
    if !style.trim().eq_ignore_ascii_case("RAW") {
        return Outcome::new(
            Level::Warn,
            Part::Disk,
            format!("disk {number} already initialized ({}); left untouched", style.trim()),
        );
    }
    run_fragment(
        agent,
        Part::Disk,
        &configure_script::disk_fragment(number, intent.drive_letter),
    )
    .await
}

async fn apply_via_script(
    client: &TransportClient,
    intent: &ServerConfigIntent,
    parts: &[Part],
) -> Vec<Outcome> {
    if parts.is_empty() {
        return Vec::new();
    }
    let script = configure_script::full_script(intent, parts);
    let output = match client.execute(&script).await {
        Ok(result) => {
            if !result.success {
                debug!(exit_code = result.exit_code, "configuration script exited non-zero");
            }
            result
        }
        Err(err) => return transport_failure(parts, &err),
    };

    let reported = configure_script::parse_outcomes(&output.stdout);
    parts
        .iter()
        .map(|part| {
            reported
                .iter()
                .find(|outcome| outcome.part() == Some(*part))
                .cloned()
                .unwrap_or_else(|| {
                    Outcome::new(
                        Level::Fail,
                        *part,
                        format!("no outcome reported (exit code {})", output.exit_code),
                    )
                })
        })
        .collect()
}

fn transport_failure(parts: &[Part], err: &TransportError) -> Vec<Outcome> {
    parts
        .iter()
        .map(|part| Outcome::new(Level::Fail, *part, err.to_string()))
        .collect()
}

fn summarize(client: &TransportClient, outcomes: &[Outcome]) -> ConnectionResult {
    let message = outcomes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n");
    let failed = outcomes.iter().filter(|o| o.level == Level::Fail).count();
    let host = client.descriptor().host;
    if failed == 0 {
        info!(host = %host, parts = outcomes.len(), "configuration applied");
        ConnectionResult::success(message).with_method(client.kind())
    } else {
        warn!(host = %host, failed, "configuration incomplete");
        ConnectionResult::failure(message, RETRY_HINT, FailureKind::NonZeroExit)
            .with_method(client.kind())
    }
}
