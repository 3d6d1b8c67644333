use anyhow::{bail, Result};
use dc_cutover::config::{HostRole, MigrationConfig};
use dc_cutover::configure::apply;
use dc_cutover::connection::ConnectionResult;
use dc_cutover::intent::ServerConfigIntent;
use dc_cutover::negotiate::{check_both, ConnectionNegotiator};
use dc_cutover::report::{render_configure, render_connection};
use remote_exec_core::TransportKind;
use serde::Serialize;

use crate::cli::{ConfigureArgs, ConnectArgs, EnableWinrmArgs, MethodArg, OutputFormat};

#[derive(Debug, Serialize)]
struct HostResult<'a> {
    host: &'a str,
    #[serde(flatten)]
    result: &'a ConnectionResult,
}

fn method(config: &MigrationConfig, arg: Option<MethodArg>) -> TransportKind {
    arg.map(TransportKind::from).unwrap_or(config.hosts.method)
}

fn exit_code(success: bool) -> i32 {
    if success {
        0
    } else {
        1
    }
}

pub async fn run_connect(config: &MigrationConfig, args: ConnectArgs) -> Result<i32> {
    let negotiator = ConnectionNegotiator::from_config(config);
    let preferred = method(config, args.method);

    let results: Vec<(String, ConnectionResult)> = match args.host {
        Some(host) => {
            let credentials = config.credentials(HostRole::from(args.role));
            let negotiated = negotiator.connect(&host, &credentials, preferred).await;
            vec![(host, negotiated.result().clone())]
        }
        None => {
            let source = config.hosts.source_dc.trim();
            let target = config.hosts.target_dc.trim();
            if source.is_empty() || target.is_empty() {
                bail!("no host given and [hosts] source_dc/target_dc are not both set");
            }
            let source_creds = config.credentials(HostRole::Source);
            let target_creds = config.credentials(HostRole::Target);
            let (source_result, target_result) = check_both(
                &negotiator,
                (source, &source_creds),
                (target, &target_creds),
                preferred,
            )
            .await;
            vec![
                (source.to_string(), source_result.result().clone()),
                (target.to_string(), target_result.result().clone()),
            ]
        }
    };

    print_results(&results, args.format)?;
    Ok(exit_code(results.iter().all(|(_, result)| result.success)))
}

fn print_results(results: &[(String, ConnectionResult)], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            let blocks: Vec<String> = results
                .iter()
                .map(|(host, result)| render_connection(host, result))
                .collect();
            println!("{}", blocks.join("\n\n"));
        }
        OutputFormat::Json => {
            let rows: Vec<HostResult<'_>> = results
                .iter()
                .map(|(host, result)| HostResult { host, result })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }
    Ok(())
}

pub fn intent_from_args(args: &ConfigureArgs) -> ServerConfigIntent {
    let mut intent = ServerConfigIntent::default();
    intent.configure_network = args.network;
    intent.ip_address = args.ip.clone().unwrap_or_default();
    intent.prefix_length = args.prefix;
    intent.gateway = args.gateway.clone();
    intent.dns_server = args.dns.clone();
    intent.secondary_dns = args.secondary_dns.clone();
    intent.open_firewall_ports = args.firewall;
    intent.install_roles = args.roles;
    if let Some(disk) = args.disk {
        intent.prepare_disk = true;
        intent.disk_number = disk;
    }
    intent.drive_letter = args.drive_letter;
    if args.confirm_disk {
        intent.confirm_disk_preparation();
    }
    intent
}

pub async fn run_configure(config: &MigrationConfig, args: ConfigureArgs) -> Result<i32> {
    let intent = intent_from_args(&args);
    if intent.is_empty() {
        bail!("nothing to configure; pass --network, --firewall, --roles or --disk");
    }

    let negotiator = ConnectionNegotiator::from_config(config);
    let credentials = config.credentials(HostRole::from(args.role));
    let negotiated = negotiator
        .connect(&args.host, &credentials, method(config, args.method))
        .await;
    let session = match negotiated.into_session() {
        Ok(session) => session,
        Err(result) => {
            print_results(&[(args.host.clone(), result)], args.format)?;
            return Ok(1);
        }
    };

    let result = apply(&session.client, &intent).await;
    match args.format {
        OutputFormat::Text => println!("{}", render_configure(&args.host, &result)),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&HostResult {
                host: &args.host,
                result: &result,
            })?
        ),
    }
    Ok(exit_code(result.success))
}

pub async fn run_enable_winrm(config: &MigrationConfig, args: EnableWinrmArgs) -> Result<i32> {
    let negotiator = ConnectionNegotiator::from_config(config);
    let credentials = config.credentials(HostRole::from(args.role));
    let result = negotiator
        .enable_remote_management(&args.host, &credentials, args.via.into())
        .await;
    println!("{}", render_connection(&args.host, &result));
    Ok(exit_code(result.success))
}
