use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::Arc;

use anyhow::{bail, Result};
use dc_cutover::config::MigrationConfig;
use dc_cutover::report::{render_discovery, render_hosts};
use remote_exec_core::{
    discover_directory_servers, scan_subnet, HostProbe, LocalDiscovery, PingProbe, TcpProbe,
};
use serde::Serialize;
use tracing::info;

use crate::cli::{DiscoverArgs, OutputFormat, ProbeArg};

#[derive(Debug, Serialize)]
struct SweepReport {
    subnet: Ipv4Addr,
    directory_only: bool,
    hosts: BTreeSet<Ipv4Addr>,
}

pub async fn run_discover(config: &MigrationConfig, args: DiscoverArgs) -> Result<i32> {
    if !(args.scan || args.dcs) {
        let result = LocalDiscovery::new(config.interpreter.clone()).discover().await;
        match args.format {
            OutputFormat::Text => println!("{}", render_discovery(&result)),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        }
        return Ok(0);
    }

    let base = match args.subnet {
        Some(addr) => addr,
        None => {
            let local = LocalDiscovery::new(config.interpreter.clone()).discover().await;
            match local.local_ip {
                Some(addr) => addr,
                None => bail!("could not determine the local IPv4 address; pass --subnet"),
            }
        }
    };

    let hosts = match args.probe {
        ProbeArg::Ping => sweep(config, base, args.dcs, PingProbe::new()).await,
        ProbeArg::Tcp => sweep(config, base, args.dcs, TcpProbe::default()).await,
    };
    info!(subnet = %base, found = hosts.len(), "sweep finished");

    match args.format {
        OutputFormat::Text => {
            let title = if args.dcs { "directory_servers" } else { "live_hosts" };
            println!("{}", render_hosts(title, base, &hosts));
        }
        OutputFormat::Json => {
            let report = SweepReport {
                subnet: base,
                directory_only: args.dcs,
                hosts,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(0)
}

async fn sweep<P: HostProbe>(
    config: &MigrationConfig,
    base: Ipv4Addr,
    directory_only: bool,
    probe: P,
) -> BTreeSet<Ipv4Addr> {
    let probe = Arc::new(probe);
    if directory_only {
        discover_directory_servers(base, probe, &config.discovery).await
    } else {
        scan_subnet(base, probe, &config.discovery).await
    }
}
