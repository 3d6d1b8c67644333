use std::net::Ipv4Addr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use dc_cutover::config::{HostRole, DEFAULT_CONFIG_FILE};
use dc_cutover::intent::DEFAULT_SECONDARY_DNS;
use dc_cutover::plan::StepId;
use remote_exec_core::TransportKind;

#[derive(Parser, Debug)]
#[command(name = "dc-cutover", version)]
#[command(about = "Plan and drive directory and file-share cutovers between Windows servers")]
pub struct Cli {
    /// Configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
    /// Log debug output to stderr (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Check that the scripts root and its step directories exist.
    Precheck,
    /// Create the trust between source and target domains.
    SetupTrust(ScriptArgs),
    /// Enable SID history on the target domain.
    EnableSidhistory(ScriptArgs),
    /// Migrate groups to the target domain.
    MigrateGroups(ScriptArgs),
    /// Migrate users to the target domain.
    MigrateUsers(ScriptArgs),
    /// Migrate computers to the target domain.
    MigrateComputers(ScriptArgs),
    /// Translate security on migrated resources.
    TranslateSecurity(ScriptArgs),
    /// Seed copy of the file shares.
    FilesSeed(ScriptArgs),
    /// Final delta copy of the file shares, mirroring deletions.
    FilesDelta(ScriptArgs),
    /// Create the namespace.
    DfsnSetup(ScriptArgs),
    /// Set up replication.
    DfsrSetup(ScriptArgs),
    /// Check that every script the plan needs is present.
    Validate(FormatArgs),
    /// Show the ordered migration plan.
    Plan(FormatArgs),
    /// Run the migration plan.
    Run(RunArgs),
    /// Report local domain membership, or sweep the local subnet.
    Discover(DiscoverArgs),
    /// Test the connection to one host, or to both configured controllers.
    Connect(ConnectArgs),
    /// Prepare a server: addressing, firewall, roles, data disk.
    Configure(ConfigureArgs),
    /// Turn on WinRM on a host through the admin-share executor.
    EnableWinrm(EnableWinrmArgs),
}

#[derive(Parser, Debug)]
pub struct ScriptArgs {
    /// Arguments forwarded to the script after `--`.
    #[arg(last = true)]
    pub extra: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct FormatArgs {
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Plan and report every step without executing anything.
    #[arg(long)]
    pub dry_run: bool,
    /// Start at this step; earlier steps are reported as skipped.
    #[arg(long, value_parser = parse_step_id)]
    pub from: Option<StepId>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct DiscoverArgs {
    /// Sweep the /24 around the local (or given) address for live hosts.
    #[arg(long)]
    pub scan: bool,
    /// Narrow the sweep to hosts answering on the directory port.
    #[arg(long)]
    pub dcs: bool,
    /// Any address inside the subnet to sweep (default: local address).
    #[arg(long)]
    pub subnet: Option<Ipv4Addr>,
    #[arg(long, value_enum, default_value_t = ProbeArg::Tcp)]
    pub probe: ProbeArg,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct ConnectArgs {
    /// Host to test; both configured controllers when omitted.
    pub host: Option<String>,
    #[arg(long, value_enum, default_value_t = RoleArg::Target)]
    pub role: RoleArg,
    /// Traditional method used when no agent answers (default from config).
    #[arg(long, value_enum)]
    pub method: Option<MethodArg>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct ConfigureArgs {
    pub host: String,
    #[arg(long, value_enum, default_value_t = RoleArg::Target)]
    pub role: RoleArg,
    #[arg(long, value_enum)]
    pub method: Option<MethodArg>,
    /// Replace IPv4 addressing on the first adapter that is up.
    #[arg(long, requires = "ip")]
    pub network: bool,
    #[arg(long)]
    pub ip: Option<String>,
    #[arg(long, default_value_t = 24)]
    pub prefix: u8,
    #[arg(long)]
    pub gateway: Option<String>,
    #[arg(long)]
    pub dns: Option<String>,
    /// Paired with `--dns`; pass an empty value to set only the primary.
    #[arg(long, default_value = DEFAULT_SECONDARY_DNS)]
    pub secondary_dns: String,
    /// Open the directory service inbound ports.
    #[arg(long)]
    pub firewall: bool,
    /// Install the directory, namespace, replication and file server roles.
    #[arg(long)]
    pub roles: bool,
    /// Initialize, partition and format this disk if it is still RAW.
    #[arg(long)]
    pub disk: Option<u32>,
    #[arg(long, default_value_t = 'E')]
    pub drive_letter: char,
    /// Confirm that the disk may be wiped.
    #[arg(long)]
    pub confirm_disk: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct EnableWinrmArgs {
    pub host: String,
    #[arg(long, value_enum, default_value_t = RoleArg::Target)]
    pub role: RoleArg,
    #[arg(long, value_enum, default_value_t = MethodArg::AdminShare)]
    pub via: MethodArg,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoleArg {
    Source,
    Target,
}

impl From<RoleArg> for HostRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Source => HostRole::Source,
            RoleArg::Target => HostRole::Target,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MethodArg {
    Agent,
    Winrm,
    Ssh,
    AdminShare,
}

impl From<MethodArg> for TransportKind {
    fn from(method: MethodArg) -> Self {
        match method {
            MethodArg::Agent => TransportKind::Agent,
            MethodArg::Winrm => TransportKind::WinRm,
            MethodArg::Ssh => TransportKind::Ssh,
            MethodArg::AdminShare => TransportKind::AdminShareExec,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeArg {
    Ping,
    Tcp,
}

fn parse_step_id(raw: &str) -> Result<StepId, String> {
    raw.parse()
}
