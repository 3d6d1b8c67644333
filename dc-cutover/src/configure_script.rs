//! PowerShell fragments for server preparation.
//!
//! Every fragment reports exactly one `OUTCOME|<ok|warn|fail>|<label>: <text>`
//! line, so the same fragment can be sent alone to an agent or concatenated
//! into one script for a traditional session.

use std::fmt::{self, Display, Formatter};

use remote_exec_core::powershell::quote;
use serde::Serialize;

use crate::intent::{ServerConfigIntent, FIREWALL_RULES, ROLES};

const OUTCOME_MARKER: &str = "OUTCOME|";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Ok,
    Warn,
    Fail,
}

impl Level {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ok" => Some(Level::Ok),
            "warn" => Some(Level::Warn),
            "fail" => Some(Level::Fail),
            _ => None,
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            Level::Ok => "OK",
            Level::Warn => "WARN",
            Level::Fail => "FAIL",
        }
    }
}

/// Sub-intents, in the order they are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Part {
    Network,
    Firewall,
    Roles,
    Disk,
}

impl Part {
    pub fn label(&self) -> &'static str {
        match self {
            Part::Network => "network",
            Part::Firewall => "firewall",
            Part::Roles => "roles",
            Part::Disk => "disk",
        }
    }
}

/// One line of the configuration outcome log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub level: Level,
    pub text: String,
}

impl Outcome {
    pub fn new(level: Level, part: Part, detail: impl AsRef<str>) -> Self {
        Self {
            level,
            text: format!("{}: {}", part.label(), detail.as_ref().trim()),
        }
    }

    pub fn part(&self) -> Option<Part> {
        let label = self.text.split(':').next()?.trim();
        [Part::Network, Part::Firewall, Part::Roles, Part::Disk]
            .into_iter()
            .find(|part| part.label() == label)
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level.tag(), self.text)
    }
}

/// Replace IPv4 addressing on the first adapter that is up.
pub fn network_fragment(intent: &ServerConfigIntent) -> String {
    let mut lines = vec![
        "try {".to_string(),
        "    $adapter = Get-NetAdapter | Where-Object { $_.Status -eq 'Up' } | Select-Object -First 1"
            .to_string(),
        "    if (-not $adapter) { throw 'no network adapter is up' }".to_string(),
        "    Remove-NetIPAddress -InterfaceAlias $adapter.Name -AddressFamily IPv4 -Confirm:$false -ErrorAction SilentlyContinue"
            .to_string(),
        "    Remove-NetRoute -InterfaceAlias $adapter.Name -AddressFamily IPv4 -Confirm:$false -ErrorAction SilentlyContinue"
            .to_string(),
    ];
    let mut add = format!(
        "    New-NetIPAddress -InterfaceAlias $adapter.Name -IPAddress {} -PrefixLength {}",
        quote(&intent.ip_address),
        intent.prefix_length
    );
    if let Some(gateway) = non_blank(intent.gateway.as_deref()) {
        add.push_str(&format!(" -DefaultGateway {}", quote(gateway)));
    }
    add.push_str(" -ErrorAction Stop | Out-Null");
    lines.push(add);
    if let Some(dns) = non_blank(intent.dns_server.as_deref()) {
        let mut servers = quote(dns);
        if let Some(secondary) = non_blank(Some(&intent.secondary_dns)) {
            servers.push_str(&format!(",{}", quote(secondary)));
        }
        lines.push(format!(
            "    Set-DnsClientServerAddress -InterfaceAlias $adapter.Name -ServerAddresses {servers} -ErrorAction Stop"
        ));
    }
    lines.push(format!(
        "    Write-Output ('{OUTCOME_MARKER}ok|network: ' + $adapter.Name + ' set to {}/{}')",
        intent.ip_address.replace('\'', "''"),
        intent.prefix_length
    ));
    lines.push("} catch {".to_string());
    lines.push(format!(
        "    Write-Output ('{OUTCOME_MARKER}fail|network: ' + $_.Exception.Message)"
    ));
    lines.push("}".to_string());
    lines.join("\n")
}

/// Remove-then-add every allowance by display name, so re-applying never duplicates a rule.
pub fn firewall_fragment() -> String {
    let mut lines = vec!["try {".to_string()];
    for rule in FIREWALL_RULES {
        let name = quote(rule.name);
        lines.push(format!(
            "    Remove-NetFirewallRule -DisplayName {name} -ErrorAction SilentlyContinue"
        ));
        lines.push(format!(
            "    New-NetFirewallRule -DisplayName {name} -Direction Inbound -Protocol {} -LocalPort {} -Action Allow -ErrorAction Stop | Out-Null",
            rule.protocol, rule.ports
        ));
    }
    lines.push(format!(
        "    Write-Output '{OUTCOME_MARKER}ok|firewall: {} inbound rules applied'",
        FIREWALL_RULES.len()
    ));
    lines.push("} catch {".to_string());
    lines.push(format!(
        "    Write-Output ('{OUTCOME_MARKER}fail|firewall: ' + $_.Exception.Message)"
    ));
    lines.push("}".to_string());
    lines.join("\n")
}

/// Install the role set; individual feature failures only warn.
pub fn roles_fragment() -> String {
    let features = ROLES
        .iter()
        .map(|role| quote(role))
        .collect::<Vec<_>>()
        .join(", ");
    [
        format!("$failed = @()"),
        format!("foreach ($f in @({features})) {{"),
        "    $r = Install-WindowsFeature -Name $f -IncludeManagementTools -ErrorAction SilentlyContinue"
            .to_string(),
        "    if (-not $r -or -not $r.Success) { $failed += $f }".to_string(),
        "}".to_string(),
        "if ($failed.Count -eq 0) {".to_string(),
        format!(
            "    Write-Output '{OUTCOME_MARKER}ok|roles: {} features installed'",
            ROLES.len()
        ),
        "} else {".to_string(),
        format!("    Write-Output ('{OUTCOME_MARKER}warn|roles: not installed: ' + ($failed -join ', '))"),
        "}".to_string(),
    ]
    .join("\n")
}

/// Initialize, partition and format the disk, but only while it is still RAW.
pub fn disk_fragment(disk_number: u32, drive_letter: char) -> String {
    let letter = drive_letter.to_ascii_uppercase();
    [
        "try {".to_string(),
        format!("    $disk = Get-Disk -Number {disk_number} -ErrorAction Stop"),
        "    if ($disk.PartitionStyle -eq 'RAW') {".to_string(),
        format!("        Initialize-Disk -Number {disk_number} -PartitionStyle GPT -ErrorAction Stop | Out-Null"),
        format!("        New-Partition -DiskNumber {disk_number} -UseMaximumSize -DriveLetter '{letter}' -ErrorAction Stop | Out-Null"),
        format!("        Format-Volume -DriveLetter '{letter}' -FileSystem NTFS -NewFileSystemLabel 'Shares' -Confirm:$false -ErrorAction Stop | Out-Null"),
        format!("        Write-Output '{OUTCOME_MARKER}ok|disk: disk {disk_number} prepared as {letter}:'"),
        "    } else {".to_string(),
        format!("        Write-Output ('{OUTCOME_MARKER}warn|disk: disk {disk_number} already initialized (' + $disk.PartitionStyle + '); left untouched')"),
        "    }".to_string(),
        "} catch {".to_string(),
        format!("    Write-Output ('{OUTCOME_MARKER}fail|disk: ' + $_.Exception.Message)"),
        "}".to_string(),
    ]
    .join("\n")
}

/// One script for every part in `parts`, applied in order.
pub fn full_script(intent: &ServerConfigIntent, parts: &[Part]) -> String {
    let mut sections = vec!["$ErrorActionPreference = 'Continue'".to_string()];
    for part in parts {
        sections.push(fragment(intent, *part));
    }
    sections.join("\n\n")
}

pub fn fragment(intent: &ServerConfigIntent, part: Part) -> String {
    match part {
        Part::Network => network_fragment(intent),
        Part::Firewall => firewall_fragment(),
        Part::Roles => roles_fragment(),
        Part::Disk => disk_fragment(intent.disk_number, intent.drive_letter),
    }
}

/// Outcome markers found in script output, in order of appearance.
pub fn parse_outcomes(output: &str) -> Vec<Outcome> {
    output
        .lines()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix(OUTCOME_MARKER)?;
            let (level, text) = rest.split_once('|')?;
            Some(Outcome {
                level: Level::parse(level)?,
                text: text.trim().to_string(),
            })
        })
        .collect()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
