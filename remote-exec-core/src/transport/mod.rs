//! Remote command transports.
//!
//! Every channel to a server is one variant of the closed [`TransportClient`]
//! enum. All variants expose the same three capabilities:
//!
//! - [`TransportClient::connect`] — one liveness + identity round trip
//! - [`TransportClient::execute`] — run a PowerShell command remotely
//! - [`TransportClient::query_fact`] — fetch a single remote fact
//!
//! | Variant | Channel |
//! |---------|---------|
//! | [`AgentTransport`] | HTTP control-plane agent on the server |
//! | [`WinRmTransport`] | remote session through the local PowerShell |
//! | [`SshTransport`] | system `ssh` client, key authentication only |
//! | [`AdminShareTransport`] | admin-share remote executor (PsExec compatible) |

pub mod admin_share;
pub mod agent;
pub mod ssh;
pub mod winrm;

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::process::{ExecError, ExecutionResult};

pub use admin_share::{AdminShareOptions, AdminShareTransport};
pub use agent::{AgentConfig, AgentTransport};
pub use ssh::{SshOptions, SshTransport};
pub use winrm::{WinRmOptions, WinRmTransport};

/// The traditional and agent channels a session can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    Agent,
    #[serde(rename = "winrm")]
    WinRm,
    Ssh,
    AdminShareExec,
}

impl Display for TransportKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportKind::Agent => "agent",
            TransportKind::WinRm => "winrm",
            TransportKind::Ssh => "ssh",
            TransportKind::AdminShareExec => "admin-share-exec",
        };
        f.write_str(name)
    }
}

/// What a session authenticates with. Never carries the secret itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthReference {
    SharedToken,
    Password { username: String },
    KeyFile { username: String, path: String },
    Ambient { username: String },
}

/// Minimum description of an open channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransportDescriptor {
    pub kind: TransportKind,
    pub host: String,
    pub port: u16,
    pub auth: AuthReference,
}

/// Identity reported by a liveness probe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemoteIdentity {
    pub hostname: String,
    pub os_version: String,
}

/// Single remote facts the transports know how to look up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fact {
    Hostname,
    OsVersion,
    Domain,
    Shares,
    DiskPartitionStyle(u32),
}

impl Fact {
    /// PowerShell that prints the fact on stdout.
    pub fn script(&self) -> String {
        match self {
            Fact::Hostname => "$env:COMPUTERNAME".to_string(),
            Fact::OsVersion => "(Get-CimInstance Win32_OperatingSystem).Caption".to_string(),
            Fact::Domain => "(Get-CimInstance Win32_ComputerSystem).Domain".to_string(),
            Fact::Shares => "Get-SmbShare | Select-Object -ExpandProperty Name".to_string(),
            Fact::DiskPartitionStyle(number) => {
                format!("(Get-Disk -Number {number} -ErrorAction Stop).PartitionStyle")
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),
    #[error("access denied: {0}")]
    AuthDenied(String),
    #[error("{method} is not supported here: {reason}")]
    UnsupportedMethod {
        method: TransportKind,
        reason: String,
    },
    #[error("remote session failed: {0}")]
    Session(String),
    #[error("remote command exited with code {exit_code}: {stderr}")]
    CommandFailed { exit_code: i32, stderr: String },
    #[error("unexpected response: {0}")]
    Protocol(String),
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("agent request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to stage remote script: {0}")]
    Io(#[from] std::io::Error),
}

/// A bound, ready-to-use channel to one server.
#[derive(Debug)]
pub enum TransportClient {
    Agent(AgentTransport),
    WinRm(WinRmTransport),
    Ssh(SshTransport),
    AdminShare(AdminShareTransport),
}

impl TransportClient {
    pub fn kind(&self) -> TransportKind {
        match self {
            TransportClient::Agent(_) => TransportKind::Agent,
            TransportClient::WinRm(_) => TransportKind::WinRm,
            TransportClient::Ssh(_) => TransportKind::Ssh,
            TransportClient::AdminShare(_) => TransportKind::AdminShareExec,
        }
    }

    pub fn descriptor(&self) -> TransportDescriptor {
        match self {
            TransportClient::Agent(t) => t.descriptor(),
            TransportClient::WinRm(t) => t.descriptor(),
            TransportClient::Ssh(t) => t.descriptor(),
            TransportClient::AdminShare(t) => t.descriptor(),
        }
    }

    /// One liveness + identity round trip.
    pub async fn connect(&self) -> Result<RemoteIdentity, TransportError> {
        match self {
            TransportClient::Agent(t) => t.connect().await,
            TransportClient::WinRm(t) => t.connect().await,
            TransportClient::Ssh(t) => t.connect().await,
            TransportClient::AdminShare(t) => t.connect().await,
        }
    }

    /// Run a PowerShell command on the server.
    pub async fn execute(&self, command: &str) -> Result<ExecutionResult, TransportError> {
        match self {
            TransportClient::Agent(t) => t.execute(command).await,
            TransportClient::WinRm(t) => t.execute(command).await,
            TransportClient::Ssh(t) => t.execute(command).await,
            TransportClient::AdminShare(t) => t.execute(command).await,
        }
    }

    pub async fn query_fact(&self, fact: Fact) -> Result<String, TransportError> {
        match self {
            TransportClient::Agent(t) => t.query_fact(fact).await,
            other => {
                let result = other.execute(&fact.script()).await?;
                fact_output(result)
            }
        }
    }

    pub fn as_agent(&self) -> Option<&AgentTransport> {
        match self {
            TransportClient::Agent(t) => Some(t),
            _ => None,
        }
    }
}

pub(crate) fn fact_output(result: ExecutionResult) -> Result<String, TransportError> {
    if result.success {
        Ok(result.stdout.trim().to_string())
    } else {
        Err(TransportError::CommandFailed {
            exit_code: result.exit_code,
            stderr: result.stderr.trim().to_string(),
        })
    }
}

/// Remote PowerShell printing `IDENTITY|<hostname>|<caption> (Build <n>)`.
pub(crate) const IDENTITY_SCRIPT: &str = "$os = Get-CimInstance Win32_OperatingSystem; \
$cs = Get-CimInstance Win32_ComputerSystem; \
Write-Output ('IDENTITY|' + $cs.Name + '|' + $os.Caption + ' (Build ' + $os.BuildNumber + ')')";

pub(crate) fn parse_identity(output: &str) -> Option<RemoteIdentity> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("IDENTITY|"))?;
    let mut parts = line.splitn(3, '|').skip(1);
    Some(RemoteIdentity {
        hostname: parts.next().unwrap_or_default().trim().to_string(),
        os_version: parts.next().unwrap_or_default().trim().to_string(),
    })
}
