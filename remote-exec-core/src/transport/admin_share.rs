//! Remote execution over the admin share (PsExec compatible helper).

use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

use crate::credentials::Credentials;
use crate::powershell::encode_command;
use crate::process::{find_executable_with, CommandSpec, ExecutionResult, ProcessExecutor};
use crate::transport::{
    AuthReference, RemoteIdentity, TransportDescriptor, TransportError, TransportKind,
};

/// The helper reaches the target over SMB.
pub const ADMIN_SHARE_PORT: u16 = 445;

const ENABLE_REMOTING: &str =
    "Enable-PSRemoting -Force; Set-Item WSMan:\\localhost\\Client\\TrustedHosts -Value '*' -Force";

#[derive(Debug, Clone)]
pub struct AdminShareOptions {
    /// Explicit helper binary. When unset the usual install locations and `PATH` are searched.
    pub tool: Option<PathBuf>,
    pub connect_timeout: Duration,
    pub execution_timeout: Duration,
    pub bootstrap_timeout: Duration,
}

impl Default for AdminShareOptions {
    fn default() -> Self {
        Self {
            tool: None,
            connect_timeout: Duration::from_secs(30),
            execution_timeout: Duration::from_secs(300),
            bootstrap_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdminShareTransport {
    host: String,
    credentials: Credentials,
    tool: PathBuf,
    options: AdminShareOptions,
    executor: ProcessExecutor,
}

impl AdminShareTransport {
    pub fn new(
        host: impl Into<String>,
        credentials: Credentials,
        options: AdminShareOptions,
    ) -> Result<Self, TransportError> {
        let tool = locate_tool(options.tool.as_ref()).ok_or_else(|| {
            TransportError::Unavailable(
                "admin-share executor (PsExec) not found; download it from Sysinternals \
                 or enable WinRM manually"
                    .to_string(),
            )
        })?;
        Ok(Self {
            host: host.into(),
            credentials,
            tool,
            options,
            executor: ProcessExecutor::new(),
        })
    }

    pub fn descriptor(&self) -> TransportDescriptor {
        let username = self.credentials.qualified_username();
        TransportDescriptor {
            kind: TransportKind::AdminShareExec,
            host: self.host.clone(),
            port: ADMIN_SHARE_PORT,
            auth: if self.credentials.has_password() {
                AuthReference::Password { username }
            } else {
                AuthReference::Ambient { username }
            },
        }
    }

    pub async fn connect(&self) -> Result<RemoteIdentity, TransportError> {
        let spec = self
            .command(false, ["hostname"])
            .timeout(self.options.connect_timeout);
        let result = self.executor.run(&spec).await?;
        let hostname = result
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .unwrap_or_default()
            .to_string();

        if !result.success || hostname.is_empty() {
            let detail = result.stderr.trim();
            return Err(TransportError::Session(if detail.is_empty() {
                "admin-share connection failed; check that ADMIN$ is reachable and the \
                 firewall allows it"
                    .to_string()
            } else {
                detail.to_string()
            }));
        }
        Ok(RemoteIdentity {
            hostname,
            os_version: String::new(),
        })
    }

    pub async fn execute(&self, command: &str) -> Result<ExecutionResult, TransportError> {
        debug!(host = %self.host, "running remote command over admin share");
        let encoded = encode_command(command);
        let spec = self
            .command(
                false,
                [
                    "powershell.exe",
                    "-NoProfile",
                    "-NonInteractive",
                    "-EncodedCommand",
                    encoded.as_str(),
                ],
            )
            .timeout(self.options.execution_timeout);
        Ok(self.executor.run(&spec).await?)
    }

    /// Turn on the WinRM listener and trust all hosts, running as SYSTEM.
    pub async fn enable_remote_management(&self) -> Result<ExecutionResult, TransportError> {
        let spec = self
            .command(true, ["powershell.exe", "-NoProfile", "-Command", ENABLE_REMOTING])
            .timeout(self.options.bootstrap_timeout);
        Ok(self.executor.run(&spec).await?)
    }

    fn command<'a>(&self, as_system: bool, remote: impl IntoIterator<Item = &'a str>) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.tool).arg(format!("\\\\{}", self.host));
        if let Some(password) = self.credentials.expose_password() {
            spec = spec
                .arg("-u")
                .arg(self.credentials.qualified_username())
                .arg("-p")
                .arg(password);
        }
        spec = spec.args(["-accepteula", "-nobanner"]);
        if as_system {
            spec = spec.arg("-s");
        }
        spec.args(remote)
    }
}

fn locate_tool(explicit: Option<&PathBuf>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return find_executable_with(path, &[]);
    }
    let mut candidates = Vec::new();
    if let Some(root) = std::env::var_os("SystemRoot") {
        candidates.push(PathBuf::from(root).join("System32").join("PsExec.exe"));
    }
    for var in ["ProgramFiles", "ProgramFiles(x86)"] {
        if let Some(dir) = std::env::var_os(var) {
            candidates.push(PathBuf::from(dir).join("PSTools").join("PsExec.exe"));
        }
    }
    find_executable_with("PsExec.exe", &candidates).or_else(|| find_executable_with("psexec", &[]))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn transport(credentials: Credentials) -> AdminShareTransport {
        let options = AdminShareOptions {
            tool: Some(PathBuf::from("/bin/sh")),
            ..AdminShareOptions::default()
        };
        AdminShareTransport::new("fs01", credentials, options).expect("transport")
    }

    #[test]
    fn missing_tool_is_unavailable() {
        let options = AdminShareOptions {
            tool: Some(PathBuf::from("/nonexistent/PsExec.exe")),
            ..AdminShareOptions::default()
        };
        let err = AdminShareTransport::new("fs01", Credentials::ambient("admin"), options)
            .unwrap_err();
        assert!(matches!(err, TransportError::Unavailable(ref m) if m.contains("PsExec")));
    }

    #[test]
    fn password_credentials_are_passed_qualified() {
        let t = transport(Credentials::password("admin", "pw").with_domain("OLD"));
        let spec = t.command(false, ["hostname"]);
        assert_eq!(
            spec.args,
            vec!["\\\\fs01", "-u", "OLD\\admin", "-p", "pw", "-accepteula", "-nobanner", "hostname"]
        );
    }

    #[test]
    fn bootstrap_runs_as_system() {
        let t = transport(Credentials::ambient("admin"));
        let spec = t.command(true, ["powershell.exe", "-Command", ENABLE_REMOTING]);
        let system = spec.args.iter().position(|a| a == "-s").expect("-s flag");
        let program = spec.args.iter().position(|a| a == "powershell.exe").expect("program");
        assert!(system < program);
        assert!(spec.args.last().is_some_and(|a| a.contains("Enable-PSRemoting -Force")));
    }
}
