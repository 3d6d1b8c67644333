//! SSH through the system client. Key authentication only.

use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

use crate::credentials::{Credentials, Secret};
use crate::powershell::encode_command;
use crate::process::{find_executable, CommandSpec, ExecutionResult, ProcessExecutor};
use crate::transport::{
    parse_identity, AuthReference, RemoteIdentity, TransportDescriptor, TransportError,
    TransportKind, IDENTITY_SCRIPT,
};

pub const DEFAULT_SSH_PORT: u16 = 22;

#[derive(Debug, Clone)]
pub struct SshOptions {
    pub port: u16,
    /// Explicit client binary; `ssh` on `PATH` otherwise.
    pub client: Option<PathBuf>,
    pub connect_timeout: Duration,
    pub execution_timeout: Duration,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            port: DEFAULT_SSH_PORT,
            client: None,
            connect_timeout: Duration::from_secs(15),
            execution_timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SshTransport {
    host: String,
    username: String,
    key_file: PathBuf,
    client: PathBuf,
    options: SshOptions,
    executor: ProcessExecutor,
}

impl SshTransport {
    /// Fails with [`TransportError::UnsupportedMethod`] for password credentials
    /// and [`TransportError::Unavailable`] when no ssh client is installed.
    pub fn new(
        host: impl Into<String>,
        credentials: &Credentials,
        options: SshOptions,
    ) -> Result<Self, TransportError> {
        let key_file = match &credentials.secret {
            Secret::KeyFile(path) => path.clone(),
            Secret::Password(_) | Secret::Ambient => {
                return Err(TransportError::UnsupportedMethod {
                    method: TransportKind::Ssh,
                    reason: "password authentication is not supported; \
                             use WinRM or configure SSH key authentication"
                        .to_string(),
                })
            }
        };

        let client = match &options.client {
            Some(path) => find_executable(path),
            None => find_executable("ssh"),
        }
        .ok_or_else(|| {
            TransportError::Unavailable(
                "ssh client not found; install OpenSSH client or use WinRM".to_string(),
            )
        })?;

        Ok(Self {
            host: host.into(),
            username: credentials.username.clone(),
            key_file,
            client,
            options,
            executor: ProcessExecutor::new(),
        })
    }

    pub fn descriptor(&self) -> TransportDescriptor {
        TransportDescriptor {
            kind: TransportKind::Ssh,
            host: self.host.clone(),
            port: self.options.port,
            auth: AuthReference::KeyFile {
                username: self.username.clone(),
                path: self.key_file.display().to_string(),
            },
        }
    }

    pub async fn connect(&self) -> Result<RemoteIdentity, TransportError> {
        let result = self
            .executor
            .run(&self.command(IDENTITY_SCRIPT, self.options.connect_timeout))
            .await?;
        if !result.success {
            let detail = result.stderr.trim();
            return Err(TransportError::Session(if detail.is_empty() {
                format!("ssh exited with code {}", result.exit_code)
            } else {
                detail.to_string()
            }));
        }
        parse_identity(&result.stdout).ok_or_else(|| {
            TransportError::Protocol(format!("no identity line in response from {}", self.host))
        })
    }

    pub async fn execute(&self, command: &str) -> Result<ExecutionResult, TransportError> {
        debug!(host = %self.host, "running remote command over ssh");
        Ok(self
            .executor
            .run(&self.command(command, self.options.execution_timeout))
            .await?)
    }

    fn command(&self, script: &str, timeout: Duration) -> CommandSpec {
        let connect_secs = self.options.connect_timeout.as_secs().max(1);
        CommandSpec::new(&self.client)
            .arg("-i")
            .arg(self.key_file.display().to_string())
            .args(["-p".to_string(), self.options.port.to_string()])
            .args(["-o", "BatchMode=yes", "-o", "StrictHostKeyChecking=accept-new"])
            .arg("-o")
            .arg(format!("ConnectTimeout={connect_secs}"))
            .arg(format!("{}@{}", self.username, self.host))
            .args(["powershell", "-NoProfile", "-NonInteractive", "-EncodedCommand"])
            .arg(encode_command(script))
            .timeout(timeout)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn options() -> SshOptions {
        SshOptions {
            client: Some(PathBuf::from("/bin/sh")),
            ..SshOptions::default()
        }
    }

    #[test]
    fn password_credentials_are_unsupported() {
        let err = SshTransport::new("host", &Credentials::password("admin", "pw"), options())
            .unwrap_err();
        match err {
            TransportError::UnsupportedMethod { method, reason } => {
                assert_eq!(method, TransportKind::Ssh);
                assert!(reason.contains("configure SSH key authentication"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_client_is_unavailable() {
        let opts = SshOptions {
            client: Some(PathBuf::from("/nonexistent/ssh-client")),
            ..SshOptions::default()
        };
        let err = SshTransport::new("host", &Credentials::key_file("admin", "/tmp/key"), opts)
            .unwrap_err();
        assert!(matches!(err, TransportError::Unavailable(_)));
    }

    #[test]
    fn command_runs_encoded_powershell_in_batch_mode() {
        let t = SshTransport::new("fs01", &Credentials::key_file("admin", "/tmp/key"), options())
            .expect("transport");
        let spec = t.command("hostname", Duration::from_secs(5));
        assert!(spec.args.contains(&"BatchMode=yes".to_string()));
        assert!(spec.args.contains(&"admin@fs01".to_string()));
        assert_eq!(spec.args.last(), Some(&encode_command("hostname")));
        assert_eq!(spec.timeout, Duration::from_secs(5));
    }
}
