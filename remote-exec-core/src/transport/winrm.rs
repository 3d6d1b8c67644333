//! WinRM sessions driven through the local PowerShell.
//!
//! Each call stages a small wrapper script in a temp file. The wrapper opens a
//! `New-PSSession`, runs the payload with `Invoke-Command` and reports its own
//! outcome on a `__STATUS__|...` line. The payload travels base64 embedded and
//! the password travels in the child environment, so neither is ever quoted
//! into a command line.

use std::io::Write;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::credentials::{Credentials, Secret};
use crate::powershell::{embedded_payload, quote, Interpreter};
use crate::process::{ExecutionResult, ProcessExecutor};
use crate::transport::{
    parse_identity, AuthReference, RemoteIdentity, TransportDescriptor, TransportError,
    TransportKind, IDENTITY_SCRIPT,
};

pub const DEFAULT_HTTP_PORT: u16 = 5985;
pub const DEFAULT_HTTPS_PORT: u16 = 5986;
/// Environment variable carrying the password into the wrapper process.
pub const SECRET_ENV: &str = "CUTOVER_REMOTE_SECRET";

const STATUS_MARKER: &str = "__STATUS__|";
const EXIT_MARKER: &str = "__EXIT__|";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WinRmOptions {
    pub port: u16,
    pub use_https: bool,
    /// Skip CA and CN validation on HTTPS listeners with self-signed certificates.
    pub skip_certificate_checks: bool,
    #[serde(with = "secs")]
    pub connect_timeout: Duration,
    #[serde(with = "secs")]
    pub execution_timeout: Duration,
}

impl Default for WinRmOptions {
    fn default() -> Self {
        Self {
            port: DEFAULT_HTTP_PORT,
            use_https: false,
            skip_certificate_checks: false,
            connect_timeout: Duration::from_secs(30),
            execution_timeout: Duration::from_secs(300),
        }
    }
}

impl WinRmOptions {
    pub fn https() -> Self {
        Self {
            port: DEFAULT_HTTPS_PORT,
            use_https: true,
            skip_certificate_checks: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct WinRmTransport {
    host: String,
    credentials: Credentials,
    options: WinRmOptions,
    interpreter: Interpreter,
    executor: ProcessExecutor,
}

impl WinRmTransport {
    pub fn new(
        host: impl Into<String>,
        credentials: Credentials,
        options: WinRmOptions,
        interpreter: Interpreter,
    ) -> Result<Self, TransportError> {
        if let Secret::KeyFile(_) = credentials.secret {
            return Err(TransportError::UnsupportedMethod {
                method: TransportKind::WinRm,
                reason: "key-file authentication is only available over ssh".to_string(),
            });
        }
        Ok(Self {
            host: host.into(),
            credentials,
            options,
            interpreter,
            executor: ProcessExecutor::new(),
        })
    }

    pub fn descriptor(&self) -> TransportDescriptor {
        let username = self.credentials.qualified_username();
        TransportDescriptor {
            kind: TransportKind::WinRm,
            host: self.host.clone(),
            port: self.options.port,
            auth: if self.credentials.has_password() {
                AuthReference::Password { username }
            } else {
                AuthReference::Ambient { username }
            },
        }
    }

    pub async fn connect(&self) -> Result<RemoteIdentity, TransportError> {
        let result = self
            .invoke(IDENTITY_SCRIPT, self.options.connect_timeout)
            .await?;
        if !result.success {
            return Err(TransportError::Session(first_non_empty(&[
                &result.stderr,
                &result.stdout,
            ])));
        }
        parse_identity(&result.stdout).ok_or_else(|| {
            TransportError::Protocol(format!(
                "no identity line in response from {}",
                self.host
            ))
        })
    }

    pub async fn execute(&self, command: &str) -> Result<ExecutionResult, TransportError> {
        self.invoke(command, self.options.execution_timeout).await
    }

    async fn invoke(&self, payload: &str, timeout: Duration) -> Result<ExecutionResult, TransportError> {
        let mut staged = tempfile::Builder::new()
            .prefix("cutover-")
            .suffix(".ps1")
            .tempfile()?;
        staged.write_all(self.wrapper_script(payload).as_bytes())?;
        staged.flush()?;

        let mut spec = self.interpreter.script_command(staged.path(), &[], timeout);
        if let Some(password) = self.credentials.expose_password() {
            spec = spec.env(SECRET_ENV, password);
        }
        debug!(host = %self.host, port = self.options.port, "invoking winrm session");
        let result = self.executor.run(&spec).await?;
        // `staged` lives until here so the interpreter can read it.
        drop(staged);
        parse_wrapper_output(result)
    }

    fn wrapper_script(&self, payload: &str) -> String {
        let mut script = String::from("$ErrorActionPreference = 'Stop'\ntry {\n");
        script.push_str(&format!(
            "    $opts = @{{ ComputerName = {}; Port = {} }}\n",
            quote(&self.host),
            self.options.port
        ));
        if self.credentials.has_password() {
            script.push_str(&format!(
                "    $pw = ConvertTo-SecureString $env:{SECRET_ENV} -AsPlainText -Force\n    \
                 $opts.Credential = New-Object System.Management.Automation.PSCredential({}, $pw)\n",
                quote(&self.credentials.qualified_username())
            ));
        }
        if self.options.use_https {
            script.push_str("    $opts.UseSSL = $true\n");
            if self.options.skip_certificate_checks {
                script.push_str("    $opts.SessionOption = New-PSSessionOption -SkipCACheck -SkipCNCheck\n");
            }
        }
        script.push_str("    $session = New-PSSession @opts\n    try {\n");
        script.push_str(&format!(
            "        Invoke-Command -Session $session -ScriptBlock {{ param($script) \
             $global:LASTEXITCODE = 0; \
             try {{ Invoke-Expression $script; '{EXIT_MARKER}' + [int]$LASTEXITCODE }} \
             catch {{ Write-Error $_; '{EXIT_MARKER}1' }} }} -ArgumentList ({})\n",
            embedded_payload(payload)
        ));
        script.push_str("    } finally {\n        Remove-PSSession $session\n    }\n");
        script.push_str(&format!("    Write-Output '{STATUS_MARKER}OK'\n"));
        script.push_str("} catch {\n");
        script.push_str(&format!(
            "    Write-Output ('{STATUS_MARKER}ERROR|' + $_.Exception.Message)\n    exit 1\n}}\n"
        ));
        script
    }
}

/// Split the wrapper's markers from the payload output.
fn parse_wrapper_output(result: ExecutionResult) -> Result<ExecutionResult, TransportError> {
    let mut status = None;
    let mut exit_code = 0;
    let mut lines = Vec::new();
    for line in result.stdout.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix(STATUS_MARKER) {
            status = Some(rest.to_string());
        } else if let Some(code) = trimmed.strip_prefix(EXIT_MARKER) {
            exit_code = code.trim().parse().unwrap_or(1);
        } else {
            lines.push(line);
        }
    }

    match status.as_deref() {
        Some("OK") => Ok(ExecutionResult::new(exit_code, lines.join("\n"), result.stderr)),
        Some(other) => {
            let message = other.strip_prefix("ERROR|").unwrap_or(other).trim();
            Err(TransportError::Session(first_non_empty(&[message, &result.stderr])))
        }
        None if !result.success => Err(TransportError::Session(first_non_empty(&[
            &result.stderr,
            &result.stdout,
        ]))),
        None => Err(TransportError::Protocol(
            "remote session wrapper produced no status line".to_string(),
        )),
    }
}

fn first_non_empty(candidates: &[&str]) -> String {
    candidates
        .iter()
        .map(|text| text.trim())
        .find(|text| !text.is_empty())
        .unwrap_or("unexpected response from server")
        .to_string()
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
