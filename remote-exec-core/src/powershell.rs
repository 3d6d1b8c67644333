//! Helpers for driving a PowerShell-compatible interpreter.

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::process::{find_executable, CommandSpec};

/// How scripts and inline commands are handed to the local interpreter.
///
/// The default is Windows PowerShell on Windows and `pwsh` elsewhere, invoked as
/// `<program> -NoProfile -ExecutionPolicy Bypass -File <script> <args...>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Interpreter {
    pub program: PathBuf,
    pub flags: Vec<String>,
    /// Flag placed before the script path. Empty means the path is passed bare.
    pub file_flag: String,
    /// Flag placed before an inline command string.
    pub command_flag: String,
}

impl Default for Interpreter {
    fn default() -> Self {
        let program = if cfg!(windows) {
            "powershell.exe"
        } else {
            "pwsh"
        };
        Self {
            program: PathBuf::from(program),
            flags: vec![
                "-NoProfile".to_string(),
                "-ExecutionPolicy".to_string(),
                "Bypass".to_string(),
            ],
            file_flag: "-File".to_string(),
            command_flag: "-Command".to_string(),
        }
    }
}

impl Interpreter {
    /// Resolve the interpreter binary, or `None` when it is not installed.
    pub fn locate(&self) -> Option<PathBuf> {
        find_executable(&self.program)
    }

    /// Arguments for running `script` with `args`.
    pub fn script_args(&self, script: &Path, args: &[String]) -> Vec<String> {
        let mut out = self.flags.clone();
        if !self.file_flag.is_empty() {
            out.push(self.file_flag.clone());
        }
        out.push(script.display().to_string());
        out.extend(args.iter().cloned());
        out
    }

    pub fn script_command(&self, script: &Path, args: &[String], timeout: Duration) -> CommandSpec {
        CommandSpec::new(&self.program)
            .args(self.script_args(script, args))
            .timeout(timeout)
    }

    pub fn inline_command(&self, command: &str, timeout: Duration) -> CommandSpec {
        CommandSpec::new(&self.program)
            .args(self.flags.iter().cloned())
            .arg(self.command_flag.clone())
            .arg(command)
            .timeout(timeout)
    }
}

/// Quote a value as a PowerShell single-quoted literal.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Encode a script for `-EncodedCommand` (base64 of UTF-16LE).
pub fn encode_command(script: &str) -> String {
    let bytes: Vec<u8> = script.encode_utf16().flat_map(u16::to_le_bytes).collect();
    STANDARD.encode(bytes)
}

/// An expression that decodes `payload` at runtime, avoiding any quoting of the payload itself.
pub fn embedded_payload(payload: &str) -> String {
    format!(
        "[System.Text.Encoding]::UTF8.GetString([System.Convert]::FromBase64String('{}'))",
        STANDARD.encode(payload.as_bytes())
    )
}
