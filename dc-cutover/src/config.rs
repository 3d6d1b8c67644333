//! `cutover.toml` loading.
//!
//! Every section is optional. Secrets never need to live in the file:
//! passwords are read from environment variables named in `[hosts]` and the
//! agent token may come from `CUTOVER_AGENT_TOKEN` instead of `[agent].token`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use remote_exec_core::discovery::ScanOptions;
use remote_exec_core::transport::agent::DEFAULT_AGENT_PORT;
use remote_exec_core::{Credentials, Interpreter, TransportKind};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_CONFIG_FILE: &str = "cutover.toml";
pub const AGENT_TOKEN_ENV: &str = "CUTOVER_AGENT_TOKEN";

/// Errors returned when loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    /// The file parsed but a value is unusable.
    #[error("invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub domains: DomainSettings,
    pub hosts: HostSettings,
    pub mode: ModeSettings,
    pub files: FileSettings,
    pub agent: AgentSettings,
    pub interpreter: Interpreter,
    pub timeouts: TimeoutSettings,
    pub discovery: ScanOptions,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DomainSettings {
    pub source: String,
    /// Empty in same-domain mode.
    pub target: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    pub source_dc: String,
    pub target_dc: String,
    pub source_file_server: String,
    pub destination_file_server: String,
    pub username: String,
    /// SSH private key. When set it takes precedence over passwords.
    pub key_file: Option<PathBuf>,
    /// Traditional method used when no agent answers.
    pub method: TransportKind,
    pub source_password_env: String,
    pub target_password_env: String,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            source_dc: String::new(),
            target_dc: String::new(),
            source_file_server: String::new(),
            destination_file_server: String::new(),
            username: "Administrator".to_string(),
            key_file: None,
            method: TransportKind::WinRm,
            source_password_env: "CUTOVER_SOURCE_PASSWORD".to_string(),
            target_password_env: "CUTOVER_TARGET_PASSWORD".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModeSettings {
    /// Promote a new controller in the existing domain instead of migrating to a new one.
    pub same_domain: bool,
    pub copy_files: bool,
    /// Also plan the final delete-mirroring copy pass.
    pub cutover_pass: bool,
    pub namespace: bool,
    pub replication: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileSettings {
    /// Holds `scripts/` and `scripts-b/`.
    pub scripts_root: PathBuf,
    /// Share map consumed by the copy steps. Defaults to `<scripts_root>/samples/maps.csv`.
    pub maps_csv: Option<PathBuf>,
    pub destination_root: String,
    pub namespace_folder: String,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            scripts_root: PathBuf::from("cutover-kit"),
            maps_csv: None,
            destination_root: "E:\\Shares".to_string(),
            namespace_folder: "Files".to_string(),
        }
    }
}

impl FileSettings {
    pub fn scripts_dir(&self) -> PathBuf {
        self.scripts_root.join("scripts")
    }

    pub fn cross_domain_dir(&self) -> PathBuf {
        self.scripts_root.join("scripts-b")
    }

    pub fn maps_csv(&self) -> PathBuf {
        self.maps_csv
            .clone()
            .unwrap_or_else(|| self.scripts_root.join("samples").join("maps.csv"))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub enabled: bool,
    pub port: u16,
    #[serde(deserialize_with = "optional_secret")]
    pub token: Option<SecretString>,
    pub probe_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            port: DEFAULT_AGENT_PORT,
            token: None,
            probe_timeout_secs: 3,
            request_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub step_secs: u64,
    pub connect_secs: u64,
    pub execute_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            step_secs: 3600,
            connect_secs: 30,
            execute_secs: 300,
        }
    }
}

impl TimeoutSettings {
    pub fn step(&self) -> Duration {
        Duration::from_secs(self.step_secs)
    }

    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn execute(&self) -> Duration {
        Duration::from_secs(self.execute_secs)
    }
}

/// Which side of the migration a host belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostRole {
    Source,
    Target,
}

impl MigrationConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&raw, path.display().to_string())
    }

    /// Like [`MigrationConfig::load`], but a missing file yields defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!(path = %path.display(), "config file not found; using defaults");
            return Ok(Self::default());
        }
        let config = Self::load(path)?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn parse(raw: &str, origin: String) -> Result<Self, ConfigError> {
        let config: MigrationConfig = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin,
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeouts.step_secs == 0 {
            return Err(ConfigError::Invalid(
                "timeouts.step_secs must be greater than zero".to_string(),
            ));
        }
        if self.discovery.max_in_flight == 0 {
            return Err(ConfigError::Invalid(
                "discovery.max_in_flight must be greater than zero".to_string(),
            ));
        }
        if self.mode.cutover_pass && !self.mode.copy_files {
            return Err(ConfigError::Invalid(
                "mode.cutover_pass requires mode.copy_files".to_string(),
            ));
        }
        Ok(())
    }

    /// Domain a role's administrative account belongs to.
    pub fn domain_for(&self, role: HostRole) -> &str {
        match role {
            HostRole::Source => &self.domains.source,
            HostRole::Target if self.domains.target.trim().is_empty() => &self.domains.source,
            HostRole::Target => &self.domains.target,
        }
    }

    /// Key file first, then the role's password variable, then the ambient identity.
    pub fn credentials(&self, role: HostRole) -> Credentials {
        let username = self.hosts.username.clone();
        let credentials = if let Some(key) = &self.hosts.key_file {
            Credentials::key_file(username, key.clone())
        } else {
            let env = match role {
                HostRole::Source => &self.hosts.source_password_env,
                HostRole::Target => &self.hosts.target_password_env,
            };
            match std::env::var(env) {
                Ok(password) if !password.is_empty() => Credentials::password(username, password),
                _ => Credentials::ambient(username),
            }
        };
        credentials.with_domain(self.domain_for(role))
    }

    /// The agent token from the file, falling back to the environment.
    pub fn agent_token(&self) -> Option<SecretString> {
        self.agent.token.clone().or_else(|| {
            std::env::var(AGENT_TOKEN_ENV)
                .ok()
                .filter(|token| !token.trim().is_empty())
                .map(SecretString::from)
        })
    }
}

fn optional_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .filter(|token| !token.trim().is_empty())
        .map(SecretString::from))
}
