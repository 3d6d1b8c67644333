//! Choosing and opening the channel to a server.
//!
//! When an agent token is configured the agent is always probed first. Its
//! failure is never an error: the negotiation falls through to the one
//! traditional method the operator selected. There is no cascade between
//! traditional methods.

use std::time::Duration;

use remote_exec_core::transport::{
    AdminShareOptions, AdminShareTransport, AgentConfig, AgentTransport, SshOptions,
    SshTransport, WinRmOptions, WinRmTransport,
};
use remote_exec_core::{Credentials, Interpreter, TransportClient, TransportError, TransportKind};
use secrecy::SecretString;
use tracing::{debug, info};

use crate::config::MigrationConfig;
use crate::connection::ConnectionResult;
use crate::error::FailureKind;
use crate::hint::{derive_hint, hint_for_error, AGENT_TOKEN_HINT, CREDENTIALS_HINT};

/// Where and how to reach agents; the host is supplied per connection.
#[derive(Debug, Clone)]
pub struct AgentEndpoint {
    pub port: u16,
    pub token: SecretString,
    pub probe_timeout: Duration,
    pub request_timeout: Duration,
}

impl AgentEndpoint {
    fn config_for(&self, host: &str) -> AgentConfig {
        AgentConfig {
            host: host.to_string(),
            port: self.port,
            token: self.token.clone(),
            probe_timeout: self.probe_timeout,
            request_timeout: self.request_timeout,
        }
    }
}

/// A ready channel and the result that describes it.
#[derive(Debug)]
pub struct Session {
    pub client: TransportClient,
    pub result: ConnectionResult,
}

#[derive(Debug)]
pub enum AgentProbe {
    Connected(Session),
    AgentUnavailable(String),
}

#[derive(Debug)]
pub enum Negotiated {
    Connected(Session),
    Failed(ConnectionResult),
}

impl Negotiated {
    pub fn result(&self) -> &ConnectionResult {
        match self {
            Negotiated::Connected(session) => &session.result,
            Negotiated::Failed(result) => result,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Negotiated::Connected(_))
    }

    pub fn into_session(self) -> Result<Session, ConnectionResult> {
        match self {
            Negotiated::Connected(session) => Ok(session),
            Negotiated::Failed(result) => Err(result),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionNegotiator {
    agent: Option<AgentEndpoint>,
    interpreter: Interpreter,
    winrm: WinRmOptions,
    ssh: SshOptions,
    admin_share: AdminShareOptions,
}

impl ConnectionNegotiator {
    /// Traditional methods only, with default options.
    pub fn new(interpreter: Interpreter) -> Self {
        Self {
            agent: None,
            interpreter,
            winrm: WinRmOptions::default(),
            ssh: SshOptions::default(),
            admin_share: AdminShareOptions::default(),
        }
    }

    pub fn from_config(config: &MigrationConfig) -> Self {
        let timeouts = &config.timeouts;
        let mut negotiator = Self::new(config.interpreter.clone())
            .with_winrm(WinRmOptions {
                connect_timeout: timeouts.connect(),
                execution_timeout: timeouts.execute(),
                ..WinRmOptions::default()
            })
            .with_ssh(SshOptions {
                connect_timeout: timeouts.connect(),
                execution_timeout: timeouts.execute(),
                ..SshOptions::default()
            })
            .with_admin_share(AdminShareOptions {
                connect_timeout: timeouts.connect(),
                execution_timeout: timeouts.execute(),
                ..AdminShareOptions::default()
            });

        if config.agent.enabled {
            if let Some(token) = config.agent_token() {
                negotiator = negotiator.with_agent(AgentEndpoint {
                    port: config.agent.port,
                    token,
                    probe_timeout: Duration::from_secs(config.agent.probe_timeout_secs),
                    request_timeout: Duration::from_secs(config.agent.request_timeout_secs),
                });
            }
        }
        negotiator
    }

    pub fn with_agent(mut self, endpoint: AgentEndpoint) -> Self {
        self.agent = Some(endpoint);
        self
    }

    pub fn with_winrm(mut self, options: WinRmOptions) -> Self {
        self.winrm = options;
        self
    }

    pub fn with_ssh(mut self, options: SshOptions) -> Self {
        self.ssh = options;
        self
    }

    pub fn with_admin_share(mut self, options: AdminShareOptions) -> Self {
        self.admin_share = options;
        self
    }

    pub fn agent_configured(&self) -> bool {
        self.agent.is_some()
    }

    /// Probe the agent on `host`. Failures are returned as values, never raised.
    pub async fn probe_agent(&self, host: &str) -> AgentProbe {
        let Some(endpoint) = &self.agent else {
            return AgentProbe::AgentUnavailable("no agent token configured".to_string());
        };
        let transport = match AgentTransport::new(endpoint.config_for(host)) {
            Ok(transport) => transport,
            Err(err) => return AgentProbe::AgentUnavailable(err.to_string()),
        };
        match transport.connect().await {
            Ok(identity) => AgentProbe::Connected(Session {
                result: ConnectionResult::connected(TransportKind::Agent, &identity),
                client: TransportClient::Agent(transport),
            }),
            Err(err) => AgentProbe::AgentUnavailable(err.to_string()),
        }
    }

    /// Build the client for one traditional method without touching the network.
    pub fn open(
        &self,
        host: &str,
        credentials: &Credentials,
        method: TransportKind,
    ) -> Result<TransportClient, TransportError> {
        match method {
            TransportKind::WinRm => WinRmTransport::new(
                host,
                credentials.clone(),
                self.winrm.clone(),
                self.interpreter.clone(),
            )
            .map(TransportClient::WinRm),
            TransportKind::Ssh => {
                SshTransport::new(host, credentials, self.ssh.clone()).map(TransportClient::Ssh)
            }
            TransportKind::AdminShareExec => {
                AdminShareTransport::new(host, credentials.clone(), self.admin_share.clone())
                    .map(TransportClient::AdminShare)
            }
            TransportKind::Agent => Err(TransportError::UnsupportedMethod {
                method,
                reason: "the agent is reached through probing, not opened directly".to_string(),
            }),
        }
    }

    pub async fn connect(
        &self,
        host: &str,
        credentials: &Credentials,
        preferred: TransportKind,
    ) -> Negotiated {
        if self.agent.is_some() {
            match self.probe_agent(host).await {
                AgentProbe::Connected(session) => {
                    info!(host, "connected through agent");
                    return Negotiated::Connected(session);
                }
                AgentProbe::AgentUnavailable(reason) => {
                    debug!(host, %reason, "agent unavailable");
                    if preferred == TransportKind::Agent {
                        return Negotiated::Failed(
                            ConnectionResult::failure(
                                format!("agent on {host} unavailable: {reason}"),
                                derive_hint(&reason),
                                FailureKind::TransportUnavailable,
                            )
                            .with_method(TransportKind::Agent),
                        );
                    }
                }
            }
        } else if preferred == TransportKind::Agent {
            return Negotiated::Failed(
                ConnectionResult::failure(
                    format!("agent requested for {host} but no agent token is configured"),
                    AGENT_TOKEN_HINT,
                    FailureKind::UnsupportedMethod,
                )
                .with_method(TransportKind::Agent),
            );
        }

        let client = match self.open(host, credentials, preferred) {
            Ok(client) => client,
            Err(err) => return Negotiated::Failed(failed(host, preferred, &err)),
        };
        match client.connect().await {
            Ok(identity) => {
                info!(host, method = %preferred, remote = %identity.hostname, "connected");
                Negotiated::Connected(Session {
                    result: ConnectionResult::connected(preferred, &identity),
                    client,
                })
            }
            Err(err) => Negotiated::Failed(failed(host, preferred, &err)),
        }
    }

    /// Turn on WinRM on `host` through a method that does not need it.
    pub async fn enable_remote_management(
        &self,
        host: &str,
        credentials: &Credentials,
        via: TransportKind,
    ) -> ConnectionResult {
        if via != TransportKind::AdminShareExec {
            return ConnectionResult::failure(
                format!("enabling WinRM via {via} is not supported"),
                "use the admin-share executor or run Enable-PSRemoting -Force on the server",
                FailureKind::UnsupportedMethod,
            )
            .with_method(via);
        }

        let transport =
            match AdminShareTransport::new(host, credentials.clone(), self.admin_share.clone()) {
                Ok(transport) => transport,
                Err(err) => return failed(host, via, &err),
            };
        match transport.enable_remote_management().await {
            Ok(result) if result.success => {
                info!(host, "remote management enabled");
                ConnectionResult::success(format!("WinRM enabled on {host} via admin share"))
                    .with_method(via)
            }
            Ok(result) => ConnectionResult::failure(
                format!(
                    "failed to enable WinRM on {host} (exit code {}): {}",
                    result.exit_code,
                    result.stderr.trim()
                ),
                CREDENTIALS_HINT,
                FailureKind::NonZeroExit,
            )
            .with_method(via),
            Err(err) => failed(host, via, &err),
        }
    }
}

/// Negotiate with both hosts concurrently.
pub async fn check_both(
    negotiator: &ConnectionNegotiator,
    source: (&str, &Credentials),
    target: (&str, &Credentials),
    preferred: TransportKind,
) -> (Negotiated, Negotiated) {
    tokio::join!(
        negotiator.connect(source.0, source.1, preferred),
        negotiator.connect(target.0, target.1, preferred)
    )
}

fn failed(host: &str, method: TransportKind, err: &TransportError) -> ConnectionResult {
    ConnectionResult::failure(
        format!("{method} connection to {host} failed: {err}"),
        hint_for_error(method, err),
        FailureKind::from(err),
    )
    .with_method(method)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn agent_requested_without_token_fails_with_hint() {
        let negotiator = ConnectionNegotiator::new(Interpreter::default());
        let negotiated = negotiator
            .connect("dc02", &Credentials::ambient("admin"), TransportKind::Agent)
            .await;
        let result = negotiated.result();
        assert!(!result.success);
        assert_eq!(result.hint, AGENT_TOKEN_HINT);
        assert_eq!(result.failure, Some(FailureKind::UnsupportedMethod));
    }

    #[tokio::test]
    async fn ssh_with_password_is_unsupported() {
        let negotiator = ConnectionNegotiator::new(Interpreter::default());
        let negotiated = negotiator
            .connect("dc02", &Credentials::password("admin", "pw"), TransportKind::Ssh)
            .await;
        let result = negotiated.result();
        assert!(!result.success);
        assert_eq!(result.failure, Some(FailureKind::UnsupportedMethod));
        assert_eq!(result.hint, crate::hint::SSH_KEY_HINT);
    }

    #[tokio::test]
    async fn bootstrap_over_ssh_is_refused() {
        let negotiator = ConnectionNegotiator::new(Interpreter::default());
        let result = negotiator
            .enable_remote_management("dc02", &Credentials::ambient("admin"), TransportKind::Ssh)
            .await;
        assert!(!result.success);
        assert!(!result.hint.is_empty());
    }
}
