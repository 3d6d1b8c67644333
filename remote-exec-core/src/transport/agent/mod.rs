//! Client for the lightweight HTTP control-plane agent.
//!
//! The agent listens on `http://<host>:8765` by default. Every route except
//! `/health` requires the shared secret in the `X-Agent-Token` header; a
//! mismatch is answered with `401 {"error": "..."}` which surfaces here as
//! [`TransportError::AuthDenied`].

pub mod models;

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::process::ExecutionResult;
use crate::transport::{
    fact_output, AuthReference, Fact, RemoteIdentity, TransportDescriptor, TransportError,
    TransportKind,
};

use models::{
    AgentCommandResult, AgentHealth, CreateShareRequest, DiskInfo, DomainInfo, ErrorBody,
    ExecuteRequest, FirewallRuleRequest, InstallRoleRequest, NetworkConfigRequest,
    NetworkConfigResponse, PromoteRequest, RebootRequest, SharesResponse, SystemInfo,
    TestConnectionRequest,
};

pub const DEFAULT_AGENT_PORT: u16 = 8765;
pub const TOKEN_HEADER: &str = "X-Agent-Token";

/// Everything needed to reach one agent. Threaded explicitly; there is no
/// process-wide default token.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub host: String,
    pub port: u16,
    pub token: SecretString,
    /// Budget for the `/health` liveness probe.
    pub probe_timeout: Duration,
    /// Budget for every other request.
    pub request_timeout: Duration,
}

impl AgentConfig {
    pub fn new(host: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_AGENT_PORT,
            token: SecretString::from(token.into()),
            probe_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(300),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct AgentTransport {
    config: AgentConfig,
    base_url: String,
    client: Client,
}

impl AgentTransport {
    pub fn new(config: AgentConfig) -> Result<Self, TransportError> {
        let mut token = HeaderValue::from_str(config.token.expose_secret()).map_err(|_| {
            TransportError::Protocol("agent token is not a valid header value".to_string())
        })?;
        token.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(TOKEN_HEADER, token);

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(config.probe_timeout)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            base_url: config.base_url(),
            config,
            client,
        })
    }

    pub fn descriptor(&self) -> TransportDescriptor {
        TransportDescriptor {
            kind: TransportKind::Agent,
            host: self.config.host.clone(),
            port: self.config.port,
            auth: AuthReference::SharedToken,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Liveness probe, bounded by the short probe timeout.
    pub async fn health(&self) -> Result<AgentHealth, TransportError> {
        let request = self
            .client
            .get(self.url("/health"))
            .timeout(self.config.probe_timeout);
        self.send(request).await
    }

    pub async fn connect(&self) -> Result<RemoteIdentity, TransportError> {
        let health = self.health().await?;
        // The OS caption is best effort, but a rejected token means the agent is unusable.
        let os_version = match self.system_info().await {
            Ok(info) if !info.windows_version.trim().is_empty() => info.windows_version,
            Ok(_) => health.os.clone(),
            Err(err @ TransportError::AuthDenied(_)) => return Err(err),
            Err(err) => {
                debug!(host = %self.config.host, error = %err, "agent system info unavailable");
                health.os.clone()
            }
        };
        Ok(RemoteIdentity {
            hostname: health.hostname,
            os_version,
        })
    }

    pub async fn execute(&self, command: &str) -> Result<ExecutionResult, TransportError> {
        self.execute_command(command, true).await.map(Into::into)
    }

    pub async fn execute_command(
        &self,
        command: &str,
        as_admin: bool,
    ) -> Result<AgentCommandResult, TransportError> {
        let body = ExecuteRequest {
            command: command.to_string(),
            as_admin,
        };
        self.post("/api/execute", &body).await
    }

    pub async fn query_fact(&self, fact: Fact) -> Result<String, TransportError> {
        match fact {
            Fact::Hostname => Ok(self.system_info().await?.hostname),
            Fact::OsVersion => {
                let info = self.system_info().await?;
                Ok(if info.windows_version.trim().is_empty() {
                    info.os
                } else {
                    info.windows_version
                })
            }
            Fact::Domain => Ok(self.system_info().await?.domain),
            Fact::Shares => Ok(self.shares().await?.join("\n")),
            Fact::DiskPartitionStyle(_) => fact_output(self.execute(&fact.script()).await?),
        }
    }

    pub async fn system_info(&self) -> Result<SystemInfo, TransportError> {
        self.get("/api/system").await
    }

    pub async fn domain_info(&self) -> Result<DomainInfo, TransportError> {
        self.get("/api/domain").await
    }

    pub async fn shares(&self) -> Result<Vec<String>, TransportError> {
        let response: SharesResponse = self.get("/api/shares").await?;
        Ok(response.shares)
    }

    pub async fn disks(&self) -> Result<DiskInfo, TransportError> {
        self.get("/api/disks").await
    }

    /// Returns the first per-command result the agent reports.
    pub async fn configure_network(
        &self,
        request: &NetworkConfigRequest,
    ) -> Result<AgentCommandResult, TransportError> {
        let response: NetworkConfigResponse = self.post("/api/network/configure", request).await?;
        response
            .results
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::Protocol("network configure returned no results".into()))
    }

    pub async fn install_role(&self, role_name: &str) -> Result<AgentCommandResult, TransportError> {
        let body = InstallRoleRequest {
            role_name: role_name.to_string(),
        };
        self.post("/api/roles/install", &body).await
    }

    pub async fn promote_domain_controller(
        &self,
        request: &PromoteRequest,
    ) -> Result<AgentCommandResult, TransportError> {
        self.post("/api/domain/promote", request).await
    }

    pub async fn create_share(
        &self,
        request: &CreateShareRequest,
    ) -> Result<AgentCommandResult, TransportError> {
        self.post("/api/shares/create", request).await
    }

    pub async fn configure_firewall(
        &self,
        request: &FirewallRuleRequest,
    ) -> Result<AgentCommandResult, TransportError> {
        self.post("/api/firewall/configure", request).await
    }

    pub async fn reboot(&self, delay_seconds: u32) -> Result<AgentCommandResult, TransportError> {
        self.post("/api/system/reboot", &RebootRequest { delay_seconds })
            .await
    }

    pub async fn test_connection(
        &self,
        target: &str,
        port: u16,
    ) -> Result<AgentCommandResult, TransportError> {
        let body = TestConnectionRequest {
            target: target.to_string(),
            port,
        };
        self.post("/api/network/test", &body).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, TransportError> {
        self.send(self.client.get(self.url(path))).await
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, TransportError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(self.client.post(self.url(path)).json(body)).await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, TransportError> {
        let response = request.send().await?;
        let response = check_status(response).await?;
        Ok(response.json::<T>().await?)
    }
}

async fn check_status(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().path().to_string();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .map(|b| b.error)
        .filter(|e| !e.is_empty())
        .unwrap_or(body);

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(TransportError::AuthDenied(format!(
            "agent rejected token on {url}: {detail}"
        )));
    }
    Err(TransportError::Protocol(format!(
        "agent returned {status} for {url}: {detail}"
    )))
}
