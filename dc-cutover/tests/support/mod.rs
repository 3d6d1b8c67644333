//! In-process fake of the server agent.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use dc_cutover::negotiate::AgentEndpoint;
use remote_exec_core::transport::{AgentConfig, AgentTransport};
use remote_exec_core::{Interpreter, TransportClient};
use secrecy::SecretString;
use serde_json::{json, Value};
use tokio::net::TcpListener;

pub const TOKEN: &str = "test-token";

#[derive(Debug, Default)]
pub struct AgentState {
    /// Firewall rules by display name, in creation order.
    pub rules: Vec<String>,
    /// Every command received on `/api/execute`.
    pub commands: Vec<String>,
    pub partition_style: String,
    pub failing_roles: Vec<String>,
    pub installed_roles: Vec<String>,
}

pub type Shared = Arc<Mutex<AgentState>>;

pub fn state(partition_style: &str) -> Shared {
    Arc::new(Mutex::new(AgentState {
        partition_style: partition_style.to_string(),
        ..AgentState::default()
    }))
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("X-Agent-Token").and_then(|v| v.to_str().ok()) == Some(TOKEN)
}

fn denied() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Invalid token" }))).into_response()
}

fn ok(output: &str) -> Response {
    Json(json!({ "success": true, "output": output, "error": "", "exitCode": 0 })).into_response()
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": "1.0.0",
        "hostname": "DC02",
        "os": "Microsoft Windows NT 10.0.20348.0",
        "timestamp": "2026-01-01T00:00:00Z"
    }))
}

async fn system(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return denied();
    }
    Json(json!({
        "hostname": "DC02",
        "os": "Microsoft Windows NT 10.0.20348.0",
        "domain": "new.corp",
        "windowsVersion": "Windows Server 2022 Standard"
    }))
    .into_response()
}

fn display_name(line: &str, prefix: &str) -> Option<String> {
    let rest = line.trim().strip_prefix(prefix)?.strip_prefix(" -DisplayName '")?;
    rest.split('\'').next().map(str::to_string)
}

async fn execute(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return denied();
    }
    let command = body["command"].as_str().unwrap_or_default().to_string();
    let mut state = state.lock().expect("state");
    state.commands.push(command.clone());

    if command.trim_start().starts_with("(Get-Disk") {
        let style = state.partition_style.clone();
        return ok(&format!("{style}\r\n"));
    }
    if command.contains("New-NetFirewallRule") {
        for line in command.lines() {
            if let Some(name) = display_name(line, "Remove-NetFirewallRule") {
                state.rules.retain(|rule| *rule != name);
            } else if let Some(name) = display_name(line, "New-NetFirewallRule") {
                state.rules.push(name);
            }
        }
        return ok("OUTCOME|ok|firewall: inbound rules applied");
    }
    if command.contains("Initialize-Disk") {
        return ok("OUTCOME|ok|disk: disk prepared");
    }
    if command.contains("New-NetIPAddress") {
        return ok("OUTCOME|ok|network: Ethernet configured");
    }
    ok("")
}

async fn install_role(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return denied();
    }
    let role = body["roleName"].as_str().unwrap_or_default().to_string();
    let mut state = state.lock().expect("state");
    if state.failing_roles.contains(&role) {
        return Json(json!({
            "success": false,
            "output": "",
            "error": format!("{role} is not available"),
            "exitCode": 1
        }))
        .into_response();
    }
    state.installed_roles.push(role);
    ok("Success")
}

pub async fn spawn_agent(state: Shared) -> u16 {
    let app = Router::new()
        .route("/health", get(health))
        .route("/api/system", get(system))
        .route("/api/execute", post(execute))
        .route("/api/roles/install", post(install_role))
        .with_state(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    port
}

pub fn agent_client(port: u16) -> TransportClient {
    let mut config = AgentConfig::new("127.0.0.1", TOKEN);
    config.port = port;
    TransportClient::Agent(AgentTransport::new(config).expect("client"))
}

pub fn endpoint(port: u16) -> AgentEndpoint {
    AgentEndpoint {
        port,
        token: SecretString::from(TOKEN.to_string()),
        probe_timeout: Duration::from_secs(2),
        request_timeout: Duration::from_secs(10),
    }
}

/// A port nothing listens on.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    listener.local_addr().expect("addr").port()
}

/// An interpreter that ignores the staged script and runs `body` with `sh`.
pub fn stub_interpreter(body: &str) -> Interpreter {
    Interpreter {
        program: "sh".into(),
        flags: vec!["-c".to_string(), body.to_string(), "stub".to_string()],
        file_flag: String::new(),
        command_flag: "-c".to_string(),
    }
}
