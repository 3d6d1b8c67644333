use axum::extract::OriginalUri;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use remote_exec_core::transport::agent::models::{
    CreateShareRequest, FirewallRuleRequest, NetworkConfigRequest, PromoteRequest,
};
use remote_exec_core::transport::{AgentConfig, AgentTransport, Fact, TransportClient};
use remote_exec_core::TransportError;

const TOKEN: &str = "test-token";

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("X-Agent-Token").and_then(|v| v.to_str().ok()) == Some(TOKEN)
}

fn denied() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Invalid token" }))).into_response()
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

async fn execute(headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !authorized(&headers) {
        return denied();
    }
    let command = body["command"].as_str().unwrap_or_default();
    if command.contains("PartitionStyle") {
        return Json(json!({ "success": true, "output": "RAW\r\n", "error": "", "exitCode": 0 }))
            .into_response();
    }
    Json(json!({
        "success": body["asAdmin"] == json!(true),
        "output": format!("ran: {command}"),
        "error": "",
        "exitCode": 0
    }))
    .into_response()
}

async fn firewall(headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !authorized(&headers) {
        return denied();
    }
    Json(json!({
        "success": true,
        "output": format!("rule {} created", body["ruleName"].as_str().unwrap_or_default()),
        "error": "",
        "exitCode": 0
    }))
    .into_response()
}

async fn domain(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return denied();
    }
    Json(json!({
        "isDomainController": true,
        "domainName": "new.corp",
        "forestName": "new.corp",
        "functionalLevel": "Windows2016Domain",
        "userCount": 42,
        "groupCount": 7
    }))
    .into_response()
}

async fn shares(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return denied();
    }
    Json(json!({ "shares": ["NETLOGON", "SYSVOL", "Data"] })).into_response()
}

async fn disks(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return denied();
    }
    Json(json!({ "drives": [{ "name": "C:\\", "usedGB": 40.5, "freeGB": 59.5 }] })).into_response()
}

/// Answers any command endpoint with the path it was called on.
async fn command(headers: HeaderMap, uri: OriginalUri, Json(body): Json<Value>) -> Response {
    if !authorized(&headers) {
        return denied();
    }
    let result = json!({
        "success": true,
        "output": format!("{} {body}", uri.path()),
        "error": "",
        "exitCode": 0
    });
    if uri.path() == "/api/network/configure" {
        return Json(json!({ "results": [result] })).into_response();
    }
    Json(result).into_response()
}

async fn spawn_agent() -> u16 {
    let app = Router::new()
        .route("/health", get(health))
        .route("/api/system", get(system))
        .route("/api/domain", get(domain))
        .route("/api/shares", get(shares))
        .route("/api/disks", get(disks))
        .route("/api/execute", post(execute))
        .route("/api/firewall/configure", post(firewall))
        .route("/api/network/configure", post(command))
        .route("/api/domain/promote", post(command))
        .route("/api/shares/create", post(command))
        .route("/api/system/reboot", post(command))
        .route("/api/network/test", post(command));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    port
}

fn transport(port: u16, token: &str) -> AgentTransport {
    let mut config = AgentConfig::new("127.0.0.1", token);
    config.port = port;
    AgentTransport::new(config).expect("client")
}

#[tokio::test]
async fn connect_reports_identity_from_agent() {
    let port = spawn_agent().await;
    let client = TransportClient::Agent(transport(port, TOKEN));
    let identity = client.connect().await.expect("connect");
    assert_eq!(identity.hostname, "DC02");
    assert_eq!(identity.os_version, "Windows Server 2022 Standard");
}

#[tokio::test]
async fn execute_runs_as_admin() {
    let port = spawn_agent().await;
    let client = TransportClient::Agent(transport(port, TOKEN));
    let result = client.execute("Get-Service").await.expect("execute");
    assert!(result.success);
    assert_eq!(result.stdout, "ran: Get-Service");
}

#[tokio::test]
async fn wrong_token_is_auth_denied() {
    let port = spawn_agent().await;
    let agent = transport(port, "wrong");
    // Health is open; everything else checks the token.
    assert!(agent.health().await.is_ok());
    let err = agent.execute("hostname").await.unwrap_err();
    match err {
        TransportError::AuthDenied(message) => assert!(message.contains("Invalid token")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn connect_with_wrong_token_fails() {
    let port = spawn_agent().await;
    let client = TransportClient::Agent(transport(port, "wrong"));
    match client.connect().await {
        Err(TransportError::AuthDenied(message)) => assert!(message.contains("Invalid token")),
        other => panic!("unexpected connect result: {other:?}"),
    }
}

#[tokio::test]
async fn facts_come_from_typed_endpoints() {
    let port = spawn_agent().await;
    let client = TransportClient::Agent(transport(port, TOKEN));
    assert_eq!(client.query_fact(Fact::Domain).await.expect("domain"), "new.corp");
    assert_eq!(
        client
            .query_fact(Fact::DiskPartitionStyle(1))
            .await
            .expect("partition style"),
        "RAW"
    );
}

#[tokio::test]
async fn firewall_endpoint_round_trips() {
    let port = spawn_agent().await;
    let agent = transport(port, TOKEN);
    let result = agent
        .configure_firewall(&FirewallRuleRequest {
            rule_name: "AD-LDAP".into(),
            direction: "Inbound".into(),
            protocol: "TCP".into(),
            port: 389,
        })
        .await
        .expect("firewall");
    assert!(result.success);
    assert_eq!(result.output, "rule AD-LDAP created");
}

#[tokio::test]
async fn inventory_endpoints_decode() {
    let port = spawn_agent().await;
    let agent = transport(port, TOKEN);

    let domain = agent.domain_info().await.expect("domain");
    assert!(domain.is_domain_controller);
    assert_eq!(domain.user_count, 42);
    assert_eq!(agent.shares().await.expect("shares"), vec!["NETLOGON", "SYSVOL", "Data"]);
    let disks = agent.disks().await.expect("disks");
    assert_eq!(disks.drives.len(), 1);
    assert_eq!(disks.drives[0].free_gb, 59.5);
}

#[tokio::test]
async fn command_endpoints_send_camel_case_bodies() {
    let port = spawn_agent().await;
    let agent = transport(port, TOKEN);

    let network = agent
        .configure_network(&NetworkConfigRequest {
            interface_name: "Ethernet".into(),
            ip_address: "10.0.0.20".into(),
            subnet_mask: 24,
            gateway: "10.0.0.1".into(),
            dns_servers: vec!["10.0.0.10".into()],
        })
        .await
        .expect("network");
    assert!(network.output.starts_with("/api/network/configure"));
    assert!(network.output.contains(r#""ipAddress":"10.0.0.20""#));

    let promote = agent
        .promote_domain_controller(&PromoteRequest {
            domain_name: "new.corp".into(),
            safe_mode_password: "dsrm".into(),
            is_new_forest: false,
        })
        .await
        .expect("promote");
    assert!(promote.output.contains(r#""isNewForest":false"#));

    let share = agent
        .create_share(&CreateShareRequest {
            share_name: "Data".into(),
            path: "E:\\Shares\\Data".into(),
            full_access_users: "Everyone".into(),
        })
        .await
        .expect("share");
    assert!(share.output.contains(r#""shareName":"Data""#));

    let reboot = agent.reboot(30).await.expect("reboot");
    assert!(reboot.output.contains(r#""delaySeconds":30"#));

    let probe = agent.test_connection("10.0.0.10", 389).await.expect("test");
    assert!(probe.success);
    assert!(probe.output.starts_with("/api/network/test"));
}

#[tokio::test]
async fn closed_port_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);
    let err = transport(port, TOKEN).health().await.unwrap_err();
    assert!(matches!(err, TransportError::Http(_)));
}
