mod support;

use dc_cutover::configure::{apply, RETRY_HINT};
use dc_cutover::intent::{ServerConfigIntent, FIREWALL_RULES, ROLES};
use pretty_assertions::assert_eq;

use support::{agent_client, spawn_agent, state};

fn firewall_intent() -> ServerConfigIntent {
    let mut intent = ServerConfigIntent::default();
    intent.open_firewall_ports = true;
    intent
}

fn disk_intent(confirmed: bool) -> ServerConfigIntent {
    let mut intent = ServerConfigIntent::default();
    intent.prepare_disk = true;
    intent.disk_number = 1;
    if confirmed {
        intent.confirm_disk_preparation();
    }
    intent
}

#[tokio::test]
async fn firewall_applied_twice_keeps_one_rule_per_allowance() {
    let shared = state("GPT");
    let port = spawn_agent(shared.clone()).await;
    let client = agent_client(port);

    let first = apply(&client, &firewall_intent()).await;
    let second = apply(&client, &firewall_intent()).await;
    assert!(first.success, "{}", first.message);
    assert!(second.success, "{}", second.message);
    assert!(second.message.starts_with("[OK] firewall:"));

    let mut rules = shared.lock().expect("state").rules.clone();
    rules.sort();
    let mut expected: Vec<String> = FIREWALL_RULES.iter().map(|r| r.name.to_string()).collect();
    expected.sort();
    assert_eq!(rules, expected);
}

#[tokio::test]
async fn non_raw_disk_is_left_untouched() {
    let shared = state("GPT");
    let port = spawn_agent(shared.clone()).await;
    let client = agent_client(port);

    let result = apply(&client, &disk_intent(true)).await;
    assert!(result.success, "a warning is not a failure");
    assert!(result.message.starts_with("[WARN] disk:"), "{}", result.message);
    let commands = shared.lock().expect("state").commands.clone();
    assert!(commands.iter().all(|c| !c.contains("Initialize-Disk")));
}

#[tokio::test]
async fn raw_disk_is_prepared_after_confirmation() {
    let shared = state("RAW");
    let port = spawn_agent(shared.clone()).await;
    let client = agent_client(port);

    let result = apply(&client, &disk_intent(true)).await;
    assert!(result.success, "{}", result.message);
    assert_eq!(result.message, "[OK] disk: disk prepared");
    let commands = shared.lock().expect("state").commands.clone();
    assert!(commands.iter().any(|c| c.contains("Initialize-Disk -Number 1")));
}

#[tokio::test]
async fn unconfirmed_disk_fails_without_touching_the_server() {
    let shared = state("RAW");
    let port = spawn_agent(shared.clone()).await;
    let client = agent_client(port);

    let result = apply(&client, &disk_intent(false)).await;
    assert!(!result.success);
    assert!(result.message.starts_with("[FAIL] disk:"));
    assert_eq!(result.hint, RETRY_HINT);
    assert!(shared.lock().expect("state").commands.is_empty());
}

#[tokio::test]
async fn every_part_is_attempted_and_reported_in_order() {
    let shared = state("RAW");
    shared
        .lock()
        .expect("state")
        .failing_roles
        .push("FS-DFS-Replication".to_string());
    let port = spawn_agent(shared.clone()).await;
    let client = agent_client(port);

    let mut intent = disk_intent(false);
    intent.configure_network = true;
    intent.ip_address = "10.0.0.20".to_string();
    intent.open_firewall_ports = true;
    intent.install_roles = true;

    let result = apply(&client, &intent).await;
    let lines: Vec<&str> = result.message.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("[OK] network:"));
    assert!(lines[1].starts_with("[OK] firewall:"));
    assert_eq!(lines[2], "[WARN] roles: not installed: FS-DFS-Replication");
    assert!(lines[3].starts_with("[FAIL] disk:"));
    assert!(!result.success);

    let installed = shared.lock().expect("state").installed_roles.len();
    assert_eq!(installed, ROLES.len() - 1);
}
