//! Wire models of the agent control-plane API (camelCase JSON).

use serde::{Deserialize, Serialize};

use crate::process::ExecutionResult;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentHealth {
    pub status: String,
    pub version: String,
    pub hostname: String,
    pub os: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub command: String,
    pub as_admin: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentCommandResult {
    pub success: bool,
    pub output: String,
    pub error: String,
    pub exit_code: i32,
}

impl From<AgentCommandResult> for ExecutionResult {
    fn from(result: AgentCommandResult) -> Self {
        // The agent reports launch failures as success=false with exit code 0.
        let exit_code = if !result.success && result.exit_code == 0 {
            1
        } else {
            result.exit_code
        };
        ExecutionResult::new(exit_code, result.output, result.error)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SystemInfo {
    pub hostname: String,
    #[serde(rename = "os")]
    pub os: String,
    pub domain: String,
    pub username: String,
    #[serde(rename = "is64Bit")]
    pub is_64_bit: bool,
    pub processor_count: u32,
    #[serde(rename = "totalMemoryGB")]
    pub total_memory_gb: f64,
    pub windows_version: String,
    pub installed_roles: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DomainInfo {
    pub is_domain_controller: bool,
    pub domain_name: String,
    pub forest_name: String,
    pub functional_level: String,
    pub user_count: u32,
    pub group_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharesResponse {
    pub shares: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskInfo {
    pub drives: Vec<DriveInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveInfo {
    pub name: String,
    #[serde(rename = "usedGB")]
    pub used_gb: f64,
    #[serde(rename = "freeGB")]
    pub free_gb: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfigRequest {
    pub interface_name: String,
    pub ip_address: String,
    pub subnet_mask: u8,
    pub gateway: String,
    pub dns_servers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfigResponse {
    pub results: Vec<AgentCommandResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallRoleRequest {
    pub role_name: String,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoteRequest {
    pub domain_name: String,
    pub safe_mode_password: String,
    pub is_new_forest: bool,
}

impl std::fmt::Debug for PromoteRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromoteRequest")
            .field("domain_name", &self.domain_name)
            .field("safe_mode_password", &"[REDACTED]")
            .field("is_new_forest", &self.is_new_forest)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShareRequest {
    pub share_name: String,
    pub path: String,
    pub full_access_users: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallRuleRequest {
    pub rule_name: String,
    pub direction: String,
    pub protocol: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebootRequest {
    pub delay_seconds: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestConnectionRequest {
    pub target: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub(crate) struct ErrorBody {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_command_with_zero_exit_becomes_failure() {
        let result: ExecutionResult = AgentCommandResult {
            success: false,
            output: String::new(),
            error: "could not start".into(),
            exit_code: 0,
        }
        .into();
        assert!(!result.success);
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.stderr, "could not start");
    }

    #[test]
    fn system_info_reads_dotnet_casing() {
        let info: SystemInfo = serde_json::from_str(
            r#"{"hostname":"DC01","os":"Microsoft Windows NT 10.0","is64Bit":true,
                "totalMemoryGB":15.5,"windowsVersion":"Windows Server 2019","installedRoles":["DNS"]}"#,
        )
        .expect("parse");
        assert_eq!(info.hostname, "DC01");
        assert!(info.is_64_bit);
        assert_eq!(info.total_memory_gb, 15.5);
        assert_eq!(info.windows_version, "Windows Server 2019");
        assert_eq!(info.installed_roles, vec!["DNS".to_string()]);
    }

    #[test]
    fn execute_request_uses_camel_case() {
        let body = serde_json::to_string(&ExecuteRequest {
            command: "hostname".into(),
            as_admin: true,
        })
        .expect("json");
        assert_eq!(body, r#"{"command":"hostname","asAdmin":true}"#);
    }
}
