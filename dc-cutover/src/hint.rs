//! Remediation hints for failed connections.
//!
//! Markers are matched case-insensitively against the failure text, in
//! priority order; the first group that matches wins.

use remote_exec_core::{TransportError, TransportKind};

pub const SERVICE_HINT: &str =
    "enable the remote-execution service on the server (Enable-PSRemoting -Force)";
pub const CREDENTIALS_HINT: &str =
    "credentials invalid or insufficient privilege; check the user name, domain and password and that the account is a local administrator";
pub const REACHABILITY_HINT: &str =
    "check firewall/port reachability between this machine and the server (5985/5986 for WinRM, 445 for admin share, 22 for SSH, 8765 for the agent)";
pub const TRUSTED_HOSTS_HINT: &str =
    "adjust trusted-hosts policy on this machine (Set-Item WSMan:\\localhost\\Client\\TrustedHosts)";
pub const GENERIC_HINT: &str =
    "verify network connectivity, the selected connection method and the credentials";
pub const SSH_KEY_HINT: &str = "Use WinRM or configure SSH key authentication";
pub const SSH_CLIENT_HINT: &str = "install the OpenSSH client or use WinRM";
pub const ADMIN_SHARE_TOOL_HINT: &str =
    "download PsExec from Sysinternals and place it on PATH, or enable WinRM manually";
pub const AGENT_TOKEN_HINT: &str =
    "configure an agent token ([agent].token or CUTOVER_AGENT_TOKEN) or choose a traditional method";

const HINT_RULES: &[(&[&str], &str)] = &[
    (&["winrm", "ws-management", "5985", "5986"], SERVICE_HINT),
    (
        &[
            "access is denied",
            "acesso negado",
            "logon failure",
            "unauthorized",
            "authentication failed",
        ],
        CREDENTIALS_HINT,
    ),
    (&["timeout", "timed out"], REACHABILITY_HINT),
    (&["trustedhosts"], TRUSTED_HOSTS_HINT),
];

/// Pick the hint for a raw failure message.
pub fn derive_hint(message: &str) -> &'static str {
    let lowered = message.to_lowercase();
    HINT_RULES
        .iter()
        .find(|(markers, _)| markers.iter().any(|marker| lowered.contains(marker)))
        .map(|(_, hint)| *hint)
        .unwrap_or(GENERIC_HINT)
}

/// Hint for a transport error, with fixed hints for conditions the text alone does not identify.
pub fn hint_for_error(method: TransportKind, err: &TransportError) -> &'static str {
    match (method, err) {
        (TransportKind::Ssh, TransportError::UnsupportedMethod { .. }) => SSH_KEY_HINT,
        (TransportKind::Ssh, TransportError::Unavailable(_)) => SSH_CLIENT_HINT,
        (TransportKind::AdminShareExec, TransportError::Unavailable(_)) => ADMIN_SHARE_TOOL_HINT,
        (_, TransportError::AuthDenied(_)) => CREDENTIALS_HINT,
        (_, other) => derive_hint(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_denied_maps_to_credentials() {
        assert_eq!(derive_hint("Access is denied."), CREDENTIALS_HINT);
        assert_eq!(derive_hint("Acesso negado"), CREDENTIALS_HINT);
        assert_eq!(derive_hint("The user name or password is incorrect: Logon failure"), CREDENTIALS_HINT);
    }

    #[test]
    fn service_markers_take_priority() {
        assert_eq!(
            derive_hint("The WinRM client cannot process the request: Access is denied"),
            SERVICE_HINT
        );
        assert_eq!(derive_hint("connection to port 5985 timed out"), SERVICE_HINT);
    }

    #[test]
    fn timeout_before_trusted_hosts() {
        assert_eq!(derive_hint("operation timed out"), REACHABILITY_HINT);
        assert_eq!(derive_hint("Timeout while checking TrustedHosts"), REACHABILITY_HINT);
        assert_eq!(derive_hint("add the server to the TrustedHosts list"), TRUSTED_HOSTS_HINT);
    }

    #[test]
    fn unknown_text_gets_generic_hint() {
        assert_eq!(derive_hint("something odd"), GENERIC_HINT);
        assert_eq!(derive_hint(""), GENERIC_HINT);
    }

    #[test]
    fn fixed_hints_for_missing_tools() {
        let unsupported = TransportError::UnsupportedMethod {
            method: TransportKind::Ssh,
            reason: "password".into(),
        };
        assert_eq!(hint_for_error(TransportKind::Ssh, &unsupported), SSH_KEY_HINT);
        let missing = TransportError::Unavailable("not found".into());
        assert_eq!(
            hint_for_error(TransportKind::AdminShareExec, &missing),
            ADMIN_SHARE_TOOL_HINT
        );
    }
}
