use remote_exec_core::{RemoteIdentity, TransportKind};
use serde::Serialize;

use crate::error::FailureKind;
use crate::hint::GENERIC_HINT;

/// Outcome of a connection attempt or a remote configuration pass.
///
/// Built only through [`ConnectionResult::success`] and
/// [`ConnectionResult::failure`], so a failed result always carries a hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionResult {
    pub success: bool,
    pub message: String,
    pub hint: String,
    pub remote_hostname: Option<String>,
    pub remote_os_version: Option<String>,
    pub method: Option<TransportKind>,
    pub failure: Option<FailureKind>,
}

impl ConnectionResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            hint: String::new(),
            remote_hostname: None,
            remote_os_version: None,
            method: None,
            failure: None,
        }
    }

    pub fn connected(method: TransportKind, identity: &RemoteIdentity) -> Self {
        let mut result = Self::success(format!(
            "connected via {method}: {}",
            if identity.hostname.is_empty() {
                "unknown host"
            } else {
                identity.hostname.as_str()
            }
        ));
        result.method = Some(method);
        result.remote_hostname = non_empty(&identity.hostname);
        result.remote_os_version = non_empty(&identity.os_version);
        result
    }

    /// A blank `hint` is replaced by the generic one.
    pub fn failure(message: impl Into<String>, hint: impl Into<String>, kind: FailureKind) -> Self {
        let hint = hint.into();
        Self {
            success: false,
            message: message.into(),
            hint: if hint.trim().is_empty() {
                GENERIC_HINT.to_string()
            } else {
                hint
            },
            remote_hostname: None,
            remote_os_version: None,
            method: None,
            failure: Some(kind),
        }
    }

    pub fn with_method(mut self, method: TransportKind) -> Self {
        self.method = Some(method);
        self
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_always_has_hint() {
        let result = ConnectionResult::failure("boom", "   ", FailureKind::TransportUnavailable);
        assert!(!result.success);
        assert_eq!(result.hint, GENERIC_HINT);
    }

    #[test]
    fn connected_copies_identity() {
        let identity = RemoteIdentity {
            hostname: "DC02".into(),
            os_version: "Windows Server 2022".into(),
        };
        let result = ConnectionResult::connected(TransportKind::WinRm, &identity);
        assert!(result.success);
        assert!(result.hint.is_empty());
        assert_eq!(result.message, "connected via winrm: DC02");
        assert_eq!(result.remote_os_version.as_deref(), Some("Windows Server 2022"));
    }

    #[test]
    fn empty_os_version_is_none() {
        let identity = RemoteIdentity {
            hostname: "FS01".into(),
            os_version: String::new(),
        };
        let result = ConnectionResult::connected(TransportKind::AdminShareExec, &identity);
        assert!(result.remote_os_version.is_none());
    }
}
