use std::fmt::{self, Display, Formatter};

use remote_exec_core::{ExecError, TransportError};
use serde::Serialize;

/// Why an operation did not succeed, as reported to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// The executable could not be started.
    LaunchFailure,
    /// The process exceeded its allotted time and was killed.
    Timeout,
    /// The process ran to completion and reported failure.
    NonZeroExit,
    /// No channel to the host could be established.
    TransportUnavailable,
    AuthDenied,
    /// The chosen method cannot work with the given credentials or host.
    UnsupportedMethod,
    /// A required step script does not exist.
    ScriptMissing,
    /// The operator interrupted the run.
    Cancelled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::LaunchFailure => "launch-failure",
            FailureKind::Timeout => "timeout",
            FailureKind::NonZeroExit => "non-zero-exit",
            FailureKind::TransportUnavailable => "transport-unavailable",
            FailureKind::AuthDenied => "auth-denied",
            FailureKind::UnsupportedMethod => "unsupported-method",
            FailureKind::ScriptMissing => "script-missing",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

impl Display for FailureKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&ExecError> for FailureKind {
    fn from(err: &ExecError) -> Self {
        match err {
            ExecError::LaunchFailed { .. } => FailureKind::LaunchFailure,
            ExecError::Timeout { .. } => FailureKind::Timeout,
            ExecError::Cancelled { .. } => FailureKind::Cancelled,
            ExecError::Wait { .. } => FailureKind::LaunchFailure,
        }
    }
}

impl From<&TransportError> for FailureKind {
    fn from(err: &TransportError) -> Self {
        match err {
            TransportError::AuthDenied(_) => FailureKind::AuthDenied,
            TransportError::UnsupportedMethod { .. } => FailureKind::UnsupportedMethod,
            TransportError::CommandFailed { .. } => FailureKind::NonZeroExit,
            TransportError::Exec(ExecError::Timeout { .. }) => FailureKind::Timeout,
            TransportError::Exec(ExecError::Cancelled { .. }) => FailureKind::Cancelled,
            TransportError::Unavailable(_)
            | TransportError::Session(_)
            | TransportError::Protocol(_)
            | TransportError::Exec(_)
            | TransportError::Http(_)
            | TransportError::Io(_) => FailureKind::TransportUnavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn timeout_is_distinct_from_launch_failure() {
        let timeout = ExecError::Timeout {
            program: "pwsh".into(),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(FailureKind::from(&timeout), FailureKind::Timeout);
        let wrapped = TransportError::Exec(timeout);
        assert_eq!(FailureKind::from(&wrapped), FailureKind::Timeout);
    }

    #[test]
    fn transport_errors_classify() {
        assert_eq!(
            FailureKind::from(&TransportError::AuthDenied("no".into())),
            FailureKind::AuthDenied
        );
        assert_eq!(
            FailureKind::from(&TransportError::Session("Access is denied.".into())),
            FailureKind::TransportUnavailable
        );
        assert_eq!(FailureKind::ScriptMissing.to_string(), "script-missing");
    }
}
