use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::time::Duration;

use tracing::debug;

use crate::powershell::Interpreter;
use crate::process::{CommandSpec, ProcessExecutor};

use super::DiscoveryResult;

/// Prints `JOINED|`, `DOMAIN|`, `DC|name|ip` and one `PEER|name|ip` line per
/// controller. A failed lookup prints `ERROR|field|message` and the rest still run.
const DOMAIN_REPORT_SCRIPT: &str = "$ErrorActionPreference = 'Stop'
try {
    Write-Output ('JOINED|' + (Get-CimInstance Win32_ComputerSystem).PartOfDomain)
} catch { Write-Output ('ERROR|membership|' + $_.Exception.Message) }
$d = $null
try {
    $d = [System.DirectoryServices.ActiveDirectory.Domain]::GetComputerDomain()
    Write-Output ('DOMAIN|' + $d.Name)
} catch { Write-Output ('ERROR|domain|' + $_.Exception.Message) }
if ($d) {
    try {
        $dc = $d.FindDomainController()
        Write-Output ('DC|' + $dc.Name + '|' + $dc.IPAddress)
    } catch { Write-Output ('ERROR|controller|' + $_.Exception.Message) }
    try {
        foreach ($c in $d.FindAllDomainControllers()) {
            Write-Output ('PEER|' + $c.Name + '|' + $c.IPAddress)
        }
    } catch { Write-Output ('ERROR|controllers|' + $_.Exception.Message) }
}";

/// Inspects the machine this process runs on.
#[derive(Debug, Clone)]
pub struct LocalDiscovery {
    pub interpreter: Interpreter,
    pub executor: ProcessExecutor,
    pub timeout: Duration,
}

impl Default for LocalDiscovery {
    fn default() -> Self {
        Self {
            interpreter: Interpreter::default(),
            executor: ProcessExecutor::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl LocalDiscovery {
    pub fn new(interpreter: Interpreter) -> Self {
        Self {
            interpreter,
            ..Self::default()
        }
    }

    /// Resolve every field independently. Failures leave the field empty and
    /// are summarized in `error_message`; this never fails as a whole.
    pub async fn discover(&self) -> DiscoveryResult {
        let mut notes = Vec::new();
        let mut result = DiscoveryResult {
            local_host: self.local_host().await,
            ..DiscoveryResult::default()
        };

        result.local_ip = match local_ipv4(&result.local_host).await {
            Some(ip) => Some(ip),
            None => {
                notes.push("no non-loopback IPv4 address found".to_string());
                None
            }
        };

        let report = self.domain_report(&mut notes).await;
        apply_domain_report(&mut result, &report, &mut notes);

        if !notes.is_empty() {
            result.error_message = Some(notes.join("; "));
        }
        result
    }

    async fn local_host(&self) -> String {
        for var in ["COMPUTERNAME", "HOSTNAME"] {
            if let Ok(name) = std::env::var(var) {
                if !name.trim().is_empty() {
                    return name.trim().to_string();
                }
            }
        }
        let spec = CommandSpec::new("hostname").timeout(Duration::from_secs(5));
        match self.executor.run(&spec).await {
            Ok(result) if result.success => result.stdout.trim().to_string(),
            _ => String::new(),
        }
    }

    /// Whatever the report printed, even when it exited non-zero.
    async fn domain_report(&self, notes: &mut Vec<String>) -> String {
        let spec = self.interpreter.inline_command(DOMAIN_REPORT_SCRIPT, self.timeout);
        let result = match self.executor.run(&spec).await {
            Ok(result) => result,
            Err(err) => {
                notes.push(format!("domain lookup failed: {err}"));
                return String::new();
            }
        };
        if !result.success {
            let detail = result.stderr.trim();
            notes.push(if detail.is_empty() {
                format!("domain lookup exited with code {}", result.exit_code)
            } else {
                format!("domain lookup failed: {detail}")
            });
        }
        result.stdout
    }
}

/// Fold the lines printed by the domain report into `result`.
pub(crate) fn apply_domain_report(
    result: &mut DiscoveryResult,
    report: &str,
    notes: &mut Vec<String>,
) {
    let mut membership_known = false;
    for line in report.lines().map(str::trim) {
        let mut fields = line.splitn(3, '|');
        match (fields.next(), fields.next(), fields.next()) {
            (Some("JOINED"), Some(flag), _) => {
                membership_known = true;
                result.joined_to_domain = flag.eq_ignore_ascii_case("true");
            }
            (Some("ERROR"), Some(field), message) => {
                notes.push(format!(
                    "{field} lookup failed: {}",
                    message.unwrap_or_default().trim()
                ));
            }
            (Some("DOMAIN"), Some(name), _) if !name.is_empty() => {
                result.current_domain = Some(name.to_string());
            }
            (Some("DC"), Some(name), ip) if !name.is_empty() => {
                result.current_dc_name = Some(name.to_string());
                result.current_dc_ip = ip.and_then(|ip| ip.parse().ok());
            }
            (Some("PEER"), Some(name), ip) if !name.is_empty() => {
                let ip = ip.filter(|ip| !ip.is_empty()).unwrap_or("unresolved");
                result.available_dcs.push(format!("{name} ({ip})"));
            }
            _ => {}
        }
    }
    if membership_known && !result.joined_to_domain {
        notes.push("this computer is not joined to a directory domain".to_string());
    }
}

/// First non-loopback IPv4 of `host`, falling back to the address the
/// default route would use.
async fn local_ipv4(host: &str) -> Option<Ipv4Addr> {
    if !host.is_empty() {
        match tokio::net::lookup_host((host, 0)).await {
            Ok(addrs) => {
                let found = addrs.into_iter().find_map(|addr| match addr.ip() {
                    IpAddr::V4(ip) if !ip.is_loopback() => Some(ip),
                    _ => None,
                });
                if found.is_some() {
                    return found;
                }
            }
            Err(err) => debug!(host, error = %err, "hostname did not resolve"),
        }
    }
    // Connecting a UDP socket sends nothing; it only selects a source address.
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9)).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn domain_report_fills_controller_fields() {
        let mut result = DiscoveryResult::default();
        let mut notes = Vec::new();
        let report = "JOINED|True\nDOMAIN|old.corp\nDC|dc01.old.corp|10.0.0.10\n\
                      PEER|dc01.old.corp|10.0.0.10\nPEER|dc02.old.corp|";
        apply_domain_report(&mut result, report, &mut notes);

        assert!(result.joined_to_domain);
        assert_eq!(result.current_domain.as_deref(), Some("old.corp"));
        assert_eq!(result.current_dc_name.as_deref(), Some("dc01.old.corp"));
        assert_eq!(result.current_dc_ip, Some(Ipv4Addr::new(10, 0, 0, 10)));
        assert_eq!(
            result.available_dcs,
            vec!["dc01.old.corp (10.0.0.10)", "dc02.old.corp (unresolved)"]
        );
        assert!(notes.is_empty());
    }

    #[test]
    fn workgroup_machine_is_noted() {
        let mut result = DiscoveryResult::default();
        let mut notes = Vec::new();
        apply_domain_report(&mut result, "JOINED|False", &mut notes);
        assert!(!result.joined_to_domain);
        assert!(result.current_domain.is_none());
        assert_eq!(notes.len(), 1);
    }

    #[test]
    fn failed_field_keeps_the_others() {
        let mut result = DiscoveryResult::default();
        let mut notes = Vec::new();
        let report = "JOINED|True\nDOMAIN|old.corp\n\
                      ERROR|controller|The server is not operational.\n\
                      PEER|dc01.old.corp|10.0.0.10";
        apply_domain_report(&mut result, report, &mut notes);

        assert!(result.joined_to_domain);
        assert_eq!(result.current_domain.as_deref(), Some("old.corp"));
        assert!(result.current_dc_name.is_none());
        assert_eq!(result.available_dcs, vec!["dc01.old.corp (10.0.0.10)"]);
        assert_eq!(
            notes,
            vec!["controller lookup failed: The server is not operational."]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn partial_report_survives_a_failing_exit() {
        // The report script lands in `$2` and is ignored.
        let discovery = LocalDiscovery::new(Interpreter {
            program: "sh".into(),
            flags: vec![
                "-c".to_string(),
                "echo 'JOINED|True'; echo 'DOMAIN|old.corp'; echo 'controller unreachable' >&2; exit 1"
                    .to_string(),
                "stub".to_string(),
            ],
            file_flag: String::new(),
            command_flag: "-c".to_string(),
        });
        let result = discovery.discover().await;

        assert!(result.joined_to_domain);
        assert_eq!(result.current_domain.as_deref(), Some("old.corp"));
        assert!(result.current_dc_name.is_none());
        let message = result.error_message.expect("error message");
        assert!(message.contains("controller unreachable"), "{message}");
    }

    #[tokio::test]
    async fn missing_interpreter_is_absorbed() {
        let discovery = LocalDiscovery::new(Interpreter {
            program: "definitely-not-an-interpreter-7d2e".into(),
            ..Interpreter::default()
        });
        let result = discovery.discover().await;
        assert!(!result.joined_to_domain);
        let message = result.error_message.expect("error message");
        assert!(message.contains("domain lookup failed"));
    }
}
