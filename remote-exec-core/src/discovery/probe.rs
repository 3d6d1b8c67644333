use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tracing::debug;

use crate::process::{CommandSpec, ProcessExecutor};

/// Decides whether a single address is alive.
///
/// Implementations must honor `timeout` themselves; the sweep only adds a
/// small grace period on top of it.
pub trait HostProbe: Send + Sync + 'static {
    fn probe(&self, addr: Ipv4Addr, timeout: Duration) -> impl Future<Output = bool> + Send;
}

/// True when a TCP connection to `addr` completes within `timeout`.
pub async fn port_open(addr: SocketAddr, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

/// One ICMP echo through the system `ping`.
#[derive(Debug, Clone)]
pub struct PingProbe {
    program: PathBuf,
    executor: ProcessExecutor,
}

impl Default for PingProbe {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ping"),
            executor: ProcessExecutor::new(),
        }
    }
}

impl PingProbe {
    pub fn new() -> Self {
        Self::default()
    }

    fn command(&self, addr: Ipv4Addr, timeout: Duration) -> CommandSpec {
        let spec = CommandSpec::new(&self.program);
        let spec = if cfg!(windows) {
            spec.args(["-n".to_string(), "1".to_string(), "-w".to_string()])
                .arg(timeout.as_millis().max(1).to_string())
        } else {
            // iputils only takes whole seconds.
            let secs = timeout.as_secs_f64().ceil().max(1.0) as u64;
            spec.args(["-c".to_string(), "1".to_string(), "-W".to_string()])
                .arg(secs.to_string())
        };
        spec.arg(addr.to_string())
            .timeout(timeout + Duration::from_secs(1))
    }
}

impl HostProbe for PingProbe {
    async fn probe(&self, addr: Ipv4Addr, timeout: Duration) -> bool {
        match self.executor.run(&self.command(addr, timeout)).await {
            // Windows ping exits 0 on "destination unreachable" replies too.
            Ok(result) if cfg!(windows) => result.success && result.stdout.contains("TTL="),
            Ok(result) => result.success,
            Err(err) => {
                debug!(%addr, error = %err, "ping probe failed");
                false
            }
        }
    }
}

/// Alive when any of `ports` accepts a TCP connection.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    pub ports: Vec<u16>,
}

impl Default for TcpProbe {
    /// RPC, SMB, LDAP, SSH, RDP and WinRM.
    fn default() -> Self {
        Self {
            ports: vec![135, 445, 389, 22, 3389, 5985],
        }
    }
}

impl HostProbe for TcpProbe {
    async fn probe(&self, addr: Ipv4Addr, timeout: Duration) -> bool {
        let mut attempts = JoinSet::new();
        for &port in &self.ports {
            attempts.spawn(port_open(SocketAddr::from((addr, port)), timeout));
        }
        while let Some(joined) = attempts.join_next().await {
            if matches!(joined, Ok(true)) {
                attempts.abort_all();
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn tcp_probe_sees_listening_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let probe = TcpProbe { ports: vec![port] };
        assert!(probe.probe(Ipv4Addr::LOCALHOST, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn tcp_probe_rejects_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);
        let probe = TcpProbe { ports: vec![port] };
        assert!(!probe.probe(Ipv4Addr::LOCALHOST, Duration::from_millis(500)).await);
    }

    #[test]
    fn ping_waits_whole_seconds_off_windows() {
        let spec = PingProbe::new().command(Ipv4Addr::new(10, 0, 0, 1), Duration::from_millis(200));
        if !cfg!(windows) {
            assert_eq!(spec.args, vec!["-c", "1", "-W", "1", "10.0.0.1"]);
        }
        assert_eq!(spec.timeout, Duration::from_millis(1200));
    }
}
