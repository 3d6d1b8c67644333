use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use remote_exec_core::discovery::{discover_directory_servers, scan_subnet, HostProbe, ScanOptions};
use tokio::net::TcpListener;

/// Answers for a fixed set of last octets.
struct FixedProbe {
    live: Vec<u8>,
}

impl HostProbe for FixedProbe {
    async fn probe(&self, addr: Ipv4Addr, _timeout: Duration) -> bool {
        self.live.contains(&addr.octets()[3])
    }
}

#[tokio::test]
async fn scan_returns_each_responder_once_in_order() {
    let probe = Arc::new(FixedProbe {
        live: vec![200, 3, 3, 17, 254, 1],
    });
    let live = scan_subnet(Ipv4Addr::new(10, 20, 30, 99), probe, &ScanOptions::default()).await;
    let expected: BTreeSet<Ipv4Addr> = [1, 3, 17, 200, 254]
        .into_iter()
        .map(|d| Ipv4Addr::new(10, 20, 30, d))
        .collect();
    assert_eq!(live, expected);
}

#[tokio::test]
async fn silent_subnet_is_empty() {
    let probe = Arc::new(FixedProbe { live: Vec::new() });
    let live = scan_subnet(Ipv4Addr::new(10, 0, 0, 0), probe, &ScanOptions::default()).await;
    assert!(live.is_empty());
}

#[tokio::test]
async fn directory_servers_are_a_subset_of_live_hosts() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let options = ScanOptions {
        directory_port: port,
        port_timeout: Duration::from_millis(500),
        ..ScanOptions::default()
    };
    let probe = Arc::new(FixedProbe {
        live: vec![1, 7, 9],
    });

    let live = scan_subnet(Ipv4Addr::LOCALHOST, Arc::clone(&probe), &options).await;
    let servers = discover_directory_servers(Ipv4Addr::LOCALHOST, probe, &options).await;

    assert!(servers.is_subset(&live));
    assert!(servers.contains(&Ipv4Addr::LOCALHOST));
    assert!(!servers.contains(&Ipv4Addr::new(127, 0, 0, 7)));
}
