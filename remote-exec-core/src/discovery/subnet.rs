use std::collections::BTreeSet;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::probe::{port_open, HostProbe};
use super::ScanOptions;

/// Extra time a probe gets beyond its own timeout before the sweep gives up on it.
const PROBE_GRACE: Duration = Duration::from_secs(1);

/// `.1` through `.254` of the /24 containing `base`.
pub fn subnet_hosts(base: Ipv4Addr) -> Vec<Ipv4Addr> {
    let [a, b, c, _] = base.octets();
    (1..=254).map(|d| Ipv4Addr::new(a, b, c, d)).collect()
}

/// Every address in the /24 of `base` that answers `probe`, ascending.
pub async fn scan_subnet<P: HostProbe>(
    base: Ipv4Addr,
    probe: Arc<P>,
    options: &ScanOptions,
) -> BTreeSet<Ipv4Addr> {
    let timeout = options.probe_timeout;
    let live = sweep(subnet_hosts(base), options.max_in_flight, move |addr| {
        let probe = Arc::clone(&probe);
        async move {
            tokio::time::timeout(timeout + PROBE_GRACE, probe.probe(addr, timeout))
                .await
                .unwrap_or(false)
        }
    })
    .await;
    debug!(subnet = %base, live = live.len(), "subnet sweep finished");
    live
}

/// Live hosts of the /24 that also accept connections on the directory port.
pub async fn discover_directory_servers<P: HostProbe>(
    base: Ipv4Addr,
    probe: Arc<P>,
    options: &ScanOptions,
) -> BTreeSet<Ipv4Addr> {
    let live = scan_subnet(base, probe, options).await;
    let port = options.directory_port;
    let timeout = options.port_timeout;
    sweep(live.into_iter().collect(), options.max_in_flight, move |addr| {
        port_open(SocketAddr::from((addr, port)), timeout)
    })
    .await
}

/// Run `check` for each address with at most `max_in_flight` checks pending.
async fn sweep<F, Fut>(addrs: Vec<Ipv4Addr>, max_in_flight: usize, check: F) -> BTreeSet<Ipv4Addr>
where
    F: Fn(Ipv4Addr) -> Fut,
    Fut: Future<Output = bool> + Send + 'static,
{
    let limit = Arc::new(Semaphore::new(max_in_flight.max(1)));
    let found = Arc::new(Mutex::new(BTreeSet::new()));
    let mut tasks = JoinSet::new();

    for addr in addrs {
        let Ok(permit) = Arc::clone(&limit).acquire_owned().await else {
            break;
        };
        let pending = check(addr);
        let found = Arc::clone(&found);
        tasks.spawn(async move {
            let _permit = permit;
            if pending.await {
                found
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(addr);
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            warn!(error = %err, "probe task ended abnormally");
        }
    }

    let mut guard = found.lock().unwrap_or_else(PoisonError::into_inner);
    std::mem::take(&mut *guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn subnet_has_254_hosts() {
        let hosts = subnet_hosts(Ipv4Addr::new(192, 168, 10, 77));
        assert_eq!(hosts.len(), 254);
        assert_eq!(hosts[0], Ipv4Addr::new(192, 168, 10, 1));
        assert_eq!(hosts[253], Ipv4Addr::new(192, 168, 10, 254));
    }

    #[tokio::test]
    async fn sweep_never_exceeds_in_flight_limit() {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let live = sweep(subnet_hosts(Ipv4Addr::new(10, 0, 0, 0)), 8, |addr| {
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                addr.octets()[3] % 2 == 0
            }
        })
        .await;
        assert_eq!(live.len(), 127);
        assert!(peak.load(Ordering::SeqCst) <= 8);
    }
}
