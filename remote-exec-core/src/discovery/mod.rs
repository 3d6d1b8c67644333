//! Local machine and subnet discovery.
//!
//! - [`LocalDiscovery::discover`] reports host name, IPv4, domain membership
//!   and the known domain controllers of the machine running the tool.
//! - [`scan_subnet`] sweeps a /24 with a [`HostProbe`] under bounded concurrency.
//! - [`discover_directory_servers`] narrows a sweep to hosts with the
//!   directory port open.

mod local;
mod probe;
mod subnet;

use std::net::Ipv4Addr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use local::LocalDiscovery;
pub use probe::{port_open, HostProbe, PingProbe, TcpProbe};
pub use subnet::{discover_directory_servers, scan_subnet, subnet_hosts};

pub const LDAP_PORT: u16 = 389;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryResult {
    pub local_host: String,
    pub local_ip: Option<Ipv4Addr>,
    pub joined_to_domain: bool,
    pub current_domain: Option<String>,
    pub current_dc_name: Option<String>,
    pub current_dc_ip: Option<Ipv4Addr>,
    /// `"name (ip)"` per controller.
    pub available_dcs: Vec<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    #[serde(with = "millis")]
    pub probe_timeout: Duration,
    #[serde(with = "millis")]
    pub port_timeout: Duration,
    pub max_in_flight: usize,
    pub directory_port: u16,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_millis(250),
            port_timeout: Duration::from_secs(1),
            max_in_flight: 64,
            directory_port: LDAP_PORT,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
