use serde::Serialize;

/// One inbound allowance opened on a prepared server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FirewallRule {
    pub name: &'static str,
    pub protocol: &'static str,
    /// A port or an inclusive `low-high` range.
    pub ports: &'static str,
}

pub const FIREWALL_RULES: &[FirewallRule] = &[
    FirewallRule {
        name: "AD-DNS-TCP",
        protocol: "TCP",
        ports: "53",
    },
    FirewallRule {
        name: "AD-DNS-UDP",
        protocol: "UDP",
        ports: "53",
    },
    FirewallRule {
        name: "AD-Kerberos-TCP",
        protocol: "TCP",
        ports: "88",
    },
    FirewallRule {
        name: "AD-RPC",
        protocol: "TCP",
        ports: "135",
    },
    FirewallRule {
        name: "AD-LDAP",
        protocol: "TCP",
        ports: "389",
    },
    FirewallRule {
        name: "AD-SMB",
        protocol: "TCP",
        ports: "445",
    },
    FirewallRule {
        name: "AD-LDAPS",
        protocol: "TCP",
        ports: "636",
    },
    FirewallRule {
        name: "AD-GC",
        protocol: "TCP",
        ports: "3268",
    },
    FirewallRule {
        name: "AD-WinRM",
        protocol: "TCP",
        ports: "5985",
    },
    FirewallRule {
        name: "AD-RPC-Dynamic",
        protocol: "TCP",
        ports: "49152-65535",
    },
];

/// Paired with the given DNS server unless overridden.
pub const DEFAULT_SECONDARY_DNS: &str = "8.8.8.8";

/// Installed together with their management tools.
pub const ROLES: &[&str] = &[
    "AD-Domain-Services",
    "FS-DFS-Namespace",
    "FS-DFS-Replication",
    "FS-FileServer",
];

/// What to change on a server. Each part is toggled independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerConfigIntent {
    pub configure_network: bool,
    pub ip_address: String,
    pub prefix_length: u8,
    pub gateway: Option<String>,
    pub dns_server: Option<String>,
    /// Blank leaves the given server as the only one.
    pub secondary_dns: String,
    pub open_firewall_ports: bool,
    pub install_roles: bool,
    pub prepare_disk: bool,
    pub disk_number: u32,
    pub drive_letter: char,
    disk_confirmed: bool,
}

impl Default for ServerConfigIntent {
    fn default() -> Self {
        Self {
            configure_network: false,
            ip_address: String::new(),
            prefix_length: 24,
            gateway: None,
            dns_server: None,
            secondary_dns: DEFAULT_SECONDARY_DNS.to_string(),
            open_firewall_ports: false,
            install_roles: false,
            prepare_disk: false,
            disk_number: 1,
            drive_letter: 'E',
            disk_confirmed: false,
        }
    }
}

impl ServerConfigIntent {
    /// Disk preparation wipes the disk; it only runs after this is called.
    pub fn confirm_disk_preparation(&mut self) {
        self.disk_confirmed = true;
    }

    pub fn disk_confirmed(&self) -> bool {
        self.disk_confirmed
    }

    pub fn is_empty(&self) -> bool {
        !(self.configure_network || self.open_firewall_ports || self.install_roles || self.prepare_disk)
    }
}
