//! Generic remote-execution primitives: local processes, remote transports and network discovery.

pub mod credentials;
pub mod discovery;
pub mod powershell;
pub mod process;
pub mod transport;

pub use credentials::{Credentials, Secret};
pub use discovery::{
    discover_directory_servers, scan_subnet, DiscoveryResult, HostProbe, LocalDiscovery,
    PingProbe, ScanOptions, TcpProbe,
};
pub use powershell::Interpreter;
pub use process::{find_executable, CommandSpec, ExecError, ExecutionResult, ProcessExecutor};
pub use transport::{
    Fact, RemoteIdentity, TransportClient, TransportDescriptor, TransportError, TransportKind,
};
