/*!
 * Connection Configuration
 *
 * Where to connect and how the connection's I/O thread is sized.
 */

use std::fmt;
use std::path::PathBuf;

/// Default Redis port
pub const DEFAULT_PORT: u16 = 6379;

/// Default ceiling on connection-wide unanswered commands
pub const DEFAULT_MAX_IN_FLIGHT: usize = 1000;

/// Size of the reactor's socket read buffer
pub const READ_BUF: usize = 4096;

/// Server endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// TCP host name or IP plus port
    Tcp { host: String, port: u16 },
    /// Unix domain socket path
    Unix(PathBuf),
}

impl Address {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Address::Tcp {
            host: host.into(),
            port,
        }
    }

    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Address::Unix(path.into())
    }

    /// Parse `host:port`, a bare host (default port) or a `unix:` path
    pub fn parse(s: &str) -> Self {
        if let Some(path) = s.strip_prefix("unix:") {
            return Address::unix(path);
        }
        match s.rsplit_once(':') {
            Some((host, port)) => match port.parse::<u16>() {
                Ok(port) => Address::tcp(host, port),
                Err(_) => Address::tcp(s, DEFAULT_PORT),
            },
            None => Address::tcp(s, DEFAULT_PORT),
        }
    }

    pub fn is_unix(&self) -> bool {
        matches!(self, Address::Unix(_))
    }
}

impl Default for Address {
    fn default() -> Self {
        Address::tcp("127.0.0.1", DEFAULT_PORT)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Tcp { host, port } => write!(f, "{}:{}", host, port),
            Address::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Configuration for a [`Connection`](crate::Connection)
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server endpoint
    pub address: Address,
    /// Maximum commands sent but not yet answered, across all batches
    pub max_in_flight: usize,
    /// Bytes read from the socket per read call
    pub read_buffer: usize,
    /// Capacity of the reactor's event list
    pub event_capacity: usize,
    /// Set TCP_NODELAY on TCP connections
    pub nodelay: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            address: Address::default(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            read_buffer: READ_BUF,
            event_capacity: 1024,
            nodelay: true,
        }
    }
}

impl ConnectionConfig {
    pub fn new(address: Address) -> Self {
        ConnectionConfig {
            address,
            ..Default::default()
        }
    }

    pub fn max_in_flight(mut self, n: usize) -> Self {
        self.max_in_flight = n.max(1);
        self
    }
}
