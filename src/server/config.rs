//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::{Error, Result};

/// Smallest datagram size a server may be configured to read
pub const MIN_UDP_SIZE: usize = 512;

/// Largest datagram size a server may be configured to read
pub const MAX_UDP_SIZE: usize = 65535;

/// Configuration for [`UdpServer`](crate::server::UdpServer) and
/// [`ForkServer`](crate::server::ForkServer)
///
/// # Example
///
/// ```
/// use fastdns::server::ServerConfig;
///
/// let config = ServerConfig::new()
///     .with_addr("0.0.0.0:53".parse().unwrap())
///     .with_max_workers(2048)
///     .with_max_procs(4);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address
    pub addr: SocketAddr,
    /// Largest datagram accepted from clients
    pub max_udp_size: usize,
    /// Ceiling on long-lived dispatch workers
    pub max_workers: usize,
    /// Idle time after which a dispatch worker retires
    pub worker_idle_timeout: Duration,
    /// Bind with SO_REUSEPORT so multiple processes can share the port
    pub reuse_port: bool,
    /// Number of server processes; zero means one per CPU core
    ///
    /// Only honored by [`ForkServer`](crate::server::ForkServer); on
    /// platforms without SO_REUSEPORT it is forced to one.
    pub max_procs: usize,
    /// Cumulative child restarts tolerated before the supervisor gives up
    pub max_restarts: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            addr: ([127, 0, 0, 1], 5353).into(),
            max_udp_size: crate::dns::edns::UDP_PAYLOAD_SIZE as usize,
            max_workers: 1024,
            worker_idle_timeout: Duration::from_secs(10),
            reuse_port: false,
            max_procs: 0,
            max_restarts: 200,
        }
    }
}

impl ServerConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the listen address
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    /// Set the largest accepted datagram size
    pub fn with_max_udp_size(mut self, size: usize) -> Self {
        self.max_udp_size = size;
        self
    }

    /// Set the dispatch worker ceiling
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Set the dispatch worker idle timeout
    pub fn with_worker_idle_timeout(mut self, timeout: Duration) -> Self {
        self.worker_idle_timeout = timeout;
        self
    }

    /// Bind with SO_REUSEPORT
    pub fn with_reuse_port(mut self, reuse_port: bool) -> Self {
        self.reuse_port = reuse_port;
        self
    }

    /// Set the number of prefork processes (zero for one per core)
    pub fn with_max_procs(mut self, max_procs: usize) -> Self {
        self.max_procs = max_procs;
        self
    }

    /// Set the cumulative child restart budget
    pub fn with_max_restarts(mut self, max_restarts: u32) -> Self {
        self.max_restarts = max_restarts;
        self
    }

    /// Check the configuration for impossible values
    ///
    /// # Errors
    ///
    /// `Config` when the datagram size falls outside
    /// [`MIN_UDP_SIZE`]..=[`MAX_UDP_SIZE`].
    pub fn validate(&self) -> Result<()> {
        if self.max_udp_size < MIN_UDP_SIZE || self.max_udp_size > MAX_UDP_SIZE {
            return Err(Error::Config(format!(
                "max_udp_size {} outside {}..={}",
                self.max_udp_size, MIN_UDP_SIZE, MAX_UDP_SIZE
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.max_udp_size, 1232);
        assert_eq!(config.max_workers, 1024);
        assert_eq!(config.max_restarts, 200);
        assert_eq!(config.max_procs, 0);
        assert!(!config.reuse_port);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = ServerConfig::new()
            .with_addr("0.0.0.0:53".parse().unwrap())
            .with_max_udp_size(4096)
            .with_max_workers(16)
            .with_worker_idle_timeout(Duration::from_secs(1))
            .with_reuse_port(true)
            .with_max_procs(2)
            .with_max_restarts(10);
        assert_eq!(config.addr.port(), 53);
        assert_eq!(config.max_udp_size, 4096);
        assert!(config.reuse_port);
        assert_eq!(config.max_procs, 2);
    }

    #[test]
    fn test_validate_rejects_tiny_udp_size() {
        let config = ServerConfig::new().with_max_udp_size(100);
        assert!(config.validate().is_err());
    }
}
