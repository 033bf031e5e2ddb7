//! DNS server implementations
//!
//! [`UdpServer`] serves a single socket, dispatching each datagram to a
//! [`Handler`] through a worker pool. [`ForkServer`] wraps it in a
//! prefork supervisor: the parent re-executes itself once per CPU core
//! and the children share the port via SO_REUSEPORT.

pub mod config;
pub mod handler;
pub mod prefork;
pub mod udp;

pub use config::ServerConfig;
pub use handler::{DefaultHandler, Handler, MemResponseWriter, ResponseWriter, UdpResponseWriter};
pub use prefork::ForkServer;
pub use udp::UdpServer;
