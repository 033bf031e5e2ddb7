//! fastdns - a zero-allocation DNS engine in Rust
//!
//! This crate provides an RFC 1035 (+EDNS0) wire-format codec that parses
//! and builds messages directly against byte buffers, together with the
//! concurrency infrastructure needed to drive it at high request rates.
//!
//! # Architecture
//!
//! The crate is organized into several main modules:
//!
//! - `dns`: DNS protocol implementation (parsing, serialization, name
//!   compression, resource-record and EDNS option cursors)
//! - `pool`: reusable buffer and message pools with a retained-capacity cap
//! - `worker`: a bounded pool of reusable execution units for dispatch
//! - `client`: UDP client with pooled sockets and single-retry exchange
//! - `server`: UDP server and prefork multi-process server
//! - `stats`: the statistics collaborator boundary
//! - `error`: error types and handling
//!
//! # Example
//!
//! Parse a query and append an answer:
//!
//! ```
//! use fastdns::dns::{Message, Rcode};
//! use std::net::Ipv4Addr;
//!
//! let query = b"\x00\x02\x81\x00\x00\x01\x00\x00\x00\x00\x00\x00\
//!               \x02hk\x04phus\x02lu\x00\x00\x01\x00\x01";
//!
//! let mut msg = Message::new();
//! msg.parse(query)?;
//! assert_eq!(msg.domain(), b"hk.phus.lu");
//!
//! msg.set_response_header(Rcode::NoError, 1);
//! msg.answer_writer().append_a(300, Ipv4Addr::new(1, 2, 4, 8));
//! # Ok::<(), fastdns::Error>(())
//! ```

/// DNS protocol implementation
///
/// This module provides DNS message parsing, serialization, and core DNS types.
pub mod dns;

/// Buffer and message pools
pub mod pool;

/// Reusable worker pool for datagram dispatch
pub mod worker;

/// UDP DNS client
pub mod client;

/// DNS server implementations
///
/// Includes the single-socket UDP server and the prefork multi-process server.
pub mod server;

/// Statistics collaborator boundary
pub mod stats;

/// Error types and handling
///
/// Provides unified error types for the entire crate.
pub mod error {
    use std::net::SocketAddr;
    use thiserror::Error;

    /// Main error type for fastdns
    #[derive(Error, Debug)]
    pub enum Error {
        // ============ Wire Format Errors ============
        /// Malformed or truncated message header, or QDCOUNT != 1
        #[error("invalid dns header")]
        InvalidHeader,

        /// Malformed question section
        #[error("invalid dns question")]
        InvalidQuestion,

        /// Malformed resource record, including rejected compression pointers
        #[error("invalid dns answer")]
        InvalidAnswer,

        /// Malformed EDNS option inside an OPT record
        #[error("invalid edns option")]
        InvalidOption,

        // ============ Client Errors ============
        /// Connection pool exhausted
        #[error("connection pool exhausted ({max_conns} connections)")]
        MaxConns {
            /// The configured pool bound
            max_conns: usize,
        },

        /// Read deadline elapsed while waiting for a reply
        #[error("read timeout from {addr} after {timeout_ms}ms")]
        Timeout {
            /// The upstream address
            addr: SocketAddr,
            /// Deadline in milliseconds
            timeout_ms: u64,
        },

        // ============ Server Errors ============
        /// Socket could not be bound
        #[error("failed to listen on {addr}: {source}")]
        Listen {
            /// The listen address
            addr: SocketAddr,
            /// The underlying bind error
            source: std::io::Error,
        },

        /// Prefork children crashed more times than the supervisor allows
        #[error("child process restart limit reached ({restarts} restarts)")]
        RestartLimit {
            /// Cumulative restart count at the time of failure
            restarts: u32,
        },

        // ============ Generic Errors ============
        /// IO error
        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),

        /// Configuration error
        #[error("configuration error: {0}")]
        Config(String),
    }
}

pub use error::Error;

/// Result type alias using the crate error type
pub type Result<T> = std::result::Result<T, Error>;
