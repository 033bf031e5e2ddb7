//! Statistics collaborator boundary
//!
//! The server reports every handled request through a [`Stats`]
//! implementation chosen at construction time. The default
//! [`NoopStats`] discards everything, keeping the hot path free of
//! bookkeeping unless a deployment asks for it.

use std::net::SocketAddr;
use std::time::Duration;

use crate::dns::Message;

/// Receives per-request observations from the server
pub trait Stats: Send + Sync {
    /// Record one handled request
    ///
    /// Called after the handler finishes, with the client address, the
    /// request message and the wall-clock handling duration.
    fn update_stats(&self, addr: SocketAddr, msg: &Message, duration: Duration);

    /// Append an OpenMetrics rendering of the collected statistics
    ///
    /// Takes and returns the buffer so implementations can chain onto an
    /// existing exposition body without copying.
    fn append_open_metrics(&self, buf: Vec<u8>) -> Vec<u8>;
}

/// A [`Stats`] implementation that records nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStats;

impl Stats for NoopStats {
    fn update_stats(&self, _addr: SocketAddr, _msg: &Message, _duration: Duration) {}

    fn append_open_metrics(&self, buf: Vec<u8>) -> Vec<u8> {
        buf
    }
}
