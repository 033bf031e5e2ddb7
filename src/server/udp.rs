//! Single-socket UDP server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type as SocketType};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::pool::{BufferPool, MessagePool};
use crate::server::config::ServerConfig;
use crate::server::handler::{Handler, UdpResponseWriter};
use crate::stats::{NoopStats, Stats};
use crate::worker::WorkerPool;
use crate::{Error, Result};

/// Bind a nonblocking UDP socket, optionally with SO_REUSEPORT
///
/// Must run inside a tokio runtime. SO_REUSEPORT is requested only on
/// platforms that implement per-socket load balancing for it.
pub(crate) fn bind_udp(addr: SocketAddr, reuse_port: bool) -> Result<UdpSocket> {
    let bind = || -> std::io::Result<std::net::UdpSocket> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, SocketType::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
        if reuse_port {
            socket.set_reuse_port(true)?;
        }
        #[cfg(not(all(unix, not(any(target_os = "solaris", target_os = "illumos")))))]
        let _ = reuse_port;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        Ok(socket.into())
    };
    let socket = bind().map_err(|source| Error::Listen { addr, source })?;
    UdpSocket::from_std(socket).map_err(|source| Error::Listen { addr, source })
}

/// A UDP DNS server on one socket
///
/// Each received datagram is moved into a pooled [`Message`](crate::dns::Message)
/// without copying, parsed, and dispatched to the handler on a pooled
/// worker. Malformed datagrams are dropped; no response is sent for
/// them.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use fastdns::server::{DefaultHandler, ServerConfig, UdpServer};
///
/// # async fn run() -> fastdns::Result<()> {
/// let config = ServerConfig::new().with_addr("0.0.0.0:53".parse().unwrap());
/// let server = UdpServer::new(Arc::new(DefaultHandler), config)?;
/// server.run().await
/// # }
/// ```
pub struct UdpServer {
    socket: Arc<UdpSocket>,
    local: SocketAddr,
    handler: Arc<dyn Handler>,
    stats: Arc<dyn Stats>,
    workers: WorkerPool,
    buffers: Arc<BufferPool>,
    messages: Arc<MessagePool>,
    config: ServerConfig,
}

impl UdpServer {
    /// Bind the configured address and build a server around it
    ///
    /// # Errors
    ///
    /// `Config` for an invalid configuration, `Listen` when the socket
    /// cannot be bound.
    pub fn new(handler: Arc<dyn Handler>, config: ServerConfig) -> Result<Self> {
        config.validate()?;
        let socket = bind_udp(config.addr, config.reuse_port)?;
        let local = socket.local_addr()?;
        Ok(UdpServer {
            socket: Arc::new(socket),
            local,
            handler,
            stats: Arc::new(NoopStats),
            workers: WorkerPool::new(config.max_workers, config.worker_idle_timeout),
            buffers: Arc::new(BufferPool::new()),
            messages: Arc::new(MessagePool::new()),
            config,
        })
    }

    /// Replace the statistics collaborator
    pub fn with_stats(mut self, stats: Arc<dyn Stats>) -> Self {
        self.stats = stats;
        self
    }

    /// The address the server is bound to
    ///
    /// Differs from the configured address when port zero was requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Receive and dispatch datagrams until the socket fails permanently
    ///
    /// Transient read errors are logged and retried after a short pause;
    /// this future completes only by error propagation from the runtime
    /// shutting the socket down.
    pub async fn run(&self) -> Result<()> {
        info!(addr = %self.local, "udp dns server listening");
        loop {
            let mut buf = self.buffers.get();
            buf.resize(self.config.max_udp_size, 0);

            match self.socket.recv_from(&mut buf).await {
                Ok((len, peer)) => {
                    buf.truncate(len);
                    self.dispatch(buf, peer);
                }
                Err(err) => {
                    warn!(error = %err, "udp read failed");
                    self.buffers.put(buf);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }

    /// Hand one datagram to the handler on a pooled worker
    fn dispatch(&self, mut buf: Vec<u8>, peer: SocketAddr) {
        let socket = Arc::clone(&self.socket);
        let local = self.local;
        let handler = Arc::clone(&self.handler);
        let stats = Arc::clone(&self.stats);
        let buffers = Arc::clone(&self.buffers);
        let messages = Arc::clone(&self.messages);

        self.workers.submit(async move {
            let mut msg = messages.get();
            // Take ownership of the datagram bytes; the emptied buffer
            // goes straight back to its pool.
            std::mem::swap(&mut msg.raw, &mut buf);
            buffers.put(buf);

            match msg.parse_in_place() {
                Ok(()) => {
                    let start = Instant::now();
                    let mut rw = UdpResponseWriter::new(socket, local, peer);
                    handler.serve_dns(&mut rw, &mut msg).await;
                    stats.update_stats(peer, &msg, start.elapsed());
                }
                Err(err) => {
                    debug!(%peer, error = %err, "dropping malformed datagram");
                }
            }
            messages.put(msg);
        });
    }
}

impl std::fmt::Debug for UdpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpServer")
            .field("local", &self.local)
            .field("config", &self.config)
            .finish()
    }
}
