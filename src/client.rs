//! UDP DNS client
//!
//! [`Client`] exchanges queries with one upstream over connected UDP
//! sockets. The default transport keeps a free list of sockets with an
//! optional hard bound; [`with_mux`](Client::with_mux) switches to a
//! fixed ring of shared sockets better suited to very high concurrency.
//! Every exchange that fails is retried exactly once on a fresh socket.

use std::net::SocketAddr;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::net::UdpSocket;
use tracing::debug;

use crate::dns::Message;
use crate::{Error, Result};

/// Number of socket slots in the mux transport
const MUX_SLOTS: usize = 64;

/// Largest reply a single exchange will accept
const MAX_REPLY_SIZE: usize = 65535;

/// Default read deadline for one exchange attempt
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// A UDP DNS client bound to one upstream address
///
/// # Example
///
/// ```no_run
/// use fastdns::client::Client;
/// use fastdns::dns::{Class, Message, Type};
///
/// # async fn run() -> fastdns::Result<()> {
/// let client = Client::new("8.8.8.8:53".parse().unwrap());
///
/// let mut req = Message::new();
/// req.set_question("hk.phus.lu", Type::A, Class::IN);
///
/// let mut resp = Message::new();
/// client.exchange(&req, &mut resp).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Client {
    addr: SocketAddr,
    read_timeout: Duration,
    transport: Transport,
}

#[derive(Debug)]
enum Transport {
    Pooled(ConnPool),
    Mux(MuxRing),
}

impl Client {
    /// Create a client for `addr` with a socket pool and no pool bound
    pub fn new(addr: SocketAddr) -> Self {
        Client {
            addr,
            read_timeout: DEFAULT_READ_TIMEOUT,
            transport: Transport::Pooled(ConnPool::new(0)),
        }
    }

    /// Set the per-attempt read deadline
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Bound the socket pool to `max_conns` sockets
    ///
    /// Zero leaves the pool unbounded. When the bound is reached and no
    /// pooled socket is free, exchanges fail with [`Error::MaxConns`]
    /// instead of dialing further sockets.
    pub fn with_max_conns(mut self, max_conns: usize) -> Self {
        self.transport = Transport::Pooled(ConnPool::new(max_conns));
        self
    }

    /// Switch to the multiplexed transport
    ///
    /// Exchanges then share a fixed ring of sockets instead of
    /// acquiring a private socket each, trading per-request isolation
    /// for a hard cap on descriptor usage.
    pub fn with_mux(mut self) -> Self {
        self.transport = Transport::Mux(MuxRing::new());
        self
    }

    /// Send `req` upstream and parse the reply into `resp`
    ///
    /// A failed attempt, timeout included, is retried exactly once on a
    /// freshly dialed socket before the error is surfaced. `MaxConns`
    /// is the one exception: pool exhaustion is surfaced immediately,
    /// since a retry would dial another counted socket and fail the
    /// same bound check.
    ///
    /// # Errors
    ///
    /// `Timeout` when neither attempt sees a reply within the read
    /// deadline, `MaxConns` when the socket pool is exhausted, wire
    /// format errors when the reply does not parse, or the underlying
    /// IO error.
    pub async fn exchange(&self, req: &Message, resp: &mut Message) -> Result<()> {
        match self.attempt(req, resp, false).await {
            Ok(()) => Ok(()),
            Err(Error::MaxConns { max_conns }) => Err(Error::MaxConns { max_conns }),
            Err(err) => {
                debug!(addr = %self.addr, error = %err, "dns exchange failed, retrying on a fresh socket");
                self.attempt(req, resp, true).await
            }
        }
    }

    async fn attempt(&self, req: &Message, resp: &mut Message, fresh: bool) -> Result<()> {
        match &self.transport {
            Transport::Pooled(pool) => {
                let sock = if fresh {
                    pool.dial_counted(self.addr).await?
                } else {
                    pool.acquire(self.addr).await?
                };
                match self.roundtrip(&sock, req, resp).await {
                    Ok(()) => {
                        pool.release(sock);
                        Ok(())
                    }
                    Err(err) => {
                        pool.discard(sock);
                        Err(err)
                    }
                }
            }
            Transport::Mux(ring) => {
                let mut slot = ring.pick().await;
                // A slot that failed an exchange is empty by now, so a
                // retry dials fresh here without ever closing a healthy
                // socket held in some other slot.
                if slot.is_none() {
                    *slot = Some(dial(self.addr).await?);
                }
                let sock = match slot.as_ref() {
                    Some(sock) => sock,
                    None => return Err(Error::Config("mux slot empty after dial".into())),
                };
                match self.roundtrip(sock, req, resp).await {
                    Ok(()) => Ok(()),
                    Err(err) => {
                        // A socket that failed an exchange may hold a
                        // stale peer or a late reply; drop it.
                        *slot = None;
                        Err(err)
                    }
                }
            }
        }
    }

    async fn roundtrip(&self, sock: &UdpSocket, req: &Message, resp: &mut Message) -> Result<()> {
        sock.send(&req.raw).await?;

        resp.raw.clear();
        resp.raw.resize(MAX_REPLY_SIZE, 0);
        let n = match tokio::time::timeout(self.read_timeout, sock.recv(&mut resp.raw)).await {
            Ok(res) => res?,
            Err(_) => {
                return Err(Error::Timeout {
                    addr: self.addr,
                    timeout_ms: self.read_timeout.as_millis() as u64,
                })
            }
        };
        resp.raw.truncate(n);
        resp.parse_in_place()
    }
}

async fn dial(addr: SocketAddr) -> Result<UdpSocket> {
    let local: SocketAddr = if addr.is_ipv4() {
        ([0, 0, 0, 0], 0).into()
    } else {
        (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let sock = UdpSocket::bind(local).await?;
    sock.connect(addr).await?;
    Ok(sock)
}

/// Free list of connected sockets with an optional hard bound
#[derive(Debug)]
struct ConnPool {
    max_conns: usize,
    state: Mutex<PoolState>,
}

#[derive(Debug, Default)]
struct PoolState {
    free: Vec<UdpSocket>,
    total: usize,
}

impl ConnPool {
    fn new(max_conns: usize) -> Self {
        ConnPool {
            max_conns,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Take a pooled socket, or dial one while under the bound
    async fn acquire(&self, addr: SocketAddr) -> Result<UdpSocket> {
        {
            let mut state = self.state.lock();
            if let Some(sock) = state.free.pop() {
                return Ok(sock);
            }
            if self.max_conns > 0 && state.total >= self.max_conns {
                return Err(Error::MaxConns {
                    max_conns: self.max_conns,
                });
            }
            state.total += 1;
        }
        self.dial_new(addr).await
    }

    /// Dial a fresh socket against the bound, bypassing the free list
    async fn dial_counted(&self, addr: SocketAddr) -> Result<UdpSocket> {
        {
            let mut state = self.state.lock();
            if self.max_conns > 0 && state.total >= self.max_conns {
                return Err(Error::MaxConns {
                    max_conns: self.max_conns,
                });
            }
            state.total += 1;
        }
        self.dial_new(addr).await
    }

    async fn dial_new(&self, addr: SocketAddr) -> Result<UdpSocket> {
        match dial(addr).await {
            Ok(sock) => Ok(sock),
            Err(err) => {
                self.state.lock().total -= 1;
                Err(err)
            }
        }
    }

    fn release(&self, sock: UdpSocket) {
        let mut state = self.state.lock();
        if self.max_conns > 0 && state.free.len() >= self.max_conns {
            // Over the bound: close the socket instead of keeping it.
            state.total -= 1;
            return;
        }
        state.free.push(sock);
    }

    fn discard(&self, sock: UdpSocket) {
        drop(sock);
        self.state.lock().total -= 1;
    }
}

/// Fixed ring of shared sockets guarded by async locks
///
/// Picks a random slot and tries to take it without waiting; when that
/// slot is busy it falls back to waiting on a second random slot, which
/// spreads contention across the ring under load.
struct MuxRing {
    slots: Vec<tokio::sync::Mutex<Option<UdpSocket>>>,
}

impl MuxRing {
    fn new() -> Self {
        MuxRing {
            slots: (0..MUX_SLOTS).map(|_| tokio::sync::Mutex::new(None)).collect(),
        }
    }

    async fn pick(&self) -> tokio::sync::MutexGuard<'_, Option<UdpSocket>> {
        let first = rand::thread_rng().gen_range(0..self.slots.len());
        if let Ok(guard) = self.slots[first].try_lock() {
            return guard;
        }
        let second = rand::thread_rng().gen_range(0..self.slots.len());
        self.slots[second].lock().await
    }
}

impl std::fmt::Debug for MuxRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MuxRing")
            .field("slots", &self.slots.len())
            .finish()
    }
}
