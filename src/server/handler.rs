//! Request handler and response writer traits

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::debug;

use crate::dns::{Message, Rcode};
use crate::Result;

/// Destination for a DNS response
///
/// Abstracts over the transport so handlers can be exercised in tests
/// without a socket.
#[async_trait]
pub trait ResponseWriter: Send {
    /// Address the request arrived on
    fn local_addr(&self) -> SocketAddr;

    /// Address of the client being answered
    fn remote_addr(&self) -> SocketAddr;

    /// Send a response payload to the client
    async fn write(&mut self, payload: &[u8]) -> Result<usize>;
}

/// Writes responses back over the server's UDP socket
#[derive(Debug)]
pub struct UdpResponseWriter {
    socket: Arc<UdpSocket>,
    local: SocketAddr,
    peer: SocketAddr,
}

impl UdpResponseWriter {
    /// Create a writer answering `peer` over `socket`
    pub fn new(socket: Arc<UdpSocket>, local: SocketAddr, peer: SocketAddr) -> Self {
        UdpResponseWriter {
            socket,
            local,
            peer,
        }
    }
}

#[async_trait]
impl ResponseWriter for UdpResponseWriter {
    fn local_addr(&self) -> SocketAddr {
        self.local
    }

    fn remote_addr(&self) -> SocketAddr {
        self.peer
    }

    async fn write(&mut self, payload: &[u8]) -> Result<usize> {
        Ok(self.socket.send_to(payload, self.peer).await?)
    }
}

/// Collects responses in memory instead of sending them
///
/// Useful for exercising handlers in tests and for callers that want to
/// post-process a response before transmission.
#[derive(Debug)]
pub struct MemResponseWriter {
    /// Everything written so far
    pub data: Vec<u8>,
    local: SocketAddr,
    peer: SocketAddr,
}

impl MemResponseWriter {
    /// Create a writer reporting the given addresses
    pub fn new(local: SocketAddr, peer: SocketAddr) -> Self {
        MemResponseWriter {
            data: Vec::new(),
            local,
            peer,
        }
    }
}

#[async_trait]
impl ResponseWriter for MemResponseWriter {
    fn local_addr(&self) -> SocketAddr {
        self.local
    }

    fn remote_addr(&self) -> SocketAddr {
        self.peer
    }

    async fn write(&mut self, payload: &[u8]) -> Result<usize> {
        self.data.extend_from_slice(payload);
        Ok(payload.len())
    }
}

/// Serves DNS requests
///
/// One handler instance serves every request concurrently; implementors
/// hold shared state behind `Arc` or atomics. The request message
/// arrives parsed and may be rewritten in place into the response.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Answer one request
    ///
    /// Write errors are the implementation's to log; the server does not
    /// inspect the outcome.
    async fn serve_dns(&self, rw: &mut dyn ResponseWriter, req: &mut Message);
}

/// Handler that refuses every query with SERVFAIL
///
/// The fallback wired in when a server is built without a real handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHandler;

#[async_trait]
impl Handler for DefaultHandler {
    async fn serve_dns(&self, rw: &mut dyn ResponseWriter, req: &mut Message) {
        req.set_response_header(Rcode::ServFail, 0);
        if let Err(err) = rw.write(&req.raw).await {
            debug!(peer = %rw.remote_addr(), error = %err, "failed to write response");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{Class, Type, QUESTION_OFFSET};

    fn addr() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn test_mem_writer_accumulates() {
        let mut rw = MemResponseWriter::new(addr(), addr());
        rw.write(b"ab").await.unwrap();
        rw.write(b"cd").await.unwrap();
        assert_eq!(rw.data, b"abcd");
    }

    #[tokio::test]
    async fn test_default_handler_servfail() {
        let mut msg = Message::new();
        msg.set_question("hk.phus.lu", Type::A, Class::IN);
        let raw = msg.raw.clone();
        let mut req = Message::new();
        req.parse(&raw).unwrap();
        let id = req.header.id;

        let mut rw = MemResponseWriter::new(addr(), addr());
        DefaultHandler.serve_dns(&mut rw, &mut req).await;

        // Bare 12-byte header: QR set, SERVFAIL, zeroed counts.
        assert_eq!(rw.data.len(), QUESTION_OFFSET);
        assert_eq!(&rw.data[0..2], &id.to_be_bytes());
        assert_eq!(rw.data[2] & 0x80, 0x80);
        assert_eq!(rw.data[3] & 0x0F, Rcode::ServFail.to_u8());
        assert_eq!(&rw.data[4..12], &[0; 8]);
    }
}
