//! End-to-end tests running a UDP server against the client

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;

use fastdns::client::Client;
use fastdns::dns::{Class, Message, Rcode, Type};
use fastdns::server::{Handler, ResponseWriter, ServerConfig, UdpServer};
use fastdns::stats::Stats;

/// Answers `hk.phus.lu A` with a fixed address and everything else with
/// NXDOMAIN.
struct StaticHandler;

#[async_trait]
impl Handler for StaticHandler {
    async fn serve_dns(&self, rw: &mut dyn ResponseWriter, req: &mut Message) {
        if req.domain() == b"hk.phus.lu" && req.question.qtype == Type::A {
            req.set_response_header(Rcode::NoError, 1);
            req.answer_writer().append_a(300, Ipv4Addr::new(1, 2, 4, 8));
        } else {
            req.set_response_header(Rcode::NXDomain, 0);
        }
        let _ = rw.write(&req.raw).await;
    }
}

static TRACING: Once = Once::new();

/// Install a log subscriber once for the whole test binary; set
/// `RUST_LOG` to see server output while debugging a failure.
fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn test_config() -> ServerConfig {
    init_tracing();
    ServerConfig::new().with_addr("127.0.0.1:0".parse().unwrap())
}

/// Start a server and return its bound address.
fn start_server(server: UdpServer) -> SocketAddr {
    let addr = server.local_addr();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    addr
}

fn query(domain: &str) -> Message {
    let mut req = Message::new();
    req.set_question(domain, Type::A, Class::IN);
    req
}

#[tokio::test]
async fn test_exchange_end_to_end() {
    let server = UdpServer::new(Arc::new(StaticHandler), test_config()).unwrap();
    let addr = start_server(server);

    let client = Client::new(addr);
    let req = query("hk.phus.lu");
    let mut resp = Message::new();
    client.exchange(&req, &mut resp).await.unwrap();

    assert_eq!(resp.header.id, req.header.id);
    assert!(resp.header.flags.qr());
    assert_eq!(resp.header.flags.rcode(), Rcode::NoError);
    assert_eq!(resp.header.ancount, 1);
    assert_eq!(resp.domain(), b"hk.phus.lu");

    let records: Vec<_> = resp.records().collect::<fastdns::Result<_>>().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].rtype, Type::A);
    assert_eq!(records[0].ttl, 300);
    assert_eq!(records[0].rdata, &[1, 2, 4, 8]);
}

#[tokio::test]
async fn test_nxdomain_is_bare_header() {
    let server = UdpServer::new(Arc::new(StaticHandler), test_config()).unwrap();
    let addr = start_server(server);

    let req = query("nonexistent.example.com");
    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    sock.send_to(&req.raw, addr).await.unwrap();

    let mut buf = vec![0u8; 512];
    let (n, _) = tokio::time::timeout(Duration::from_secs(2), sock.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();

    // Non-success responses carry only the 12-byte header.
    assert_eq!(n, 12);
    assert_eq!(&buf[0..2], &req.header.id.to_be_bytes());
    assert_eq!(buf[2] & 0x80, 0x80);
    assert_eq!(buf[3] & 0x0F, Rcode::NXDomain.to_u8());
    assert_eq!(&buf[4..12], &[0; 8]);
}

#[tokio::test]
async fn test_malformed_datagram_is_dropped() {
    let server = UdpServer::new(Arc::new(StaticHandler), test_config()).unwrap();
    let addr = start_server(server);

    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    sock.send_to(b"\x00\x01\x02", addr).await.unwrap();

    let mut buf = vec![0u8; 512];
    let reply = tokio::time::timeout(Duration::from_millis(200), sock.recv_from(&mut buf)).await;
    assert!(reply.is_err(), "malformed datagram must not be answered");

    // The server keeps serving after the bad datagram.
    let client = Client::new(addr);
    let mut resp = Message::new();
    client.exchange(&query("hk.phus.lu"), &mut resp).await.unwrap();
    assert_eq!(resp.header.ancount, 1);
}

struct CountingStats {
    requests: AtomicUsize,
}

impl Stats for CountingStats {
    fn update_stats(&self, _addr: SocketAddr, _msg: &Message, _duration: Duration) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }

    fn append_open_metrics(&self, mut buf: Vec<u8>) -> Vec<u8> {
        buf.extend_from_slice(
            format!(
                "dns_requests_total {}\n",
                self.requests.load(Ordering::SeqCst)
            )
            .as_bytes(),
        );
        buf
    }
}

#[tokio::test]
async fn test_stats_sees_every_request() {
    let stats = Arc::new(CountingStats {
        requests: AtomicUsize::new(0),
    });
    let server = UdpServer::new(Arc::new(StaticHandler), test_config())
        .unwrap()
        .with_stats(Arc::clone(&stats) as Arc<dyn Stats>);
    let addr = start_server(server);

    let client = Client::new(addr);
    let mut resp = Message::new();
    client.exchange(&query("hk.phus.lu"), &mut resp).await.unwrap();
    client.exchange(&query("hk.phus.lu"), &mut resp).await.unwrap();

    // Stats are recorded after the response is written; let the worker
    // finish before checking.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(stats.requests.load(Ordering::SeqCst), 2);
    let body = stats.append_open_metrics(Vec::new());
    assert_eq!(body, b"dns_requests_total 2\n");
}

#[tokio::test]
async fn test_concurrent_clients() {
    let server = UdpServer::new(Arc::new(StaticHandler), test_config()).unwrap();
    let addr = start_server(server);

    let mut tasks = Vec::new();
    for _ in 0..32 {
        tasks.push(tokio::spawn(async move {
            let client = Client::new(addr);
            let req = query("hk.phus.lu");
            let mut resp = Message::new();
            client.exchange(&req, &mut resp).await.unwrap();
            assert_eq!(resp.header.id, req.header.id);
            assert_eq!(resp.header.ancount, 1);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
}
