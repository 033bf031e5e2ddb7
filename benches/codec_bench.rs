//! Benchmark for the wire codec hot path
//!
//! Measures parse and answer-append throughput on a reused message and
//! verifies that the steady state performs no heap allocations.
//!
//! Run with: cargo bench --bench codec_bench

use std::alloc::{GlobalAlloc, Layout, System};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use fastdns::dns::{Message, Rcode};

// Global allocator wrapper counting allocations
struct TrackingAlloc {
    alloc_count: AtomicUsize,
}

impl TrackingAlloc {
    const fn new() -> Self {
        Self {
            alloc_count: AtomicUsize::new(0),
        }
    }

    fn reset(&self) {
        self.alloc_count.store(0, Ordering::SeqCst);
    }

    fn count(&self) -> usize {
        self.alloc_count.load(Ordering::SeqCst)
    }
}

unsafe impl GlobalAlloc for TrackingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.alloc_count.fetch_add(1, Ordering::Relaxed);
        unsafe { System.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) }
    }
}

#[global_allocator]
static ALLOC: TrackingAlloc = TrackingAlloc::new();

const QUERY: &[u8] = b"\x00\x02\x81\x00\x00\x01\x00\x00\x00\x00\x00\x00\
                       \x02hk\x04phus\x02lu\x00\x00\x01\x00\x01";

const ITERS: usize = 1_000_000;

fn bench_parse(msg: &mut Message) {
    // Warm up so the internal buffers reach their steady capacity.
    for _ in 0..1000 {
        msg.parse(QUERY).unwrap();
    }

    ALLOC.reset();
    let start = Instant::now();
    for _ in 0..ITERS {
        msg.parse(QUERY).unwrap();
    }
    let elapsed = start.elapsed();
    let allocs = ALLOC.count();

    println!(
        "parse:        {:>6.1} ns/op, {} allocations / {} iterations",
        elapsed.as_nanos() as f64 / ITERS as f64,
        allocs,
        ITERS
    );
    assert_eq!(allocs, 0, "steady-state parse must not allocate");
}

fn bench_append(msg: &mut Message) {
    for _ in 0..1000 {
        msg.parse(QUERY).unwrap();
        msg.set_response_header(Rcode::NoError, 1);
        msg.answer_writer().append_a(300, Ipv4Addr::new(1, 2, 4, 8));
    }

    ALLOC.reset();
    let start = Instant::now();
    for _ in 0..ITERS {
        msg.parse(QUERY).unwrap();
        msg.set_response_header(Rcode::NoError, 1);
        msg.answer_writer().append_a(300, Ipv4Addr::new(1, 2, 4, 8));
    }
    let elapsed = start.elapsed();
    let allocs = ALLOC.count();

    println!(
        "parse+append: {:>6.1} ns/op, {} allocations / {} iterations",
        elapsed.as_nanos() as f64 / ITERS as f64,
        allocs,
        ITERS
    );
    assert_eq!(allocs, 0, "steady-state append must not allocate");
}

fn main() {
    let mut msg = Message::new();
    bench_parse(&mut msg);
    bench_append(&mut msg);
}
