//! Bounded pool of reusable execution units
//!
//! Spawning a task per datagram churns through allocations at high
//! request rates. [`WorkerPool`] keeps a stack of long-lived tasks that
//! park between jobs and are handed work over a one-slot channel, so the
//! steady-state dispatch path allocates nothing. Workers idle longer
//! than the configured timeout retire themselves, and load beyond the
//! pool ceiling spills over to plain task spawning rather than queueing.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

const IDLE: u8 = 0;
const BUSY: u8 = 1;
const RETIRED: u8 = 2;

/// Handle to one parked worker task
///
/// The tri-state `state` arbitrates between a submitter claiming the
/// worker and the worker retiring itself: whichever side wins the
/// compare-and-swap out of `IDLE` owns the transition.
#[derive(Clone)]
struct WorkerHandle {
    state: Arc<AtomicU8>,
    tx: mpsc::Sender<Job>,
}

struct Shared {
    free: Mutex<Vec<WorkerHandle>>,
    active: AtomicUsize,
    max_workers: usize,
    idle_timeout: Duration,
}

/// A pool of reusable worker tasks
///
/// [`submit`](WorkerPool::submit) prefers handing the job to a parked
/// worker, spawns a new long-lived worker while under the ceiling, and
/// falls back to a one-shot `tokio::spawn` beyond it. Jobs are never
/// queued behind each other.
pub struct WorkerPool {
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// Create a pool with at most `max_workers` long-lived workers
    ///
    /// Workers idle for longer than `idle_timeout` exit and release
    /// their slot. A ceiling of zero disables long-lived workers
    /// entirely; every job is then spawned directly.
    pub fn new(max_workers: usize, idle_timeout: Duration) -> Self {
        WorkerPool {
            shared: Arc::new(Shared {
                free: Mutex::new(Vec::new()),
                active: AtomicUsize::new(0),
                max_workers,
                idle_timeout,
            }),
        }
    }

    /// Number of live worker tasks, parked or busy
    pub fn active_workers(&self) -> usize {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Run `fut` on a pooled worker
    ///
    /// Never blocks and never queues: a parked worker is claimed if one
    /// exists, a new worker is started while the pool is under its
    /// ceiling, and otherwise the job runs as a plain spawned task.
    pub fn submit<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut job: Job = Box::pin(fut);

        // Pop parked workers until one accepts the claim. Retired
        // entries linger in the free list until discarded here.
        loop {
            let worker = self.shared.free.lock().pop();
            let Some(worker) = worker else { break };
            if worker
                .state
                .compare_exchange(IDLE, BUSY, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                continue;
            }
            match worker.tx.try_send(job) {
                Ok(()) => return,
                // Worker task is gone; recover the job and keep looking.
                Err(err) => job = err.into_inner(),
            }
        }

        if self.shared.active.load(Ordering::Acquire) < self.shared.max_workers {
            self.spawn_worker(job);
        } else {
            trace!("worker pool ceiling reached, spawning one-shot task");
            tokio::spawn(job);
        }
    }

    fn spawn_worker(&self, first: Job) {
        let shared = Arc::clone(&self.shared);
        shared.active.fetch_add(1, Ordering::AcqRel);

        let (tx, rx) = mpsc::channel(1);
        let handle = WorkerHandle {
            state: Arc::new(AtomicU8::new(BUSY)),
            tx,
        };
        tokio::spawn(worker_loop(shared, handle, rx, first));
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("max_workers", &self.shared.max_workers)
            .field("idle_timeout", &self.shared.idle_timeout)
            .field("active", &self.shared.active.load(Ordering::Relaxed))
            .finish()
    }
}

async fn worker_loop(
    shared: Arc<Shared>,
    handle: WorkerHandle,
    mut rx: mpsc::Receiver<Job>,
    first: Job,
) {
    let mut job = Some(first);
    'run: loop {
        if let Some(j) = job.take() {
            j.await;
        }

        // Park: publish ourselves back to the free list, then wait for
        // either a claim or the idle deadline.
        handle.state.store(IDLE, Ordering::Release);
        shared.free.lock().push(handle.clone());

        tokio::select! {
            next = rx.recv() => match next {
                Some(j) => job = Some(j),
                None => break 'run,
            },
            _ = tokio::time::sleep(shared.idle_timeout) => {
                if handle
                    .state
                    .compare_exchange(IDLE, RETIRED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    break 'run;
                }
                // A submitter claimed us as the deadline fired; its job
                // is already in flight on the channel.
                match rx.recv().await {
                    Some(j) => job = Some(j),
                    None => break 'run,
                }
            }
        }
    }
    shared.active.fetch_sub(1, Ordering::AcqRel);
}
