//! Prefork multi-process server
//!
//! The parent process re-executes its own binary once per desired
//! process, tagging each child with an index through an environment
//! variable. Children bind the same address with SO_REUSEPORT, pin
//! themselves to a CPU core and serve; the parent supervises, restarting
//! crashed children until a cumulative restart budget runs out.

use std::path::Path;
use std::process::ExitStatus;
use std::sync::Arc;

use tokio::process::Command;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::server::config::ServerConfig;
use crate::server::handler::Handler;
use crate::server::udp::UdpServer;
use crate::stats::{NoopStats, Stats};
use crate::{Error, Result};

/// Environment variable carrying a child's 1-based process index
///
/// Absent (or zero) in the parent process.
pub const CHILD_INDEX_ENV: &str = "FASTDNS_CHILD_INDEX";

/// The process index of the current process
///
/// Zero in the parent, 1-based in prefork children.
pub fn child_index() -> usize {
    parse_child_index(std::env::var(CHILD_INDEX_ENV).ok().as_deref())
}

fn parse_child_index(value: Option<&str>) -> usize {
    value.and_then(|v| v.parse().ok()).unwrap_or(0)
}

/// A prefork supervisor around [`UdpServer`]
///
/// [`run`](ForkServer::run) behaves according to the process it finds
/// itself in: children serve, a parent configured for more than one
/// process supervises, and everything else degrades to a plain
/// single-process server. Call it from `main` with the same
/// configuration in every process.
pub struct ForkServer {
    handler: Arc<dyn Handler>,
    stats: Arc<dyn Stats>,
    config: ServerConfig,
}

impl ForkServer {
    /// Create a prefork server
    pub fn new(handler: Arc<dyn Handler>, config: ServerConfig) -> Self {
        ForkServer {
            handler,
            stats: Arc::new(NoopStats),
            config,
        }
    }

    /// Replace the statistics collaborator
    pub fn with_stats(mut self, stats: Arc<dyn Stats>) -> Self {
        self.stats = stats;
        self
    }

    /// Serve or supervise, depending on the current process
    ///
    /// # Errors
    ///
    /// Children propagate server errors; the parent returns
    /// `RestartLimit` once the restart budget is exhausted, or the IO
    /// error that kept a child from spawning at all.
    pub async fn run(&self) -> Result<()> {
        let index = child_index();
        if index > 0 {
            return self.run_child(index).await;
        }

        let procs = effective_max_procs(self.config.max_procs);
        if procs <= 1 {
            let server = UdpServer::new(Arc::clone(&self.handler), self.config.clone())?
                .with_stats(Arc::clone(&self.stats));
            return server.run().await;
        }
        self.run_parent(procs).await
    }

    async fn run_child(&self, index: usize) -> Result<()> {
        pin_to_cpu(index);
        let config = self.config.clone().with_reuse_port(true);
        let server =
            UdpServer::new(Arc::clone(&self.handler), config)?.with_stats(Arc::clone(&self.stats));
        info!(child = index, addr = %server.local_addr(), "prefork child serving");
        server.run().await
    }

    async fn run_parent(&self, procs: usize) -> Result<()> {
        let exe = std::env::current_exe()?;
        info!(procs, addr = %self.config.addr, "prefork parent supervising");

        let mut children: JoinSet<(usize, std::io::Result<ExitStatus>)> = JoinSet::new();
        for index in 1..=procs {
            spawn_child(&mut children, &exe, index)?;
        }

        let mut restarts: u32 = 0;
        while let Some(joined) = children.join_next().await {
            let (index, status) = match joined {
                Ok(v) => v,
                Err(err) => {
                    error!(error = %err, "child waiter task failed");
                    continue;
                }
            };
            warn!(child = index, ?status, "prefork child exited");

            restarts += 1;
            if restarts > self.config.max_restarts {
                return Err(Error::RestartLimit { restarts });
            }
            spawn_child(&mut children, &exe, index)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ForkServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForkServer")
            .field("config", &self.config)
            .finish()
    }
}

/// Re-execute the current binary as child number `index`
///
/// The child inherits this process's arguments and environment, plus
/// [`CHILD_INDEX_ENV`].
fn spawn_child(
    children: &mut JoinSet<(usize, std::io::Result<ExitStatus>)>,
    exe: &Path,
    index: usize,
) -> Result<()> {
    let mut child = Command::new(exe)
        .args(std::env::args().skip(1))
        .env(CHILD_INDEX_ENV, index.to_string())
        .spawn()?;
    children.spawn(async move { (index, child.wait().await) });
    Ok(())
}

/// Resolve the number of prefork processes to actually run
///
/// Zero asks for one process per CPU core. Platforms without
/// SO_REUSEPORT load balancing cannot share the port, so they always
/// get a single process.
fn effective_max_procs(max_procs: usize) -> usize {
    if cfg!(not(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))) {
        return 1;
    }
    if max_procs == 0 {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    } else {
        max_procs
    }
}

/// Pin the current process to the core matching its child index
fn pin_to_cpu(index: usize) {
    let Some(cores) = core_affinity::get_core_ids() else {
        return;
    };
    if cores.is_empty() {
        return;
    }
    let core = cores[(index - 1) % cores.len()];
    if !core_affinity::set_for_current(core) {
        warn!(child = index, core = core.id, "failed to pin to cpu core");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_index_defaults_to_parent() {
        // Unset in the test runner: we are the parent. Read-only; the
        // parsing itself is covered without touching the environment.
        assert_eq!(child_index(), 0);
    }

    #[test]
    fn test_parse_child_index() {
        assert_eq!(parse_child_index(None), 0);
        assert_eq!(parse_child_index(Some("3")), 3);
        assert_eq!(parse_child_index(Some("0")), 0);
        assert_eq!(parse_child_index(Some("not-a-number")), 0);
        assert_eq!(parse_child_index(Some("")), 0);
    }

    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    #[test]
    fn test_effective_max_procs() {
        assert_eq!(effective_max_procs(4), 4);
        assert!(effective_max_procs(0) >= 1);
    }

    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    #[test]
    fn test_pin_to_cpu_wraps_core_list() {
        // Indexes far past the core count must still resolve to a core.
        pin_to_cpu(10_000);
    }
}
