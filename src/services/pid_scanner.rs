use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::error::WatchError;
use crate::models::Pid;
use crate::services::proc_fs::ProcFs;

pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Yields every PID of the process table once, on first appearance.
///
/// Seen PIDs are remembered so later passes only return newcomers. The
/// memory is pruned of exited PIDs at most every `cleanup_interval`, so it
/// stays bounded by live plus recently seen processes.
#[derive(Debug)]
pub struct PidScanner {
    proc: ProcFs,
    seen: HashSet<Pid>,
    cleanup_interval: Duration,
    last_cleanup: Instant,
}

impl PidScanner {
    pub fn new(proc: ProcFs, cleanup_interval: Duration) -> Self {
        Self {
            proc,
            seen: HashSet::new(),
            cleanup_interval,
            last_cleanup: Instant::now(),
        }
    }

    /// PIDs present now that no earlier pass returned. Empty means nothing
    /// new this time, not that the scanner is exhausted.
    pub fn next_pass(&mut self) -> Result<Vec<Pid>, WatchError> {
        let current = self.proc.list_pids()?;

        let fresh: Vec<Pid> = current.difference(&self.seen).copied().collect();
        self.seen.extend(fresh.iter().copied());

        if self.last_cleanup.elapsed() >= self.cleanup_interval {
            self.prune(&current);
        }

        Ok(fresh)
    }

    fn prune(&mut self, current: &HashSet<Pid>) {
        let before = self.seen_count();
        self.seen.retain(|pid| current.contains(pid));
        self.last_cleanup = Instant::now();
        log::debug!(
            "Pruned {} exited PIDs from scanner memory ({} remain)",
            before - self.seen_count(),
            self.seen_count()
        );
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}
