use chrono::Local;
use std::fmt::Write as _;
use std::io::{self, BufRead};

use crate::error::WatchError;
use crate::models::{Liveness, MemoryField, MemoryStats, Pid, ProcessSnapshot};
use crate::services::proc_fs::ProcFs;

const TIME_FORMAT: &str = "%a, %b %d %H:%M:%S";

/// A watched process backed by its `/proc/<pid>` entry.
#[derive(Debug)]
pub struct ProcessInfo {
    proc: ProcFs,
    snapshot: ProcessSnapshot,
}

impl ProcessInfo {
    /// Reads the metadata of `pid` and takes a first memory reading.
    pub fn create(proc: &ProcFs, pid: Pid) -> Result<Self, WatchError> {
        if !proc.exists(pid) {
            return Err(WatchError::NotFound(pid));
        }

        let cmdline = proc.read_cmdline(pid)?;
        let (command, executable) = if cmdline.is_empty() {
            // kernel threads have an empty cmdline
            let comm = proc.read_comm(pid)?;
            (comm.clone(), comm)
        } else {
            let executable = cmdline.split_whitespace().next().unwrap_or_default().to_string();
            (cmdline, executable)
        };
        let created_at = proc.created_at(pid)?;

        let mut info = Self {
            proc: proc.clone(),
            snapshot: ProcessSnapshot::new(pid, command, executable, created_at),
        };

        if info.check()?.is_running() {
            Ok(info)
        } else {
            // exited while we were reading it
            Err(WatchError::NotFound(pid))
        }
    }

    pub fn pid(&self) -> Pid {
        self.snapshot.pid
    }

    pub fn snapshot(&self) -> &ProcessSnapshot {
        &self.snapshot
    }

    /// Probes the process and refreshes its memory counters.
    ///
    /// Returns [`Liveness::Ended`] exactly once, on the first check that finds
    /// the process gone. Later calls return [`Liveness::AlreadyEnded`] and leave
    /// the snapshot alone.
    pub fn check(&mut self) -> Result<Liveness, WatchError> {
        if !self.snapshot.running() {
            return Ok(Liveness::AlreadyEnded);
        }

        if self.proc.exists(self.pid()) {
            match self.update_memory() {
                Ok(()) => return Ok(Liveness::Alive),
                // vanished between the probe and the read
                Err(WatchError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        self.snapshot.mark_ended(Local::now());
        log::debug!("PID {} ended", self.pid());
        Ok(Liveness::Ended)
    }

    fn update_memory(&mut self) -> Result<(), WatchError> {
        let pid = self.pid();
        let reader = self.proc.open_status(pid)?;
        scan_status(reader, &mut self.snapshot.memory)
            .map_err(|e| WatchError::from_read(pid, self.proc.pid_dir(pid).join("status"), e))?;
        Ok(())
    }

    /// Human readable summary, used as the notification body.
    pub fn report(&self) -> String {
        let s = &self.snapshot;
        let mut text = format!(
            "PID {}: {}\n Started: {}",
            s.pid,
            s.command,
            s.created_at.format(TIME_FORMAT)
        );

        if let (Some(ended), Some(duration)) = (s.ended_at(), s.duration_text()) {
            let _ = write!(
                text,
                "  Ended: {}  (duration {})",
                ended.format(TIME_FORMAT),
                duration
            );
        }

        let m = &s.memory;
        let _ = write!(
            text,
            "\n Memory (current/peak) - Resident: {} / {} kB   Virtual: {} / {} kB",
            group_thousands(m.vm_rss),
            group_thousands(m.vm_hwm),
            group_thousands(m.vm_size),
            group_thousands(m.vm_peak)
        );
        text
    }
}

/// Reads the tracked memory fields out of a status listing.
///
/// Walks [`MemoryField::ORDERED`] with a cursor and stops as soon as the last
/// field is read, so the rest of the (long) listing is never touched. Fields
/// that are absent, as for kernel threads, keep their previous value.
/// Returns the number of lines consumed.
pub fn scan_status<R: BufRead>(reader: R, memory: &mut MemoryStats) -> io::Result<usize> {
    let mut fields = MemoryField::ORDERED.iter().copied();
    let mut consumed = 0;
    let Some(mut field) = fields.next() else {
        return Ok(0);
    };

    for line in reader.lines() {
        let line = line?;
        consumed += 1;
        if let Some(value) = field.parse_line(&line) {
            memory.set(field, value);
            match fields.next() {
                Some(next) => field = next,
                None => break,
            }
        }
    }
    Ok(consumed)
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
