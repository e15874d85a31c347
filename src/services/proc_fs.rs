use chrono::{DateTime, Local};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::BufReader;
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;

use crate::error::WatchError;
use crate::models::Pid;

pub const PROC_DIR: &str = "/proc";

/// Read-only view of the kernel process table.
///
/// Every per-process read maps a missing file to [`WatchError::NotFound`],
/// since the entry can disappear between any two reads.
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new(PROC_DIR)
    }
}

impl ProcFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn pid_dir(&self, pid: Pid) -> PathBuf {
        self.root.join(pid.to_string())
    }

    fn pid_file(&self, pid: Pid, name: &str) -> PathBuf {
        self.pid_dir(pid).join(name)
    }

    /// Liveness probe. Needs no privilege over the target, unlike `kill(pid, 0)`.
    pub fn exists(&self, pid: Pid) -> bool {
        self.pid_dir(pid).exists()
    }

    /// All numeric entries of the table; `self`, `sys`, `meminfo`... are skipped.
    pub fn list_pids(&self) -> Result<HashSet<Pid>, WatchError> {
        let entries = fs::read_dir(&self.root).map_err(|source| WatchError::Io {
            path: self.root.clone(),
            source,
        })?;

        Ok(entries
            .flatten()
            .filter_map(|entry| entry.file_name().to_str()?.parse::<Pid>().ok())
            .collect())
    }

    /// Argument vector joined with spaces. Empty for kernel threads.
    pub fn read_cmdline(&self, pid: Pid) -> Result<String, WatchError> {
        let path = self.pid_file(pid, "cmdline");
        let raw = fs::read(&path).map_err(|e| WatchError::from_read(pid, path, e))?;
        Ok(String::from_utf8_lossy(&raw).replace('\0', " ").trim().to_string())
    }

    /// Short process name
    pub fn read_comm(&self, pid: Pid) -> Result<String, WatchError> {
        let path = self.pid_file(pid, "comm");
        let comm = fs::read_to_string(&path).map_err(|e| WatchError::from_read(pid, path, e))?;
        Ok(comm.trim_end_matches(['\n', '\r']).to_string())
    }

    pub fn open_status(&self, pid: Pid) -> Result<BufReader<File>, WatchError> {
        let path = self.pid_file(pid, "status");
        let file = File::open(&path).map_err(|e| WatchError::from_read(pid, path, e))?;
        Ok(BufReader::new(file))
    }

    /// Creation time of the process's table entry (ctime of `/proc/<pid>`).
    pub fn created_at(&self, pid: Pid) -> Result<DateTime<Local>, WatchError> {
        let path = self.pid_dir(pid);
        let meta = fs::metadata(&path).map_err(|e| WatchError::from_read(pid, path, e))?;
        let created = DateTime::from_timestamp(meta.ctime(), meta.ctime_nsec() as u32)
            .map(|utc| utc.with_timezone(&Local))
            .unwrap_or_else(Local::now);
        Ok(created)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeProcTable;
    use super::*;

    #[test]
    fn lists_only_numeric_entries() {
        let table = FakeProcTable::new();
        table.spawn(1, &["init"], "init");
        table.spawn(300, &["app", "--flag"], "app");

        let pids = table.procfs().list_pids().unwrap();
        assert_eq!(pids, HashSet::from([1, 300]));
    }

    #[test]
    fn reads_cmdline_and_comm() {
        let table = FakeProcTable::new();
        table.spawn(5, &["/usr/bin/python3", "job.py", "-v"], "python3");
        table.spawn(6, &[], "kworker/0:1");

        let proc = table.procfs();
        assert_eq!(proc.read_cmdline(5).unwrap(), "/usr/bin/python3 job.py -v");
        assert_eq!(proc.read_comm(5).unwrap(), "python3");
        assert_eq!(proc.read_cmdline(6).unwrap(), "");
        assert_eq!(proc.read_comm(6).unwrap(), "kworker/0:1");
    }

    #[test]
    fn missing_process_is_not_found() {
        let table = FakeProcTable::new();
        let proc = table.procfs();
        assert!(!proc.exists(99));
        assert!(matches!(proc.read_comm(99), Err(WatchError::NotFound(99))));
        assert!(matches!(proc.created_at(99), Err(WatchError::NotFound(99))));
    }

    #[test]
    fn missing_root_is_io_error() {
        let proc = ProcFs::new("/nonexistent/proc/root");
        assert!(matches!(proc.list_pids(), Err(WatchError::Io { .. })));
    }

    #[test]
    fn sees_current_process_in_real_table() {
        let proc = ProcFs::default();
        let me = std::process::id();
        assert!(proc.exists(me));
        assert!(proc.list_pids().unwrap().contains(&me));
        assert!(!proc.read_comm(me).unwrap().is_empty());
        assert!(proc.created_at(me).unwrap() <= Local::now());
    }
}
