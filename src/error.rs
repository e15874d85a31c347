use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::Pid;

/// Failures of the process-tracking core.
///
/// A process disappearing mid-read is not listed here: `check()` reports it
/// as [`crate::models::Liveness::Ended`] and the matcher as a non-match.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("No process with PID {0}")]
    NotFound(Pid),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid watch file {}: {reason}", .path.display())]
    Config { path: PathBuf, reason: String },
}

impl WatchError {
    /// Maps a read error on a per-process file, treating a missing file as
    /// the process being gone.
    pub fn from_read(pid: Pid, path: PathBuf, source: io::Error) -> Self {
        if is_vanished(&source) {
            WatchError::NotFound(pid)
        } else {
            WatchError::Io { path, source }
        }
    }
}

/// `ENOENT` and `ESRCH` both show up when a `/proc/<pid>` entry goes away
/// under an open reader.
pub fn is_vanished(err: &io::Error) -> bool {
    const ESRCH: i32 = 3;
    err.kind() == io::ErrorKind::NotFound || err.raw_os_error() == Some(ESRCH)
}
