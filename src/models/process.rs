use chrono::{DateTime, Duration, Local};

pub use crate::models::stats::MemoryStats;

/// Kernel process identifier
pub type Pid = u32;

/// One watched process.
///
/// `ended_at` and `duration` are only ever set together, by
/// [`ProcessSnapshot::mark_ended`], which also flips `running` to false.
#[derive(Debug, Clone)]
pub struct ProcessSnapshot {
    /// Process ID
    pub pid: Pid,
    /// Argument vector joined with spaces, or the short name for kernel threads
    pub command: String,
    /// First token of `command`
    pub executable: String,
    /// Creation time of the `/proc/<pid>` entry
    pub created_at: DateTime<Local>,
    /// Latest memory counters
    pub memory: MemoryStats,
    running: bool,
    ended_at: Option<DateTime<Local>>,
    duration: Option<Duration>,
}

/// Outcome of a liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Still present; memory refreshed.
    Alive,
    /// Observed gone for the first time on this check.
    Ended,
    /// Already reported as gone by an earlier check.
    AlreadyEnded,
}

impl Liveness {
    pub fn is_running(self) -> bool {
        self == Liveness::Alive
    }
}

impl ProcessSnapshot {
    pub fn new(pid: Pid, command: String, executable: String, created_at: DateTime<Local>) -> Self {
        Self {
            pid,
            command,
            executable,
            created_at,
            memory: MemoryStats::default(),
            running: true,
            ended_at: None,
            duration: None,
        }
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn ended_at(&self) -> Option<DateTime<Local>> {
        self.ended_at
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Records the end of the process. Returns false, changing nothing, if it
    /// had already ended.
    pub fn mark_ended(&mut self, at: DateTime<Local>) -> bool {
        if !self.running {
            return false;
        }
        self.running = false;
        self.ended_at = Some(at);
        self.duration = Some(at - self.created_at);
        true
    }

    pub fn duration_text(&self) -> Option<String> {
        self.duration().map(format_duration)
    }
}

/// Formats a duration as `H:MM:SS`, prefixed with `N day(s), ` past a day.
/// Sub-second precision is dropped and negative spans (clock changes) clamp
/// to zero.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);
    let days = total / 86_400;
    let rem = total % 86_400;
    let clock = format!("{}:{:02}:{:02}", rem / 3600, (rem % 3600) / 60, rem % 60);
    match days {
        0 => clock,
        1 => format!("1 day, {}", clock),
        n => format!("{} days, {}", n, clock),
    }
}
