use glob::Pattern;
use regex::Regex;

use crate::error::WatchError;
use crate::models::Pid;
use crate::services::proc_fs::ProcFs;

/// Selects processes by their short command name (`/proc/<pid>/comm`).
///
/// Both kinds of rule match the whole name: globs by nature, regexes because
/// they are compiled as `^(?:pattern)$`.
#[derive(Debug)]
pub struct ProcessMatcher {
    proc: ProcFs,
    globs: Vec<Pattern>,
    regexes: Vec<Regex>,
}

impl ProcessMatcher {
    pub fn new(proc: ProcFs) -> Self {
        Self {
            proc,
            globs: Vec::new(),
            regexes: Vec::new(),
        }
    }

    /// Shell-style wildcard. `*` also matches `/`, and case is significant.
    pub fn add_glob(&mut self, pattern: &str) -> Result<(), WatchError> {
        let glob = Pattern::new(pattern).map_err(|e| WatchError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        self.globs.push(glob);
        Ok(())
    }

    pub fn add_regex(&mut self, pattern: &str) -> Result<(), WatchError> {
        let anchored = format!("^(?:{})$", pattern);
        let regex = Regex::new(&anchored).map_err(|e| WatchError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        self.regexes.push(regex);
        Ok(())
    }

    pub fn rule_count(&self) -> usize {
        self.globs.len() + self.regexes.len()
    }

    pub fn matches_name(&self, name: &str) -> bool {
        self.globs.iter().any(|g| g.matches(name)) || self.regexes.iter().any(|r| r.is_match(name))
    }

    /// False, not an error, when the process is already gone.
    pub fn matches(&self, pid: Pid) -> bool {
        match self.proc.read_comm(pid) {
            Ok(name) => self.matches_name(&name),
            Err(e) => {
                log::debug!("Skipping PID {} while matching: {}", pid, e);
                false
            }
        }
    }

    /// Lazily filters `pids` down to the matching ones.
    pub fn matching<'a, I>(&'a self, pids: I) -> impl Iterator<Item = Pid> + 'a
    where
        I: IntoIterator<Item = Pid>,
        I::IntoIter: 'a,
    {
        pids.into_iter().filter(move |pid| self.matches(*pid))
    }
}
