use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cli::CommandArgs;
use crate::error::WatchError;
use crate::models::Pid;

/// JSON file listing what to watch and whom to tell.
///
/// ```json
/// {"to": ["ops@example.com"],
///  "processes": [{"command": "backup*", "regex": "", "pid": ""}]}
/// ```
///
/// Empty strings mean "not given".
#[derive(Debug, Default, Deserialize)]
pub struct WatchFile {
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub processes: Vec<WatchEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WatchEntry {
    /// Shell-style pattern
    #[serde(default)]
    pub command: String,
    /// Regular expression
    #[serde(default)]
    pub regex: String,
    /// Number, numeric string or empty string
    #[serde(default)]
    pub pid: Option<PidField>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PidField {
    Number(Pid),
    Text(String),
}

impl PidField {
    fn value(&self) -> Result<Option<Pid>, String> {
        match self {
            PidField::Number(pid) => Ok(Some(*pid)),
            PidField::Text(text) if text.trim().is_empty() => Ok(None),
            PidField::Text(text) => text
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| format!("invalid pid {:?}", text)),
        }
    }
}

impl WatchFile {
    pub fn load(path: &Path) -> Result<Self, WatchError> {
        let content = fs::read_to_string(path).map_err(|e| config_error(path, e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| config_error(path, e.to_string()))
    }

    /// Appends the file's contents to the command line lists.
    pub fn merge_into(self, path: &Path, args: &mut CommandArgs) -> Result<(), WatchError> {
        args.to.extend(self.to.into_iter().filter(|to| !to.is_empty()));

        for entry in self.processes {
            if !entry.command.is_empty() {
                args.commands.push(entry.command);
            }
            if !entry.regex.is_empty() {
                args.command_regexes.push(entry.regex);
            }
            if let Some(pid) = entry.pid {
                if let Some(pid) = pid.value().map_err(|reason| config_error(path, reason))? {
                    args.pids.push(pid);
                }
            }
        }
        Ok(())
    }
}

fn config_error(path: &Path, reason: String) -> WatchError {
    WatchError::Config {
        path: PathBuf::from(path),
        reason,
    }
}
