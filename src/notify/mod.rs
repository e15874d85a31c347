pub mod desktop;
pub mod email;
pub mod slack;

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::models::Pid;
use crate::services::ProcessInfo;

pub use desktop::DesktopNotifier;
pub use email::EmailNotifier;
pub use slack::SlackNotifier;

pub const DEFAULT_SUBJECT: &str = "{executable} process {pid} ended";
pub const FOOTER: &str = "(automatically sent by process-watcher program)";

/// Upper bound on one delivery attempt of one channel.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Recipient parameters of a channel, e.g. `to` → addresses.
pub type Params = HashMap<String, Vec<String>>;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("missing required parameter '{0}'")]
    MissingParam(&'static str),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("desktop notification failed: {0}")]
    Desktop(#[from] notify_rust::error::Error),

    #[error("{0}")]
    Transport(String),

    #[error("no answer within {0:?}")]
    Timeout(Duration),
}

/// What a channel gets to know about an ended process.
#[derive(Debug, Clone)]
pub struct Report {
    pub pid: Pid,
    pub executable: String,
    pub command: String,
    pub tag: Option<String>,
    /// Rendered [`ProcessInfo::report`]
    pub text: String,
}

impl Report {
    pub fn new(info: &ProcessInfo, tag: Option<&str>) -> Self {
        let snap = info.snapshot();
        Self {
            pid: snap.pid,
            executable: snap.executable.clone(),
            command: snap.command.clone(),
            tag: tag.map(str::to_string),
            text: info.report(),
        }
    }

    /// Fills `{pid}`, `{executable}`, `{command}` and `{tag}` in `template`.
    ///
    /// Substituted values are never expanded again, and unknown `{..}`
    /// sequences are kept as they are.
    pub fn subject(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len() + self.command.len());
        let mut rest = template;

        while let Some(start) = rest.find('{') {
            let tail = &rest[start..];
            let Some(end) = tail.find('}') else {
                break;
            };
            out.push_str(&rest[..start]);
            match self.placeholder(&tail[1..end]) {
                Some(value) => out.push_str(&value),
                None => out.push_str(&tail[..=end]),
            }
            rest = &tail[end + 1..];
        }
        out.push_str(rest);
        out
    }

    fn placeholder(&self, name: &str) -> Option<String> {
        match name {
            "pid" => Some(self.pid.to_string()),
            "executable" => Some(self.executable.clone()),
            "command" => Some(self.command.clone()),
            "tag" => Some(self.tag.clone().unwrap_or_default()),
            _ => None,
        }
    }
}

/// Subject template used for every channel, with the tag appended when
/// there is one.
pub fn subject_template(tag: Option<&str>) -> String {
    match tag {
        Some(_) => format!("{}: {{tag}}", DEFAULT_SUBJECT),
        None => DEFAULT_SUBJECT.to_string(),
    }
}

/// A way of telling someone a process ended.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(
        &self,
        report: &Report,
        subject_template: &str,
        params: &Params,
    ) -> Result<(), NotifyError>;
}

/// A notifier together with its recipients.
pub struct Channel {
    pub notifier: Box<dyn Notifier>,
    pub params: Params,
}

impl Channel {
    pub fn new(notifier: impl Notifier + 'static, params: Params) -> Self {
        Self {
            notifier: Box::new(notifier),
            params,
        }
    }
}

/// Non-empty values of `key`.
pub(crate) fn required<'a>(params: &'a Params, key: &'static str) -> Result<&'a [String], NotifyError> {
    match params.get(key) {
        Some(values) if !values.is_empty() => Ok(values),
        _ => Err(NotifyError::MissingParam(key)),
    }
}
