use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::path::PathBuf;
use std::process::Stdio;
use sysinfo::System;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{required, Notifier, NotifyError, Params, Report, FOOTER};

pub const DEFAULT_SENDMAIL: &str = "/usr/sbin/sendmail";
const FROM: &str = "process.watcher@localhost";

/// Mails the report through the local MTA (`sendmail -t`).
///
/// Params: `to` (one or more addresses).
pub struct EmailNotifier {
    program: PathBuf,
    args: Vec<String>,
    machine: String,
}

impl EmailNotifier {
    pub fn new(sendmail: impl Into<PathBuf>) -> Self {
        Self::with_command(sendmail, vec!["-t".to_string()])
    }

    /// Any program that reads a full RFC 822 message on stdin.
    pub fn with_command(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            machine: System::host_name().unwrap_or_else(|| "unknown".to_string()),
        }
    }

    pub fn compose(&self, report: &Report, subject_template: &str, to: &[String]) -> String {
        let subject = format!("[{} ALERT]{}", self.machine, report.subject(subject_template));
        let to: Vec<String> = to.iter().map(|addr| single_line(addr)).collect();
        format!(
            "Subject: {}\nFrom: {}\nTo: {}\nMIME-Version: 1.0\nContent-Type: text/plain; charset=utf-8\nContent-Transfer-Encoding: 8bit\n\nProcess has stopped.\n\n{}\n\n{}\n",
            header_value(&subject),
            FROM,
            to.join(", "),
            report.text,
            FOOTER
        )
    }
}

/// Control characters (CR and LF included) become spaces.
fn single_line(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

/// Longest raw chunk per encoded word; 45 bytes give 60 base64 chars, which
/// keeps each `=?utf-8?B?..?=` word under 75 characters.
const ENCODED_WORD_BYTES: usize = 45;

/// A header value that is one line and plain ASCII. Anything else is sent
/// as RFC 2047 encoded words, folded onto continuation lines.
fn header_value(value: &str) -> String {
    let value = single_line(value);
    if value.is_ascii() {
        return value;
    }

    let mut words = Vec::new();
    let mut chunk = String::new();
    for c in value.chars() {
        if chunk.len() + c.len_utf8() > ENCODED_WORD_BYTES {
            words.push(encoded_word(&chunk));
            chunk.clear();
        }
        chunk.push(c);
    }
    if !chunk.is_empty() {
        words.push(encoded_word(&chunk));
    }
    words.join("\n ")
}

fn encoded_word(text: &str) -> String {
    format!("=?utf-8?B?{}?=", STANDARD.encode(text))
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn send(&self, report: &Report, subject_template: &str, params: &Params) -> Result<(), NotifyError> {
        let to = required(params, "to")?;
        let message = self.compose(report, subject_template, to);

        log::info!("Sending email to: {}", to.join(", "));
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(message.as_bytes()).await?;
            // closing stdin lets the MTA see end of message
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(NotifyError::Transport(format!(
                "{} exited with {}",
                self.program.display(),
                status
            )));
        }
        Ok(())
    }
}
