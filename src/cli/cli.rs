use clap::{ArgAction, Parser};
use std::path::PathBuf;

use crate::models::Pid;
use crate::notify::email::DEFAULT_SENDMAIL;
use crate::services::pid_scanner::DEFAULT_CLEANUP_INTERVAL;
use crate::services::proc_fs::PROC_DIR;

/// Watch a process and notify when it completes via various communication
/// channels.
///
/// [+] marks options that may be given more than once, for example:
///  process-watcher -p 1234 -p 4258 -c 'myapp*' -r 'exec\d+' --to person1@domain.com --to person2@someplace.com
#[derive(Parser, Debug)]
#[command(author, version, about, verbatim_doc_comment, arg_required_else_help = true)]
pub struct CommandArgs {
    /// Process ID(s) to watch [+]
    #[arg(short, long = "pid", value_name = "PID", action = ArgAction::Append)]
    pub pids: Vec<Pid>,

    /// Watch all processes matching the command name pattern (shell-style wildcards) [+]
    #[arg(short = 'c', long = "command", value_name = "COMMAND_PATTERN", action = ArgAction::Append)]
    pub commands: Vec<String>,

    /// Watch all processes matching the command name regular expression [+]
    #[arg(
        short = 'r',
        long = "command-regex",
        visible_alias = "crx",
        value_name = "COMMAND_REGEX",
        action = ArgAction::Append
    )]
    pub command_regexes: Vec<String>,

    /// Watch for new processes that match --command or --command-regex (run forever)
    #[arg(short, long)]
    pub watch_new: bool,

    /// Email address to send to [+]
    #[arg(long, value_name = "EMAIL_ADDRESS", action = ArgAction::Append)]
    pub to: Vec<String>,

    /// Slack webhook path to post to [+]
    #[arg(long = "channel", value_name = "CHANNEL", action = ArgAction::Append)]
    pub channels: Vec<String>,

    /// Send a desktop notification
    #[arg(short, long)]
    pub notify: bool,

    /// How often to check on processes, in seconds
    #[arg(short, long, env = "WATCH_INTERVAL", default_value_t = 15.0, value_name = "SECONDS")]
    pub interval: f64,

    /// How often the scanner forgets exited PIDs, in seconds
    #[arg(long, default_value_t = DEFAULT_CLEANUP_INTERVAL.as_secs_f64(), value_name = "SECONDS")]
    pub cleanup_interval: f64,

    /// Don't print anything to stdout except warnings and errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Log style output (timestamps and log level)
    #[arg(long)]
    pub log: bool,

    /// Label for the process, added to notification subjects [+]
    #[arg(long = "tag", value_name = "LABEL", action = ArgAction::Append)]
    pub tags: Vec<String>,

    /// JSON file to import PIDs, commands and email addresses from [+]
    #[arg(short, long = "json", value_name = "JSON_FILE", action = ArgAction::Append)]
    pub json: Vec<PathBuf>,

    /// Root of the process table
    #[arg(long, env = "PROC_ROOT", default_value = PROC_DIR, hide = true)]
    pub proc_root: PathBuf,

    /// MTA used for --to
    #[arg(long, env = "SENDMAIL_PATH", default_value = DEFAULT_SENDMAIL)]
    pub sendmail: PathBuf,
}

impl CommandArgs {
    /// Tags joined into the single label used in subjects.
    pub fn tag(&self) -> Option<String> {
        if self.tags.is_empty() {
            None
        } else {
            Some(self.tags.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> CommandArgs {
        CommandArgs::try_parse_from(std::iter::once("process-watcher").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn definition_is_consistent() {
        CommandArgs::command().debug_assert();
    }

    #[test]
    fn repeated_options_accumulate() {
        let args = parse(&[
            "-p", "1234", "--pid", "4258", "-c", "myapp*", "--crx", r"exec\d+", "-r", "svc.+",
            "--to", "a@x.org", "--to", "b@x.org", "--tag", "nightly", "--tag", "db",
        ]);
        assert_eq!(args.pids, vec![1234, 4258]);
        assert_eq!(args.commands, vec!["myapp*"]);
        assert_eq!(args.command_regexes, vec![r"exec\d+", "svc.+"]);
        assert_eq!(args.to.len(), 2);
        assert_eq!(args.tag().as_deref(), Some("nightly, db"));
    }

    #[test]
    fn defaults() {
        let args = parse(&["-p", "1"]);
        assert_eq!(args.interval, 15.0);
        assert_eq!(args.cleanup_interval, 60.0);
        assert!(!args.watch_new && !args.notify && !args.quiet && !args.log);
        assert_eq!(args.proc_root, PathBuf::from("/proc"));
        assert_eq!(args.tag(), None);
    }

    #[test]
    fn no_arguments_prints_help() {
        let err = CommandArgs::try_parse_from(["process-watcher"]).unwrap_err();
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
        );
    }
}
