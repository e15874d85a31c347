use anyhow::{anyhow, Context};
use clap::Parser;
use std::io::Write;
use std::time::Duration;

mod cli;
mod error;
mod models;
mod notify;
mod services;
mod session;

use cli::{CommandArgs, WatchFile};
use notify::{Channel, DesktopNotifier, EmailNotifier, Params, SlackNotifier, SEND_TIMEOUT};
use services::{PidScanner, ProcFs, ProcessMatcher};
use session::{SessionOptions, WatchSession};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let mut args = CommandArgs::parse();
    init_logging(&args);

    for path in args.json.clone() {
        WatchFile::load(&path)?.merge_into(&path, &mut args)?;
    }

    let proc = ProcFs::new(&args.proc_root);

    let mut matcher = ProcessMatcher::new(proc.clone());
    for pattern in &args.commands {
        matcher.add_glob(pattern)?;
    }
    for regex in &args.command_regexes {
        matcher.add_regex(regex)?;
    }

    let scanner = PidScanner::new(proc.clone(), seconds(args.cleanup_interval, "--cleanup-interval")?);
    let options = SessionOptions {
        interval: seconds(args.interval, "--interval")?,
        watch_new: args.watch_new,
        tag: args.tag(),
        send_timeout: SEND_TIMEOUT,
    };

    let mut session = WatchSession::new(proc, matcher, scanner, options);
    for channel in channels(&args)? {
        session.add_channel(channel);
    }

    for &pid in &args.pids {
        if let Err(e) = session.watch_pid(pid) {
            log::warn!("{}", e);
        }
    }

    session.sweep().context("Failed to scan the process table")?;

    if session.is_finished() {
        log::warn!("No processes found to watch.");
        return Ok(());
    }

    log::info!("Watching {} processes:", session.watched_count());
    for info in session.watched() {
        log::info!("{}", info.report());
    }
    if session.watch_new() {
        log::info!("Watching for new processes matching the given patterns");
    }

    session.run().await;
    Ok(())
}

fn init_logging(args: &CommandArgs) {
    let level = if args.quiet { "warn" } else { "info" };
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));

    if args.log {
        builder.format(|buf, record| {
            writeln!(buf, "{} {}: {}", buf.timestamp(), record.level(), record.args())
        });
    } else {
        builder.format(|buf, record| writeln!(buf, "{}", record.args()));
    }
    builder.init();
}

/// Notification channels requested on the command line.
fn channels(args: &CommandArgs) -> anyhow::Result<Vec<Channel>> {
    let mut channels = Vec::new();

    if !args.to.is_empty() {
        channels.push(Channel::new(
            EmailNotifier::new(&args.sendmail),
            Params::from([("to".to_string(), args.to.clone())]),
        ));
    }
    if !args.channels.is_empty() {
        channels.push(Channel::new(
            SlackNotifier::new().context("Failed to set up the Slack client")?,
            Params::from([("channel".to_string(), args.channels.clone())]),
        ));
    }
    if args.notify {
        channels.push(Channel::new(DesktopNotifier, Params::new()));
    }

    Ok(channels)
}

fn seconds(value: f64, flag: &str) -> anyhow::Result<Duration> {
    Duration::try_from_secs_f64(value).map_err(|e| anyhow!("invalid {} value {}: {}", flag, value, e))
}
