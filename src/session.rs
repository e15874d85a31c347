use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::WatchError;
use crate::models::{Liveness, Pid};
use crate::notify::{subject_template, Channel, NotifyError, Report};
use crate::services::{PidScanner, ProcFs, ProcessInfo, ProcessMatcher};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Time between two ticks
    pub interval: Duration,
    /// Keep scanning for new processes matching the rules
    pub watch_new: bool,
    /// Free-form label appended to notification subjects
    pub tag: Option<String>,
    /// Longest a single channel may take to deliver one report
    pub send_timeout: Duration,
}

/// What one tick did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickSummary {
    /// Observed ended and reported
    pub ended: Vec<Pid>,
    /// Newly matched and now watched
    pub added: Vec<Pid>,
    /// Removed after an error
    pub dropped: Vec<Pid>,
}

/// The poll loop and everything it owns.
pub struct WatchSession {
    proc: ProcFs,
    watched: BTreeMap<Pid, ProcessInfo>,
    matcher: ProcessMatcher,
    scanner: PidScanner,
    channels: Vec<Channel>,
    interval: Duration,
    send_timeout: Duration,
    watch_new: bool,
    tag: Option<String>,
    subject_template: String,
}

impl WatchSession {
    pub fn new(proc: ProcFs, matcher: ProcessMatcher, scanner: PidScanner, options: SessionOptions) -> Self {
        // with no rules nothing new could ever match
        let watch_new = options.watch_new && matcher.rule_count() > 0;
        if options.watch_new && !watch_new {
            log::warn!("Not watching for new processes: no command patterns given");
        }

        Self {
            proc,
            watched: BTreeMap::new(),
            matcher,
            scanner,
            channels: Vec::new(),
            interval: options.interval,
            send_timeout: options.send_timeout,
            watch_new,
            subject_template: subject_template(options.tag.as_deref()),
            tag: options.tag,
        }
    }

    pub fn add_channel(&mut self, channel: Channel) {
        self.channels.push(channel);
    }

    pub fn watch_new(&self) -> bool {
        self.watch_new
    }

    pub fn is_watching(&self, pid: Pid) -> bool {
        self.watched.contains_key(&pid)
    }

    pub fn watched(&self) -> impl Iterator<Item = &ProcessInfo> {
        self.watched.values()
    }

    pub fn watched_count(&self) -> usize {
        self.watched.len()
    }

    /// Nothing is watched and nothing new can show up.
    pub fn is_finished(&self) -> bool {
        self.watched.is_empty() && !self.watch_new
    }

    /// Starts watching an explicitly requested PID.
    pub fn watch_pid(&mut self, pid: Pid) -> Result<(), WatchError> {
        if self.is_watching(pid) {
            return Ok(());
        }
        let info = ProcessInfo::create(&self.proc, pid)?;
        self.watched.insert(pid, info);
        Ok(())
    }

    /// One scanner pass through the matcher; every new match gets watched.
    /// The first call covers the whole current process table.
    pub fn sweep(&mut self) -> Result<Vec<Pid>, WatchError> {
        if self.matcher.rule_count() == 0 {
            return Ok(Vec::new());
        }

        let fresh = self.scanner.next_pass()?;
        let candidates: Vec<Pid> = self
            .matcher
            .matching(fresh)
            .filter(|pid| !self.watched.contains_key(pid))
            .collect();

        let mut added = Vec::with_capacity(candidates.len());
        for pid in candidates {
            match ProcessInfo::create(&self.proc, pid) {
                Ok(info) => {
                    log::debug!("Matched PID {}", pid);
                    self.watched.insert(pid, info);
                    added.push(pid);
                }
                Err(WatchError::NotFound(_)) => {
                    log::debug!("PID {} ended before it could be watched", pid);
                }
                Err(e) => {
                    log::error!("Failed to watch new process {}: {}", pid, e);
                }
            }
        }
        added.sort_unstable();
        Ok(added)
    }

    /// Checks every watched process, reports the ended ones, then folds in
    /// new matches. Errors for one PID only drop that PID.
    pub async fn tick(&mut self) -> TickSummary {
        let mut summary = TickSummary::default();

        for (pid, info) in self.watched.iter_mut() {
            match info.check() {
                Ok(Liveness::Alive) => {}
                Ok(Liveness::Ended) => summary.ended.push(*pid),
                Ok(Liveness::AlreadyEnded) => summary.dropped.push(*pid),
                Err(e) => {
                    log::error!("Error while checking process {}: {}", pid, e);
                    summary.dropped.push(*pid);
                }
            }
        }

        for pid in &summary.ended {
            let Some(info) = self.watched.get(pid) else {
                continue;
            };
            let report = Report::new(info, self.tag.as_deref());
            log::info!("Process stopped\n{}", report.text);
            self.notify(&report).await;
        }

        for pid in summary.ended.iter().chain(&summary.dropped) {
            self.watched.remove(pid);
        }

        if self.watch_new {
            match self.sweep() {
                Ok(added) => {
                    for pid in &added {
                        if let Some(info) = self.watched.get(pid) {
                            log::info!("Watching new process\n{}", info.report());
                        }
                    }
                    summary.added = added;
                }
                Err(e) => log::error!("Failed to scan for new processes: {}", e),
            }
        }

        summary
    }

    /// Delivers to every channel in turn. A channel that fails or stalls
    /// is logged and skipped; the others still get the report.
    async fn notify(&self, report: &Report) {
        for channel in &self.channels {
            let sent = tokio::time::timeout(
                self.send_timeout,
                channel.notifier.send(report, &self.subject_template, &channel.params),
            )
            .await
            .unwrap_or_else(|_| Err(NotifyError::Timeout(self.send_timeout)));

            if let Err(e) = sent {
                log::error!(
                    "Failed to notify via {} about process {}: {}",
                    channel.notifier.name(),
                    report.pid,
                    e
                );
            }
        }
    }

    /// Ticks every `interval` until nothing is left to watch or Ctrl-C.
    pub async fn run(&mut self) {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        while !self.is_finished() {
            tokio::select! {
                _ = &mut ctrl_c => {
                    log::info!("Interrupted, stopped watching {} processes", self.watched.len());
                    return;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
            let summary = self.tick().await;
            log::debug!(
                "Tick: {} ended, {} added, {} dropped, {} watched",
                summary.ended.len(),
                summary.added.len(),
                summary.dropped.len(),
                self.watched.len()
            );
        }

        log::info!("No processes left to watch.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::{FailingNotifier, RecordingNotifier};
    use crate::notify::{Params, SlackNotifier, SEND_TIMEOUT};
    use crate::services::pid_scanner::DEFAULT_CLEANUP_INTERVAL;
    use crate::services::proc_fs::testing::{spawn_sleep, FakeProcTable};

    fn session(table: &FakeProcTable, globs: &[&str], regexes: &[&str], watch_new: bool) -> WatchSession {
        let proc = table.procfs();
        let mut matcher = ProcessMatcher::new(proc.clone());
        for g in globs {
            matcher.add_glob(g).unwrap();
        }
        for r in regexes {
            matcher.add_regex(r).unwrap();
        }
        let scanner = PidScanner::new(proc.clone(), DEFAULT_CLEANUP_INTERVAL);
        let options = SessionOptions {
            interval: Duration::from_millis(10),
            watch_new,
            tag: None,
            send_timeout: SEND_TIMEOUT,
        };
        WatchSession::new(proc, matcher, scanner, options)
    }

    fn with_recorder(session: &mut WatchSession) -> RecordingNotifier {
        let recorder = RecordingNotifier::default();
        session.add_channel(Channel::new(recorder.clone(), Params::new()));
        recorder
    }

    #[test]
    fn missing_explicit_pid_leaves_nothing_to_watch() {
        let table = FakeProcTable::new();
        let mut session = session(&table, &[], &[], false);

        assert!(matches!(session.watch_pid(999), Err(WatchError::NotFound(999))));
        assert!(session.sweep().unwrap().is_empty());
        assert!(session.is_finished());
    }

    #[test]
    fn one_missing_pid_does_not_block_others() {
        let table = FakeProcTable::new();
        table.spawn(20, &["make"], "make");
        let mut session = session(&table, &[], &[], false);

        assert!(session.watch_pid(999).is_err());
        session.watch_pid(20).unwrap();
        session.watch_pid(20).unwrap();
        assert_eq!(session.watched_count(), 1);
        assert!(!session.is_finished());
    }

    #[test]
    fn watch_new_needs_rules() {
        let table = FakeProcTable::new();
        assert!(!session(&table, &[], &[], true).watch_new());
        assert!(session(&table, &["x*"], &[], true).watch_new());
        assert!(!session(&table, &["x*"], &[], false).watch_new());
    }

    #[test]
    fn initial_sweep_adds_each_match_once() {
        let table = FakeProcTable::new();
        table.spawn(40, &["svc7"], "svc7");
        table.spawn(41, &["app-svc1"], "app1");
        table.spawn(42, &["bash"], "bash");
        let mut session = session(&table, &["app*", "svc*"], &[r"^svc\d+$", r"app\d"], false);

        assert_eq!(session.sweep().unwrap(), vec![40, 41]);
        assert_eq!(session.watched_count(), 2);
        assert!(!session.is_watching(42));
        // a second pass has nothing new
        assert!(session.sweep().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ended_process_is_reported_once_to_every_channel() {
        let table = FakeProcTable::new();
        table.spawn(50, &["/usr/bin/rsync", "-a"], "rsync");
        table.spawn(51, &["vim"], "vim");
        let mut session = session(&table, &[], &[], false);
        let first = with_recorder(&mut session);
        session.add_channel(Channel::new(FailingNotifier, Params::new()));
        let last = with_recorder(&mut session);
        session.watch_pid(50).unwrap();
        session.watch_pid(51).unwrap();

        assert_eq!(session.tick().await, TickSummary::default());

        table.exit(50);
        let summary = session.tick().await;
        assert_eq!(summary.ended, vec![50]);
        assert!(summary.dropped.is_empty());
        assert!(!session.is_watching(50));
        assert!(session.is_watching(51));

        let expected = vec![(50, "/usr/bin/rsync process 50 ended".to_string())];
        assert_eq!(first.deliveries(), expected);
        assert_eq!(last.deliveries(), expected);

        table.exit(51);
        session.tick().await;
        session.tick().await;
        assert_eq!(first.deliveries().len(), 2);
        assert!(session.is_finished());
    }

    #[tokio::test]
    async fn tag_reaches_subject() {
        let table = FakeProcTable::new();
        table.spawn(55, &["backup.sh"], "backup.sh");
        let proc = table.procfs();
        let mut session = WatchSession::new(
            proc.clone(),
            ProcessMatcher::new(proc.clone()),
            PidScanner::new(proc, DEFAULT_CLEANUP_INTERVAL),
            SessionOptions {
                interval: Duration::from_millis(10),
                watch_new: false,
                tag: Some("nightly".into()),
                send_timeout: SEND_TIMEOUT,
            },
        );
        let recorder = with_recorder(&mut session);
        session.watch_pid(55).unwrap();

        table.exit(55);
        session.tick().await;
        assert_eq!(
            recorder.deliveries(),
            vec![(55, "backup.sh process 55 ended: nightly".to_string())]
        );
    }

    #[tokio::test]
    async fn new_matches_are_picked_up_and_reported() {
        let table = FakeProcTable::new();
        table.spawn(1, &["init"], "init");
        let mut session = session(&table, &["job*"], &[], true);
        let recorder = with_recorder(&mut session);
        assert!(session.sweep().unwrap().is_empty());
        assert!(!session.is_finished());

        table.spawn(60, &["./job-runner"], "job-runner");
        table.spawn(61, &["other"], "other");
        let summary = session.tick().await;
        assert_eq!(summary.added, vec![60]);
        assert!(session.is_watching(60));

        table.exit(60);
        let summary = session.tick().await;
        assert_eq!(summary.ended, vec![60]);
        assert!(summary.added.is_empty());
        session.tick().await;

        assert_eq!(recorder.deliveries().len(), 1);
        // still looking for more
        assert!(!session.is_finished());
    }

    #[tokio::test]
    async fn failing_process_is_dropped_without_stopping_others() {
        let table = FakeProcTable::new();
        table.spawn(70, &["a"], "a");
        table.spawn(71, &["b"], "b");
        let mut session = session(&table, &[], &[], false);
        let recorder = with_recorder(&mut session);
        session.watch_pid(70).unwrap();
        session.watch_pid(71).unwrap();

        table.break_status(70);
        table.exit(71);
        let summary = session.tick().await;

        assert_eq!(summary.dropped, vec![70]);
        assert_eq!(summary.ended, vec![71]);
        assert_eq!(recorder.deliveries().len(), 1);
        assert!(session.is_finished());
    }

    #[tokio::test]
    async fn stalled_channel_does_not_hold_up_the_tick() {
        // accepts the webhook connection and never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let table = FakeProcTable::new();
        table.spawn(50, &["rsync"], "rsync");
        table.spawn(51, &["vim"], "vim");
        let mut session = session(&table, &[], &[], false);
        session.send_timeout = Duration::from_millis(200);
        session.add_channel(Channel::new(
            SlackNotifier::with_base_url(base, SEND_TIMEOUT).unwrap(),
            Params::from([("channel".to_string(), vec!["T0/B0/X".to_string()])]),
        ));
        let recorder = with_recorder(&mut session);
        session.watch_pid(50).unwrap();
        session.watch_pid(51).unwrap();

        table.exit(50);
        let summary = tokio::time::timeout(Duration::from_secs(5), session.tick())
            .await
            .unwrap();
        assert_eq!(summary.ended, vec![50]);
        assert_eq!(recorder.deliveries().len(), 1);
        assert!(session.is_watching(51));

        table.exit(51);
        let summary = tokio::time::timeout(Duration::from_secs(5), session.tick())
            .await
            .unwrap();
        assert_eq!(summary.ended, vec![51]);
        assert_eq!(recorder.deliveries().len(), 2);
        server.abort();
    }

    #[tokio::test]
    async fn run_returns_when_everything_ended() {
        let table = FakeProcTable::new();
        table.spawn(80, &["x"], "x");
        let mut session = session(&table, &[], &[], false);
        let recorder = with_recorder(&mut session);
        session.watch_pid(80).unwrap();
        table.exit(80);

        tokio::time::timeout(Duration::from_secs(5), session.run())
            .await
            .unwrap();
        assert_eq!(recorder.deliveries().len(), 1);
    }

    #[tokio::test]
    async fn watches_real_child_until_exit() {
        let mut child = spawn_sleep();
        let pid = child.id();
        let proc = ProcFs::default();
        let mut session = WatchSession::new(
            proc.clone(),
            ProcessMatcher::new(proc.clone()),
            PidScanner::new(proc, DEFAULT_CLEANUP_INTERVAL),
            SessionOptions {
                interval: Duration::from_millis(10),
                watch_new: false,
                tag: None,
                send_timeout: SEND_TIMEOUT,
            },
        );
        let recorder = with_recorder(&mut session);
        session.watch_pid(pid).unwrap();
        assert!(session.tick().await.ended.is_empty());

        child.kill().unwrap();
        child.wait().unwrap();
        assert_eq!(session.tick().await.ended, vec![pid]);
        assert_eq!(recorder.deliveries(), vec![(pid, format!("sleep process {} ended", pid))]);
    }
}
