use async_trait::async_trait;
use notify_rust::{Notification, Timeout};

use super::{Notifier, NotifyError, Params, Report};

const APP_NAME: &str = "process-watcher";

/// Desktop notification over D-Bus. Takes no params.
#[derive(Default)]
pub struct DesktopNotifier;

#[async_trait]
impl Notifier for DesktopNotifier {
    fn name(&self) -> &'static str {
        "desktop"
    }

    async fn send(&self, report: &Report, subject_template: &str, _params: &Params) -> Result<(), NotifyError> {
        let summary = report.subject(subject_template);
        let body = report.text.clone();

        // the D-Bus round trip is blocking
        tokio::task::spawn_blocking(move || {
            Notification::new()
                .summary(&summary)
                .body(&body)
                .appname(APP_NAME)
                .timeout(Timeout::Never)
                .show()
                .map(|_| ())
        })
        .await
        .map_err(|e| NotifyError::Transport(e.to_string()))??;

        Ok(())
    }
}
