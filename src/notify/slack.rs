use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

use super::{required, Notifier, NotifyError, Params, Report, FOOTER, SEND_TIMEOUT};

pub const WEBHOOK_BASE: &str = "https://hooks.slack.com/services";

/// Posts the report to Slack incoming webhooks.
///
/// Params: `channel`, the webhook path (`T000/B000/XXXX`) of each channel.
pub struct SlackNotifier {
    client: reqwest::Client,
    base_url: String,
}

impl SlackNotifier {
    pub fn new() -> Result<Self, NotifyError> {
        Self::with_base_url(WEBHOOK_BASE, SEND_TIMEOUT)
    }

    /// `timeout` bounds each request, connect through response body.
    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn webhook_url(&self, channel: &str) -> String {
        format!("{}/{}", self.base_url, channel.trim_start_matches('/'))
    }

    pub fn payload(report: &Report, subject_template: &str) -> serde_json::Value {
        json!({
            "text": format!("*{}*\n{}\n\n{}", report.subject(subject_template), report.text, FOOTER),
            "icon_emoji": ":computer:",
        })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn send(&self, report: &Report, subject_template: &str, params: &Params) -> Result<(), NotifyError> {
        let payload = Self::payload(report, subject_template);
        for channel in required(params, "channel")? {
            let url = self.webhook_url(channel);
            log::debug!("Posting report for PID {} to {}", report.pid, url);
            self.client
                .post(&url)
                .json(&payload)
                .send()
                .await?
                .error_for_status()?;
        }
        Ok(())
    }
}
