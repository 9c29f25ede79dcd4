// src/notify/teams.rs
//! Microsoft Teams sink: posts an adaptive card to an incoming webhook.

use anyhow::{anyhow, bail, Result};
use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;

use super::Notifier;
use crate::source::PullRequest;

const CARD_CONTENT_TYPE: &str = "application/vnd.microsoft.card.adaptive";
const CARD_SCHEMA: &str = "http://adaptivecards.io/schemas/adaptive-card.json";
const CARD_VERSION: &str = "1.5";
const MAX_RETRIES: u8 = 10;

// Hosts Teams hands out webhook URLs for (classic connectors and Workflows).
static WEBHOOK_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^https://(?:[a-z0-9-]+\.)*(?:webhook\.office\.com|logic\.azure\.com|azure-api\.net|api\.powerplatform\.com)(?::443)?/",
    )
    .expect("static webhook regex")
});

/// Reject URLs that are obviously not Teams webhooks before the first notification is due.
pub fn validate_webhook_url(url: &str) -> Result<()> {
    if WEBHOOK_URL.is_match(url) {
        Ok(())
    } else {
        bail!("{url:?} does not look like a Microsoft Teams webhook URL")
    }
}

#[derive(Clone)]
pub struct TeamsNotifier {
    webhook: String,
    prefix: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
    backoff: Duration,
}

impl TeamsNotifier {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            prefix: String::new(),
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
            backoff: Duration::from_millis(500),
        }
    }

    /// Prepended to the card title, e.g. `owner/repo: `.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Total attempts per notification, `1..=10`.
    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.clamp(1, MAX_RETRIES);
        self
    }

    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.backoff = base;
        self
    }

    pub fn card_for(&self, pr: &PullRequest) -> TeamsMessage {
        let title = pr.display_title();
        let text = match pr.html_url.as_deref() {
            Some(url) => format!("[{title}]({url})"),
            None => "no URL available".to_string(),
        };
        TeamsMessage::simple(format!("{}{}", self.prefix, title), text)
    }

    pub async fn send(&self, pr: &PullRequest) -> Result<()> {
        let payload = self.card_for(pr);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.webhook)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status_ref() {
                    Ok(_) => return Ok(()),
                    Err(e) if !retryable(rsp.status()) => {
                        return Err(anyhow!("Teams webhook HTTP error: {e}"));
                    }
                    Err(e) => anyhow!("Teams webhook HTTP error: {e}"),
                },
                Err(e) => anyhow!("Teams webhook request failed: {e}"),
            };

            if attempt >= self.max_retries {
                return Err(err);
            }
            tracing::debug!(attempt, error = %err, "retrying Teams webhook");
            tokio::time::sleep(self.backoff_after(attempt)).await;
        }
    }

    /// Delay after the given failed attempt: `backoff`, `2 * backoff`, `4 * backoff`, ...
    fn backoff_after(&self, attempt: u8) -> Duration {
        let factor = 1u32
            .checked_shl(u32::from(attempt.saturating_sub(1)))
            .unwrap_or(u32::MAX);
        self.backoff.saturating_mul(factor)
    }
}

fn retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

#[async_trait::async_trait]
impl Notifier for TeamsNotifier {
    fn name(&self) -> &'static str {
        "teams"
    }

    async fn notify(&self, pr: &PullRequest) {
        match self.send(pr).await {
            Ok(()) => {
                counter!("watchprs_notifications_total", "sink" => self.name()).increment(1);
            }
            Err(e) => {
                tracing::warn!(number = pr.number, error = %e, "Failed to send message to Teams");
                counter!("watchprs_notification_failures_total", "sink" => self.name())
                    .increment(1);
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TeamsMessage {
    #[serde(rename = "type")]
    kind: &'static str,
    attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Serialize)]
struct Attachment {
    #[serde(rename = "contentType")]
    content_type: &'static str,
    content: AdaptiveCard,
}

#[derive(Debug, Clone, Serialize)]
struct AdaptiveCard {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(rename = "$schema")]
    schema: &'static str,
    version: &'static str,
    body: Vec<TextBlock>,
    msteams: MsTeams,
}

#[derive(Debug, Clone, Serialize)]
struct TextBlock {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
    wrap: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    weight: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
struct MsTeams {
    width: &'static str,
}

impl TeamsMessage {
    fn simple(title: String, text: String) -> Self {
        Self {
            kind: "message",
            attachments: vec![Attachment {
                content_type: CARD_CONTENT_TYPE,
                content: AdaptiveCard {
                    kind: "AdaptiveCard",
                    schema: CARD_SCHEMA,
                    version: CARD_VERSION,
                    body: vec![
                        TextBlock {
                            kind: "TextBlock",
                            text: title,
                            wrap: true,
                            size: Some("Large"),
                            weight: Some("Bolder"),
                        },
                        TextBlock {
                            kind: "TextBlock",
                            text,
                            wrap: true,
                            size: None,
                            weight: None,
                        },
                    ],
                    msteams: MsTeams { width: "Full" },
                },
            }],
        }
    }

    pub fn title(&self) -> &str {
        &self.attachments[0].content.body[0].text
    }

    pub fn text(&self) -> &str {
        &self.attachments[0].content.body[1].text
    }
}
