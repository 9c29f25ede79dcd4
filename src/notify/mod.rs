// src/notify/mod.rs
//! Notification sinks.

pub mod teams;

use metrics::counter;

use crate::source::PullRequest;

pub use teams::TeamsNotifier;

/// A receiver for newly discovered pull requests.
///
/// `notify` has nothing to report back: a sink logs and swallows its own failures and applies
/// its own timeout and retry policy. It must not block indefinitely.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn notify(&self, pr: &PullRequest);
}

/// Debug sink: writes one log line per pull request.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn notify(&self, pr: &PullRequest) {
        let url = pr.html_url.as_deref().unwrap_or("<no URL in PR>");
        let title = pr.title.as_deref().unwrap_or("<no title>");
        tracing::info!(number = pr.number, author = pr.author(), "Handling PR {url}: {title:?}");
        counter!("watchprs_notifications_total", "sink" => self.name()).increment(1);
    }
}
