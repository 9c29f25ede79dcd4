// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod detector;
pub mod dispatch;
pub mod matcher;
pub mod notify;
pub mod scheduler;
pub mod source;
pub mod telemetry;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

// ---- Re-exports for stable public API ----
pub use crate::config::Settings;
pub use crate::detector::{NoveltyDetector, PAGE_SIZE};
pub use crate::dispatch::Dispatcher;
pub use crate::matcher::Matcher;
pub use crate::notify::{LogNotifier, Notifier, TeamsNotifier};
pub use crate::scheduler::{WatchError, Watcher};
pub use crate::source::{GitHubClient, PullRequest, PullRequestSource, RepoRef};

/// How long shutdown waits for notifications that are still in flight.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Build the configured sinks: Teams when a webhook is set, the log sink with `--debug`.
pub fn build_notifiers(settings: &Settings) -> Result<Vec<Arc<dyn Notifier>>> {
    let mut sinks: Vec<Arc<dyn Notifier>> = Vec::new();

    if let Some(url) = &settings.teams_webhook {
        notify::teams::validate_webhook_url(url)?;
        tracing::info!("Setting up Microsoft Teams integration");
        sinks.push(Arc::new(
            TeamsNotifier::new(url.clone()).with_prefix(format!("{}: ", settings.repo)),
        ));
    }
    if settings.debug {
        sinks.push(Arc::new(LogNotifier));
    }
    Ok(sinks)
}

/// Wire the GitHub client, matcher, detector and sinks into a watcher.
pub fn build_watcher(settings: &Settings, sinks: Vec<Arc<dyn Notifier>>) -> (Watcher, Dispatcher) {
    let github = Arc::new(GitHubClient::new(settings.token.clone()).with_api_url(&settings.api_url));

    let mut detector = NoveltyDetector::new(github.clone(), settings.repo.clone());
    if let Some(branch) = &settings.base_branch {
        detector = detector.with_base_filter(branch.clone());
    }
    let matcher = matcher::pull_request_matcher(
        settings.base_re.clone(),
        settings.files_re.clone(),
        github,
    );
    let dispatcher = Dispatcher::new(sinks);
    let watcher = Watcher::new(detector, Arc::new(matcher), dispatcher.clone(), settings.period);
    (watcher, dispatcher)
}

/// Run until `cancel` fires. Errors only when startup fails.
pub async fn run(settings: Settings, cancel: CancellationToken) -> Result<()> {
    tracing::debug!(?settings, "starting");
    let sinks = build_notifiers(&settings)?;

    let metrics_task = match settings.metrics_addr {
        Some(addr) => {
            let metrics = telemetry::Metrics::install()?;
            let listener = telemetry::Metrics::bind(addr).await?;
            let cancel = cancel.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = metrics.serve(listener, cancel).await {
                    tracing::warn!(error = %e, "metrics server stopped");
                }
            }))
        }
        None => None,
    };

    let (watcher, dispatcher) = build_watcher(&settings, sinks);
    if dispatcher.is_empty() {
        tracing::warn!("no notification sinks configured; new pull requests will only be counted");
    }
    tracing::info!(
        repo = %settings.repo,
        period = ?settings.period,
        sinks = ?dispatcher.sink_names(),
        "watching pull requests"
    );

    let outcome = watcher.run(cancel.clone()).await;
    // Stop the metrics server on the fatal path too.
    cancel.cancel();
    if let Some(task) = metrics_task {
        join_logged(task, "metrics server").await;
    }
    outcome?;

    if dispatcher.in_flight() > 0
        && tokio::time::timeout(SHUTDOWN_GRACE, dispatcher.settle())
            .await
            .is_err()
    {
        tracing::warn!(
            pending = dispatcher.in_flight(),
            "exiting with notifications still in flight"
        );
    }
    tracing::info!("shut down");
    Ok(())
}

/// Await a background task; a panic or abort is logged rather than dropped.
async fn join_logged(task: JoinHandle<()>, what: &'static str) -> bool {
    match task.await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(task = what, error = %e, "background task failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failed_background_tasks_are_reported() {
        assert!(join_logged(tokio::spawn(async {}), "ok").await);

        let panicked = tokio::spawn(async { panic!("boom") });
        assert!(!join_logged(panicked, "panics").await);

        let aborted = tokio::spawn(std::future::pending::<()>());
        aborted.abort();
        assert!(!join_logged(aborted, "aborted").await);
    }
}
