// src/scheduler.rs
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::detector::NoveltyDetector;
use crate::dispatch::Dispatcher;
use crate::matcher::Matcher;
use crate::source::SourceError;

/// Longest accepted poll period. Longer values are configuration errors.
pub const MAX_PERIOD: Duration = Duration::from_secs(7 * 24 * 3600);

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("establishing the initial watermark: {0}")]
    Baseline(#[source] SourceError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Initializing,
    Idle,
    Polling,
    ShuttingDown,
}

/// The poll loop: baseline once, then poll on every tick until cancelled.
///
/// Polls run one at a time on the calling task. Only notifications run concurrently,
/// see [`Dispatcher`].
pub struct Watcher {
    detector: NoveltyDetector,
    matcher: Arc<dyn Matcher>,
    dispatcher: Dispatcher,
    period: Duration,
}

impl Watcher {
    /// `period` is clamped to `1ms..=MAX_PERIOD`.
    pub fn new(
        detector: NoveltyDetector,
        matcher: Arc<dyn Matcher>,
        dispatcher: Dispatcher,
        period: Duration,
    ) -> Self {
        Self {
            detector,
            matcher,
            dispatcher,
            // tokio intervals panic on zero, and on deadlines past the end of time
            period: period.clamp(Duration::from_millis(1), MAX_PERIOD),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Runs until `cancel` fires (`Ok`) or the baseline sweep fails (`Err`).
    /// Failed polls after the baseline are logged and retried on the next tick.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), WatchError> {
        let repo = self.detector.repo().to_string();
        transition(&repo, WatchState::Initializing);

        let baseline = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                transition(&repo, WatchState::ShuttingDown);
                return Ok(());
            }
            res = self.detector.baseline() => res,
        };
        baseline.map_err(WatchError::Baseline)?;

        // First poll one full period after the baseline; no catch-up bursts.
        let now = Instant::now();
        let start = now.checked_add(self.period).unwrap_or(now);
        let mut ticker = time::interval_at(start, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            transition(&repo, WatchState::Idle);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            transition(&repo, WatchState::Polling);
            counter!("watchprs_polls_total").increment(1);
            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                res = self.detector.poll(self.matcher.as_ref()) => res,
            };

            match polled {
                Ok(items) if items.is_empty() => {
                    tracing::debug!(watermark = self.detector.watermark(), "no new pull requests");
                }
                Ok(items) => {
                    let numbers: Vec<u64> = items.iter().filter_map(|p| p.number).collect();
                    let spawned = self.dispatcher.dispatch(items);
                    tracing::info!(
                        ?numbers,
                        notifications = spawned,
                        watermark = self.detector.watermark(),
                        "new pull requests"
                    );
                }
                Err(e) => {
                    counter!("watchprs_poll_errors_total").increment(1);
                    tracing::warn!(error = %e, "poll failed, retrying on next tick");
                }
            }
        }

        transition(&repo, WatchState::ShuttingDown);
        Ok(())
    }
}

fn transition(repo: &str, state: WatchState) {
    tracing::trace!(repo, ?state, "watcher state");
}
