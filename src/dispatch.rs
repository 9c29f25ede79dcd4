// src/dispatch.rs
use std::sync::Arc;
use tokio_util::task::TaskTracker;

use crate::notify::Notifier;
use crate::source::PullRequest;

/// Fans pull requests out to every sink.
///
/// Each (pull request, sink) pair runs as its own task. Delivery is best-effort with no join:
/// `dispatch` returns as soon as the tasks are spawned, tasks are not ordered relative to each
/// other, and the caller never waits for them before polling again. A slow or failing sink
/// therefore cannot hold up or affect another one. [`Dispatcher::settle`] exists for shutdown
/// grace periods and tests; the poll loop never calls it.
#[derive(Clone)]
pub struct Dispatcher {
    sinks: Arc<[Arc<dyn Notifier>]>,
    tasks: TaskTracker,
}

impl Dispatcher {
    pub fn new(sinks: Vec<Arc<dyn Notifier>>) -> Self {
        Self {
            sinks: sinks.into(),
            tasks: TaskTracker::new(),
        }
    }

    pub fn sink_names(&self) -> Vec<&'static str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Spawn one notification task per (item, sink). Returns the number of tasks spawned.
    /// Must be called from within a Tokio runtime.
    pub fn dispatch(&self, items: Vec<PullRequest>) -> usize {
        let mut spawned = 0;
        for pr in items {
            let pr = Arc::new(pr);
            for sink in self.sinks.iter() {
                let sink = Arc::clone(sink);
                let pr = Arc::clone(&pr);
                self.tasks.spawn(async move {
                    tracing::debug!(sink = sink.name(), number = pr.number, "notifying");
                    sink.notify(&pr).await;
                });
                spawned += 1;
            }
        }
        spawned
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Wait until every notification spawned so far has finished.
    pub async fn settle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<u64>>);

    #[async_trait::async_trait]
    impl Notifier for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        async fn notify(&self, pr: &PullRequest) {
            self.0.lock().push(pr.number.unwrap_or_default());
        }
    }

    fn pr(n: u64) -> PullRequest {
        PullRequest {
            number: Some(n),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn every_item_reaches_every_sink() {
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        let d = Dispatcher::new(vec![a.clone(), b.clone()]);

        assert_eq!(d.dispatch(vec![pr(1), pr(2)]), 4);
        d.settle().await;

        for r in [&a, &b] {
            let mut got = r.0.lock().clone();
            got.sort_unstable();
            assert_eq!(got, vec![1, 2]);
        }
        assert_eq!(d.in_flight(), 0);
    }

    #[tokio::test]
    async fn no_sinks_spawns_nothing() {
        let d = Dispatcher::new(vec![]);
        assert!(d.is_empty());
        assert_eq!(d.dispatch(vec![pr(1)]), 0);
    }
}
