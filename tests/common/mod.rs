// tests/common/mod.rs
// In-memory stand-ins for the GitHub API, diff downloads and sinks.
#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use watchprs::matcher::{DiffError, DiffFetcher};
use watchprs::notify::Notifier;
use watchprs::source::{BaseRef, PullRequest, PullRequestSource, RepoRef, SourceError};

pub fn pr(number: u64, branch: &str) -> PullRequest {
    PullRequest {
        number: Some(number),
        title: Some(format!("PR {number}")),
        html_url: Some(format!("https://github.com/acme/widgets/pull/{number}")),
        diff_url: Some(format!("https://github.com/acme/widgets/pull/{number}.diff")),
        base: Some(BaseRef {
            label: Some(branch.to_string()),
            git_ref: Some(branch.to_string()),
        }),
        ..Default::default()
    }
}

pub fn numbers(prs: &[PullRequest]) -> Vec<u64> {
    prs.iter().filter_map(|p| p.number).collect()
}

/// A git diff touching `paths`.
pub fn diff_touching(paths: &[&str]) -> String {
    paths
        .iter()
        .map(|p| {
            format!(
                "diff --git a/{p} b/{p}\nindex 1111111..2222222 100644\n--- a/{p}\n+++ b/{p}\n@@ -1 +1 @@\n-a\n+b\n"
            )
        })
        .collect()
}

/// Returns scripted pages in order, then keeps returning the last successful page.
#[derive(Default)]
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<Vec<PullRequest>, String>>>,
    last: Mutex<Vec<PullRequest>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<Vec<PullRequest>, String>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PullRequestSource for ScriptedSource {
    async fn list_open(
        &self,
        _repo: &RepoRef,
        _base: Option<&str>,
        _per_page: u8,
    ) -> Result<Vec<PullRequest>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().pop_front() {
            Some(Ok(page)) => {
                *self.last.lock() = page.clone();
                Ok(page)
            }
            Some(Err(msg)) => Err(SourceError::Other(msg)),
            None => Ok(self.last.lock().clone()),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Diff bodies keyed by URL; unknown URLs answer 404.
#[derive(Default)]
pub struct FakeDiffs {
    bodies: HashMap<String, String>,
    fetches: AtomicUsize,
}

impl FakeDiffs {
    pub fn with(mut self, pr: &PullRequest, paths: &[&str]) -> Self {
        let url = pr.diff_url.clone().expect("diff url");
        self.bodies.insert(url, diff_touching(paths));
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DiffFetcher for FakeDiffs {
    async fn fetch_diff(&self, url: &str) -> Result<String, DiffError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.bodies.get(url).cloned().ok_or_else(|| DiffError::Status {
            url: url.to_string(),
            status: reqwest::StatusCode::NOT_FOUND,
        })
    }
}

/// Records every pull request number it is notified about.
#[derive(Default)]
pub struct RecordingSink(Mutex<Vec<u64>>);

impl RecordingSink {
    pub fn seen(&self) -> Vec<u64> {
        let mut v = self.0.lock().clone();
        v.sort_unstable();
        v
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn notify(&self, pr: &PullRequest) {
        self.0.lock().push(pr.number.unwrap_or_default());
    }
}

/// Fails every delivery (and logs it, like a real sink would).
#[derive(Default)]
pub struct FailingSink(AtomicUsize);

impl FailingSink {
    pub fn attempts(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Notifier for FailingSink {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn notify(&self, pr: &PullRequest) {
        self.0.fetch_add(1, Ordering::SeqCst);
        tracing::warn!(number = pr.number, "delivery failed");
    }
}

/// Never finishes a delivery.
#[derive(Default)]
pub struct StalledSink;

#[async_trait::async_trait]
impl Notifier for StalledSink {
    fn name(&self) -> &'static str {
        "stalled"
    }

    async fn notify(&self, _pr: &PullRequest) {
        std::future::pending::<()>().await;
    }
}
