// src/matcher/mod.rs
pub mod diff;

use regex::Regex;
use std::sync::Arc;

use crate::source::PullRequest;

pub use diff::{DiffError, DiffFetcher, FileChange, FileMatcher};

/// Decides whether a pull request is worth a notification.
///
/// Branch and file checks are both expressed through this trait so they compose with [`AllOf`].
/// Implementations must not fail: anything that goes wrong is logged and reported as `false`.
#[async_trait::async_trait]
pub trait Matcher: Send + Sync {
    async fn matches(&self, pr: &PullRequest) -> bool;
}

/// Accepts every pull request. Used for the baseline sweep.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchAll;

#[async_trait::async_trait]
impl Matcher for MatchAll {
    async fn matches(&self, _pr: &PullRequest) -> bool {
        true
    }
}

/// Adapts a plain synchronous predicate.
pub struct MatchFn<F>(pub F);

#[async_trait::async_trait]
impl<F> Matcher for MatchFn<F>
where
    F: Fn(&PullRequest) -> bool + Send + Sync,
{
    async fn matches(&self, pr: &PullRequest) -> bool {
        (self.0)(pr)
    }
}

/// Conjunction, evaluated in order and short-circuiting on the first `false`.
/// Put cheap matchers first so expensive ones (diff downloads) run only when needed.
#[derive(Clone, Default)]
pub struct AllOf {
    matchers: Vec<Arc<dyn Matcher>>,
}

impl AllOf {
    pub fn new(matchers: Vec<Arc<dyn Matcher>>) -> Self {
        Self { matchers }
    }

    pub fn with(mut self, m: Arc<dyn Matcher>) -> Self {
        self.matchers.push(m);
        self
    }
}

#[async_trait::async_trait]
impl Matcher for AllOf {
    async fn matches(&self, pr: &PullRequest) -> bool {
        for m in &self.matchers {
            if !m.matches(pr).await {
                return false;
            }
        }
        true
    }
}

/// Matches the target branch label (`owner:branch`). No base means no match.
#[derive(Debug, Clone)]
pub struct BranchMatcher {
    pattern: Regex,
}

impl BranchMatcher {
    pub fn new(pattern: Regex) -> Self {
        Self { pattern }
    }
}

#[async_trait::async_trait]
impl Matcher for BranchMatcher {
    async fn matches(&self, pr: &PullRequest) -> bool {
        pr.base_label().is_some_and(|l| self.pattern.is_match(l))
    }
}

/// The predicate the binary watches with: branch pattern AND file pattern.
pub fn pull_request_matcher(branch: Regex, files: Regex, fetcher: Arc<dyn DiffFetcher>) -> AllOf {
    AllOf::new(vec![
        Arc::new(BranchMatcher::new(branch)),
        Arc::new(FileMatcher::new(fetcher, files)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::BaseRef;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pr_on(label: Option<&str>) -> PullRequest {
        PullRequest {
            number: Some(1),
            base: label.map(|l| BaseRef {
                label: Some(l.to_string()),
                git_ref: None,
            }),
            ..Default::default()
        }
    }

    struct Counting(AtomicUsize, bool);

    #[async_trait::async_trait]
    impl Matcher for Counting {
        async fn matches(&self, _pr: &PullRequest) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            self.1
        }
    }

    #[tokio::test]
    async fn branch_matcher_uses_label_and_rejects_missing_base() {
        let m = BranchMatcher::new(Regex::new(":main$").unwrap());
        assert!(m.matches(&pr_on(Some("acme:main"))).await);
        assert!(!m.matches(&pr_on(Some("acme:dev"))).await);
        assert!(!m.matches(&pr_on(None)).await);
    }

    #[tokio::test]
    async fn all_of_short_circuits_in_order() {
        let second = Arc::new(Counting(AtomicUsize::new(0), true));
        let all = AllOf::new(vec![Arc::new(MatchFn(|_: &PullRequest| false)), second.clone()]);
        assert!(!all.matches(&pr_on(None)).await);
        assert_eq!(second.0.load(Ordering::SeqCst), 0);

        let all = AllOf::default().with(Arc::new(MatchAll)).with(second.clone());
        assert!(all.matches(&pr_on(None)).await);
        assert_eq!(second.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_conjunction_matches() {
        assert!(AllOf::default().matches(&pr_on(None)).await);
    }
}
