// src/detector.rs
//! Novelty detection over a single page of open pull requests.
//!
//! The detector keeps one number, the watermark: the highest pull request number it has
//! evaluated for its repository. A poll reports matching pull requests numbered above the
//! watermark and then raises the watermark to the highest number on the page, matched or not.
//! The watermark lives in memory only and never decreases.

use metrics::{counter, gauge};
use std::sync::Arc;

use crate::matcher::{MatchAll, Matcher};
use crate::source::{PullRequest, PullRequestSource, RepoRef, SourceError};

/// Items requested per poll. Only the first page is ever read.
pub const PAGE_SIZE: u8 = 25;

pub struct NoveltyDetector {
    source: Arc<dyn PullRequestSource>,
    repo: RepoRef,
    base: Option<String>,
    watermark: u64,
}

impl NoveltyDetector {
    pub fn new(source: Arc<dyn PullRequestSource>, repo: RepoRef) -> Self {
        Self {
            source,
            repo,
            base: None,
            watermark: 0,
        }
    }

    /// Ask the source to only list pull requests targeting `branch`.
    pub fn with_base_filter(mut self, branch: impl Into<String>) -> Self {
        self.base = Some(branch.into());
        self
    }

    pub fn repo(&self) -> &RepoRef {
        &self.repo
    }

    pub fn watermark(&self) -> u64 {
        self.watermark
    }

    /// Sweep once with an always-true matcher so pull requests that already exist are
    /// never reported. Returns the resulting watermark.
    pub async fn baseline(&mut self) -> Result<u64, SourceError> {
        let skipped = self.poll(&MatchAll).await?;
        tracing::info!(
            repo = %self.repo,
            source = self.source.name(),
            watermark = self.watermark,
            existing = skipped.len(),
            "baseline established"
        );
        Ok(self.watermark)
    }

    /// Fetch one page and return the matching pull requests above the watermark, in source order.
    ///
    /// On error the watermark is left untouched. The watermark is only written after the whole
    /// page has been scanned, so dropping this future part-way leaves it unchanged as well.
    pub async fn poll(&mut self, matcher: &dyn Matcher) -> Result<Vec<PullRequest>, SourceError> {
        let page = self
            .source
            .list_open(&self.repo, self.base.as_deref(), PAGE_SIZE)
            .await?;

        let mut highest = self.watermark;
        let mut out = Vec::new();
        for pr in page {
            let Some(number) = pr.valid_number() else {
                tracing::debug!(repo = %self.repo, "skipping pull request without a number");
                continue;
            };
            highest = highest.max(number);
            // Checked before the matcher: it yields the same result and spares a diff download.
            if number <= self.watermark {
                continue;
            }
            if !matcher.matches(&pr).await {
                tracing::debug!(number, "pull request does not match");
                continue;
            }
            out.push(pr);
        }

        if highest > self.watermark {
            tracing::debug!(from = self.watermark, to = highest, "advancing watermark");
        }
        self.watermark = highest;
        gauge!("watchprs_watermark").set(self.watermark as f64);
        counter!("watchprs_matched_total").increment(out.len() as u64);
        Ok(out)
    }
}
