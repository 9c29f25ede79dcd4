// src/matcher/diff.rs
//! Content matcher: downloads a pull request's unified diff and checks the touched paths.

use metrics::counter;
use regex::Regex;
use std::sync::Arc;

use super::Matcher;
use crate::source::PullRequest;

const DEV_NULL: &str = "/dev/null";

#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    #[error("could not fetch {url:?}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("fetching {url:?} returned status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("could not parse diff: {0}")]
    Parse(String),
}

#[async_trait::async_trait]
pub trait DiffFetcher: Send + Sync {
    async fn fetch_diff(&self, url: &str) -> Result<String, DiffError>;
}

/// Paths of one file section. `None` on the side that does not exist (creation/deletion).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileChange {
    pub old_name: Option<String>,
    pub new_name: Option<String>,
}

impl FileChange {
    pub fn touches(&self, pattern: &Regex) -> bool {
        self.new_name.as_deref().is_some_and(|n| pattern.is_match(n))
            || self.old_name.as_deref().is_some_and(|n| pattern.is_match(n))
    }
}

/// Extract the file list from a git-style unified diff.
pub fn parse_changed_files(diff: &str) -> Result<Vec<FileChange>, DiffError> {
    let mut files: Vec<FileChange> = Vec::new();
    // Extended headers are only read between `diff --git` and the first hunk,
    // hunk bodies may contain lines that look like `--- ...`.
    let mut in_header = false;

    for line in diff.lines() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            let (old, new) = split_git_header(rest).ok_or_else(|| {
                DiffError::Parse(format!("malformed file header: {line:?}"))
            })?;
            files.push(FileChange {
                old_name: Some(old),
                new_name: Some(new),
            });
            in_header = true;
            continue;
        }
        if !in_header {
            continue;
        }
        let Some(current) = files.last_mut() else {
            continue;
        };

        if line.starts_with("@@") {
            in_header = false;
        } else if line.starts_with("new file mode") {
            current.old_name = None;
        } else if line.starts_with("deleted file mode") {
            current.new_name = None;
        } else if let Some(p) = line.strip_prefix("rename from ") {
            current.old_name = Some(unquote(p));
        } else if let Some(p) = line.strip_prefix("rename to ") {
            current.new_name = Some(unquote(p));
        } else if let Some(p) = line.strip_prefix("--- ") {
            current.old_name = side_path(p, "a/");
        } else if let Some(p) = line.strip_prefix("+++ ") {
            current.new_name = side_path(p, "b/");
        }
    }

    if files.is_empty() && !diff.trim().is_empty() {
        return Err(DiffError::Parse("no file sections found".into()));
    }
    Ok(files)
}

/// `a/<old> b/<new>`; paths may contain spaces, so prefer the split where both sides agree.
fn split_git_header(rest: &str) -> Option<(String, String)> {
    let rest = rest.trim_end();
    if rest.starts_with('"') {
        let close = closing_quote(rest)?;
        let old = unquote(&rest[..=close]);
        let new = unquote(rest[close + 1..].trim_start());
        return Some((old.strip_prefix("a/")?.to_string(), new.strip_prefix("b/")?.to_string()));
    }

    let body = rest.strip_prefix("a/")?;
    let candidates: Vec<usize> = body.match_indices(" b/").map(|(i, _)| i).collect();
    let pick = candidates
        .iter()
        .copied()
        .find(|&i| body[..i] == body[i + 3..])
        .or_else(|| candidates.first().copied())?;
    Some((body[..pick].to_string(), body[pick + 3..].to_string()))
}

fn closing_quote(s: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in s.char_indices().skip(1) {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return Some(i),
            _ => {}
        }
    }
    None
}

fn side_path(p: &str, prefix: &str) -> Option<String> {
    // Some tools append a tab and a timestamp.
    let p = p.split('\t').next().unwrap_or(p).trim_end();
    if p == DEV_NULL {
        return None;
    }
    let p = unquote(p);
    Some(p.strip_prefix(prefix).map(str::to_string).unwrap_or(p))
}

fn unquote(p: &str) -> String {
    let p = p.trim();
    match p.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        Some(inner) => inner.replace("\\\"", "\"").replace("\\\\", "\\"),
        None => p.to_string(),
    }
}

/// Matches when any old or new path in the pull request's diff matches `pattern`.
pub struct FileMatcher {
    fetcher: Arc<dyn DiffFetcher>,
    pattern: Regex,
}

impl FileMatcher {
    pub fn new(fetcher: Arc<dyn DiffFetcher>, pattern: Regex) -> Self {
        Self { fetcher, pattern }
    }
}

#[async_trait::async_trait]
impl Matcher for FileMatcher {
    async fn matches(&self, pr: &PullRequest) -> bool {
        let Some(url) = pr.diff_url.as_deref() else {
            return false;
        };
        let number = pr.number.unwrap_or_default();

        let body = match self.fetcher.fetch_diff(url).await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(number, error = %e, "error fetching diff");
                counter!("watchprs_diff_errors_total").increment(1);
                return false;
            }
        };

        match parse_changed_files(&body) {
            Ok(files) => files.iter().any(|f| f.touches(&self.pattern)),
            Err(e) => {
                tracing::warn!(number, error = %e, "error parsing diff");
                counter!("watchprs_diff_errors_total").increment(1);
                false
            }
        }
    }
}
