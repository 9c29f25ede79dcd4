// src/source/types.rs
use serde::{Deserialize, Serialize};
use std::fmt;

pub const UNTITLED: &str = "_untitled PR_";

/// The (owner, repository) pair a watcher is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseRef {
    /// `owner:branch`, what the branch pattern is matched against.
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, rename = "ref")]
    pub git_ref: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub login: String,
}

/// One open pull request as returned by the listing endpoint.
/// Everything is optional on the wire; a missing or zero `number` marks the item as malformed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    #[serde(default)]
    pub number: Option<u64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub diff_url: Option<String>,
    #[serde(default)]
    pub base: Option<BaseRef>,
    #[serde(default)]
    pub user: Option<Author>,
}

impl PullRequest {
    /// The identifier, if the item carries a usable one.
    pub fn valid_number(&self) -> Option<u64> {
        self.number.filter(|n| *n > 0)
    }

    pub fn base_label(&self) -> Option<&str> {
        self.base.as_ref().and_then(|b| b.label.as_deref())
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(UNTITLED)
    }

    pub fn author(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.login.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("listing pull requests: request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("listing pull requests: status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("listing pull requests: decoding response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("listing pull requests: {0}")]
    Other(String),
}

/// Item Source: one page of open pull requests, provider order (newest first on GitHub).
#[async_trait::async_trait]
pub trait PullRequestSource: Send + Sync {
    async fn list_open(
        &self,
        repo: &RepoRef,
        base: Option<&str>,
        per_page: u8,
    ) -> Result<Vec<PullRequest>, SourceError>;

    fn name(&self) -> &'static str;
}
