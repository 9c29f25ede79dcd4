// src/source/github.rs
//! GitHub REST client: lists open pull requests and downloads their diffs.

use reqwest::header::{ACCEPT, LINK, USER_AGENT};
use reqwest::{Client, StatusCode};

use crate::matcher::{DiffError, DiffFetcher};
use crate::source::types::{PullRequest, PullRequestSource, RepoRef, SourceError};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
const AGENT: &str = concat!("watchprs/", env!("CARGO_PKG_VERSION"));
// Error bodies are only logged; keep them short.
const MAX_ERROR_BODY: usize = 512;

#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    api_url: String,
    token: String,
}

impl GitHubClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: DEFAULT_API_URL.to_string(),
            token: token.into(),
        }
    }

    /// Point at GitHub Enterprise (`https://host/api/v3`) or a local stand-in.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn pulls_url(&self, repo: &RepoRef) -> String {
        format!("{}/repos/{}/{}/pulls", self.api_url, repo.owner, repo.repo)
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_url", &self.api_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[async_trait::async_trait]
impl PullRequestSource for GitHubClient {
    async fn list_open(
        &self,
        repo: &RepoRef,
        base: Option<&str>,
        per_page: u8,
    ) -> Result<Vec<PullRequest>, SourceError> {
        let mut query = vec![("state", "open".to_string()), ("per_page", per_page.to_string())];
        if let Some(b) = base {
            query.push(("base", b.to_string()));
        }

        let resp = self
            .client
            .get(self.pulls_url(repo))
            .query(&query)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, AGENT)
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await?;

        let status = resp.status();
        let has_next = resp
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|l| l.contains("rel=\"next\""));
        let body = resp.text().await?;

        if !status.is_success() {
            let mut body = body;
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(SourceError::Status { status, body });
        }

        let prs: Vec<PullRequest> = serde_json::from_str(&body)?;
        tracing::debug!(repo = %repo, count = prs.len(), has_next, "listed pull requests");
        Ok(prs)
    }

    fn name(&self) -> &'static str {
        "github"
    }
}

#[async_trait::async_trait]
impl DiffFetcher for GitHubClient {
    async fn fetch_diff(&self, url: &str) -> Result<String, DiffError> {
        let http = |source| DiffError::Http {
            url: url.to_string(),
            source,
        };
        let resp = self
            .client
            .get(url)
            .header(USER_AGENT, AGENT)
            .send()
            .await
            .map_err(http)?;

        if resp.status() != StatusCode::OK {
            return Err(DiffError::Status {
                url: url.to_string(),
                status: resp.status(),
            });
        }
        resp.text().await.map_err(http)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_is_normalized_and_token_not_printed() {
        let c = GitHubClient::new("sekrit").with_api_url("https://ghe.example.com/api/v3/");
        assert_eq!(
            c.pulls_url(&RepoRef::new("o", "r")),
            "https://ghe.example.com/api/v3/repos/o/r/pulls"
        );
        assert!(!format!("{c:?}").contains("sekrit"));
    }
}
