// src/source/mod.rs
pub mod github;
pub mod types;

pub use github::GitHubClient;
pub use types::{Author, BaseRef, PullRequest, PullRequestSource, RepoRef, SourceError};
