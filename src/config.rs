// src/config.rs
//! Process settings: command-line flags (with env fallbacks) layered over an optional TOML file.

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::scheduler::MAX_PERIOD;
use crate::source::github::DEFAULT_API_URL;
use crate::source::RepoRef;

pub const TOKEN_ENV: &str = "GH_TOKEN";
pub const TEAMS_URL_ENV: &str = "TEAMS_WEBHOOK";
const DEFAULT_PATTERN: &str = ".*";
const DEFAULT_PERIOD: Duration = Duration::from_secs(60);

#[derive(Default, Parser)]
#[command(
    name = "watchprs",
    version,
    about = "Notify chat webhooks about new pull requests touching interesting files"
)]
pub struct Cli {
    /// TOML file with defaults for any of the flags below
    #[arg(long, env = "WATCHPRS_CONFIG")]
    pub config: Option<PathBuf>,

    /// GitHub repository owner
    #[arg(long)]
    pub owner: Option<String>,

    /// GitHub repository
    #[arg(long)]
    pub repo: Option<String>,

    /// Regular expression for the PR's target branch label (`owner:branch`) [default: .*]
    #[arg(long = "base-re")]
    pub base_re: Option<String>,

    /// Regular expression for files of interest [default: .*]
    #[arg(long = "files-re")]
    pub files_re: Option<String>,

    /// Only list PRs targeting exactly this branch (server-side filter)
    #[arg(long = "base-branch")]
    pub base_branch: Option<String>,

    /// Time between GitHub API calls, e.g. `30s`, `1m`, `1h30m` [default: 1m]
    #[arg(long, value_parser = parse_period)]
    pub period: Option<Duration>,

    /// Print debug information and log every matching PR
    #[arg(long)]
    pub debug: bool,

    /// GitHub API base URL
    #[arg(long, env = "GITHUB_API_URL")]
    pub api_url: Option<String>,

    /// Serve Prometheus metrics on this address, e.g. `127.0.0.1:9100`
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,

    #[arg(long = "gh-token", env = TOKEN_ENV, hide = true, hide_env_values = true)]
    pub token: Option<String>,

    #[arg(long = "teams-webhook", env = TEAMS_URL_ENV, hide = true, hide_env_values = true)]
    pub teams_webhook: Option<String>,
}

/// Everything the config file may set. Secrets stay in the environment.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub base_re: Option<String>,
    pub files_re: Option<String>,
    pub base_branch: Option<String>,
    pub period: Option<String>,
    pub debug: Option<bool>,
    pub api_url: Option<String>,
    pub metrics_addr: Option<SocketAddr>,
}

pub fn load_file_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
}

#[derive(Clone)]
pub struct Settings {
    pub repo: RepoRef,
    pub base_re: Regex,
    pub files_re: Regex,
    pub base_branch: Option<String>,
    pub period: Duration,
    pub debug: bool,
    pub api_url: String,
    pub metrics_addr: Option<SocketAddr>,
    pub token: String,
    pub teams_webhook: Option<String>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("repo", &self.repo.to_string())
            .field("base_re", &self.base_re.as_str())
            .field("files_re", &self.files_re.as_str())
            .field("base_branch", &self.base_branch)
            .field("period", &self.period)
            .field("debug", &self.debug)
            .field("api_url", &self.api_url)
            .field("metrics_addr", &self.metrics_addr)
            .field("token", &"<redacted>")
            .field("teams_webhook", &self.teams_webhook.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Settings {
    /// Resolve flags/env over the config file over defaults, and validate.
    pub fn resolve(cli: Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(p) => load_file_config(p)?,
            None => FileConfig::default(),
        };

        let owner = non_empty(cli.owner.or(file.owner));
        let repo = non_empty(cli.repo.or(file.repo));
        let (Some(owner), Some(repo)) = (owner, repo) else {
            bail!("--owner and --repo must be set");
        };

        let token = non_empty(cli.token)
            .ok_or_else(|| anyhow!("Environment variable {TOKEN_ENV:?} must be set!"))?;

        let files = cli
            .files_re
            .or(file.files_re)
            .unwrap_or_else(|| DEFAULT_PATTERN.to_string());
        let files_re = Regex::new(&files)
            .with_context(|| format!("Could not compile --files-re={files:?}"))?;
        let base = cli
            .base_re
            .or(file.base_re)
            .unwrap_or_else(|| DEFAULT_PATTERN.to_string());
        let base_re =
            Regex::new(&base).with_context(|| format!("Could not compile --base-re={base:?}"))?;

        let period = match (cli.period, file.period) {
            (Some(p), _) => p,
            (None, Some(s)) => parse_period(&s).map_err(|e| anyhow!("period in config: {e}"))?,
            (None, None) => DEFAULT_PERIOD,
        };
        if period.is_zero() {
            bail!("--period must be greater than zero");
        }
        if period > MAX_PERIOD {
            bail!("--period must be at most {}h", MAX_PERIOD.as_secs() / 3600);
        }

        Ok(Self {
            repo: RepoRef::new(owner, repo),
            base_re,
            files_re,
            base_branch: non_empty(cli.base_branch.or(file.base_branch)),
            period,
            debug: cli.debug || file.debug.unwrap_or(false),
            api_url: non_empty(cli.api_url.or(file.api_url))
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            metrics_addr: cli.metrics_addr.or(file.metrics_addr),
            token,
            teams_webhook: non_empty(cli.teams_webhook),
        })
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Parse durations like `500ms`, `30s`, `1m`, `1h30m`. A bare number means seconds.
pub fn parse_period(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("duration cannot be empty".to_string());
    }
    if let Ok(secs) = input.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return Err(format!("invalid duration {input:?}: expected a number"));
        }
        let n: u64 = rest[..digits]
            .parse()
            .map_err(|_| format!("invalid duration {input:?}"))?;
        rest = &rest[digits..];
        let unit_len = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let too_large = || format!("invalid duration {input:?}: too large");
        let part = match &rest[..unit_len] {
            "ms" => Duration::from_millis(n),
            "s" => Duration::from_secs(n),
            "m" => Duration::from_secs(n.checked_mul(60).ok_or_else(too_large)?),
            "h" => Duration::from_secs(n.checked_mul(3600).ok_or_else(too_large)?),
            "" => return Err(format!("invalid duration {input:?}: missing unit")),
            unit => return Err(format!("invalid duration {input:?}: unknown unit {unit:?}")),
        };
        total = total.checked_add(part).ok_or_else(too_large)?;
        rest = &rest[unit_len..];
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli() -> Cli {
        Cli {
            owner: Some("acme".into()),
            repo: Some("widgets".into()),
            token: Some("t0k".into()),
            ..Default::default()
        }
    }

    #[test]
    fn periods() {
        assert_eq!(parse_period("90"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_period("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_period("1m"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_period("1h30m"), Ok(Duration::from_secs(5400)));
        assert!(parse_period("").is_err());
        assert!(parse_period("m").is_err());
        assert!(parse_period("5 minutes").is_err());
        assert!(parse_period("3d").is_err());
    }

    #[test]
    fn oversized_periods_are_errors_not_overflows() {
        let err = parse_period("5124095576030432h").unwrap_err();
        assert!(err.contains("too large"), "{err}");
        let err = parse_period("307445734561825861m").unwrap_err();
        assert!(err.contains("too large"), "{err}");
        let err = parse_period("18446744073709551615s1s").unwrap_err();
        assert!(err.contains("too large"), "{err}");
        // parses, but is rejected when settings are resolved
        assert_eq!(parse_period("18446744073709551615"), Ok(Duration::from_secs(u64::MAX)));
    }

    #[test]
    fn defaults_apply() {
        let s = Settings::resolve(cli()).unwrap();
        assert_eq!(s.repo, RepoRef::new("acme", "widgets"));
        assert_eq!(s.period, DEFAULT_PERIOD);
        assert_eq!(s.base_re.as_str(), ".*");
        assert_eq!(s.files_re.as_str(), ".*");
        assert_eq!(s.api_url, DEFAULT_API_URL);
        assert!(!s.debug);
        assert!(!format!("{s:?}").contains("t0k"));
    }

    #[test]
    fn configuration_errors() {
        let mut c = cli();
        c.owner = Some("  ".into());
        assert!(Settings::resolve(c).is_err());

        let mut c = cli();
        c.token = None;
        let err = Settings::resolve(c).unwrap_err().to_string();
        assert!(err.contains(TOKEN_ENV), "{err}");

        let mut c = cli();
        c.files_re = Some("(".into());
        let err = format!("{:#}", Settings::resolve(c).unwrap_err());
        assert!(err.contains("--files-re"), "{err}");

        let mut c = cli();
        c.period = Some(Duration::ZERO);
        assert!(Settings::resolve(c).is_err());
    }

    #[test]
    fn period_has_an_upper_bound() {
        let mut c = cli();
        c.period = Some(Duration::from_secs(u64::MAX));
        let err = Settings::resolve(c).unwrap_err().to_string();
        assert!(err.contains("--period must be at most"), "{err}");

        let mut c = cli();
        c.period = Some(MAX_PERIOD);
        assert_eq!(Settings::resolve(c).unwrap().period, MAX_PERIOD);
    }

    #[test]
    fn flags_parse() {
        let c = Cli::try_parse_from([
            "watchprs",
            "--owner",
            "o",
            "--repo",
            "r",
            "--base-re",
            "^o:main$",
            "--files-re",
            r"\.go$",
            "--period",
            "30s",
            "--debug",
        ])
        .unwrap();
        assert_eq!(c.period, Some(Duration::from_secs(30)));
        assert_eq!(c.base_re.as_deref(), Some("^o:main$"));
        assert!(c.debug);
    }
}
