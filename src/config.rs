// =============================================================================
// config.rs -- THE GRAND CONFIGURATION CATHEDRAL (LAWSUIT WING)
// =============================================================================
//
// A batch job has fewer knobs than a daemon, but the ones it has matter:
// how far back to look, where to file the report, who to tell about it.
//
// Everything comes from the environment. A missing GitHub token is the one
// thing we refuse to shrug off: we fail before a single request leaves the
// building, because a run that collects everything and then cannot publish
// it is a run that wasted everyone's rate limit.
// =============================================================================

use std::env;
use std::time::Duration;

use thiserror::Error;

/// Configuration failures are the only fatal errors in the engine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required environment variable `{0}` is not set")]
    Missing(&'static str),
    #[error("environment variable `{key}` is `{value}`, expected {expected}")]
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Accepted range for `LOOKBACK_DAYS`. Ten years is already absurd.
pub const LOOKBACK_DAYS_RANGE: std::ops::RangeInclusive<i64> = 1..=3650;

/// Every tunable parameter of a run.
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // PUBLISHING
    // =========================================================================
    /// GitHub repository owner that hosts the report issues.
    pub github_owner: String,

    /// GitHub repository name.
    pub github_repo: String,

    /// Token with `issues: write` on the repository.
    pub github_token: String,

    /// Slack incoming webhook for the per-run summary.
    pub slack_webhook_url: String,

    /// Daily issues are titled `"{issue_title_base} (YYYY-MM-DD)"`.
    pub issue_title_base: String,

    /// Label that scopes which issues belong to the monitor.
    pub issue_label: String,

    /// Print the final report instead of touching GitHub and Slack.
    pub dry_run: bool,

    // =========================================================================
    // COLLECTION
    // =========================================================================
    /// Trailing window, in days, for filings and articles.
    pub lookback_days: i64,

    /// CourtListener API root, e.g. `https://www.courtlistener.com/api/rest/v4`.
    pub court_listener_base_url: String,

    /// Optional CourtListener token. Without it we only see public data,
    /// which is a degraded mode, not an error.
    pub court_listener_token: Option<String>,

    /// Per-request timeout. A timed-out request is a failed request.
    pub request_timeout: Duration,

    /// `page_size` sent with every search query.
    pub search_page_size: u32,

    /// Offset of the report timezone from UTC. Default 9 (KST).
    pub report_utc_offset_hours: i32,

    /// Capacity of the court short-name cache.
    pub court_cache_size: usize,

    /// YAML file of hand-curated cases that override what the news
    /// heuristics extract. A missing file means no overrides.
    pub known_cases_path: String,
}

impl Config {
    /// Load configuration from the environment (and `.env`, if present).
    ///
    /// The publishing credentials are required unless `DRY_RUN` is set.
    /// Numeric values that fail to parse fall back to their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup. `from_env` is this plus dotenv;
    /// tests feed it a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let or_default = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let dry_run = matches!(
            get("DRY_RUN").map(|v| v.to_lowercase()).as_deref(),
            Some("1" | "true" | "yes" | "y")
        );

        let require = |key: &'static str| -> Result<String, ConfigError> {
            match get(key) {
                Some(v) => Ok(v),
                None if dry_run => Ok(String::new()),
                None => Err(ConfigError::Missing(key)),
            }
        };

        Ok(Config {
            // The owner is needed even for dry runs: it goes into the issue link.
            github_owner: get("GITHUB_OWNER").ok_or(ConfigError::Missing("GITHUB_OWNER"))?,
            github_repo: require("GITHUB_REPO")?,
            github_token: require("GITHUB_TOKEN")?,
            slack_webhook_url: require("SLACK_WEBHOOK_URL")?,
            issue_title_base: or_default("ISSUE_TITLE_BASE", "AI Training Data Lawsuit Monitor"),
            issue_label: or_default("ISSUE_LABEL", "ai-lawsuit-monitor"),
            dry_run,

            lookback_days: lookback_days(get("LOOKBACK_DAYS"))?,
            court_listener_base_url: or_default(
                "COURTLISTENER_BASE_URL",
                "https://www.courtlistener.com/api/rest/v4",
            )
            .trim_end_matches('/')
            .to_string(),
            court_listener_token: get("COURTLISTENER_TOKEN"),
            request_timeout: Duration::from_secs(
                or_default("REQUEST_TIMEOUT_SECS", "25").parse().unwrap_or(25),
            ),
            search_page_size: or_default("SEARCH_PAGE_SIZE", "20").parse().unwrap_or(20),
            report_utc_offset_hours: or_default("REPORT_UTC_OFFSET_HOURS", "9").parse().unwrap_or(9),
            court_cache_size: or_default("COURT_CACHE_SIZE", "256").parse().unwrap_or(256),
            known_cases_path: or_default("KNOWN_CASES_PATH", "data/known_cases.yml"),
        })
    }

    /// The CourtListener site root, derived from the API root.
    /// `https://www.courtlistener.com/api/rest/v4` -> `https://www.courtlistener.com`
    pub fn court_listener_site(&self) -> String {
        match self.court_listener_base_url.find("/api/") {
            Some(idx) => self.court_listener_base_url[..idx].to_string(),
            None => self.court_listener_base_url.clone(),
        }
    }
}

/// Unparseable values fall back to the default of 3; parseable values
/// outside `LOOKBACK_DAYS_RANGE` are rejected.
fn lookback_days(raw: Option<String>) -> Result<i64, ConfigError> {
    let Some(raw) = raw else {
        return Ok(3);
    };
    let Ok(days) = raw.parse::<i64>() else {
        return Ok(3);
    };
    if LOOKBACK_DAYS_RANGE.contains(&days) {
        Ok(days)
    } else {
        Err(ConfigError::Invalid {
            key: "LOOKBACK_DAYS",
            value: raw,
            expected: "a whole number of days between 1 and 3650",
        })
    }
}

/// Searches run against the RECAP archive. Each one pins the search to
/// complaint-like PACER documents and intersects AI-training vocabulary with
/// a flavour of wrongdoing.
pub const COURT_LISTENER_QUERIES: &[&str] = &[
    r#"document_type:"PACER Document" (short_description:complaint OR short_description:"amended complaint" OR short_description:petition) ("AI training" OR "model training" OR "training data" OR dataset OR LLM OR "large language model") (copyright OR DMCA OR unauthorized OR pirated OR scraping OR "without permission")"#,
    r#"document_type:"PACER Document" (short_description:complaint OR short_description:"amended complaint") (Anthropic OR OpenAI OR Google OR Meta OR "Snap Inc" OR "Perplexity AI" OR Claude OR Gemini) ("training data" OR "AI training" OR dataset) (copyright OR DMCA OR unauthorized)"#,
    r#"document_type:"PACER Document" (short_description:complaint OR short_description:"amended complaint" OR short_description:petition) ("shadow library" OR LibGen OR "Library Genesis" OR Z-Library OR Books3 OR piracy OR pirated) ("AI training" OR "training data" OR LLM)"#,
    r#"document_type:"PACER Document" (short_description:complaint OR short_description:"amended complaint") (YouTube OR "video dataset" OR scraping OR circumvent OR "technical protection" OR DMCA) ("AI training" OR "training data" OR model)"#,
    r#"document_type:"PACER Document" (short_description:complaint OR short_description:"amended complaint") (lyrics OR "music publisher" OR "musical works") ("AI training" OR model OR LLM) (copyright OR unauthorized)"#,
];

/// News searches. `when:Nd` is appended at run time from the lookback window.
pub const NEWS_QUERIES: &[&str] = &[
    r#"("AI training" OR "model training" OR LLM) (lawsuit OR sued OR litigation) (copyright OR pirated OR unauthorized OR "shadow library" OR scraping)"#,
    r#"(Anthropic OR OpenAI OR Google OR Meta OR "Snap Inc" OR "Perplexity AI") (lawsuit OR sued) ("training data" OR dataset OR copyright OR DMCA)"#,
    r#"("DMCA" OR "copyright infringement") ("AI model" OR "AI training" OR "training data")"#,
    r#"("AI data contract" OR "data licensing agreement")"#,
];
