//! Application configuration structures.
//!
//! `Settings` is the TOML file configuration shared by every run.
//! `AuditConfiguration` describes one audit run and can only be obtained
//! through its validating builder.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

use super::audit::{AuditTarget, Domain};

/// Root file configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// GitHub API access
    #[serde(default)]
    pub github: GithubConfig,

    /// Repositories under audit
    #[serde(default)]
    pub targets: TargetsConfig,

    /// Request pacing
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Scan result cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Story catalog input files
    #[serde(default)]
    pub paths: PathsConfig,

    /// Scan retry policy
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load settings or return defaults if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Settings load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate settings values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.github.user_agent.trim().is_empty() {
            return Err(AppError::config("github.user_agent is empty"));
        }
        if self.github.timeout_secs == 0 {
            return Err(AppError::config("github.timeout_secs must be > 0"));
        }
        if self.github.per_page == 0 || self.github.per_page > 100 {
            return Err(AppError::config("github.per_page must be within 1..=100"));
        }
        if self.targets.frontend_repository.trim().is_empty()
            || self.targets.backend_repository.trim().is_empty()
        {
            return Err(AppError::config("targets must name both repositories"));
        }
        if self.rate_limit.batch_size == 0 {
            return Err(AppError::config("rate_limit.batch_size must be > 0"));
        }
        if self.cache.ttl_hours == 0 {
            return Err(AppError::config("cache.ttl_hours must be > 0"));
        }
        if self.retry.max_attempts == 0 {
            return Err(AppError::config("retry.max_attempts must be > 0"));
        }
        Ok(())
    }

    /// The two audit targets, frontend first.
    pub fn audit_targets(&self) -> [AuditTarget; 2] {
        [
            AuditTarget::new(Domain::Frontend, &self.targets.frontend_repository),
            AuditTarget::new(Domain::Backend, &self.targets.backend_repository),
        ]
    }
}

/// GitHub API client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    /// API root URL
    #[serde(default = "defaults::api_base")]
    pub api_base: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Environment variable holding the token
    #[serde(default = "defaults::token_env")]
    pub token_env: String,

    /// Search page size
    #[serde(default = "defaults::per_page")]
    pub per_page: u32,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: defaults::api_base(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            token_env: defaults::token_env(),
            per_page: defaults::per_page(),
        }
    }
}

/// Repositories taking part in the audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetsConfig {
    #[serde(default = "defaults::frontend_repository")]
    pub frontend_repository: String,

    #[serde(default = "defaults::backend_repository")]
    pub backend_repository: String,

    /// Repository holding the story issues themselves
    #[serde(default = "defaults::story_repository")]
    pub story_repository: String,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            frontend_repository: defaults::frontend_repository(),
            backend_repository: defaults::backend_repository(),
            story_repository: defaults::story_repository(),
        }
    }
}

/// Pacing applied around remote calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Delay before every call
    #[serde(default = "defaults::base_delay")]
    pub base_delay_ms: u64,

    /// Extra delay every `batch_size` calls
    #[serde(default = "defaults::batch_delay")]
    pub batch_delay_ms: u64,

    #[serde(default = "defaults::batch_size")]
    pub batch_size: u32,

    /// Wait after a secondary rate limit response
    #[serde(default = "defaults::secondary_wait")]
    pub secondary_wait_ms: u64,

    /// Wait after a primary rate limit response with no known snapshot
    #[serde(default = "defaults::fallback_wait")]
    pub fallback_wait_ms: u64,

    /// Added on top of the time-to-reset when the limit is critical
    #[serde(default = "defaults::critical_buffer")]
    pub critical_buffer_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: defaults::base_delay(),
            batch_delay_ms: defaults::batch_delay(),
            batch_size: defaults::batch_size(),
            secondary_wait_ms: defaults::secondary_wait(),
            fallback_wait_ms: defaults::fallback_wait(),
            critical_buffer_ms: defaults::critical_buffer(),
        }
    }
}

/// Scan result cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "defaults::cache_dir")]
    pub directory: PathBuf,

    #[serde(default = "defaults::ttl_hours")]
    pub ttl_hours: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: defaults::cache_dir(),
            ttl_hours: defaults::ttl_hours(),
        }
    }
}

/// Input file locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "defaults::processed_stories")]
    pub processed_stories: PathBuf,

    #[serde(default = "defaults::story_metadata")]
    pub story_metadata: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            processed_stories: defaults::processed_stories(),
            story_metadata: defaults::story_metadata(),
        }
    }
}

/// Retry policy for transient scan failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "defaults::retry_delay")]
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            delay_ms: defaults::retry_delay(),
        }
    }
}

/// How much of the processed-story catalog a run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditMode {
    /// Every processed story
    #[default]
    Full,
    /// Stories processed within a date window
    IncrementalDate,
    /// Stories within a number range
    IncrementalRange,
    /// Continue an interrupted audit
    Resume,
}

impl AuditMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "full" => Some(Self::Full),
            "incremental-date" | "date" => Some(Self::IncrementalDate),
            "incremental-range" | "range" => Some(Self::IncrementalRange),
            "resume" => Some(Self::Resume),
            _ => None,
        }
    }
}

impl fmt::Display for AuditMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Full => "full",
            Self::IncrementalDate => "incremental-date",
            Self::IncrementalRange => "incremental-range",
            Self::Resume => "resume",
        };
        f.write_str(s)
    }
}

static STORY_RANGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+)\s*-\s*(\d+)\s*$").expect("story range regex should compile")
});

/// Parse a `START-END` story range such as `100-250`.
///
/// Bounds are checked when the configuration is built.
pub fn parse_story_range(s: &str) -> Result<(u32, u32)> {
    let invalid = || {
        AppError::config_with_hint(
            format!("invalid story range '{s}'"),
            "use START-END, for example 100-250",
        )
    };
    let caps = STORY_RANGE_PATTERN.captures(s).ok_or_else(invalid)?;
    let start = caps[1].parse().map_err(|_| invalid())?;
    let end = caps[2].parse().map_err(|_| invalid())?;
    Ok((start, end))
}

/// API token that never shows up in debug output or persisted results.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

/// Settings for a single audit run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfiguration {
    pub mode: AuditMode,
    #[serde(skip)]
    pub github_token: Token,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub story_range_start: Option<u32>,
    pub story_range_end: Option<u32>,
    pub create_issues: bool,
    pub use_cache: bool,
    pub output_directory: PathBuf,
    pub rate_limit_delay_ms: u64,
    pub batch_size: u32,
    pub days_back: Option<u32>,
    pub resume_mode: bool,
    pub resume_from_story: Option<u32>,
    #[serde(default)]
    pub fuzzy_title_match: bool,
}

impl AuditConfiguration {
    pub fn builder() -> AuditConfigurationBuilder {
        AuditConfigurationBuilder::default()
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }

    /// Explicit date window, when both ends are set.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.start_date.zip(self.end_date)
    }

    /// Inclusive story number window, when both ends are set.
    pub fn story_range(&self) -> Option<(u32, u32)> {
        self.story_range_start.zip(self.story_range_end)
    }
}

/// Builder for [`AuditConfiguration`]; `build` validates.
#[derive(Debug, Clone)]
pub struct AuditConfigurationBuilder {
    mode: AuditMode,
    github_token: Option<String>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    story_range: Option<(u32, u32)>,
    create_issues: bool,
    use_cache: bool,
    output_directory: Option<PathBuf>,
    rate_limit_delay_ms: i64,
    batch_size: u32,
    days_back: Option<u32>,
    resume_mode: bool,
    resume_from_story: Option<u32>,
    fuzzy_title_match: bool,
}

impl Default for AuditConfigurationBuilder {
    fn default() -> Self {
        Self {
            mode: AuditMode::Full,
            github_token: None,
            start_date: None,
            end_date: None,
            story_range: None,
            create_issues: false,
            use_cache: true,
            output_directory: Some(defaults::output_dir()),
            rate_limit_delay_ms: defaults::base_delay() as i64,
            batch_size: defaults::batch_size(),
            days_back: None,
            resume_mode: false,
            resume_from_story: None,
            fuzzy_title_match: false,
        }
    }
}

impl AuditConfigurationBuilder {
    pub fn mode(mut self, mode: AuditMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn github_token(mut self, token: impl Into<String>) -> Self {
        self.github_token = Some(token.into());
        self
    }

    pub fn date_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    pub fn start_date(mut self, start: Option<NaiveDate>) -> Self {
        self.start_date = start;
        self
    }

    pub fn end_date(mut self, end: Option<NaiveDate>) -> Self {
        self.end_date = end;
        self
    }

    pub fn story_range(mut self, start: u32, end: u32) -> Self {
        self.story_range = Some((start, end));
        self
    }

    pub fn create_issues(mut self, create: bool) -> Self {
        self.create_issues = create;
        self
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn output_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_directory = Some(dir.into());
        self
    }

    pub fn rate_limit_delay_ms(mut self, delay_ms: i64) -> Self {
        self.rate_limit_delay_ms = delay_ms;
        self
    }

    pub fn batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn days_back(mut self, days: Option<u32>) -> Self {
        self.days_back = days;
        self
    }

    pub fn resume_mode(mut self, resume: bool) -> Self {
        self.resume_mode = resume;
        self
    }

    pub fn resume_from_story(mut self, story: Option<u32>) -> Self {
        self.resume_from_story = story;
        self
    }

    pub fn fuzzy_title_match(mut self, fuzzy: bool) -> Self {
        self.fuzzy_title_match = fuzzy;
        self
    }

    /// Validate and produce the configuration.
    pub fn build(self) -> Result<AuditConfiguration> {
        let token = self.github_token.unwrap_or_default();
        if token.trim().is_empty() {
            return Err(AppError::config_with_hint(
                "GitHub token is required for audit operations",
                "export GITHUB_TOKEN or pass --token",
            ));
        }

        let output_directory = self
            .output_directory
            .filter(|dir| !dir.as_os_str().is_empty())
            .ok_or_else(|| {
                AppError::config_with_hint(
                    "output directory must be specified",
                    "pass --output <dir>",
                )
            })?;

        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) if start > end => {
                return Err(AppError::config_with_hint(
                    format!("start date {start} is after end date {end}"),
                    "start date must not be after end date",
                ));
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(AppError::config_with_hint(
                    "date range needs both a start and an end date",
                    "pass both --start-date and --end-date, or use --days-back",
                ));
            }
            _ => {}
        }

        if let Some((start, end)) = self.story_range {
            if start < 1 {
                return Err(AppError::config_with_hint(
                    format!("story range start {start} is below 1"),
                    "story range start must be positive",
                ));
            }
            if start > end {
                return Err(AppError::config_with_hint(
                    format!("story range start {start} is greater than end {end}"),
                    "story range start must not exceed its end",
                ));
            }
        }

        if self.rate_limit_delay_ms < 0 {
            return Err(AppError::config_with_hint(
                format!("rate limit delay {}ms is negative", self.rate_limit_delay_ms),
                "rate limit delay must be zero or more milliseconds",
            ));
        }

        if self.batch_size == 0 {
            return Err(AppError::config_with_hint(
                "batch size must be positive",
                "pass --batch-size 1 or more",
            ));
        }

        let has_dates = self.start_date.is_some() || self.days_back.is_some();
        match self.mode {
            AuditMode::IncrementalDate if !has_dates => {
                return Err(AppError::config_with_hint(
                    "incremental-date mode needs a date range or days back",
                    "pass --start-date/--end-date or --days-back",
                ));
            }
            AuditMode::IncrementalRange if self.story_range.is_none() => {
                return Err(AppError::config_with_hint(
                    "incremental-range mode needs a story range",
                    "pass --story-range START-END",
                ));
            }
            _ => {}
        }

        let resume_mode = self.resume_mode || self.mode == AuditMode::Resume;

        Ok(AuditConfiguration {
            mode: self.mode,
            github_token: Token(token),
            start_date: self.start_date,
            end_date: self.end_date,
            story_range_start: self.story_range.map(|(s, _)| s),
            story_range_end: self.story_range.map(|(_, e)| e),
            create_issues: self.create_issues,
            use_cache: self.use_cache,
            output_directory,
            rate_limit_delay_ms: self.rate_limit_delay_ms as u64,
            batch_size: self.batch_size,
            days_back: self.days_back,
            resume_mode,
            resume_from_story: self.resume_from_story,
            fuzzy_title_match: self.fuzzy_title_match,
        })
    }
}

pub(crate) mod defaults {
    use std::path::PathBuf;

    // GitHub defaults
    pub fn api_base() -> String {
        "https://api.github.com".into()
    }
    pub fn user_agent() -> String {
        "issue-audit/0.1".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn token_env() -> String {
        "GITHUB_TOKEN".into()
    }
    pub fn per_page() -> u32 {
        100
    }

    // Target defaults
    pub fn frontend_repository() -> String {
        "louisburroughs/durion-moqui-frontend".into()
    }
    pub fn backend_repository() -> String {
        "louisburroughs/durion-positivity-backend".into()
    }
    pub fn story_repository() -> String {
        "louisburroughs/durion".into()
    }

    // Rate limit defaults
    pub fn base_delay() -> u64 {
        2_000
    }
    pub fn batch_delay() -> u64 {
        10_000
    }
    pub fn batch_size() -> u32 {
        5
    }
    pub fn secondary_wait() -> u64 {
        60_000
    }
    pub fn fallback_wait() -> u64 {
        30_000
    }
    pub fn critical_buffer() -> u64 {
        5_000
    }

    // Cache defaults
    pub fn cache_dir() -> PathBuf {
        PathBuf::from(".audit-cache")
    }
    pub fn ttl_hours() -> u32 {
        24
    }

    // Path defaults
    pub fn processed_stories() -> PathBuf {
        PathBuf::from("processed-issues.txt")
    }
    pub fn story_metadata() -> PathBuf {
        PathBuf::from("story-metadata.json")
    }
    pub fn output_dir() -> PathBuf {
        PathBuf::from(".github/orchestration/missing-issues")
    }

    // Retry defaults
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn retry_delay() -> u64 {
        5_000
    }
}
