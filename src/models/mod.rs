// src/models/mod.rs

//! Domain models for the audit application.
//!
//! Stories and scanned issues, audit results, rate limit state and
//! configuration, re-exported from one place.

mod audit;
mod config;
mod rate_limit;
mod story;

pub use audit::{AuditResult, AuditStatistics, AuditTarget, Domain, MissingIssue};
pub use config::{
    AuditConfiguration, AuditConfigurationBuilder, AuditMode, CacheConfig, GithubConfig,
    PathsConfig, RateLimitConfig, RetryConfig, Settings, TargetsConfig, Token, parse_story_range,
};
pub use rate_limit::{CRITICAL_REMAINING, LOW_REMAINING, RateLimitSnapshot};
pub use story::{IssueRecord, STORY_MARKER, StoryMetadata};
