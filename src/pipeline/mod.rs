//! Audit pipeline.
//!
//! - `rate_limiter`: pacing and rate limit recovery for remote calls
//! - `matcher`: issue title to story matching
//! - `diff`: missing issue computation
//! - `filter`: incremental narrowing of the story set
//! - `audit`: end-to-end orchestration

pub mod audit;
pub mod diff;
pub mod filter;
pub mod matcher;
pub mod rate_limiter;

pub use audit::{AuditOrchestrator, AuditOutcome, AuditRun, ScanSource};
pub use diff::DiffEngine;
pub use filter::{FilterReport, IncrementalFilter};
pub use matcher::{MatchPhase, TitleMatcher};
pub use rate_limiter::{RateLimitSignal, RateLimiter, RateLimiterConfig};
