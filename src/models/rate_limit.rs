//! Rate limit state reported by the remote API.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fewer remaining requests than this is critical.
pub const CRITICAL_REMAINING: u32 = 10;

/// Fewer remaining requests than this is low.
pub const LOW_REMAINING: u32 = 100;

/// Latest rate limit values parsed from response headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    pub limit: u32,
    pub remaining: u32,
    pub used: u32,
    pub reset_time: DateTime<Utc>,
    pub resource: String,
}

impl RateLimitSnapshot {
    /// Parse a snapshot from `x-ratelimit-*` headers.
    ///
    /// Header names are matched case-insensitively. Returns `None` unless
    /// `remaining` and `reset` are present and every present value parses;
    /// `limit` defaults to 5000, `used` to `limit - remaining` and
    /// `resource` to `core`.
    pub fn from_headers(headers: &HashMap<String, String>) -> Option<Self> {
        let get = |name: &str| {
            headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.trim())
        };

        let remaining: u32 = get("x-ratelimit-remaining")?.parse().ok()?;
        let reset_epoch: i64 = get("x-ratelimit-reset")?.parse().ok()?;
        let limit: u32 = match get("x-ratelimit-limit") {
            Some(v) => v.parse().ok()?,
            None => 5000,
        };
        let used: u32 = match get("x-ratelimit-used") {
            Some(v) => v.parse().ok()?,
            None => limit.saturating_sub(remaining),
        };
        let reset_time = DateTime::from_timestamp(reset_epoch, 0)?;
        let resource = get("x-ratelimit-resource").unwrap_or("core").to_string();

        Some(Self {
            limit,
            remaining,
            used,
            reset_time,
            resource,
        })
    }

    pub fn is_critical(&self) -> bool {
        self.remaining < CRITICAL_REMAINING
    }

    pub fn is_low(&self) -> bool {
        self.remaining < LOW_REMAINING
    }

    /// Share of the limit already used, 0.0 to 100.0.
    pub fn usage_percentage(&self) -> f64 {
        if self.limit == 0 {
            return 0.0;
        }
        f64::from(self.used) * 100.0 / f64::from(self.limit)
    }

    /// Whole seconds until reset, never negative.
    pub fn seconds_until_reset(&self, now: DateTime<Utc>) -> u64 {
        (self.reset_time - now).num_seconds().max(0) as u64
    }

    pub fn status_label(&self) -> &'static str {
        if self.is_critical() {
            "critical"
        } else if self.is_low() {
            "low"
        } else {
            "ok"
        }
    }
}
