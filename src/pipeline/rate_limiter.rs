//! Request pacing and rate limit recovery.
//!
//! Every remote call is preceded by [`RateLimiter::pre_request_delay`] and
//! followed by [`RateLimiter::observe_response`]. The limiter keeps the most
//! recent [`RateLimitSnapshot`] and a shared operation counter that drives
//! the periodic batch delay.
//!
//! ## Waits
//!
//! | Condition                         | Wait                                   |
//! |-----------------------------------|----------------------------------------|
//! | every call                        | base delay                             |
//! | every `batch_size`-th call        | base + batch delay                     |
//! | snapshot critical before a call   | time to reset + critical buffer        |
//! | 403 with "secondary rate limit"   | secondary wait, retry outside budget   |
//! | other 403 / 429                   | computed wait (or fallback), retry     |

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::{RateLimitConfig, RateLimitSnapshot};
use crate::utils::sleep_or_cancel;

/// Lower bound of the spread-out wait while the limit is low.
const LOW_WAIT_FLOOR_MS: u64 = 2_000;

/// Upper bound of the spread-out wait while the limit is low.
const LOW_WAIT_CEILING_MS: u64 = 30_000;

/// Marker GitHub puts in the body of secondary rate limit responses.
const SECONDARY_MARKER: &str = "secondary rate limit";

/// Pacing parameters.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub base_delay: Duration,
    pub batch_delay: Duration,
    /// Batch delay is added on every call whose ordinal is a multiple of this
    pub batch_size: u64,
    pub secondary_wait: Duration,
    pub fallback_wait: Duration,
    pub critical_buffer: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::from(&RateLimitConfig::default())
    }
}

impl From<&RateLimitConfig> for RateLimiterConfig {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            batch_delay: Duration::from_millis(config.batch_delay_ms),
            batch_size: u64::from(config.batch_size.max(1)),
            secondary_wait: Duration::from_millis(config.secondary_wait_ms),
            fallback_wait: Duration::from_millis(config.fallback_wait_ms),
            critical_buffer: Duration::from_millis(config.critical_buffer_ms),
        }
    }
}

/// What the caller should do after a response was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitSignal {
    /// Response was not rate limited
    Proceed,
    /// Rate limited; the wait already happened, repeat the request
    Retry {
        /// Whether this retry consumes the caller's own attempt budget
        counts_against_budget: bool,
    },
}

impl RateLimitSignal {
    pub fn is_retry(&self) -> bool {
        matches!(self, Self::Retry { .. })
    }
}

/// Paces calls against one remote API.
///
/// Owns the latest snapshot; a new snapshot replaces the old one whole.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    operation_count: AtomicU64,
    snapshot: Mutex<Option<RateLimitSnapshot>>,
    cancel: CancellationToken,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig, cancel: CancellationToken) -> Self {
        Self {
            config,
            operation_count: AtomicU64::new(0),
            snapshot: Mutex::new(None),
            cancel,
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Block before a remote call.
    ///
    /// Returns `AppError::Cancelled` if the token fires during the wait.
    pub async fn pre_request_delay(&self) -> Result<()> {
        let ordinal = self.operation_count.fetch_add(1, Ordering::SeqCst) + 1;

        let mut delay = self.config.base_delay;
        if ordinal % self.config.batch_size == 0 {
            delay += self.config.batch_delay;
            log::info!(
                "Batch pause after {} operations: waiting {}ms",
                ordinal,
                delay.as_millis()
            );
        } else {
            log::debug!("Operation {}: waiting {}ms", ordinal, delay.as_millis());
        }
        sleep_or_cancel(delay, &self.cancel).await?;

        if let Some(snapshot) = self.snapshot().filter(RateLimitSnapshot::is_critical) {
            let wait = self.critical_wait(&snapshot, Utc::now());
            log::warn!(
                "Rate limit critical ({} remaining), waiting {}s for reset",
                snapshot.remaining,
                wait.as_secs()
            );
            sleep_or_cancel(wait, &self.cancel).await?;
        }

        Ok(())
    }

    /// Record a response and wait out any rate limiting it reports.
    ///
    /// Header names are matched case-insensitively. A snapshot is stored
    /// only when the headers parse completely.
    pub async fn observe_response(
        &self,
        headers: &HashMap<String, String>,
        status: u16,
        body: &str,
    ) -> Result<RateLimitSignal> {
        if let Some(snapshot) = RateLimitSnapshot::from_headers(headers) {
            log::debug!(
                "Rate limit [{}]: {}/{} remaining ({:.1}% used, resets {}) {}",
                snapshot.resource,
                snapshot.remaining,
                snapshot.limit,
                snapshot.usage_percentage(),
                snapshot.reset_time.format("%H:%M:%S"),
                snapshot.status_label().to_uppercase()
            );
            self.replace_snapshot(snapshot);
        }

        if status != 403 && status != 429 {
            return Ok(RateLimitSignal::Proceed);
        }

        if body.to_lowercase().contains(SECONDARY_MARKER) {
            log::warn!(
                "Secondary rate limit hit, waiting {}s",
                self.config.secondary_wait.as_secs()
            );
            sleep_or_cancel(self.config.secondary_wait, &self.cancel).await?;
            return Ok(RateLimitSignal::Retry {
                counts_against_budget: false,
            });
        }

        let wait = match self.snapshot() {
            Some(snapshot) => self.compute_wait(&snapshot, Utc::now()),
            None => self.config.fallback_wait,
        };
        log::warn!(
            "Primary rate limit hit (status {}), waiting {}ms",
            status,
            wait.as_millis()
        );
        sleep_or_cancel(wait, &self.cancel).await?;
        Ok(RateLimitSignal::Retry {
            counts_against_budget: true,
        })
    }

    /// Wait suggested by a snapshot at time `now`.
    ///
    /// Critical: time to reset plus the buffer. Low: time to reset spread
    /// over the remaining calls, clamped to 2s..30s. Otherwise zero.
    pub fn compute_wait(&self, snapshot: &RateLimitSnapshot, now: DateTime<Utc>) -> Duration {
        if snapshot.is_critical() {
            return self.critical_wait(snapshot, now);
        }
        if snapshot.is_low() {
            let reset_ms = snapshot.seconds_until_reset(now) * 1000;
            let per_call = reset_ms / u64::from(snapshot.remaining.max(1));
            return Duration::from_millis(per_call.clamp(LOW_WAIT_FLOOR_MS, LOW_WAIT_CEILING_MS));
        }
        Duration::ZERO
    }

    fn critical_wait(&self, snapshot: &RateLimitSnapshot, now: DateTime<Utc>) -> Duration {
        Duration::from_secs(snapshot.seconds_until_reset(now)) + self.config.critical_buffer
    }

    /// Latest snapshot, if any response carried one.
    pub fn snapshot(&self) -> Option<RateLimitSnapshot> {
        self.snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn replace_snapshot(&self, snapshot: RateLimitSnapshot) {
        *self
            .snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(snapshot);
    }

    /// Calls paced so far.
    pub fn operation_count(&self) -> u64 {
        self.operation_count.load(Ordering::SeqCst)
    }

    /// Whether the last call completed a batch.
    pub fn should_pause(&self) -> bool {
        let count = self.operation_count();
        count > 0 && count % self.config.batch_size == 0
    }

    pub fn reset_operation_count(&self) {
        self.operation_count.store(0, Ordering::SeqCst);
    }

    pub fn log_summary(&self) {
        log::info!("Rate limiter: {} operations paced", self.operation_count());
        match self.snapshot() {
            Some(s) => log::info!(
                "Rate limit [{}]: {}/{} remaining, {:.1}% used, status {}",
                s.resource,
                s.remaining,
                s.limit,
                s.usage_percentage(),
                s.status_label()
            ),
            None => log::info!("Rate limit: no snapshot observed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use tokio::time::Instant;

    fn limiter() -> RateLimiter {
        RateLimiter::new(RateLimiterConfig::default(), CancellationToken::new())
    }

    fn snapshot(remaining: u32, reset_in_secs: i64) -> RateLimitSnapshot {
        RateLimitSnapshot {
            limit: 5000,
            remaining,
            used: 5000 - remaining,
            reset_time: Utc::now() + chrono::Duration::seconds(reset_in_secs),
            resource: "core".into(),
        }
    }

    fn headers(remaining: u32, reset: i64) -> HashMap<String, String> {
        HashMap::from([
            ("X-RateLimit-Limit".to_string(), "5000".to_string()),
            ("X-RateLimit-Remaining".to_string(), remaining.to_string()),
            ("X-RateLimit-Reset".to_string(), reset.to_string()),
        ])
    }

    #[test]
    fn test_compute_wait_exhausted() {
        let limiter = limiter();
        let now = Utc::now();
        let mut snap = snapshot(0, 0);
        snap.reset_time = now + chrono::Duration::seconds(60);
        let wait = limiter.compute_wait(&snap, now);
        assert!(wait >= Duration::from_millis(60_000));
        assert_eq!(wait, Duration::from_millis(65_000));
    }

    #[test]
    fn test_compute_wait_healthy_is_zero() {
        let limiter = limiter();
        let now = Utc::now();
        let mut snap = snapshot(500, 0);
        snap.reset_time = now + chrono::Duration::seconds(600);
        assert_eq!(limiter.compute_wait(&snap, now), Duration::ZERO);
    }

    #[test]
    fn test_compute_wait_low_is_clamped() {
        let limiter = limiter();
        let now = Utc::now();
        let mut snap = snapshot(50, 0);

        // 100s over 50 calls = 2s
        snap.reset_time = now + chrono::Duration::seconds(100);
        assert_eq!(limiter.compute_wait(&snap, now), Duration::from_millis(2_000));

        // 3600s over 50 calls = 72s, capped
        snap.reset_time = now + chrono::Duration::seconds(3600);
        assert_eq!(limiter.compute_wait(&snap, now), Duration::from_millis(30_000));

        // reset already passed, floored
        snap.reset_time = now - chrono::Duration::seconds(10);
        assert_eq!(limiter.compute_wait(&snap, now), Duration::from_millis(2_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_delay_every_fifth_call() {
        let limiter = limiter();
        let start = Instant::now();
        for _ in 0..4 {
            limiter.pre_request_delay().await.unwrap();
        }
        assert_eq!(start.elapsed().as_secs(), 8);
        assert!(!limiter.should_pause());

        limiter.pre_request_delay().await.unwrap();
        assert_eq!(start.elapsed().as_secs(), 20);
        assert_eq!(limiter.operation_count(), 5);
        assert!(limiter.should_pause());

        limiter.reset_operation_count();
        assert_eq!(limiter.operation_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_critical_snapshot_waits_for_reset() {
        let limiter = limiter();
        limiter.replace_snapshot(snapshot(3, 10));
        let start = Instant::now();
        limiter.pre_request_delay().await.unwrap();
        // base 2s + up to 10s to reset + 5s buffer
        let elapsed = start.elapsed().as_secs();
        assert!((15..=17).contains(&elapsed), "elapsed {elapsed}s");
    }

    #[tokio::test(start_paused = true)]
    async fn test_secondary_limit_waits_sixty_seconds() {
        let limiter = limiter();
        let reset = Utc::now().timestamp() + 3600;
        let start = Instant::now();
        let signal = limiter
            .observe_response(
                &headers(4000, reset),
                403,
                r#"{"message":"You have exceeded a secondary rate limit."}"#,
            )
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(60_000));
        assert_eq!(
            signal,
            RateLimitSignal::Retry {
                counts_against_budget: false
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_primary_limit_without_snapshot_uses_fallback() {
        let limiter = limiter();
        let start = Instant::now();
        let signal = limiter
            .observe_response(&HashMap::new(), 403, "API rate limit exceeded")
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(30_000));
        assert_eq!(
            signal,
            RateLimitSignal::Retry {
                counts_against_budget: true
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_primary_limit_with_snapshot_uses_computed_wait() {
        let limiter = limiter();
        let reset = Utc::now().timestamp() + 100;
        let start = Instant::now();
        let signal = limiter
            .observe_response(&headers(50, reset), 403, "API rate limit exceeded")
            .await
            .unwrap();
        // about 100s spread over 50 remaining calls
        assert_eq!(start.elapsed(), Duration::from_millis(2_000));
        assert_eq!(limiter.snapshot().unwrap().remaining, 50);
        assert!(signal.is_retry());
    }

    #[tokio::test(start_paused = true)]
    async fn test_too_many_requests_is_a_primary_limit() {
        let limiter = limiter();
        let start = Instant::now();
        let signal = limiter
            .observe_response(&HashMap::new(), 429, "")
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(30_000));
        assert_eq!(
            signal,
            RateLimitSignal::Retry {
                counts_against_budget: true
            }
        );
    }

    #[tokio::test]
    async fn test_partial_headers_keep_previous_snapshot() {
        let limiter = limiter();
        let reset = Utc::now().timestamp() + 60;
        let signal = limiter
            .observe_response(&headers(4321, reset), 200, "")
            .await
            .unwrap();
        assert_eq!(signal, RateLimitSignal::Proceed);
        assert_eq!(limiter.snapshot().unwrap().remaining, 4321);

        let partial = HashMap::from([("x-ratelimit-remaining".to_string(), "1".to_string())]);
        limiter.observe_response(&partial, 200, "").await.unwrap();
        assert_eq!(limiter.snapshot().unwrap().remaining, 4321);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_delay() {
        let cancel = CancellationToken::new();
        let limiter = RateLimiter::new(RateLimiterConfig::default(), cancel.clone());
        cancel.cancel();
        let result = limiter.pre_request_delay().await;
        assert!(matches!(result, Err(AppError::Cancelled)));
    }
}
