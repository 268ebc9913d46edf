// src/pipeline/audit.rs

//! Audit orchestration.
//!
//! Sequences one run end to end:
//!
//! 1. Load processed stories and metadata from the catalog
//! 2. Narrow them with the incremental filter
//! 3. Check access to both target repositories
//! 4. Collect issues per domain from the cache or a paced, retried scan
//! 5. Diff stories against issues and persist the result
//!
//! Every await happens in sequence; the two domain scans share one
//! [`RateLimiter`] and its operation counter.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{AuditConfiguration, AuditResult, AuditTarget, Domain, IssueRecord, Settings};
use crate::services::{IssueScanner, StoryCatalog};
use crate::storage::{ResultCache, ResultStore};
use crate::utils::{log, sleep_or_cancel};

use super::diff::DiffEngine;
use super::filter::{FilterReport, IncrementalFilter};
use super::rate_limiter::{RateLimitSignal, RateLimiter, RateLimiterConfig};

const TOTAL_STEPS: usize = 5;

/// Secondary rate limit retries allowed per scan on top of the attempt budget.
const MAX_SECONDARY_RETRIES: u32 = 5;

/// Where a domain's issues came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanSource {
    Cache,
    Remote,
}

impl fmt::Display for ScanSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => f.write_str("cache"),
            Self::Remote => f.write_str("remote"),
        }
    }
}

/// Whether an audit found gaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditOutcome {
    /// Every processed story has both implementation issues
    Complete,
    MissingIssues { frontend: usize, backend: usize },
}

impl AuditOutcome {
    pub fn from_result(result: &AuditResult) -> Self {
        if result.has_missing() {
            Self::MissingIssues {
                frontend: result.missing_frontend.len(),
                backend: result.missing_backend.len(),
            }
        } else {
            Self::Complete
        }
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct AuditRun {
    pub result: AuditResult,
    pub outcome: AuditOutcome,
    pub sources: Vec<(Domain, ScanSource)>,
    pub filter: FilterReport,
    /// Remote calls paced across both domains, access checks included
    pub operations: u64,
}

impl AuditRun {
    pub fn source(&self, domain: Domain) -> Option<ScanSource> {
        self.sources
            .iter()
            .find(|(d, _)| *d == domain)
            .map(|(_, s)| *s)
    }
}

/// Drives audit runs against one scanner and catalog.
pub struct AuditOrchestrator {
    settings: Settings,
    scanner: Arc<dyn IssueScanner>,
    catalog: Arc<dyn StoryCatalog>,
    cache: ResultCache,
    cancel: CancellationToken,
}

impl AuditOrchestrator {
    pub fn new(
        settings: Settings,
        scanner: Arc<dyn IssueScanner>,
        catalog: Arc<dyn StoryCatalog>,
        cancel: CancellationToken,
    ) -> Self {
        let cache =
            ResultCache::with_ttl_hours(&settings.cache.directory, settings.cache.ttl_hours);
        Self {
            settings,
            scanner,
            catalog,
            cache,
            cancel,
        }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Pacing for one run: file settings with the run's delay and batch size.
    fn limiter_config(&self, config: &AuditConfiguration) -> RateLimiterConfig {
        RateLimiterConfig {
            base_delay: config.rate_limit_delay(),
            batch_size: u64::from(config.batch_size),
            ..RateLimiterConfig::from(&self.settings.rate_limit)
        }
    }

    /// Run one audit.
    pub async fn run(&self, config: &AuditConfiguration) -> Result<AuditRun> {
        self.settings.validate()?;
        log::header(&format!("Missing Issues Audit ({})", config.mode));

        let limiter = RateLimiter::new(self.limiter_config(config), self.cancel.clone());
        let [frontend, backend] = self.settings.audit_targets();

        log::step(1, TOTAL_STEPS, "Loading story catalog");
        let processed = self.catalog.processed_stories().await?;
        let metadata = self.catalog.story_metadata().await?;
        log::sub_item(&format!(
            "{} processed stories, {} with metadata",
            processed.len(),
            metadata.len()
        ));

        log::step(2, TOTAL_STEPS, "Applying incremental filters");
        let prior = if config.resume_mode {
            ResultStore::new(&config.output_directory).load_latest().await
        } else {
            None
        };
        let (stories, filter) =
            IncrementalFilter::new(config).apply(&processed, prior.as_ref(), Utc::now());

        log::step(3, TOTAL_STEPS, "Checking repository access");
        for target in [&frontend, &backend] {
            self.check_access(target, &limiter).await?;
        }

        log::step(4, TOTAL_STEPS, "Collecting implementation issues");
        let (frontend_issues, frontend_source) =
            self.collect_issues(&frontend, config, &limiter).await?;
        let (backend_issues, backend_source) =
            self.collect_issues(&backend, config, &limiter).await?;

        log::step(5, TOTAL_STEPS, "Comparing stories with issues");
        let engine = DiffEngine::new(
            frontend.clone(),
            backend.clone(),
            &self.settings.targets.story_repository,
        )
        .with_fuzzy(config.fuzzy_title_match);
        let result = engine.audit(&stories, &frontend_issues, &backend_issues, &metadata, config);

        if let Err(e) = ResultStore::new(&config.output_directory).save(&result).await {
            ::log::warn!("Could not persist audit result: {}", e);
        }

        let stats = &result.statistics;
        log::summary(
            "Audit",
            &[
                ("Processed stories", stats.processed_count.to_string()),
                (
                    "Missing frontend",
                    format!(
                        "{} ({:.1}% complete)",
                        stats.missing_frontend_count,
                        stats.frontend_completion()
                    ),
                ),
                (
                    "Missing backend",
                    format!(
                        "{} ({:.1}% complete)",
                        stats.missing_backend_count,
                        stats.backend_completion()
                    ),
                ),
                ("Overall", format!("{:.1}%", stats.overall_completion())),
                ("Frontend source", frontend_source.to_string()),
                ("Backend source", backend_source.to_string()),
            ],
        );
        limiter.log_summary();

        Ok(AuditRun {
            outcome: AuditOutcome::from_result(&result),
            result,
            sources: vec![
                (Domain::Frontend, frontend_source),
                (Domain::Backend, backend_source),
            ],
            filter,
            operations: limiter.operation_count(),
        })
    }

    async fn check_access(&self, target: &AuditTarget, limiter: &RateLimiter) -> Result<()> {
        limiter.pre_request_delay().await?;
        match self.scanner.test_access(&target.repository).await {
            Ok(true) => {
                log::sub_item(&format!("{} ({}): accessible", target.repository, target.domain));
                Ok(())
            }
            Ok(false) => Err(AppError::repository_access(&target.repository)),
            Err(e) => {
                ::log::warn!("Access check for {} failed: {}", target.repository, e);
                Err(AppError::repository_access(&target.repository))
            }
        }
    }

    /// Issues for one target, from today's cache entry when allowed.
    ///
    /// Fresh scans are always written back so a later cached run can reuse them.
    async fn collect_issues(
        &self,
        target: &AuditTarget,
        config: &AuditConfiguration,
        limiter: &RateLimiter,
    ) -> Result<(Vec<IssueRecord>, ScanSource)> {
        if config.use_cache {
            match self
                .cache
                .get::<Vec<IssueRecord>>(target.domain, &target.repository)
                .await
            {
                Ok(Some(issues)) => {
                    log::sub_item(&format!(
                        "{}: {} issues from cache",
                        target.domain,
                        issues.len()
                    ));
                    return Ok((issues, ScanSource::Cache));
                }
                Ok(None) => {}
                Err(e) => ::log::warn!("Cache read failed for {}: {}", target.repository, e),
            }
        }

        let issues = self.scan_with_retry(target, limiter).await?;
        log::sub_item(&format!(
            "{}: {} issues scanned from {}",
            target.domain,
            issues.len(),
            target.repository
        ));

        if let Err(e) = self
            .cache
            .put(target.domain, &target.repository, &issues)
            .await
        {
            ::log::warn!("Cache write failed for {}: {}", target.repository, e);
        }
        Ok((issues, ScanSource::Remote))
    }

    /// Page through a repository's issues.
    ///
    /// Transient failures and primary rate limits share the attempt budget;
    /// a failed page is repeated, earlier pages are kept.
    async fn scan_with_retry(
        &self,
        target: &AuditTarget,
        limiter: &RateLimiter,
    ) -> Result<Vec<IssueRecord>> {
        let max_attempts = self.settings.retry.max_attempts.max(1);
        let retry_delay = Duration::from_millis(self.settings.retry.delay_ms);

        let mut issues = Vec::new();
        let mut page = 1u32;
        let mut failures = 0u32;
        let mut secondary_retries = 0u32;

        loop {
            limiter.pre_request_delay().await?;
            let scan = match self
                .scanner
                .scan_page(&target.repository, target.title_prefix(), page)
                .await
            {
                Ok(scan) => scan,
                Err(e) if e.is_transient() => {
                    failures += 1;
                    if failures >= max_attempts {
                        return Err(AppError::scan(&target.repository, failures, e));
                    }
                    ::log::warn!(
                        "Scan of {} failed (attempt {}/{}): {}. Retrying in {}s",
                        target.repository,
                        failures,
                        max_attempts,
                        e,
                        retry_delay.as_secs()
                    );
                    sleep_or_cancel(retry_delay, &self.cancel).await?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let signal = limiter
                .observe_response(&scan.response.headers, scan.response.status, &scan.response.body)
                .await?;
            match signal {
                RateLimitSignal::Proceed => {}
                RateLimitSignal::Retry {
                    counts_against_budget: false,
                } => {
                    secondary_retries += 1;
                    if secondary_retries > MAX_SECONDARY_RETRIES {
                        return Err(AppError::RateLimited {
                            repository: target.repository.clone(),
                            attempts: failures + secondary_retries,
                        });
                    }
                    continue;
                }
                RateLimitSignal::Retry {
                    counts_against_budget: true,
                } => {
                    failures += 1;
                    if failures >= max_attempts {
                        return Err(AppError::RateLimited {
                            repository: target.repository.clone(),
                            attempts: failures,
                        });
                    }
                    continue;
                }
            }

            ::log::debug!(
                "{} page {}: {} issues",
                target.repository,
                page,
                scan.issues.len()
            );
            issues.extend(scan.issues);
            if !scan.has_more {
                return Ok(issues);
            }
            page += 1;
        }
    }
}
