//! Narrowing of the processed-story set for incremental runs.
//!
//! Filters run in a fixed order (date, range, resume) and each only when
//! the run configuration asks for it. Every filter returns an ordered
//! subset of its input, so reapplying the pipeline is a no-op.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::models::{AuditConfiguration, AuditMode, AuditResult};

/// Hours within which a prior result narrows a resumed run.
const RESUME_WINDOW_HOURS: i64 = 1;

/// Counts from one filter pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterReport {
    pub original: usize,
    pub retained: usize,
}

impl FilterReport {
    pub fn excluded(&self) -> usize {
        self.original - self.retained
    }

    pub fn retention_percent(&self) -> f64 {
        if self.original == 0 {
            return 0.0;
        }
        self.retained as f64 * 100.0 / self.original as f64
    }
}

/// Applies the configured incremental filters.
#[derive(Debug, Clone, Copy)]
pub struct IncrementalFilter<'a> {
    config: &'a AuditConfiguration,
}

impl<'a> IncrementalFilter<'a> {
    pub fn new(config: &'a AuditConfiguration) -> Self {
        Self { config }
    }

    /// Run the filter pipeline at time `now`.
    ///
    /// A full audit returns the input unchanged.
    pub fn apply(
        &self,
        stories: &[u32],
        prior: Option<&AuditResult>,
        now: DateTime<Utc>,
    ) -> (Vec<u32>, FilterReport) {
        let mut retained = stories.to_vec();

        if self.config.mode != AuditMode::Full {
            if let Some((start, end)) = self.date_window(now.date_naive()) {
                retained = filter_by_date(retained, start, end);
            }
            if let Some((start, end)) = self.config.story_range() {
                retained = filter_by_range(retained, start, end);
                log::info!("Story range {}..={}: {} stories kept", start, end, retained.len());
            }
            if self.config.resume_mode {
                retained = filter_for_resume(retained, self.config.resume_from_story, prior, now);
            }
        }

        let report = FilterReport {
            original: stories.len(),
            retained: retained.len(),
        };
        log::info!(
            "Incremental filter ({}): {} of {} stories kept, {} excluded ({:.1}%)",
            self.config.mode,
            report.retained,
            report.original,
            report.excluded(),
            report.retention_percent()
        );
        (retained, report)
    }

    /// Explicit date range, else `days_back` ending today.
    pub fn date_window(&self, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        self.config.date_range().or_else(|| {
            self.config
                .days_back
                .map(|days| (today - Duration::days(i64::from(days)), today))
        })
    }
}

/// Date filter.
///
/// Processing timestamps are not recorded anywhere, so every story passes.
pub fn filter_by_date(stories: Vec<u32>, start: NaiveDate, end: NaiveDate) -> Vec<u32> {
    log::warn!(
        "Date filter {}..{} requested but processing dates are not tracked; keeping all {} stories",
        start,
        end,
        stories.len()
    );
    stories
}

/// Keep stories within `start..=end`.
pub fn filter_by_range(stories: Vec<u32>, start: u32, end: u32) -> Vec<u32> {
    stories
        .into_iter()
        .filter(|s| (start..=end).contains(s))
        .collect()
}

/// Resume filter.
///
/// Keeps stories up to `resume_from`. A prior result less than an hour old
/// narrows further to the stories it reported missing; anything absent from
/// its missing lists is treated as already resolved.
pub fn filter_for_resume(
    stories: Vec<u32>,
    resume_from: Option<u32>,
    prior: Option<&AuditResult>,
    now: DateTime<Utc>,
) -> Vec<u32> {
    let mut retained = match resume_from {
        Some(limit) => stories.into_iter().filter(|s| *s <= limit).collect(),
        None => stories,
    };

    if let Some(prior) = prior {
        let age = now - prior.audit_timestamp;
        if age < Duration::hours(RESUME_WINDOW_HOURS) {
            retained.retain(|s| prior.is_missing_anywhere(*s));
            log::info!(
                "Resuming from audit at {}: {} stories still missing",
                prior.audit_timestamp.format("%Y-%m-%d %H:%M:%S"),
                retained.len()
            );
        } else {
            log::info!(
                "Previous audit is {} minutes old, not narrowing resume",
                age.num_minutes()
            );
        }
    }

    retained
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuditStatistics, Domain, MissingIssue};

    fn config(builder: crate::models::AuditConfigurationBuilder) -> AuditConfiguration {
        builder.github_token("t").build().unwrap()
    }

    fn prior(missing: &[u32], at: DateTime<Utc>) -> AuditResult {
        let missing_frontend: Vec<MissingIssue> = missing
            .iter()
            .map(|n| MissingIssue {
                story_number: *n,
                story_title: format!("S{n}"),
                story_url: String::new(),
                domain: Domain::Frontend,
                target_repository: "org/web".into(),
                expected_title: String::new(),
            })
            .collect();
        AuditResult {
            statistics: AuditStatistics {
                processed_count: 10,
                frontend_found_count: 0,
                backend_found_count: 0,
                missing_frontend_count: missing_frontend.len(),
                missing_backend_count: 0,
                timestamp: at,
            },
            missing_frontend,
            missing_backend: Vec::new(),
            total_processed_stories: 10,
            audit_timestamp: at,
            configuration: config(AuditConfiguration::builder()),
        }
    }

    #[test]
    fn test_range_is_inclusive() {
        assert_eq!(filter_by_range(vec![1, 5, 9, 10, 11], 5, 10), vec![5, 9, 10]);
    }

    #[test]
    fn test_full_mode_keeps_everything() {
        let cfg = config(AuditConfiguration::builder().story_range(2, 3));
        let (kept, report) = IncrementalFilter::new(&cfg).apply(&[1, 2, 3, 4], None, Utc::now());
        assert_eq!(kept, vec![1, 2, 3, 4]);
        assert_eq!(report.excluded(), 0);
    }

    #[test]
    fn test_range_mode_filters_and_reports() {
        let cfg = config(
            AuditConfiguration::builder()
                .mode(AuditMode::IncrementalRange)
                .story_range(2, 3),
        );
        let (kept, report) = IncrementalFilter::new(&cfg).apply(&[1, 2, 3, 4], None, Utc::now());
        assert_eq!(kept, vec![2, 3]);
        assert_eq!(report.excluded(), 2);
        assert_eq!(report.retention_percent(), 50.0);
    }

    #[test]
    fn test_date_mode_returns_subset() {
        let cfg = config(
            AuditConfiguration::builder()
                .mode(AuditMode::IncrementalDate)
                .days_back(Some(7)),
        );
        let input = [10, 20, 30];
        let (kept, _) = IncrementalFilter::new(&cfg).apply(&input, None, Utc::now());
        assert!(kept.iter().all(|s| input.contains(s)));
    }

    #[test]
    fn test_days_back_window() {
        let cfg = config(
            AuditConfiguration::builder()
                .mode(AuditMode::IncrementalDate)
                .days_back(Some(7)),
        );
        let today = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        assert_eq!(
            IncrementalFilter::new(&cfg).date_window(today),
            Some((NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(), today))
        );
    }

    #[test]
    fn test_resume_from_story() {
        let kept = filter_for_resume(vec![3, 8, 12, 20], Some(12), None, Utc::now());
        assert_eq!(kept, vec![3, 8, 12]);
    }

    #[test]
    fn test_resume_with_recent_prior_keeps_missing_only() {
        let now = Utc::now();
        let recent = prior(&[8, 20], now - Duration::minutes(10));
        let kept = filter_for_resume(vec![3, 8, 12, 20], None, Some(&recent), now);
        assert_eq!(kept, vec![8, 20]);

        let stale = prior(&[8], now - Duration::hours(2));
        let kept = filter_for_resume(vec![3, 8, 12], None, Some(&stale), now);
        assert_eq!(kept, vec![3, 8, 12]);
    }

    #[test]
    fn test_pipeline_is_idempotent() {
        let now = Utc::now();
        let recent = prior(&[2, 4, 6], now - Duration::minutes(5));
        let cfg = config(
            AuditConfiguration::builder()
                .mode(AuditMode::Resume)
                .story_range(2, 6)
                .resume_from_story(Some(5)),
        );
        let filter = IncrementalFilter::new(&cfg);
        let (once, _) = filter.apply(&[1, 2, 3, 4, 5, 6, 7], Some(&recent), now);
        let (twice, _) = filter.apply(&once, Some(&recent), now);
        assert_eq!(once, vec![2, 4]);
        assert_eq!(once, twice);
    }
}
