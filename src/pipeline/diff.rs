//! Reconciliation of processed stories against scanned issues.
//!
//! A processed story is missing in a domain when no issue in that domain's
//! repository carries the domain prefix followed by the story's title.
//!
//! ```text
//! issues ──prefix filter──▶ stripped titles ──TitleMatcher──▶ found set
//! processed stories ∖ found set ──▶ MissingIssue (metadata or placeholder)
//! ```

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;

use crate::models::{
    AuditConfiguration, AuditResult, AuditStatistics, AuditTarget, Domain, IssueRecord,
    MissingIssue, StoryMetadata,
};

use super::matcher::{MatchPhase, TitleMatcher};

/// Computes missing implementation issues for both domains.
#[derive(Debug, Clone)]
pub struct DiffEngine {
    frontend: AuditTarget,
    backend: AuditTarget,
    story_repository: String,
    fuzzy: bool,
}

impl DiffEngine {
    pub fn new(
        frontend: AuditTarget,
        backend: AuditTarget,
        story_repository: impl Into<String>,
    ) -> Self {
        Self {
            frontend,
            backend,
            story_repository: story_repository.into(),
            fuzzy: false,
        }
    }

    /// Also accept fuzzy containment matches.
    pub fn with_fuzzy(mut self, fuzzy: bool) -> Self {
        self.fuzzy = fuzzy;
        self
    }

    pub fn target(&self, domain: Domain) -> &AuditTarget {
        match domain {
            Domain::Frontend => &self.frontend,
            Domain::Backend => &self.backend,
        }
    }

    /// Build the audit result for one run.
    ///
    /// Output order follows `processed`. Stories without metadata get a
    /// placeholder entry instead of failing the audit.
    pub fn audit(
        &self,
        processed: &[u32],
        frontend_issues: &[IssueRecord],
        backend_issues: &[IssueRecord],
        metadata: &BTreeMap<u32, StoryMetadata>,
        configuration: &AuditConfiguration,
    ) -> AuditResult {
        let matcher = TitleMatcher::new(metadata).with_fuzzy(self.fuzzy);

        let frontend_found = self.found_stories(Domain::Frontend, frontend_issues, &matcher);
        let backend_found = self.found_stories(Domain::Backend, backend_issues, &matcher);

        let missing_frontend = self.missing(Domain::Frontend, processed, &frontend_found, metadata);
        let missing_backend = self.missing(Domain::Backend, processed, &backend_found, metadata);

        let timestamp = Utc::now();
        let statistics = AuditStatistics {
            processed_count: processed.len(),
            frontend_found_count: frontend_issues.len(),
            backend_found_count: backend_issues.len(),
            missing_frontend_count: missing_frontend.len(),
            missing_backend_count: missing_backend.len(),
            timestamp,
        };

        AuditResult {
            missing_frontend,
            missing_backend,
            total_processed_stories: processed.len(),
            audit_timestamp: timestamp,
            configuration: configuration.clone(),
            statistics,
        }
    }

    /// Story numbers with a matching implementation issue in `domain`.
    pub fn found_stories(
        &self,
        domain: Domain,
        issues: &[IssueRecord],
        matcher: &TitleMatcher<'_>,
    ) -> BTreeSet<u32> {
        let prefix = domain.title_prefix();
        let mut found = BTreeSet::new();
        let mut unmatched = 0usize;

        for issue in issues {
            match matcher.match_issue(&issue.title, prefix) {
                Some((number, phase)) => {
                    if phase == MatchPhase::FuzzyContains {
                        log::debug!("#{} fuzzy-matched story #{}", issue.number, number);
                    }
                    found.insert(number);
                }
                None if issue.title.starts_with(prefix) => unmatched += 1,
                None => {}
            }
        }

        if unmatched > 0 {
            log::debug!(
                "{}: {} prefixed issues matched no story title",
                domain,
                unmatched
            );
        }
        found
    }

    fn missing(
        &self,
        domain: Domain,
        processed: &[u32],
        found: &BTreeSet<u32>,
        metadata: &BTreeMap<u32, StoryMetadata>,
    ) -> Vec<MissingIssue> {
        let target = self.target(domain);
        processed
            .iter()
            .filter(|number| !found.contains(*number))
            .map(|&number| {
                let (title, url) = match metadata.get(&number) {
                    Some(story) => (story.clean_title().to_string(), story.url.clone()),
                    None => {
                        log::warn!("Story #{} has no metadata, using placeholder", number);
                        (
                            format!("Story #{number} (metadata not found)"),
                            self.story_url(number),
                        )
                    }
                };
                MissingIssue {
                    story_number: number,
                    expected_title: domain.format_title(&title),
                    story_title: title,
                    story_url: url,
                    domain,
                    target_repository: target.repository.clone(),
                }
            })
            .collect()
    }

    fn story_url(&self, number: u32) -> String {
        format!("https://github.com/{}/issues/{}", self.story_repository, number)
    }
}
