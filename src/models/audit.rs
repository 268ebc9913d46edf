//! Audit domain types: domains, missing issues, results and statistics.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::AuditConfiguration;

/// One of the two downstream repositories audited independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Frontend,
    Backend,
}

impl Domain {
    pub const ALL: [Domain; 2] = [Domain::Frontend, Domain::Backend];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Frontend => "frontend",
            Domain::Backend => "backend",
        }
    }

    /// Title prefix an implementation issue must start with.
    pub fn title_prefix(&self) -> &'static str {
        match self {
            Domain::Frontend => "[FRONTEND] [STORY]",
            Domain::Backend => "[BACKEND] [STORY]",
        }
    }

    /// File name prefix for cached scan results.
    pub fn cache_prefix(&self) -> &'static str {
        match self {
            Domain::Frontend => "frontend-issues-",
            Domain::Backend => "backend-issues-",
        }
    }

    /// Expected implementation issue title for a story title.
    pub fn format_title(&self, story_title: &str) -> String {
        format!("{} {}", self.title_prefix(), story_title)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "frontend" => Some(Domain::Frontend),
            "backend" => Some(Domain::Backend),
            _ => None,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A domain bound to the repository that implements it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTarget {
    pub domain: Domain,
    pub repository: String,
}

impl AuditTarget {
    pub fn new(domain: Domain, repository: impl Into<String>) -> Self {
        Self {
            domain,
            repository: repository.into(),
        }
    }

    pub fn title_prefix(&self) -> &'static str {
        self.domain.title_prefix()
    }
}

/// A story with no matching implementation issue in one domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissingIssue {
    pub story_number: u32,
    pub story_title: String,
    pub story_url: String,
    pub domain: Domain,
    pub target_repository: String,
    pub expected_title: String,
}

impl MissingIssue {
    /// Identity triple: story, domain and target repository.
    pub fn key(&self) -> (u32, Domain, &str) {
        (self.story_number, self.domain, &self.target_repository)
    }
}

impl PartialEq for MissingIssue {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for MissingIssue {}

/// Counts and completion percentages for one audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditStatistics {
    pub processed_count: usize,
    pub frontend_found_count: usize,
    pub backend_found_count: usize,
    pub missing_frontend_count: usize,
    pub missing_backend_count: usize,
    pub timestamp: DateTime<Utc>,
}

impl AuditStatistics {
    pub fn total_missing(&self) -> usize {
        self.missing_frontend_count + self.missing_backend_count
    }

    pub fn frontend_completion(&self) -> f64 {
        completion(self.processed_count, self.missing_frontend_count)
    }

    pub fn backend_completion(&self) -> f64 {
        completion(self.processed_count, self.missing_backend_count)
    }

    pub fn overall_completion(&self) -> f64 {
        completion(self.processed_count * 2, self.total_missing())
    }
}

impl fmt::Display for AuditStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = self.processed_count;
        write!(
            f,
            "processed={}, frontend={}/{} ({:.1}%), backend={}/{} ({:.1}%), overall={:.1}%",
            p,
            p.saturating_sub(self.missing_frontend_count),
            p,
            self.frontend_completion(),
            p.saturating_sub(self.missing_backend_count),
            p,
            self.backend_completion(),
            self.overall_completion()
        )
    }
}

/// Percentage of `expected` not covered by `missing`, rounded half-up to one decimal.
fn completion(expected: usize, missing: usize) -> f64 {
    if expected == 0 {
        return 0.0;
    }
    let done = expected.saturating_sub(missing) as u128;
    let expected = expected as u128;
    // tenths of a percent: floor(1000 * done / expected + 1/2)
    let tenths = (2000 * done + expected) / (2 * expected);
    tenths as f64 / 10.0
}

/// Result of one audit run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditResult {
    pub missing_frontend: Vec<MissingIssue>,
    pub missing_backend: Vec<MissingIssue>,
    pub total_processed_stories: usize,
    pub audit_timestamp: DateTime<Utc>,
    pub configuration: AuditConfiguration,
    pub statistics: AuditStatistics,
}

impl AuditResult {
    pub fn total_missing(&self) -> usize {
        self.missing_frontend.len() + self.missing_backend.len()
    }

    pub fn has_missing(&self) -> bool {
        self.total_missing() > 0
    }

    pub fn missing_for(&self, domain: Domain) -> &[MissingIssue] {
        match domain {
            Domain::Frontend => &self.missing_frontend,
            Domain::Backend => &self.missing_backend,
        }
    }

    /// Missing issues of both domains, frontend first.
    pub fn all_missing(&self) -> impl Iterator<Item = &MissingIssue> {
        self.missing_frontend.iter().chain(self.missing_backend.iter())
    }

    /// Whether the story appears in either missing list.
    pub fn is_missing_anywhere(&self, story_number: u32) -> bool {
        self.all_missing().any(|m| m.story_number == story_number)
    }
}
