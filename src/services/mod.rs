//! Service layer for the audit application.
//!
//! The pipeline talks to the outside world through two seams:
//! - `IssueScanner`: issue search and repository access checks (`GitHubScanner`)
//! - `StoryCatalog`: processed stories and their metadata (`FileCatalog`)

mod catalog;
mod github;

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{IssueRecord, StoryMetadata};

pub use catalog::{FileCatalog, parse_metadata, parse_processed_stories};
pub use github::GitHubScanner;

/// Status, headers and body of one remote response.
///
/// Header names are lower-cased.
#[derive(Debug, Clone, Default)]
pub struct ResponseMeta {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl ResponseMeta {
    pub fn ok() -> Self {
        Self {
            status: 200,
            ..Self::default()
        }
    }
}

/// One page of a repository issue search.
#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    pub issues: Vec<IssueRecord>,
    pub response: ResponseMeta,
    /// Another page may follow
    pub has_more: bool,
}

/// Remote issue search.
#[async_trait]
pub trait IssueScanner: Send + Sync {
    /// Fetch one page (1-based) of issues in `repository` whose titles carry
    /// `title_prefix`.
    ///
    /// Rate limited responses come back as a page with the limiting status
    /// and body so the caller can wait and repeat. Transport failures are
    /// errors.
    async fn scan_page(
        &self,
        repository: &str,
        title_prefix: &str,
        page: u32,
    ) -> Result<ScanPage>;

    /// Whether `repository` is readable with the current credentials.
    async fn test_access(&self, repository: &str) -> Result<bool>;
}

/// Source of processed stories and story metadata.
#[async_trait]
pub trait StoryCatalog: Send + Sync {
    /// Unique positive story numbers, in catalog order.
    async fn processed_stories(&self) -> Result<Vec<u32>>;

    async fn story_metadata(&self) -> Result<BTreeMap<u32, StoryMetadata>>;
}
