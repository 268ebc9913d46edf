// src/services/github.rs

//! GitHub issue search client.
//!
//! Uses the search API with a title-scoped query and pages through results
//! `per_page` at a time. Search matching is loose, so titles are checked
//! for the prefix again on our side.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{GithubConfig, IssueRecord};
use crate::utils::http::{create_async_client, header_map};

use super::{IssueScanner, ResponseMeta, ScanPage};

/// Search results beyond this many items are not served by the API.
const SEARCH_RESULT_CAP: u32 = 1000;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    number: u64,
    title: String,
    html_url: String,
    #[serde(default)]
    labels: Vec<Label>,
}

#[derive(Debug, Deserialize)]
struct Label {
    name: String,
}

impl From<SearchItem> for IssueRecord {
    fn from(item: SearchItem) -> Self {
        Self {
            number: item.number,
            title: item.title,
            url: item.html_url,
            labels: item.labels.into_iter().map(|l| l.name).collect(),
        }
    }
}

/// [`IssueScanner`] backed by the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GitHubScanner {
    client: Client,
    api_base: Url,
    per_page: u32,
}

impl GitHubScanner {
    pub fn new(config: &GithubConfig, token: &str) -> Result<Self> {
        let mut api_base = Url::parse(&config.api_base)?;
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }
        Ok(Self {
            client: create_async_client(config, token)?,
            api_base,
            per_page: config.per_page.clamp(1, 100),
        })
    }

    /// Search query for issues in `repository` titled with `title_prefix`.
    pub fn search_query(repository: &str, title_prefix: &str) -> String {
        format!("repo:{repository} is:issue in:title \"{title_prefix}\"")
    }

    fn search_url(&self, repository: &str, title_prefix: &str, page: u32) -> Result<Url> {
        let mut url = self.api_base.join("search/issues")?;
        url.query_pairs_mut()
            .append_pair("q", &Self::search_query(repository, title_prefix))
            .append_pair("per_page", &self.per_page.to_string())
            .append_pair("page", &page.to_string());
        Ok(url)
    }
}

#[async_trait]
impl IssueScanner for GitHubScanner {
    async fn scan_page(&self, repository: &str, title_prefix: &str, page: u32) -> Result<ScanPage> {
        let url = self.search_url(repository, title_prefix, page)?;
        log::debug!("GET {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        let headers = header_map(response.headers());
        let body = response.text().await?;
        let meta = ResponseMeta {
            status: status.as_u16(),
            headers,
            body,
        };

        match status {
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => Ok(ScanPage {
                issues: Vec::new(),
                response: meta,
                has_more: true,
            }),
            StatusCode::UNPROCESSABLE_ENTITY => {
                log::warn!(
                    "Search for {} in {} was rejected (422), treating as no results",
                    title_prefix,
                    repository
                );
                Ok(ScanPage {
                    issues: Vec::new(),
                    response: meta,
                    has_more: false,
                })
            }
            s if s.is_success() => {
                let parsed: SearchResponse = serde_json::from_str(&meta.body)?;
                let fetched = parsed.items.len() as u32;
                let issues = parsed
                    .items
                    .into_iter()
                    .filter(|item| item.title.contains(title_prefix))
                    .map(IssueRecord::from)
                    .collect();
                Ok(ScanPage {
                    issues,
                    response: meta,
                    has_more: fetched == self.per_page
                        && page.saturating_mul(self.per_page) < SEARCH_RESULT_CAP,
                })
            }
            s => Err(AppError::Io(std::io::Error::other(format!(
                "search in {repository} returned {s}"
            )))),
        }
    }

    async fn test_access(&self, repository: &str) -> Result<bool> {
        let url = self.api_base.join(&format!("repos/{repository}"))?;
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            log::warn!("Access check for {} returned {}", repository, status);
        }
        Ok(status.is_success())
    }
}
