// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};

use crate::error::{AppError, Result};
use crate::models::GithubConfig;

/// Media type requested from the GitHub REST API.
const GITHUB_ACCEPT: &str = "application/vnd.github+json";

/// Create a configured asynchronous HTTP client for the GitHub API.
///
/// The token is sent as a bearer credential on every request.
pub fn create_async_client(config: &GithubConfig, token: &str) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_ACCEPT));

    let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|_| AppError::config("GitHub token contains invalid header characters"))?;
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);

    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .default_headers(headers)
        .build()?;
    Ok(client)
}

/// Collect response headers into a map with lower-cased names.
///
/// Values that are not valid visible ASCII are dropped.
pub fn header_map(headers: &HeaderMap) -> std::collections::HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}
