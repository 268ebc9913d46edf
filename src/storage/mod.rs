//! Durable storage for scan results and audit results.
//!
//! ## Directory Structure
//!
//! ```text
//! {cache_root}/
//! ├── frontend-issues-{repo}-{hash}-{yyyy-MM-dd}.json
//! └── backend-issues-{repo}-{hash}-{yyyy-MM-dd}.json
//!
//! {output_dir}/
//! └── last-audit.json
//! ```

pub mod cache;
pub mod results;

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::Result;

pub use cache::{CacheStatistics, Decoded, ResultCache};
pub use results::ResultStore;

/// Persisted envelope around a cached value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: DateTime<Utc>,
    pub repository: String,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, timestamp: DateTime<Utc>, repository: impl Into<String>) -> Self {
        Self {
            data,
            timestamp,
            repository: repository.into(),
        }
    }

    /// Valid while `now < timestamp + ttl`.
    pub fn is_fresh(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        now < self.timestamp + ttl
    }
}

/// Write bytes atomically (write to temp, then rename).
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
