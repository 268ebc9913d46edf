// src/storage/cache.rs

//! Date-partitioned, TTL-bounded cache of repository scan results.
//!
//! One JSON file per (domain, repository, UTC day). Only today's file is
//! consulted on read; an entry is a hit while `now < timestamp + ttl`.
//! Stale and undecodable files are reported as misses and left on disk
//! until [`ResultCache::cleanup_expired`] runs.
//!
//! Concurrent writers for the same key on the same day are not
//! coordinated; the last rename wins.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};
use crate::models::Domain;

use super::{CacheEntry, write_atomic};

const CACHE_EXTENSION: &str = "json";

/// Outcome of decoding one cache file.
#[derive(Debug)]
pub enum Decoded<T> {
    Ok(CacheEntry<T>),
    Corrupt(String),
}

impl<T: DeserializeOwned> Decoded<T> {
    pub fn from_slice(bytes: &[u8]) -> Self {
        match serde_json::from_slice(bytes) {
            Ok(entry) => Self::Ok(entry),
            Err(e) => Self::Corrupt(e.to_string()),
        }
    }
}

/// Size of the cache directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStatistics {
    pub file_count: usize,
    pub total_bytes: u64,
    pub computed_at: DateTime<Utc>,
}

/// File-backed scan result cache.
#[derive(Debug, Clone)]
pub struct ResultCache {
    root_dir: PathBuf,
    ttl: chrono::Duration,
}

impl ResultCache {
    pub fn new(root_dir: impl Into<PathBuf>, ttl: chrono::Duration) -> Self {
        Self {
            root_dir: root_dir.into(),
            ttl,
        }
    }

    pub fn with_ttl_hours(root_dir: impl Into<PathBuf>, hours: u32) -> Self {
        Self::new(root_dir, chrono::Duration::hours(i64::from(hours)))
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    /// Replace every character outside `[A-Za-z0-9._-]` with `-`, collapse
    /// runs of `-` and trim them from both ends.
    pub fn sanitize(repository: &str) -> String {
        let mut out = String::with_capacity(repository.len());
        for c in repository.chars() {
            let c = if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            };
            if c == '-' && out.ends_with('-') {
                continue;
            }
            out.push(c);
        }
        let trimmed = out.trim_matches('-');
        if trimmed.is_empty() {
            "default".to_string()
        } else {
            trimmed.to_string()
        }
    }

    /// First 8 hex digits of the SHA-256 of the raw repository name.
    fn repository_hash(repository: &str) -> String {
        let digest = Sha256::digest(repository.as_bytes());
        hex::encode(&digest[..4])
    }

    /// Key prefix shared by every day's entry for one repository.
    fn repository_prefix(domain: Domain, repository: &str) -> String {
        format!(
            "{}{}-{}-",
            domain.cache_prefix(),
            Self::sanitize(repository),
            Self::repository_hash(repository)
        )
    }

    /// Cache key for a repository on a given day.
    pub fn key(domain: Domain, repository: &str, day: NaiveDate) -> String {
        format!(
            "{}{}",
            Self::repository_prefix(domain, repository),
            day.format("%Y-%m-%d")
        )
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(format!("{key}.{CACHE_EXTENSION}"))
    }

    pub async fn put<T: Serialize>(
        &self,
        domain: Domain,
        repository: &str,
        data: &T,
    ) -> Result<()> {
        self.put_at(domain, repository, data, Utc::now()).await
    }

    /// Store `data` as written at `now`.
    pub async fn put_at<T: Serialize>(
        &self,
        domain: Domain,
        repository: &str,
        data: &T,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let key = Self::key(domain, repository, now.date_naive());
        let entry = CacheEntry::new(data, now, repository);
        let bytes = serde_json::to_vec_pretty(&entry)?;
        write_atomic(&self.path(&key), &bytes).await?;
        log::debug!("Cached {} result for {} as {}", domain, repository, key);
        Ok(())
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        domain: Domain,
        repository: &str,
    ) -> Result<Option<T>> {
        self.get_at(domain, repository, Utc::now()).await
    }

    /// Look up today's entry as seen at `now`.
    ///
    /// Absent, stale and corrupt entries are all `None`.
    pub async fn get_at<T: DeserializeOwned>(
        &self,
        domain: Domain,
        repository: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<T>> {
        let key = Self::key(domain, repository, now.date_naive());
        let Some(bytes) = read_optional(&self.path(&key)).await? else {
            log::info!("Cache miss for {} ({})", repository, domain);
            return Ok(None);
        };

        match Decoded::<T>::from_slice(&bytes) {
            Decoded::Ok(entry) if entry.is_fresh(self.ttl, now) => {
                log::info!(
                    "Cache hit for {} ({}), written {}",
                    repository,
                    domain,
                    entry.timestamp.format("%H:%M:%S")
                );
                Ok(Some(entry.data))
            }
            Decoded::Ok(_) => {
                log::info!("Cache entry for {} ({}) expired", repository, domain);
                Ok(None)
            }
            Decoded::Corrupt(reason) => {
                log::warn!("Cache entry {} unreadable, ignoring: {}", key, reason);
                Ok(None)
            }
        }
    }

    /// Delete every cache file. Returns how many were removed.
    pub async fn invalidate_all(&self) -> Result<usize> {
        let mut removed = 0;
        for path in self.entries().await? {
            tokio::fs::remove_file(&path).await?;
            removed += 1;
        }
        log::info!("Cache cleared: {} entries removed", removed);
        Ok(removed)
    }

    /// Delete every day's entry for one repository in one domain.
    pub async fn invalidate_repository(&self, domain: Domain, repository: &str) -> Result<usize> {
        let prefix = Self::repository_prefix(domain, repository);
        let mut removed = 0;
        for path in self.entries().await? {
            if file_name(&path).is_some_and(|name| name.starts_with(&prefix)) {
                tokio::fs::remove_file(&path).await?;
                removed += 1;
            }
        }
        log::info!(
            "Cache invalidated for {} ({}): {} entries removed",
            repository,
            domain,
            removed
        );
        Ok(removed)
    }

    pub async fn cleanup_expired(&self) -> Result<usize> {
        self.cleanup_expired_at(Utc::now()).await
    }

    /// Delete entries that are stale at `now` or cannot be decoded.
    pub async fn cleanup_expired_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut removed = 0;
        for path in self.entries().await? {
            let Some(bytes) = read_optional(&path).await? else {
                continue;
            };
            let stale = match Decoded::<serde_json::Value>::from_slice(&bytes) {
                Decoded::Ok(entry) => !entry.is_fresh(self.ttl, now),
                Decoded::Corrupt(reason) => {
                    log::warn!("Removing corrupt cache file {}: {}", path.display(), reason);
                    true
                }
            };
            if stale {
                tokio::fs::remove_file(&path).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            log::info!("Cache cleanup: {} expired entries removed", removed);
        }
        Ok(removed)
    }

    pub async fn statistics(&self) -> Result<CacheStatistics> {
        let mut stats = CacheStatistics {
            file_count: 0,
            total_bytes: 0,
            computed_at: Utc::now(),
        };
        for path in self.entries().await? {
            let meta = tokio::fs::metadata(&path).await?;
            stats.file_count += 1;
            stats.total_bytes += meta.len();
        }
        Ok(stats)
    }

    /// Cache files under the root; a missing root is empty.
    async fn entries(&self) -> Result<Vec<PathBuf>> {
        let mut dir = match tokio::fs::read_dir(&self.root_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::Io(e)),
        };

        let mut paths = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            let is_cache_file = path.extension().is_some_and(|ext| ext == CACHE_EXTENSION)
                && file_name(&path).is_some_and(|name| {
                    Domain::ALL.iter().any(|d| name.starts_with(d.cache_prefix()))
                });
            if is_cache_file && entry.file_type().await?.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::Io(e)),
    }
}
