//! Persistence of the latest audit result.

use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};
use crate::models::AuditResult;

use super::write_atomic;

const LAST_AUDIT_FILE: &str = "last-audit.json";

/// Stores the most recent [`AuditResult`] in the output directory.
#[derive(Debug, Clone)]
pub struct ResultStore {
    output_dir: PathBuf,
}

impl ResultStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.output_dir.join(LAST_AUDIT_FILE)
    }

    pub async fn save(&self, result: &AuditResult) -> Result<PathBuf> {
        let path = self.path();
        let bytes = serde_json::to_vec_pretty(result)?;
        write_atomic(&path, &bytes).await?;
        log::info!("Audit result saved to {}", path.display());
        Ok(path)
    }

    /// Load the previous result, if a readable one exists.
    pub async fn load_latest(&self) -> Option<AuditResult> {
        let path = self.path();
        match read(&path).await {
            Ok(Some(result)) => {
                log::info!(
                    "Loaded previous audit from {}",
                    result.audit_timestamp.format("%Y-%m-%d %H:%M:%S")
                );
                Some(result)
            }
            Ok(None) => {
                log::info!("No previous audit at {}", path.display());
                None
            }
            Err(e) => {
                log::warn!("Ignoring unreadable previous audit {}: {}", path.display(), e);
                None
            }
        }
    }
}

async fn read(path: &Path) -> Result<Option<AuditResult>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuditConfiguration, AuditStatistics};
    use chrono::Utc;
    use tempfile::TempDir;

    fn result() -> AuditResult {
        let now = Utc::now();
        AuditResult {
            missing_frontend: Vec::new(),
            missing_backend: Vec::new(),
            total_processed_stories: 4,
            audit_timestamp: now,
            configuration: AuditConfiguration::builder()
                .github_token("secret")
                .build()
                .unwrap(),
            statistics: AuditStatistics {
                processed_count: 4,
                frontend_found_count: 4,
                backend_found_count: 4,
                missing_frontend_count: 0,
                missing_backend_count: 0,
                timestamp: now,
            },
        }
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path().join("out"));
        assert!(store.load_latest().await.is_none());

        let path = store.save(&result()).await.unwrap();
        let raw = std::fs::read_to_string(path).unwrap();
        assert!(!raw.contains("secret"));

        let loaded = store.load_latest().await.unwrap();
        assert_eq!(loaded.total_processed_stories, 4);
        assert!(loaded.configuration.github_token.expose().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path());
        std::fs::write(store.path(), "[]").unwrap();
        assert!(store.load_latest().await.is_none());
    }
}
