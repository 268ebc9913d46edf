// src/services/catalog.rs

//! File-backed story catalog.
//!
//! - `processed-issues.txt`: one story number per line, blank lines skipped
//! - `story-metadata.json`: array of story metadata records

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{PathsConfig, StoryMetadata};

use super::StoryCatalog;

/// Reads the catalog from two files on disk.
#[derive(Debug, Clone)]
pub struct FileCatalog {
    processed_path: PathBuf,
    metadata_path: PathBuf,
}

impl FileCatalog {
    pub fn new(processed_path: impl Into<PathBuf>, metadata_path: impl Into<PathBuf>) -> Self {
        Self {
            processed_path: processed_path.into(),
            metadata_path: metadata_path.into(),
        }
    }

    pub fn from_config(paths: &PathsConfig) -> Self {
        Self::new(&paths.processed_stories, &paths.story_metadata)
    }
}

async fn read_text(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| AppError::catalog(path.display().to_string(), e))
}

#[async_trait]
impl StoryCatalog for FileCatalog {
    async fn processed_stories(&self) -> Result<Vec<u32>> {
        let text = read_text(&self.processed_path).await?;
        let stories = parse_processed_stories(&text, &self.processed_path.display().to_string())?;
        log::info!(
            "Loaded {} processed stories from {}",
            stories.len(),
            self.processed_path.display()
        );
        Ok(stories)
    }

    async fn story_metadata(&self) -> Result<BTreeMap<u32, StoryMetadata>> {
        let text = read_text(&self.metadata_path).await?;
        let metadata = parse_metadata(&text, &self.metadata_path.display().to_string())?;
        log::info!(
            "Loaded metadata for {} stories from {}",
            metadata.len(),
            self.metadata_path.display()
        );
        Ok(metadata)
    }
}

/// Parse processed story numbers, keeping file order.
///
/// Zero, negative, non-numeric and duplicate entries are errors, and so is
/// a file with no entries.
pub fn parse_processed_stories(text: &str, source: &str) -> Result<Vec<u32>> {
    let mut seen = HashSet::new();
    let mut stories = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let line_no = idx + 1;
        let number: i64 = line.parse().map_err(|_| {
            AppError::catalog(source, format!("line {line_no}: '{line}' is not a story number"))
        })?;
        let number = u32::try_from(number)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                AppError::catalog(
                    source,
                    format!("line {line_no}: story number {number} must be positive"),
                )
            })?;
        if !seen.insert(number) {
            return Err(AppError::catalog(
                source,
                format!("line {line_no}: duplicate story number {number}"),
            ));
        }
        stories.push(number);
    }

    if stories.is_empty() {
        return Err(AppError::catalog(source, "no story numbers found"));
    }
    Ok(stories)
}

/// Parse a JSON array of story metadata keyed by story number.
pub fn parse_metadata(text: &str, source: &str) -> Result<BTreeMap<u32, StoryMetadata>> {
    let records: Vec<StoryMetadata> =
        serde_json::from_str(text).map_err(|e| AppError::catalog(source, e))?;

    let mut metadata = BTreeMap::new();
    for record in records {
        let number = record.story_number;
        if number == 0 {
            return Err(AppError::catalog(source, "story number 0 is not valid"));
        }
        if metadata.insert(number, record).is_some() {
            return Err(AppError::catalog(
                source,
                format!("duplicate metadata for story {number}"),
            ));
        }
    }
    Ok(metadata)
}
