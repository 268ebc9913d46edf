//! Story metadata and scanned issue records.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Marker carried by story titles in the upstream catalog.
pub const STORY_MARKER: &str = "[STORY] ";

/// Metadata for a story from the upstream catalog.
///
/// Identity is the story number alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryMetadata {
    /// Story issue number
    pub story_number: u32,

    /// Story title, possibly prefixed with `[STORY] `
    pub title: String,

    /// Link to the story issue
    pub url: String,

    /// Ready for frontend implementation
    #[serde(default = "ready")]
    pub ready_for_frontend: bool,

    /// Ready for backend implementation
    #[serde(default = "ready")]
    pub ready_for_backend: bool,
}

fn ready() -> bool {
    true
}

impl StoryMetadata {
    pub fn new(story_number: u32, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            story_number,
            title: title.into(),
            url: url.into(),
            ready_for_frontend: true,
            ready_for_backend: true,
        }
    }

    /// Title with the `[STORY] ` marker stripped.
    pub fn clean_title(&self) -> &str {
        self.title.strip_prefix(STORY_MARKER).unwrap_or(&self.title)
    }
}

impl PartialEq for StoryMetadata {
    fn eq(&self, other: &Self) -> bool {
        self.story_number == other.story_number
    }
}

impl Eq for StoryMetadata {}

impl Hash for StoryMetadata {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.story_number.hash(state);
    }
}

/// An issue returned by a repository scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub number: u64,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl IssueRecord {
    pub fn new(number: u64, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            number,
            title: title.into(),
            url: url.into(),
            labels: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_title_strips_marker() {
        let story = StoryMetadata::new(7, "[STORY] Checkout flow", "https://example.com/7");
        assert_eq!(story.clean_title(), "Checkout flow");

        let plain = StoryMetadata::new(8, "Checkout flow", "https://example.com/8");
        assert_eq!(plain.clean_title(), "Checkout flow");
    }

    #[test]
    fn test_identity_is_story_number() {
        let a = StoryMetadata::new(1, "A", "u1");
        let b = StoryMetadata::new(1, "B", "u2");
        assert_eq!(a, b);
        assert_ne!(a, StoryMetadata::new(2, "A", "u1"));
    }

    #[test]
    fn test_metadata_defaults_readiness() {
        let story: StoryMetadata =
            serde_json::from_str(r#"{"story_number": 3, "title": "T", "url": "u"}"#).unwrap();
        assert!(story.ready_for_frontend);
        assert!(story.ready_for_backend);
    }
}
