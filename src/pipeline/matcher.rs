//! Title matching between implementation issues and story metadata.
//!
//! Matching runs in two ordered phases. The exact phase compares the
//! issue title (domain prefix stripped, trimmed) with each story's clean
//! title. The fuzzy phase, when enabled, accepts a case-insensitive
//! containment in either direction. Within a phase the lowest story
//! number wins.

use std::collections::{BTreeMap, HashMap};

use crate::models::StoryMetadata;

/// Phase that produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    Exact,
    FuzzyContains,
}

/// Matches issue titles against a story metadata catalog.
#[derive(Debug)]
pub struct TitleMatcher<'a> {
    metadata: &'a BTreeMap<u32, StoryMetadata>,
    exact: HashMap<&'a str, u32>,
    fuzzy: bool,
}

impl<'a> TitleMatcher<'a> {
    /// Exact-only matcher.
    pub fn new(metadata: &'a BTreeMap<u32, StoryMetadata>) -> Self {
        let mut exact = HashMap::with_capacity(metadata.len());
        // ascending iteration keeps the lowest story number per title
        for (number, story) in metadata {
            exact.entry(story.clean_title()).or_insert(*number);
        }
        Self {
            metadata,
            exact,
            fuzzy: false,
        }
    }

    /// Enable the fuzzy containment phase.
    pub fn with_fuzzy(mut self, fuzzy: bool) -> Self {
        self.fuzzy = fuzzy;
        self
    }

    /// Text left after removing `prefix` from `title`, trimmed.
    ///
    /// `None` if the title does not start with the prefix.
    pub fn strip_prefix<'t>(title: &'t str, prefix: &str) -> Option<&'t str> {
        title.strip_prefix(prefix).map(str::trim)
    }

    /// Find the story an issue title refers to.
    pub fn match_title(&self, text: &str) -> Option<(u32, MatchPhase)> {
        if let Some(number) = self.exact.get(text) {
            return Some((*number, MatchPhase::Exact));
        }
        if !self.fuzzy || text.is_empty() {
            return None;
        }

        let needle = text.to_lowercase();
        self.metadata
            .iter()
            .find(|(_, story)| {
                let clean = story.clean_title().to_lowercase();
                !clean.is_empty() && (clean.contains(&needle) || needle.contains(&clean))
            })
            .map(|(number, _)| (*number, MatchPhase::FuzzyContains))
    }

    /// Match an issue title carrying a domain prefix.
    pub fn match_issue(&self, title: &str, prefix: &str) -> Option<(u32, MatchPhase)> {
        Self::strip_prefix(title, prefix).and_then(|text| self.match_title(text))
    }
}
