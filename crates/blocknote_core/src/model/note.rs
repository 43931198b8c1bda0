//! Note record and note-level input forms.
//!
//! # Invariants
//! - `title` is never blank; blank input falls back to `"Untitled"`.
//! - `tags` are trimmed, lowercased, deduplicated and sorted.
//! - `word_count`, `char_count` and `preview` are cached values written by
//!   an explicit stats save; reads never recompute them.

use crate::model::block::Block;
use crate::model::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Stable note identifier.
pub type NoteId = Uuid;

pub const DEFAULT_NOTE_TITLE: &str = "Untitled";
pub const DEFAULT_NOTE_CATEGORY: &str = "Personal";
pub const PREVIEW_MAX_CHARS: usize = 100;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Persisted note metadata. Content lives in blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    pub created: i64,
    pub last_modified: i64,
    /// Free-form category such as `Work` or `Meeting Notes`.
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub word_count: u64,
    #[serde(default)]
    pub char_count: u64,
    #[serde(default)]
    pub preview: String,
}

/// Input for note creation. Missing fields take defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNote {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewNote {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }
}

/// Partial metadata update; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// Cached content statistics derived from a note's blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteStats {
    pub word_count: u64,
    pub char_count: u64,
    pub preview: String,
}

impl NoteStats {
    /// Computes stats over blocks in the order given.
    ///
    /// - words: whitespace-separated tokens across all block contents
    /// - chars: characters of the contents joined with `\n`
    /// - preview: first non-blank content, whitespace collapsed, 100 chars max
    pub fn from_blocks(blocks: &[Block]) -> Self {
        let word_count = blocks
            .iter()
            .map(|block| block.content.split_whitespace().count() as u64)
            .sum();

        let separators = blocks.len().saturating_sub(1) as u64;
        let char_count = blocks
            .iter()
            .map(|block| block.content.chars().count() as u64)
            .sum::<u64>()
            + separators;

        let preview = blocks
            .iter()
            .map(|block| WHITESPACE_RE.replace_all(block.content.trim(), " "))
            .find(|text| !text.is_empty())
            .map(|text| text.chars().take(PREVIEW_MAX_CHARS).collect::<String>())
            .unwrap_or_default();

        Self {
            word_count,
            char_count,
            preview,
        }
    }
}

impl Note {
    /// Builds a fresh note with a generated id and equal timestamps.
    pub fn create(input: NewNote, now: i64) -> Result<Self, ValidationError> {
        Ok(Self {
            id: Uuid::new_v4(),
            title: normalize_title(input.title.as_deref()),
            created: now,
            last_modified: now,
            category: normalize_category(input.category.as_deref()),
            tags: normalize_tags(&input.tags)?,
            word_count: 0,
            char_count: 0,
            preview: String::new(),
        })
    }

    /// Merges `patch` and stamps `last_modified`.
    ///
    /// Validation happens before any field is touched.
    pub fn apply_patch(&mut self, patch: NotePatch, now: i64) -> Result<(), ValidationError> {
        let tags = patch.tags.as_deref().map(normalize_tags).transpose()?;

        if let Some(title) = patch.title.as_deref() {
            self.title = normalize_title(Some(title));
        }
        if let Some(category) = patch.category.as_deref() {
            self.category = normalize_category(Some(category));
        }
        if let Some(tags) = tags {
            self.tags = tags;
        }
        self.last_modified = now;
        Ok(())
    }

    pub fn apply_stats(&mut self, stats: NoteStats, now: i64) {
        self.word_count = stats.word_count;
        self.char_count = stats.char_count;
        self.preview = stats.preview;
        self.last_modified = now;
    }
}

fn normalize_title(title: Option<&str>) -> String {
    match title.map(str::trim) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => DEFAULT_NOTE_TITLE.to_string(),
    }
}

fn normalize_category(category: Option<&str>) -> String {
    match category.map(str::trim) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => DEFAULT_NOTE_CATEGORY.to_string(),
    }
}

/// Normalizes one tag: trimmed and lowercased. Blank tags are rejected.
pub fn normalize_tag(tag: &str) -> Result<String, ValidationError> {
    let trimmed = tag.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::BlankTag(tag.to_string()));
    }
    Ok(trimmed.to_lowercase())
}

/// Normalizes, deduplicates and sorts a tag list.
pub fn normalize_tags(tags: &[String]) -> Result<Vec<String>, ValidationError> {
    let mut unique = BTreeSet::new();
    for tag in tags {
        unique.insert(normalize_tag(tag)?);
    }
    Ok(unique.into_iter().collect())
}
