//! Block record: one typed unit of note content.
//!
//! # Invariants
//! - `id` and `note_id` never change after creation.
//! - `order` positions the block inside its note; uniqueness is the
//!   caller's concern.
//! - `properties.checked` is a bool and `properties.url` is a string when set.

use crate::model::note::NoteId;
use crate::model::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Stable block identifier, unique across all notes.
pub type BlockId = Uuid;

/// Open key/value bag for type-specific data (`checked`, `url`, ...).
pub type BlockProperties = Map<String, Value>;

pub const PROP_CHECKED: &str = "checked";
pub const PROP_URL: &str = "url";

/// Closed set of block kinds. Serialized with the persisted tag names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockType {
    #[default]
    #[serde(rename = "paragraph")]
    Paragraph,
    #[serde(rename = "heading_1")]
    Heading1,
    #[serde(rename = "heading_2")]
    Heading2,
    #[serde(rename = "heading_3")]
    Heading3,
    #[serde(rename = "bulleted_list_item")]
    BulletedListItem,
    #[serde(rename = "numbered_list_item")]
    NumberedListItem,
    #[serde(rename = "to_do")]
    ToDo,
    #[serde(rename = "quote")]
    Quote,
    #[serde(rename = "code")]
    Code,
    #[serde(rename = "divider")]
    Divider,
    #[serde(rename = "image")]
    Image,
    /// Link card.
    #[serde(rename = "bookmark")]
    Bookmark,
}

impl BlockType {
    pub const ALL: [BlockType; 12] = [
        Self::Paragraph,
        Self::Heading1,
        Self::Heading2,
        Self::Heading3,
        Self::BulletedListItem,
        Self::NumberedListItem,
        Self::ToDo,
        Self::Quote,
        Self::Code,
        Self::Divider,
        Self::Image,
        Self::Bookmark,
    ];

    /// Persisted tag, e.g. `heading_1`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Paragraph => "paragraph",
            Self::Heading1 => "heading_1",
            Self::Heading2 => "heading_2",
            Self::Heading3 => "heading_3",
            Self::BulletedListItem => "bulleted_list_item",
            Self::NumberedListItem => "numbered_list_item",
            Self::ToDo => "to_do",
            Self::Quote => "quote",
            Self::Code => "code",
            Self::Divider => "divider",
            Self::Image => "image",
            Self::Bookmark => "bookmark",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

/// Persisted block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub id: BlockId,
    pub note_id: NoteId,
    #[serde(rename = "type")]
    pub kind: BlockType,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub properties: BlockProperties,
    #[serde(default)]
    pub order: i64,
    pub created: i64,
    pub last_modified: i64,
}

/// Block-shaped record without identity; input for creation and the output
/// of text parsing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBlock {
    #[serde(rename = "type", default)]
    pub kind: BlockType,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub properties: BlockProperties,
    #[serde(default)]
    pub order: i64,
}

impl NewBlock {
    pub fn new(kind: BlockType, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.order = order;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn checked(&self) -> bool {
        checked_of(&self.properties)
    }
}

/// Partial block update; `None` keeps the stored value.
///
/// `properties` replaces the whole map when present.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPatch {
    #[serde(rename = "type", default)]
    pub kind: Option<BlockType>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub properties: Option<BlockProperties>,
    #[serde(default)]
    pub order: Option<i64>,
}

impl BlockPatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn order(order: i64) -> Self {
        Self {
            order: Some(order),
            ..Self::default()
        }
    }
}

impl Block {
    /// Builds a block for `note_id` with a generated id.
    ///
    /// Does not check that the note exists.
    pub fn create(note_id: NoteId, input: NewBlock, now: i64) -> Result<Self, ValidationError> {
        validate_properties(&input.properties)?;
        Ok(Self {
            id: Uuid::new_v4(),
            note_id,
            kind: input.kind,
            content: input.content,
            properties: input.properties,
            order: input.order,
            created: now,
            last_modified: now,
        })
    }

    /// Merges `patch` and stamps `last_modified`. Identity fields are kept.
    pub fn apply_patch(&mut self, patch: BlockPatch, now: i64) -> Result<(), ValidationError> {
        if let Some(properties) = patch.properties.as_ref() {
            validate_properties(properties)?;
        }

        if let Some(kind) = patch.kind {
            self.kind = kind;
        }
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(properties) = patch.properties {
            self.properties = properties;
        }
        if let Some(order) = patch.order {
            self.order = order;
        }
        self.last_modified = now;
        Ok(())
    }

    /// `properties.checked`, `false` when unset.
    pub fn checked(&self) -> bool {
        checked_of(&self.properties)
    }

    /// `properties.url` when set.
    pub fn url(&self) -> Option<&str> {
        self.properties.get(PROP_URL).and_then(Value::as_str)
    }
}

fn checked_of(properties: &BlockProperties) -> bool {
    properties
        .get(PROP_CHECKED)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn validate_properties(properties: &BlockProperties) -> Result<(), ValidationError> {
    match properties.get(PROP_CHECKED) {
        None | Some(Value::Bool(_)) => {}
        Some(_) => {
            return Err(ValidationError::InvalidProperty {
                key: PROP_CHECKED,
                expected: "a boolean",
            })
        }
    }
    match properties.get(PROP_URL) {
        None | Some(Value::String(_)) => {}
        Some(_) => {
            return Err(ValidationError::InvalidProperty {
                key: PROP_URL,
                expected: "a string",
            })
        }
    }
    Ok(())
}
