//! Note and block records as persisted by the store.
//!
//! # Responsibility
//! - Define the persisted shapes (`Note`, `Block`) and their input/patch forms.
//! - Normalize and validate caller input before it reaches storage.
//!
//! # Invariants
//! - Persisted field names are camelCase (`noteId`, `lastModified`, ...).
//! - Ids are generated here and never change after creation.
//! - Timestamps are epoch milliseconds.

use serde::de::DeserializeOwned;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod block;
pub mod note;

/// Rejected caller input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Input document does not have the expected shape.
    Malformed(String),
    /// A tag is empty after trimming.
    BlankTag(String),
    /// A block property has the wrong JSON type.
    InvalidProperty {
        key: &'static str,
        expected: &'static str,
    },
    /// A reorder request names a block owned by another note.
    BlockOutsideNote {
        block_id: block::BlockId,
        note_id: note::NoteId,
    },
    /// A reorder request names the same block twice.
    DuplicateBlock(block::BlockId),
    /// Appending blocks would push `order` past `i64::MAX`.
    OrderOverflow { note_id: note::NoteId },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(message) => write!(f, "malformed input: {message}"),
            Self::BlankTag(value) => write!(f, "tag must not be blank: `{value}`"),
            Self::InvalidProperty { key, expected } => {
                write!(f, "block property `{key}` must be {expected}")
            }
            Self::BlockOutsideNote { block_id, note_id } => {
                write!(f, "block {block_id} does not belong to note {note_id}")
            }
            Self::DuplicateBlock(id) => write!(f, "block listed more than once: {id}"),
            Self::OrderOverflow { note_id } => {
                write!(f, "no block order left after the last block of note {note_id}")
            }
        }
    }
}

impl Error for ValidationError {}

/// Decodes an untyped JSON input document into a typed input/patch record.
///
/// This is the entry point for callers holding loosely typed data, e.g.
/// `{"title": 42}` is reported as [`ValidationError::Malformed`].
pub fn parse_input<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, ValidationError> {
    serde_json::from_value(value).map_err(|err| ValidationError::Malformed(err.to_string()))
}

/// Current wall-clock time in epoch milliseconds.
pub(crate) fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|elapsed| i64::try_from(elapsed.as_millis()).ok())
        .unwrap_or(0)
}
