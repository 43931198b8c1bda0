//! Note and block stores over an injected storage backend.
//!
//! # Responsibility
//! - Turn caller input into persisted records and back.
//! - Own cross-record rules: cascade delete, block ordering, batch reorder.
//!
//! # Invariants
//! - Stores hold a shared backend handle and never pick a backend themselves.
//! - Deleting a missing id succeeds; updating a missing id is `NotFound`
//!   and writes nothing.
//! - Reads decode strictly; an undecodable record is reported as corrupt
//!   storage, not skipped.

use crate::model::ValidationError;
use crate::storage::{Collection, StorageError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

mod block_store;
mod note_store;

pub use block_store::BlockStore;
pub use note_store::NoteStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Error surfaced by store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Caller input has the wrong shape.
    Validation(ValidationError),
    /// The target record does not exist.
    NotFound { collection: Collection, id: Uuid },
    /// Backend failure.
    Storage(StorageError),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound { collection, id } => write!(f, "{collection} record not found: {id}"),
            Self::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::NotFound { .. } => None,
            Self::Storage(err) => Some(err),
        }
    }
}

impl From<ValidationError> for StoreError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StorageError> for StoreError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}

pub(crate) fn encode<T: Serialize>(record: &T) -> StoreResult<Value> {
    serde_json::to_value(record)
        .map_err(|err| StoreError::Storage(StorageError::InvalidRecord(err.to_string())))
}

pub(crate) fn decode<T: DeserializeOwned>(collection: Collection, value: Value) -> StoreResult<T> {
    serde_json::from_value(value).map_err(|err| {
        StoreError::Storage(StorageError::Corrupt {
            collection,
            message: err.to_string(),
        })
    })
}

pub(crate) fn decode_all<T: DeserializeOwned>(
    collection: Collection,
    values: Vec<Value>,
) -> StoreResult<Vec<T>> {
    values
        .into_iter()
        .map(|value| decode(collection, value))
        .collect()
}
