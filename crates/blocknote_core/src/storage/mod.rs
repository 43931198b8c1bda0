//! Persistence capability shared by the note and block stores.
//!
//! # Responsibility
//! - Define the `StorageBackend` contract over JSON record documents.
//! - Provide the two variants (flat blob map, indexed SQLite) and the single
//!   place where one of them is chosen at start-up.
//!
//! # Invariants
//! - Every record is a JSON object with a string `id`.
//! - Reads return records in insertion order; replacing a record keeps its
//!   position.
//! - Only declared indexes can be queried, on both variants.
//! - A write reported as successful is durable in the chosen medium.

use crate::config::{BackendKind, ConfigError, StoreConfig};
use crate::db::DbError;
use log::{info, warn};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;

mod flat_map;
mod indexed;

pub use flat_map::FlatMapBackend;
pub use indexed::IndexedBackend;

pub const INDEXED_DB_FILE_NAME: &str = "blocknote.sqlite3";

pub type StorageResult<T> = Result<T, StorageError>;

/// Named record collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Notes,
    Blocks,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Self::Notes, Self::Blocks];

    pub fn name(self) -> &'static str {
        match self {
            Self::Notes => "notes",
            Self::Blocks => "blocks",
        }
    }

    /// Secondary indexes declared for this collection (record field names).
    pub fn indexes(self) -> &'static [&'static str] {
        match self {
            Self::Notes => &["title", "created", "lastModified", "category"],
            Self::Blocks => &["noteId", "order", "type"],
        }
    }

    pub(crate) fn check_index(self, index: &str) -> StorageResult<()> {
        if self.indexes().contains(&index) {
            Ok(())
        } else {
            Err(StorageError::UnknownIndex {
                collection: self,
                index: index.to_string(),
            })
        }
    }
}

impl Display for Collection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One mutation inside a batch passed to [`StorageBackend::apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Insert or replace the record with the same `id`.
    Put { collection: Collection, record: Value },
    /// Remove one record; missing ids are ignored.
    Delete { collection: Collection, id: String },
    /// Remove every record whose `index` field equals `value`.
    DeleteWhere {
        collection: Collection,
        index: String,
        value: Value,
    },
}

impl WriteOp {
    pub fn collection(&self) -> Collection {
        match self {
            Self::Put { collection, .. }
            | Self::Delete { collection, .. }
            | Self::DeleteWhere { collection, .. } => *collection,
        }
    }
}

/// Backend-level failure.
#[derive(Debug)]
pub enum StorageError {
    Config(ConfigError),
    Db(DbError),
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Stored state cannot be decoded.
    Corrupt {
        collection: Collection,
        message: String,
    },
    /// Serialized collection exceeds the configured blob quota.
    QuotaExceeded {
        collection: Collection,
        size: usize,
        limit: usize,
    },
    UnknownIndex {
        collection: Collection,
        index: String,
    },
    /// Record handed to the backend is not a JSON object with a string `id`.
    InvalidRecord(String),
    /// A batch failed after some collections were already written.
    PartialWrite {
        committed: Vec<Collection>,
        failed: Collection,
        source: Box<StorageError>,
    },
    /// A previous panic left the backend lock poisoned.
    Poisoned,
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Io { path, source } => write!(f, "io error at `{}`: {source}", path.display()),
            Self::Corrupt {
                collection,
                message,
            } => write!(f, "corrupt `{collection}` state: {message}"),
            Self::QuotaExceeded {
                collection,
                size,
                limit,
            } => write!(
                f,
                "`{collection}` blob of {size} bytes exceeds quota of {limit} bytes"
            ),
            Self::UnknownIndex { collection, index } => {
                write!(f, "`{collection}` has no index named `{index}`")
            }
            Self::InvalidRecord(message) => write!(f, "invalid record: {message}"),
            Self::PartialWrite {
                committed,
                failed,
                source,
            } => {
                let committed = committed
                    .iter()
                    .map(|collection| collection.name())
                    .collect::<Vec<_>>()
                    .join(",");
                write!(
                    f,
                    "batch failed on `{failed}` after committing [{committed}]: {source}"
                )
            }
            Self::Poisoned => write!(f, "storage lock poisoned by an earlier panic"),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Io { source, .. } => Some(source),
            Self::PartialWrite { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<DbError> for StorageError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<ConfigError> for StorageError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

/// Key-value persistence with secondary-index lookups.
///
/// Implementations serialize access internally; one session owns a store.
pub trait StorageBackend: Send + Sync {
    /// Short variant name used in logs (`flat_map` or `indexed`).
    fn name(&self) -> &'static str;

    fn get(&self, collection: Collection, id: &str) -> StorageResult<Option<Value>>;

    fn get_all(&self, collection: Collection) -> StorageResult<Vec<Value>>;

    /// Records whose `index` field equals `value`. `Null` matches a missing
    /// field.
    fn get_by_index(
        &self,
        collection: Collection,
        index: &str,
        value: &Value,
    ) -> StorageResult<Vec<Value>>;

    /// Applies a batch of writes. See each variant for its atomicity.
    fn apply(&self, ops: &[WriteOp]) -> StorageResult<()>;

    fn put(&self, collection: Collection, record: Value) -> StorageResult<()> {
        self.apply(&[WriteOp::Put { collection, record }])
    }

    fn delete(&self, collection: Collection, id: &str) -> StorageResult<()> {
        self.apply(&[WriteOp::Delete {
            collection,
            id: id.to_string(),
        }])
    }

    fn delete_where(&self, collection: Collection, index: &str, value: Value) -> StorageResult<()> {
        self.apply(&[WriteOp::DeleteWhere {
            collection,
            index: index.to_string(),
            value,
        }])
    }
}

/// Reads the string `id` of a record document.
pub(crate) fn record_id(record: &Value) -> StorageResult<&str> {
    record
        .as_object()
        .ok_or_else(|| StorageError::InvalidRecord("record must be a JSON object".to_string()))?
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| StorageError::InvalidRecord("record needs a string `id`".to_string()))
}

/// Opens the backend selected by `config`.
///
/// `auto` prefers the indexed variant and falls back to the flat map when
/// the SQLite store cannot be opened. Explicit choices never fall back.
pub fn open_backend(config: &StoreConfig) -> StorageResult<Arc<dyn StorageBackend>> {
    config.validate()?;

    let backend: Arc<dyn StorageBackend> = match config.backend {
        BackendKind::Indexed => Arc::new(open_indexed(config)?),
        BackendKind::FlatMap => Arc::new(open_flat_map(config)?),
        BackendKind::Auto => match open_indexed(config) {
            Ok(indexed) => Arc::new(indexed),
            Err(err) => {
                warn!(
                    "event=backend_select module=storage status=fallback from=indexed to=flat_map error={}",
                    err
                );
                Arc::new(open_flat_map(config)?)
            }
        },
    };

    info!(
        "event=backend_select module=storage status=ok requested={} selected={} persistent={}",
        config.backend.as_str(),
        backend.name(),
        config.data_dir.is_some()
    );
    Ok(backend)
}

fn open_indexed(config: &StoreConfig) -> StorageResult<IndexedBackend> {
    match config.data_dir.as_ref() {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|source| StorageError::Io {
                path: dir.clone(),
                source,
            })?;
            IndexedBackend::open(dir.join(INDEXED_DB_FILE_NAME))
        }
        None => IndexedBackend::in_memory(),
    }
}

fn open_flat_map(config: &StoreConfig) -> StorageResult<FlatMapBackend> {
    let backend = match config.data_dir.as_ref() {
        Some(dir) => FlatMapBackend::open_dir(dir)?,
        None => FlatMapBackend::in_memory(),
    };
    Ok(match config.flat_map_quota_bytes {
        Some(limit) => backend.with_quota(limit),
        None => backend,
    })
}
