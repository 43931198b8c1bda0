//! Flat blob map: each collection is one serialized JSON array.
//!
//! Every read parses the whole blob and every write rewrites it, so cost is
//! linear in collection size. The blob map lives in memory or as one file
//! per collection under a directory.
//!
//! # Invariants
//! - A blob is replaced whole: the temp file is synced, then renamed over
//!   the old blob.
//! - A blob over the quota is never written.
//! - Read-modify-write is not safe across processes; one session owns the
//!   directory.

use super::{record_id, Collection, StorageBackend, StorageError, StorageResult, WriteOp};
use log::error;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const EMPTY_BLOB: &str = "[]";

enum Medium {
    Memory(HashMap<Collection, String>),
    Directory(PathBuf),
}

impl Medium {
    fn blob_path(dir: &Path, collection: Collection) -> PathBuf {
        dir.join(format!("{}.json", collection.name()))
    }

    fn read(&self, collection: Collection) -> StorageResult<String> {
        match self {
            Self::Memory(blobs) => Ok(blobs
                .get(&collection)
                .cloned()
                .unwrap_or_else(|| EMPTY_BLOB.to_string())),
            Self::Directory(dir) => {
                let path = Self::blob_path(dir, collection);
                match std::fs::read_to_string(&path) {
                    Ok(text) => Ok(text),
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                        Ok(EMPTY_BLOB.to_string())
                    }
                    Err(source) => Err(StorageError::Io { path, source }),
                }
            }
        }
    }

    fn write(&mut self, collection: Collection, blob: String) -> StorageResult<()> {
        match self {
            Self::Memory(blobs) => {
                blobs.insert(collection, blob);
                Ok(())
            }
            Self::Directory(dir) => {
                let path = Self::blob_path(dir, collection);
                let staging = path.with_extension("json.tmp");
                write_synced(&staging, blob.as_bytes()).map_err(|source| StorageError::Io {
                    path: staging.clone(),
                    source,
                })?;
                std::fs::rename(&staging, &path)
                    .map_err(|source| StorageError::Io { path, source })
            }
        }
    }
}

/// Writes `bytes` and flushes them to disk before returning.
fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Whole-blob-per-collection backend.
pub struct FlatMapBackend {
    medium: Mutex<Medium>,
    quota_bytes: Option<usize>,
}

impl FlatMapBackend {
    pub fn in_memory() -> Self {
        Self {
            medium: Mutex::new(Medium::Memory(HashMap::new())),
            quota_bytes: None,
        }
    }

    /// Uses `dir` as the blob map, creating it and empty blobs as needed.
    ///
    /// Existing blobs are left untouched.
    pub fn open_dir(dir: impl AsRef<Path>) -> StorageResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
            path: dir.clone(),
            source,
        })?;

        let mut medium = Medium::Directory(dir.clone());
        for collection in Collection::ALL {
            if !Medium::blob_path(&dir, collection).exists() {
                medium.write(collection, EMPTY_BLOB.to_string())?;
            }
        }

        Ok(Self {
            medium: Mutex::new(medium),
            quota_bytes: None,
        })
    }

    /// Caps each serialized blob at `limit` bytes.
    pub fn with_quota(mut self, limit: usize) -> Self {
        self.quota_bytes = Some(limit);
        self
    }

    fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, Medium>> {
        self.medium.lock().map_err(|_| StorageError::Poisoned)
    }

    fn encode(&self, collection: Collection, records: &[Value]) -> StorageResult<String> {
        let blob = serde_json::to_string(records)
            .map_err(|err| StorageError::InvalidRecord(err.to_string()))?;
        if let Some(limit) = self.quota_bytes {
            if blob.len() > limit {
                return Err(StorageError::QuotaExceeded {
                    collection,
                    size: blob.len(),
                    limit,
                });
            }
        }
        Ok(blob)
    }
}

fn decode(collection: Collection, blob: &str) -> StorageResult<Vec<Value>> {
    serde_json::from_str::<Vec<Value>>(blob).map_err(|err| StorageError::Corrupt {
        collection,
        message: err.to_string(),
    })
}

fn field_matches(record: &Value, index: &str, value: &Value) -> bool {
    record.get(index).unwrap_or(&Value::Null) == value
}

fn apply_op(records: &mut Vec<Value>, op: &WriteOp) -> StorageResult<()> {
    match op {
        WriteOp::Put { record, .. } => {
            let id = record_id(record)?;
            let existing = records
                .iter()
                .position(|current| current.get("id").and_then(Value::as_str) == Some(id));
            match existing {
                Some(position) => records[position] = record.clone(),
                None => records.push(record.clone()),
            }
        }
        WriteOp::Delete { id, .. } => {
            records.retain(|current| current.get("id").and_then(Value::as_str) != Some(id));
        }
        WriteOp::DeleteWhere {
            collection,
            index,
            value,
        } => {
            collection.check_index(index)?;
            records.retain(|current| !field_matches(current, index, value));
        }
    }
    Ok(())
}

impl StorageBackend for FlatMapBackend {
    fn name(&self) -> &'static str {
        "flat_map"
    }

    fn get(&self, collection: Collection, id: &str) -> StorageResult<Option<Value>> {
        let medium = self.lock()?;
        let records = decode(collection, &medium.read(collection)?)?;
        Ok(records
            .into_iter()
            .find(|record| record.get("id").and_then(Value::as_str) == Some(id)))
    }

    fn get_all(&self, collection: Collection) -> StorageResult<Vec<Value>> {
        let medium = self.lock()?;
        decode(collection, &medium.read(collection)?)
    }

    fn get_by_index(
        &self,
        collection: Collection,
        index: &str,
        value: &Value,
    ) -> StorageResult<Vec<Value>> {
        collection.check_index(index)?;
        let medium = self.lock()?;
        let mut records = decode(collection, &medium.read(collection)?)?;
        records.retain(|record| field_matches(record, index, value));
        Ok(records)
    }

    /// Each collection is rewritten once, in order of first appearance.
    ///
    /// All blobs are built and quota-checked before the first write. If a
    /// later write fails, earlier collections stay written and the error is
    /// [`StorageError::PartialWrite`].
    fn apply(&self, ops: &[WriteOp]) -> StorageResult<()> {
        if ops.is_empty() {
            return Ok(());
        }

        let mut medium = self.lock()?;

        let mut touched: Vec<(Collection, Vec<Value>)> = Vec::new();
        for op in ops {
            let collection = op.collection();
            let slot = match touched.iter().position(|(c, _)| *c == collection) {
                Some(position) => position,
                None => {
                    let records = decode(collection, &medium.read(collection)?)?;
                    touched.push((collection, records));
                    touched.len() - 1
                }
            };
            apply_op(&mut touched[slot].1, op)?;
        }

        let mut blobs = Vec::with_capacity(touched.len());
        for (collection, records) in &touched {
            blobs.push((*collection, self.encode(*collection, records)?));
        }

        let mut committed = Vec::new();
        for (collection, blob) in blobs {
            if let Err(err) = medium.write(collection, blob) {
                if committed.is_empty() {
                    return Err(err);
                }
                error!(
                    "event=batch_apply module=storage backend=flat_map status=partial committed={} failed={} error={}",
                    committed
                        .iter()
                        .map(|c: &Collection| c.name())
                        .collect::<Vec<_>>()
                        .join(","),
                    collection,
                    err
                );
                return Err(StorageError::PartialWrite {
                    committed,
                    failed: collection,
                    source: Box::new(err),
                });
            }
            committed.push(collection);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{apply_op, write_synced, FlatMapBackend};
    use crate::storage::{Collection, StorageBackend, StorageError, WriteOp};
    use serde_json::json;

    #[test]
    fn put_replaces_in_place_and_keeps_position() {
        let mut records = vec![json!({"id": "a", "v": 1}), json!({"id": "b", "v": 1})];
        let op = WriteOp::Put {
            collection: Collection::Blocks,
            record: json!({"id": "a", "v": 2}),
        };
        apply_op(&mut records, &op).unwrap();
        assert_eq!(records[0], json!({"id": "a", "v": 2}));
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn quota_rejects_write_and_keeps_previous_blob() {
        let backend = FlatMapBackend::in_memory().with_quota(40);
        backend
            .put(Collection::Notes, json!({"id": "n1", "title": "a"}))
            .unwrap();

        let err = backend
            .put(
                Collection::Notes,
                json!({"id": "n2", "title": "this one does not fit"}),
            )
            .unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { .. }));

        let all = backend.get_all(Collection::Notes).unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn null_index_value_matches_missing_field() {
        let backend = FlatMapBackend::in_memory();
        backend
            .put(Collection::Blocks, json!({"id": "b1", "noteId": "n"}))
            .unwrap();
        backend.put(Collection::Blocks, json!({"id": "b2"})).unwrap();

        let orphans = backend
            .get_by_index(Collection::Blocks, "noteId", &json!(null))
            .unwrap();
        assert_eq!(orphans, vec![json!({"id": "b2"})]);
    }

    #[test]
    fn synced_write_replaces_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.json.tmp");
        write_synced(&path, b"[1,2,3]").unwrap();
        write_synced(&path, b"[]").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
    }
}
