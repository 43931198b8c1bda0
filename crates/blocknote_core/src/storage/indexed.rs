//! Indexed variant: one SQLite table per collection with expression indexes.
//!
//! # Invariants
//! - Tables and indexes come from versioned migrations only.
//! - Index lookups use the same `json_extract` expression as the declared
//!   index, so no full scan is needed. `Null` looks up a missing field.
//! - `apply` runs in one transaction.

use super::{record_id, Collection, StorageBackend, StorageError, StorageResult, WriteOp};
use crate::db::{open_db, open_db_in_memory};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite-backed backend.
pub struct IndexedBackend {
    conn: Mutex<Connection>,
}

impl IndexedBackend {
    /// Opens or creates the store file; reopening keeps all records.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Ok(Self::from_connection(open_db(path)?))
    }

    pub fn in_memory() -> StorageResult<Self> {
        Ok(Self::from_connection(open_db_in_memory()?))
    }

    /// Wraps a connection that is already migrated.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }
}

/// `WHERE` clause for an index lookup plus its bind value, if any.
fn index_filter(index: &str, value: &Value) -> (String, Option<SqlValue>) {
    let expr = format!("json_extract(body, '$.{index}')");
    match value {
        Value::Null => (format!("{expr} IS NULL"), None),
        other => (format!("{expr} = ?1"), Some(to_sql_value(other))),
    }
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => match number.as_i64() {
            Some(int) => SqlValue::Integer(int),
            None => number.as_f64().map_or(SqlValue::Null, SqlValue::Real),
        },
        Value::String(text) => SqlValue::Text(text.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn parse_body(collection: Collection, body: &str) -> StorageResult<Value> {
    serde_json::from_str(body).map_err(|err| StorageError::Corrupt {
        collection,
        message: err.to_string(),
    })
}

fn query_bodies(
    conn: &Connection,
    collection: Collection,
    sql: &str,
    bind: Option<SqlValue>,
) -> StorageResult<Vec<Value>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = match bind {
        Some(value) => stmt.query([value])?,
        None => stmt.query([])?,
    };
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let body: String = row.get(0)?;
        records.push(parse_body(collection, &body)?);
    }
    Ok(records)
}

fn execute_op(conn: &Connection, op: &WriteOp) -> StorageResult<()> {
    match op {
        WriteOp::Put { collection, record } => {
            let id = record_id(record)?;
            conn.execute(
                &format!(
                    "INSERT INTO {table} (id, body) VALUES (?1, ?2)
                     ON CONFLICT(id) DO UPDATE SET body = excluded.body;",
                    table = collection.name()
                ),
                params![id, record.to_string()],
            )?;
        }
        WriteOp::Delete { collection, id } => {
            conn.execute(
                &format!("DELETE FROM {} WHERE id = ?1;", collection.name()),
                [id.as_str()],
            )?;
        }
        WriteOp::DeleteWhere {
            collection,
            index,
            value,
        } => {
            collection.check_index(index)?;
            let (filter, bind) = index_filter(index, value);
            let sql = format!("DELETE FROM {} WHERE {filter};", collection.name());
            match bind {
                Some(bind) => conn.execute(&sql, [bind])?,
                None => conn.execute(&sql, [])?,
            };
        }
    }
    Ok(())
}

impl StorageBackend for IndexedBackend {
    fn name(&self) -> &'static str {
        "indexed"
    }

    fn get(&self, collection: Collection, id: &str) -> StorageResult<Option<Value>> {
        let conn = self.lock()?;
        let body: Option<String> = conn
            .query_row(
                &format!("SELECT body FROM {} WHERE id = ?1;", collection.name()),
                [id],
                |row| row.get(0),
            )
            .optional()?;
        body.map(|text| parse_body(collection, &text)).transpose()
    }

    fn get_all(&self, collection: Collection) -> StorageResult<Vec<Value>> {
        let conn = self.lock()?;
        query_bodies(
            &conn,
            collection,
            &format!("SELECT body FROM {} ORDER BY rowid ASC;", collection.name()),
            None,
        )
    }

    fn get_by_index(
        &self,
        collection: Collection,
        index: &str,
        value: &Value,
    ) -> StorageResult<Vec<Value>> {
        collection.check_index(index)?;
        let (filter, bind) = index_filter(index, value);
        let conn = self.lock()?;
        query_bodies(
            &conn,
            collection,
            &format!(
                "SELECT body FROM {} WHERE {filter} ORDER BY rowid ASC;",
                collection.name()
            ),
            bind,
        )
    }

    /// All ops commit together or not at all.
    fn apply(&self, ops: &[WriteOp]) -> StorageResult<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for op in ops {
            execute_op(&tx, op)?;
        }
        tx.commit()?;
        Ok(())
    }
}
