//! Embedded SQLite driver over `rusqlite`.
//!
//! The driver multiplexes one underlying connection behind the
//! per-operation [`DriverConnection`] handles the engines acquire; SQLite
//! serializes statements on a single connection anyway, and the engine
//! boundary (one handle per operation, released on every exit path) is
//! preserved. Foreign-key enforcement is switched on at open so
//! `ON DELETE CASCADE` schemas behave as the entry engine documents.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::types::ValueRef;
use rusqlite::Connection;

use crate::convert;
use crate::error::{DataAccessError, EngineError, EngineResult};
use crate::model::types::{FieldType, Value};
use crate::sql::dialect::Dialect;

use super::{Driver, DriverConnection, GeneratedKeys, SqlRow, SqlValue};

/// Embedded SQLite datasource.
#[derive(Clone)]
pub struct SqliteDriver {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDriver {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> EngineResult<Self> {
        let conn = Connection::open(path).map_err(map_err)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_in_memory() -> EngineResult<Self> {
        let conn = Connection::open_in_memory().map_err(map_err)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> EngineResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(map_err)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a raw SQL script, for schema setup.
    pub fn execute_batch(&self, sql: &str) -> EngineResult<()> {
        lock(&self.conn)?.execute_batch(sql).map_err(map_err)
    }
}

impl Driver for SqliteDriver {
    fn connect(&self) -> EngineResult<Box<dyn DriverConnection>> {
        Ok(Box::new(SqliteSession {
            conn: Arc::clone(&self.conn),
        }))
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }
}

struct SqliteSession {
    conn: Arc<Mutex<Connection>>,
}

impl DriverConnection for SqliteSession {
    fn query_rows(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        on_row: &mut dyn FnMut(&dyn SqlRow) -> EngineResult<bool>,
    ) -> EngineResult<()> {
        let guard = lock(&self.conn)?;
        let mut stmt = guard.prepare(sql).map_err(map_err)?;
        let mut rows = stmt
            .query(rusqlite::params_from_iter(params.iter().map(bind_value)))
            .map_err(map_err)?;
        while let Some(row) = rows.next().map_err(map_err)? {
            if !on_row(&SqliteRow { row })? {
                break;
            }
        }
        Ok(())
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> EngineResult<usize> {
        let guard = lock(&self.conn)?;
        let mut stmt = guard.prepare(sql).map_err(map_err)?;
        stmt.execute(rusqlite::params_from_iter(params.iter().map(bind_value)))
            .map_err(map_err)
    }

    fn insert(&mut self, sql: &str, params: &[SqlValue]) -> EngineResult<GeneratedKeys> {
        let guard = lock(&self.conn)?;
        let mut stmt = guard.prepare(sql).map_err(map_err)?;
        stmt.execute(rusqlite::params_from_iter(params.iter().map(bind_value)))
            .map_err(map_err)?;
        Ok(GeneratedKeys::SingleKey(SqlValue::Integer(
            guard.last_insert_rowid(),
        )))
    }

    fn begin(&mut self) -> EngineResult<()> {
        lock(&self.conn)?
            .execute_batch("BEGIN IMMEDIATE;")
            .map_err(map_err)
    }

    fn commit(&mut self) -> EngineResult<()> {
        lock(&self.conn)?.execute_batch("COMMIT;").map_err(map_err)
    }

    fn rollback(&mut self) -> EngineResult<()> {
        lock(&self.conn)?
            .execute_batch("ROLLBACK;")
            .map_err(map_err)
    }
}

struct SqliteRow<'a> {
    row: &'a rusqlite::Row<'a>,
}

impl SqlRow for SqliteRow<'_> {
    fn read(&self, idx: usize, ty: FieldType) -> EngineResult<Value> {
        let raw = match self.row.get_ref(idx).map_err(map_err)? {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(n) => SqlValue::Integer(n),
            ValueRef::Real(f) => SqlValue::Real(f),
            ValueRef::Text(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(_) => {
                return Err(DataAccessError::Driver(format!(
                    "BLOB column {} is not supported",
                    idx
                ))
                .into())
            }
        };
        convert::from_sql(raw, ty)
            .map_err(|source| EngineError::ColumnConversion { index: idx, source })
    }
}

fn bind_value(value: &SqlValue) -> rusqlite::types::Value {
    match value {
        SqlValue::Null => rusqlite::types::Value::Null,
        SqlValue::Integer(n) => rusqlite::types::Value::Integer(*n),
        SqlValue::Real(f) => rusqlite::types::Value::Real(*f),
        SqlValue::Text(s) => rusqlite::types::Value::Text(s.clone()),
    }
}

fn lock(conn: &Arc<Mutex<Connection>>) -> EngineResult<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| DataAccessError::Driver("connection mutex poisoned".into()).into())
}

fn map_err(err: rusqlite::Error) -> EngineError {
    if let rusqlite::Error::SqliteFailure(failure, message) = &err {
        let duplicate = failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE;
        if duplicate {
            let detail = message.clone().unwrap_or_else(|| err.to_string());
            return DataAccessError::DuplicateKey(detail).into();
        }
    }
    DataAccessError::Driver(err.to_string()).into()
}
