//! The driver boundary the engines execute through.
//!
//! Modeled on a JDBC-style connection: prepared statements with positional
//! parameters, row-at-a-time iteration through a callback, explicit
//! transaction control, and a generated-keys result whose shape follows
//! the backend (one synthetic column vs. the full inserted row).
//!
//! Engines acquire one connection per logical operation and release it on
//! every exit path; dropping the boxed connection releases it. Row
//! callbacks must not issue further statements on the same connection.

pub mod sqlite;

pub use sqlite::SqliteDriver;

use crate::error::EngineResult;
use crate::model::types::{FieldType, Value};
use crate::sql::dialect::Dialect;

/// A raw value as the driver sees it, before typed conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    /// Display form for error messages.
    pub fn describe(&self) -> String {
        match self {
            SqlValue::Null => "NULL".into(),
            SqlValue::Integer(n) => n.to_string(),
            SqlValue::Real(f) => f.to_string(),
            SqlValue::Text(s) => format!("'{}'", s),
        }
    }
}

/// Generated-key result of an insert, in the backend's native shape.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedKeys {
    /// The backend reports nothing.
    None,
    /// One synthetic auto-increment column (MySQL, SQLite).
    SingleKey(SqlValue),
    /// The full inserted row as (column name, value) pairs (Postgres).
    Row(Vec<(String, SqlValue)>),
}

/// One result-set row, read by column index with the declared type.
pub trait SqlRow {
    /// Read and convert the value at `idx` to the declared type.
    ///
    /// Conversion failures surface as
    /// [`EngineError::ColumnConversion`](crate::error::EngineError) so the
    /// engine can attach the dimension id it was reading for.
    fn read(&self, idx: usize, ty: FieldType) -> EngineResult<Value>;
}

/// A live database connection scoped to one engine operation.
pub trait DriverConnection {
    /// Execute a query, driving `on_row` once per row. The callback
    /// returns `true` to continue and `false` to stop iterating early.
    fn query_rows(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        on_row: &mut dyn FnMut(&dyn SqlRow) -> EngineResult<bool>,
    ) -> EngineResult<()>;

    /// Execute a statement, returning the affected-row count.
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> EngineResult<usize>;

    /// Execute an insert, returning the backend's generated-key result.
    fn insert(&mut self, sql: &str, params: &[SqlValue]) -> EngineResult<GeneratedKeys>;

    fn begin(&mut self) -> EngineResult<()>;
    fn commit(&mut self) -> EngineResult<()>;
    fn rollback(&mut self) -> EngineResult<()>;
}

/// A datasource-level driver handing out connections.
pub trait Driver: Send + Sync {
    fn connect(&self) -> EngineResult<Box<dyn DriverConnection>>;

    /// Dialect this driver speaks; selects quoting, placeholder style,
    /// and the generated-key strategy once at configuration time.
    fn dialect(&self) -> Dialect;
}
