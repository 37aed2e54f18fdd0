//! SQL dialect definitions.
//!
//! A trait-based abstraction over the database-specific behaviors the
//! engine depends on:
//!
//! - Identifier quoting: `"` (Postgres/SQLite), `` ` `` (MySQL)
//! - Parameter placeholders: `?` vs numbered `$n` (Postgres)
//! - Date-part expressions used by resolution handlers
//! - Generated-key retrieval shape: MySQL-style backends hand back one
//!   synthetic key column, Postgres-style backends hand back the full
//!   inserted row
//!
//! The key shape is selected once per datasource at configuration time and
//! consumed by the entry engine's key-resolution strategy; query logic
//! never branches on a detected DBMS name inline.

pub mod helpers;
mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MySql;
pub use postgres::Postgres;
pub use sqlite::Sqlite;

use serde::{Deserialize, Serialize};

/// Shape of the generated-key result a backend hands back after insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyShape {
    /// One synthetic column holding the auto-increment value
    /// (MySQL `LAST_INSERT_ID()`, SQLite `last_insert_rowid()`).
    SingleSynthetic,
    /// The full inserted row (Postgres `RETURNING *`).
    FullRow,
    /// The backend reports nothing; keys must already be present in the
    /// inserted values.
    None,
}

/// Date component a resolution handler can extract from a temporal column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePart {
    /// ISO-8601 week-numbering year.
    IsoYear,
    /// ISO-8601 week of year (1-53).
    IsoWeek,
    /// Calendar year.
    Year,
    /// Calendar month (1-12).
    Month,
}

/// SQL dialect trait - defines how engine constructs are rendered.
///
/// The default implementations follow ANSI SQL where possible.
pub trait SqlDialect: std::fmt::Debug {
    /// Dialect name for display/logging.
    fn name(&self) -> &'static str;

    /// Quote an identifier (table, column, alias).
    fn quote_identifier(&self, ident: &str) -> String;

    /// Whether bind parameters are numbered (`$1`) instead of `?`.
    fn numbered_placeholders(&self) -> bool {
        false
    }

    /// Generated-key retrieval shape for this backend.
    fn key_shape(&self) -> KeyShape;

    /// Render an expression extracting a date part from a temporal column.
    ///
    /// `column` is the dimension's SQL column expression; the result must
    /// evaluate to an integer.
    fn date_part(&self, part: DatePart, column: &str) -> String;

    /// Finalize a statement built with `?` placeholders for this dialect.
    fn finalize(&self, sql: String) -> String {
        if self.numbered_placeholders() {
            helpers::number_placeholders(&sql)
        } else {
            sql
        }
    }
}

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Sqlite,
    MySql,
    Postgres,
}

impl Dialect {
    /// Get the dialect implementation.
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::Sqlite => &Sqlite,
            Dialect::MySql => &MySql,
            Dialect::Postgres => &Postgres,
        }
    }
}

// Implement SqlDialect for Dialect enum by delegating to concrete types
impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    fn numbered_placeholders(&self) -> bool {
        self.dialect().numbered_placeholders()
    }

    fn key_shape(&self) -> KeyShape {
        self.dialect().key_shape()
    }

    fn date_part(&self, part: DatePart, column: &str) -> String {
        self.dialect().date_part(part, column)
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dialect().name())
    }
}
