//! SQLite SQL dialect, matching the bundled embedded driver.
//!
//! Temporal columns are stored as epoch milliseconds, so date parts go
//! through `STRFTIME(..., col / 1000, 'unixepoch')`. Generated keys come
//! back as the single synthetic `last_insert_rowid()` column, the same
//! shape MySQL uses.

use super::helpers;
use super::{DatePart, KeyShape, SqlDialect};

/// SQLite SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn key_shape(&self) -> KeyShape {
        KeyShape::SingleSynthetic
    }

    fn date_part(&self, part: DatePart, column: &str) -> String {
        let fmt = match part {
            // %G/%V are ISO year/week, available since SQLite 3.46
            DatePart::IsoYear => "%G",
            DatePart::IsoWeek => "%V",
            DatePart::Year => "%Y",
            DatePart::Month => "%m",
        };
        format!(
            "CAST(STRFTIME('{}', {} / 1000, 'unixepoch') AS INTEGER)",
            fmt, column
        )
    }
}
