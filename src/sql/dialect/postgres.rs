//! PostgreSQL SQL dialect.
//!
//! PostgreSQL features the engine relies on:
//! - ANSI identifier quoting (`"`)
//! - Numbered `$n` placeholders
//! - `RETURNING *` hands the full inserted row back, so generated-key
//!   recovery filters the row down to the declared primary-key columns

use super::helpers;
use super::{DatePart, KeyShape, SqlDialect};

/// PostgreSQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Postgres;

impl SqlDialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn numbered_placeholders(&self) -> bool {
        true
    }

    fn key_shape(&self) -> KeyShape {
        KeyShape::FullRow
    }

    fn date_part(&self, part: DatePart, column: &str) -> String {
        let field = match part {
            DatePart::IsoYear => "ISOYEAR",
            DatePart::IsoWeek => "WEEK",
            DatePart::Year => "YEAR",
            DatePart::Month => "MONTH",
        };
        format!("CAST(EXTRACT({} FROM {}) AS INTEGER)", field, column)
    }
}
