//! MySQL SQL dialect.
//!
//! MySQL differences from ANSI:
//! - Backtick identifier quoting (`` `name` ``)
//! - `?` placeholders
//! - Generated keys come back as one synthetic `LAST_INSERT_ID()` column

use super::helpers;
use super::{DatePart, KeyShape, SqlDialect};

/// MySQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct MySql;

impl SqlDialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn key_shape(&self) -> KeyShape {
        KeyShape::SingleSynthetic
    }

    fn date_part(&self, part: DatePart, column: &str) -> String {
        match part {
            // WEEK mode 3 is ISO-8601: Monday start, week 1 has >3 days
            DatePart::IsoWeek => format!("WEEK({}, 3)", column),
            // Year of the Monday of the column's week, so late-December
            // dates falling in week 1 land in the following ISO year
            DatePart::IsoYear => {
                format!("YEAR(DATE_SUB({col}, INTERVAL WEEKDAY({col}) DAY))", col = column)
            }
            DatePart::Year => format!("YEAR({})", column),
            DatePart::Month => format!("MONTH({})", column),
        }
    }
}
