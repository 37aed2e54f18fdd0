//! Resolution handlers for bucketed grouping.
//!
//! A resolution handler expands one logical grouping dimension into one or
//! more physical SQL columns, then reconstructs a single bucket value (the
//! "kernel") from those columns when a series-query row is read back. The
//! registry is caller-supplied and explicit: the engine never infers
//! per-dialect defaults. Built-in weekly and monthly handlers cover the
//! common calendar buckets; hosts register their own for anything else.
//!
//! Built-in kernels are midnight UTC of the bucket start. The query's
//! timezone string is forwarded to handlers for custom implementations
//! that want to shift boundaries.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Weekday};

use crate::error::{EngineError, EngineResult};
use crate::model::types::Value;
use crate::sql::dialect::{DatePart, SqlDialect};

/// Strategy expanding a grouping column and reconstructing its bucket key.
pub trait ResolutionHandler: std::fmt::Debug + Send + Sync {
    /// Expand the dimension's SQL column expression into the physical
    /// grouping columns this handler needs. The series engine tracks how
    /// many columns were contributed and hands exactly that many values
    /// back to [`ResolutionHandler::kernel`].
    fn expand(&self, column: &str, dialect: &dyn SqlDialect) -> Vec<String>;

    /// Reconstruct the logical bucket value from the expanded columns.
    fn kernel(&self, parts: &[Value], timezone: Option<&str>) -> EngineResult<Value>;
}

/// ISO week buckets: expands to (iso year, iso week), kernel is the Monday
/// starting the week.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeeklyResolution;

impl ResolutionHandler for WeeklyResolution {
    fn expand(&self, column: &str, dialect: &dyn SqlDialect) -> Vec<String> {
        vec![
            dialect.date_part(DatePart::IsoYear, column),
            dialect.date_part(DatePart::IsoWeek, column),
        ]
    }

    fn kernel(&self, parts: &[Value], _timezone: Option<&str>) -> EngineResult<Value> {
        let (year, week) = match parts {
            [y, w] => (part_i64(y)?, part_i64(w)?),
            _ => return Err(bad_parts("weekly", parts.len(), 2)),
        };
        let year = i32::try_from(year)
            .map_err(|_| EngineError::Consistency(format!("ISO year {} out of range", year)))?;
        let week = u32::try_from(week)
            .map_err(|_| EngineError::Consistency(format!("ISO week {} out of range", week)))?;
        let monday = NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).ok_or_else(|| {
            EngineError::Consistency(format!("no ISO week {} in year {}", week, year))
        })?;
        Ok(Value::Time(to_midnight_millis(monday)))
    }
}

/// Calendar month buckets: expands to (year, month), kernel is the first
/// of the month.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonthlyResolution;

impl ResolutionHandler for MonthlyResolution {
    fn expand(&self, column: &str, dialect: &dyn SqlDialect) -> Vec<String> {
        vec![
            dialect.date_part(DatePart::Year, column),
            dialect.date_part(DatePart::Month, column),
        ]
    }

    fn kernel(&self, parts: &[Value], _timezone: Option<&str>) -> EngineResult<Value> {
        let (year, month) = match parts {
            [y, m] => (part_i64(y)?, part_i64(m)?),
            _ => return Err(bad_parts("monthly", parts.len(), 2)),
        };
        let year = i32::try_from(year)
            .map_err(|_| EngineError::Consistency(format!("year {} out of range", year)))?;
        let month = u32::try_from(month)
            .map_err(|_| EngineError::Consistency(format!("month {} out of range", month)))?;
        let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
            EngineError::Consistency(format!("no month {} in year {}", month, year))
        })?;
        Ok(Value::Time(to_midnight_millis(first)))
    }
}

/// Caller-supplied mapping of resolution names to handlers.
#[derive(Debug, Clone, Default)]
pub struct ResolutionRegistry {
    handlers: HashMap<String, Arc<dyn ResolutionHandler>>,
}

impl ResolutionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in `weekly` and `monthly` handlers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("weekly", Arc::new(WeeklyResolution));
        registry.register("monthly", Arc::new(MonthlyResolution));
        registry
    }

    pub fn register(&mut self, name: &str, handler: Arc<dyn ResolutionHandler>) {
        self.handlers.insert(name.to_string(), handler);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ResolutionHandler>> {
        self.handlers.get(name)
    }
}

fn part_i64(value: &Value) -> EngineResult<i64> {
    match value {
        Value::Int(n) => Ok(i64::from(*n)),
        Value::Long(n) => Ok(*n),
        other => Err(EngineError::Consistency(format!(
            "resolution column produced a non-integer value ({})",
            other.type_name()
        ))),
    }
}

fn bad_parts(name: &str, got: usize, expected: usize) -> EngineError {
    EngineError::Consistency(format!(
        "{} resolution expected {} grouping columns, got {}",
        name, expected, got
    ))
}

fn to_midnight_millis(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}
