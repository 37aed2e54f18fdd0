//! Type and value conversion.
//!
//! One exhaustive mapping between driver-level raw values and
//! application-level [`Value`]s, shared by every call site that reads a
//! result set or binds a parameter. Both directions are pure functions.
//!
//! Dates and timestamps become epoch milliseconds. Integer raws are taken
//! as millis directly; text raws are parsed as `%Y-%m-%d %H:%M:%S` or
//! `%Y-%m-%d` (UTC), which covers special-sql expressions like
//! `CURRENT_TIMESTAMP` round-tripping through text-typed storage.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::driver::SqlValue;
use crate::error::ConvertError;
use crate::model::types::{FieldType, Value};

/// Convert a raw driver value into an application value of the declared type.
///
/// SQL NULL always becomes [`Value::Null`]. Numeric raws narrow to the
/// declared numeric type with range checks; anything non-coercible is a
/// [`ConvertError`] naming the expected type.
pub fn from_sql(raw: SqlValue, ty: FieldType) -> Result<Value, ConvertError> {
    if matches!(raw, SqlValue::Null) {
        return Ok(Value::Null);
    }
    match ty {
        FieldType::Date | FieldType::DateTime => match raw {
            SqlValue::Integer(ms) => Ok(Value::Time(ms)),
            SqlValue::Text(ref s) => parse_time_text(s)
                .map(Value::Time)
                .ok_or_else(|| mismatch(&raw, ty)),
            _ => Err(mismatch(&raw, ty)),
        },
        FieldType::Integer => match raw {
            SqlValue::Integer(n) => i32::try_from(n)
                .map(Value::Int)
                .map_err(|_| mismatch(&raw, ty)),
            SqlValue::Text(ref s) => s
                .trim()
                .parse::<i32>()
                .map(Value::Int)
                .map_err(|_| mismatch(&raw, ty)),
            _ => Err(mismatch(&raw, ty)),
        },
        FieldType::Long => match raw {
            SqlValue::Integer(n) => Ok(Value::Long(n)),
            SqlValue::Real(f) if f.fract() == 0.0 => Ok(Value::Long(f as i64)),
            SqlValue::Text(ref s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Long)
                .map_err(|_| mismatch(&raw, ty)),
            _ => Err(mismatch(&raw, ty)),
        },
        FieldType::Float => match raw {
            SqlValue::Null => Ok(Value::Null),
            SqlValue::Integer(n) => Ok(Value::Float(n as f32)),
            SqlValue::Real(f) => Ok(Value::Float(f as f32)),
            SqlValue::Text(ref s) => s
                .trim()
                .parse::<f32>()
                .map(Value::Float)
                .map_err(|_| mismatch(&raw, ty)),
        },
        FieldType::Double => match raw {
            SqlValue::Null => Ok(Value::Null),
            SqlValue::Integer(n) => Ok(Value::Double(n as f64)),
            SqlValue::Real(f) => Ok(Value::Double(f)),
            SqlValue::Text(ref s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Double)
                .map_err(|_| mismatch(&raw, ty)),
        },
        FieldType::Boolean => match raw {
            SqlValue::Integer(n) => Ok(Value::Bool(n != 0)),
            SqlValue::Text(ref s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "1" => Ok(Value::Bool(true)),
                "false" | "f" | "0" => Ok(Value::Bool(false)),
                _ => Err(mismatch(&raw, ty)),
            },
            _ => Err(mismatch(&raw, ty)),
        },
        FieldType::Text => match raw {
            SqlValue::Text(s) => Ok(Value::Text(s)),
            // Dynamically-typed backends may hand back numerics for a
            // TEXT column; render them rather than failing.
            SqlValue::Integer(n) => Ok(Value::Text(n.to_string())),
            SqlValue::Real(f) => Ok(Value::Text(f.to_string())),
            SqlValue::Null => Ok(Value::Null),
        },
    }
}

/// Convert an application value into the raw form the driver binds.
pub fn to_bind(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Int(n) => SqlValue::Integer(i64::from(*n)),
        Value::Long(n) => SqlValue::Integer(*n),
        Value::Float(f) => SqlValue::Real(f64::from(*f)),
        Value::Double(f) => SqlValue::Real(*f),
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Time(ms) => SqlValue::Integer(*ms),
    }
}

/// Convert a slice of application values into bind-ready raw values.
pub fn to_bind_all(values: &[Value]) -> Vec<SqlValue> {
    values.iter().map(to_bind).collect()
}

fn parse_time_text(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc().timestamp_millis());
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d.and_time(NaiveTime::MIN).and_utc().timestamp_millis());
    }
    None
}

fn mismatch(raw: &SqlValue, expected: FieldType) -> ConvertError {
    ConvertError {
        value: raw.describe(),
        expected,
    }
}
