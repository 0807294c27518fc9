//! Typed coercion of attribute values.

use crate::value::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Target type for an attribute declared in [`Model::casts`](crate::Model::casts).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cast {
    Integer,
    Float,
    Boolean,
    String,
    Json,
    DateTime,
}

impl Cast {
    /// Coerce `value`. `Null` is never coerced; values that cannot be
    /// converted are returned unchanged.
    pub fn apply(self, value: Value) -> Value {
        if value.is_null() {
            return value;
        }
        match self {
            Cast::Integer => to_integer(value),
            Cast::Float => match value.to_number() {
                Some(n) => Value::Float(n),
                None => value,
            },
            Cast::Boolean => to_boolean(value),
            Cast::String => match value {
                Value::Text(_) => value,
                other => Value::Text(other.to_string()),
            },
            Cast::Json => match value {
                Value::Text(ref s) => match serde_json::from_str::<serde_json::Value>(s) {
                    Ok(json) => Value::from(json),
                    Err(_) => value,
                },
                other => other,
            },
            Cast::DateTime => to_datetime(value),
        }
    }
}

fn to_integer(value: Value) -> Value {
    match value {
        Value::Int(_) => value,
        Value::Bool(b) => Value::Int(i64::from(b)),
        Value::Float(f) if f.is_finite() => Value::Int(f.trunc() as i64),
        Value::Text(ref s) => {
            let s = s.trim();
            if let Ok(n) = s.parse::<i64>() {
                Value::Int(n)
            } else if let Ok(f) = s.parse::<f64>() {
                Value::Int(f.trunc() as i64)
            } else {
                value
            }
        }
        other => other,
    }
}

fn to_boolean(value: Value) -> Value {
    match value {
        Value::Bool(_) => value,
        Value::Int(n) => Value::Bool(n != 0),
        Value::Float(f) => Value::Bool(f != 0.0),
        Value::Text(ref s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "t" | "yes" | "on" => Value::Bool(true),
            "0" | "false" | "f" | "no" | "off" | "" => Value::Bool(false),
            _ => value,
        },
        other => other,
    }
}

fn to_datetime(value: Value) -> Value {
    match value {
        Value::Timestamp(_) => value,
        Value::Int(secs) => DateTime::<Utc>::from_timestamp(secs, 0).map_or(value, Value::Timestamp),
        Value::Text(ref s) => parse_datetime(s).map_or(value, Value::Timestamp),
        other => other,
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
