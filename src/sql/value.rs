//! Bind values: bridge from the JSON row model to typed driver parameters.
//! Each variant is Option-wrapped so a JSON null binds as a NULL of the
//! column's type; strict engines reject untyped NULLs on non-text columns.

use crate::schema::SqlType;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

/// A value ready to bind to any of the supported drivers.
#[derive(Clone, Debug)]
pub enum SqlValue {
    Int(Option<i64>),
    Float(Option<f64>),
    Bool(Option<bool>),
    Text(Option<String>),
    Timestamp(Option<DateTime<Utc>>),
    Json(Option<Value>),
}

impl SqlValue {
    /// Coerce a JSON value against the column's normalized type. Lenient:
    /// numeric strings bind as text for text columns, RFC 3339 strings parse
    /// for timestamp columns, anything unrecognized falls back to its JSON
    /// text rendering so the driver reports the real conversion error.
    pub fn from_json(sql_type: &SqlType, value: &Value) -> SqlValue {
        match sql_type {
            SqlType::SmallInt | SqlType::Integer | SqlType::BigInt => match value {
                Value::Null => SqlValue::Int(None),
                Value::Number(n) if n.is_i64() || n.is_u64() => SqlValue::Int(n.as_i64()),
                Value::Number(n) => SqlValue::Float(n.as_f64()),
                Value::Bool(b) => SqlValue::Int(Some(i64::from(*b))),
                Value::String(s) => match s.parse::<i64>() {
                    Ok(i) => SqlValue::Int(Some(i)),
                    Err(_) => SqlValue::Text(Some(s.clone())),
                },
                other => SqlValue::Text(Some(other.to_string())),
            },
            SqlType::Real | SqlType::Double | SqlType::Decimal => match value {
                Value::Null => SqlValue::Float(None),
                Value::Number(n) => SqlValue::Float(n.as_f64()),
                Value::String(s) => match s.parse::<f64>() {
                    Ok(f) => SqlValue::Float(Some(f)),
                    Err(_) => SqlValue::Text(Some(s.clone())),
                },
                other => SqlValue::Text(Some(other.to_string())),
            },
            SqlType::Boolean => match value {
                Value::Null => SqlValue::Bool(None),
                Value::Bool(b) => SqlValue::Bool(Some(*b)),
                Value::Number(n) => SqlValue::Bool(Some(n.as_i64().unwrap_or(0) != 0)),
                other => SqlValue::Text(Some(other.to_string())),
            },
            SqlType::Timestamp => match value {
                Value::Null => SqlValue::Timestamp(None),
                Value::String(s) => match parse_timestamp(s) {
                    Some(ts) => SqlValue::Timestamp(Some(ts)),
                    None => SqlValue::Text(Some(s.clone())),
                },
                Value::Number(n) => match n.as_i64() {
                    Some(secs) => SqlValue::Timestamp(Utc.timestamp_opt(secs, 0).single()),
                    None => SqlValue::Text(Some(n.to_string())),
                },
                other => SqlValue::Text(Some(other.to_string())),
            },
            SqlType::Json => match value {
                Value::Null => SqlValue::Json(None),
                other => SqlValue::Json(Some(other.clone())),
            },
            _ => match value {
                Value::Null => SqlValue::Text(None),
                Value::String(s) => SqlValue::Text(Some(s.clone())),
                Value::Bool(b) => SqlValue::Bool(Some(*b)),
                Value::Number(n) if n.is_i64() || n.is_u64() => SqlValue::Int(n.as_i64()),
                Value::Number(n) => SqlValue::Float(n.as_f64()),
                other => SqlValue::Text(Some(other.to_string())),
            },
        }
    }

    /// A NULL typed for the given column.
    pub fn null_for(sql_type: &SqlType) -> SqlValue {
        SqlValue::from_json(sql_type, &Value::Null)
    }

    pub fn now() -> SqlValue {
        SqlValue::Timestamp(Some(Utc::now()))
    }

    pub fn is_null(&self) -> bool {
        match self {
            SqlValue::Int(v) => v.is_none(),
            SqlValue::Float(v) => v.is_none(),
            SqlValue::Bool(v) => v.is_none(),
            SqlValue::Text(v) => v.is_none(),
            SqlValue::Timestamp(v) => v.is_none(),
            SqlValue::Json(v) => v.is_none(),
        }
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerces_numbers_by_column_type() {
        assert!(matches!(
            SqlValue::from_json(&SqlType::Integer, &json!(42)),
            SqlValue::Int(Some(42))
        ));
        assert!(matches!(
            SqlValue::from_json(&SqlType::Double, &json!(1.5)),
            SqlValue::Float(Some(_))
        ));
        assert!(matches!(
            SqlValue::from_json(&SqlType::Integer, &json!("7")),
            SqlValue::Int(Some(7))
        ));
    }

    #[test]
    fn null_is_typed_for_the_column() {
        assert!(matches!(
            SqlValue::from_json(&SqlType::Integer, &Value::Null),
            SqlValue::Int(None)
        ));
        assert!(matches!(
            SqlValue::from_json(&SqlType::Text, &Value::Null),
            SqlValue::Text(None)
        ));
        assert!(SqlValue::null_for(&SqlType::Timestamp).is_null());
    }

    #[test]
    fn parses_timestamp_strings() {
        let v = SqlValue::from_json(&SqlType::Timestamp, &json!("2024-03-01T10:30:00Z"));
        assert!(matches!(v, SqlValue::Timestamp(Some(_))));
        let v = SqlValue::from_json(&SqlType::Timestamp, &json!("2024-03-01 10:30:00"));
        assert!(matches!(v, SqlValue::Timestamp(Some(_))));
    }

    #[test]
    fn objects_bind_as_json_for_json_columns() {
        let v = SqlValue::from_json(&SqlType::Json, &json!({"a": 1}));
        assert!(matches!(v, SqlValue::Json(Some(_))));
    }
}
