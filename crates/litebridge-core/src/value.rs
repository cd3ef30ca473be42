//! Domain values and engine storage values.
//!
//! [`Value`] is what the ORM layer hands to a converter; [`SqlValue`] is one
//! of the five storage classes the embedded engine actually keeps. Converters
//! translate between the two.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of domain value kinds a converter can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Boolean
    Bool,
    /// Unicode text
    Text,
    /// Text held as bytes in a declared encoding
    EncodedText,
    /// 64-bit signed integer
    Int,
    /// 64-bit floating point
    Real,
    /// Fixed-point decimal
    Decimal,
    /// Binary data
    Blob,
    /// Date with time of day
    Timestamp,
    /// Date only
    Date,
}

impl ValueKind {
    /// All kinds, in registry dispatch order.
    pub const ALL: [ValueKind; 9] = [
        ValueKind::Bool,
        ValueKind::Text,
        ValueKind::EncodedText,
        ValueKind::Int,
        ValueKind::Real,
        ValueKind::Decimal,
        ValueKind::Blob,
        ValueKind::Timestamp,
        ValueKind::Date,
    ];

    /// Human-readable name used in error messages.
    pub const fn name(self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::Text => "text",
            ValueKind::EncodedText => "encoded text",
            ValueKind::Int => "int",
            ValueKind::Real => "real",
            ValueKind::Decimal => "decimal",
            ValueKind::Blob => "blob",
            ValueKind::Timestamp => "timestamp",
            ValueKind::Date => "date",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed domain value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,

    /// Boolean value
    Bool(bool),

    /// Unicode text
    Text(String),

    /// Text as raw bytes in some declared encoding
    EncodedText(Vec<u8>),

    /// 64-bit signed integer
    Int(i64),

    /// 64-bit floating point
    Real(f64),

    /// Fixed-point decimal
    Decimal(Decimal),

    /// Binary data
    Blob(Vec<u8>),

    /// Date with time of day, no time zone
    Timestamp(NaiveDateTime),

    /// Calendar date
    Date(NaiveDate),
}

impl Value {
    /// Check if this value is NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The kind of this value, or `None` for NULL.
    pub const fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ValueKind::Bool),
            Value::Text(_) => Some(ValueKind::Text),
            Value::EncodedText(_) => Some(ValueKind::EncodedText),
            Value::Int(_) => Some(ValueKind::Int),
            Value::Real(_) => Some(ValueKind::Real),
            Value::Decimal(_) => Some(ValueKind::Decimal),
            Value::Blob(_) => Some(ValueKind::Blob),
            Value::Timestamp(_) => Some(ValueKind::Timestamp),
            Value::Date(_) => Some(ValueKind::Date),
        }
    }

    /// Get the type name of this value.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::Text(_) => "TEXT",
            Value::EncodedText(_) => "ENCODED TEXT",
            Value::Int(_) => "INTEGER",
            Value::Real(_) => "REAL",
            Value::Decimal(_) => "DECIMAL",
            Value::Blob(_) => "BLOB",
            Value::Timestamp(_) => "DATETIME",
            Value::Date(_) => "DATE",
        }
    }

    /// Truthiness of a value: zero, empty and NULL are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(v) => *v,
            Value::Text(s) => !s.is_empty(),
            Value::EncodedText(b) | Value::Blob(b) => !b.is_empty(),
            Value::Int(v) => *v != 0,
            Value::Real(v) => *v != 0.0,
            Value::Decimal(d) => !d.is_zero(),
            Value::Timestamp(_) | Value::Date(_) => true,
        }
    }

    /// Try to get this value as an i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Try to get this value as an f64.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Try to get this value as a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as a byte slice.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) | Value::EncodedText(b) => Some(b),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A value in one of the engine's storage classes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Check if this value is NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Storage class name as the engine reports it from `typeof()`.
    pub const fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Integer(_) => "integer",
            SqlValue::Real(_) => "real",
            SqlValue::Text(_) => "text",
            SqlValue::Blob(_) => "blob",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Real(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Raw fallback used when a lenient decode cannot interpret a stored value.
impl From<SqlValue> for Value {
    fn from(v: SqlValue) -> Self {
        match v {
            SqlValue::Null => Value::Null,
            SqlValue::Integer(i) => Value::Int(i),
            SqlValue::Real(r) => Value::Real(r),
            SqlValue::Text(s) => Value::Text(s),
            SqlValue::Blob(b) => Value::Blob(b),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Blob(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_of_each_variant() {
        assert_eq!(Value::Null.kind(), None);
        assert_eq!(Value::Bool(true).kind(), Some(ValueKind::Bool));
        assert_eq!(Value::Int(1).kind(), Some(ValueKind::Int));
        assert_eq!(
            Value::EncodedText(b"x".to_vec()).kind(),
            Some(ValueKind::EncodedText)
        );
        assert_eq!(
            Value::Decimal(Decimal::new(1, 0)).kind(),
            Some(ValueKind::Decimal)
        );
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Int(-3).is_truthy());
        assert!(!Value::Text(String::new()).is_truthy());
        assert!(!Value::Decimal(Decimal::ZERO).is_truthy());
        assert!(!Value::Null.is_truthy());
    }

    #[test]
    fn raw_fallback_from_storage() {
        assert_eq!(Value::from(SqlValue::Integer(5)), Value::Int(5));
        assert_eq!(
            Value::from(SqlValue::Text("abc".into())),
            Value::Text("abc".into())
        );
        assert_eq!(Value::from(SqlValue::Null), Value::Null);
    }

    #[test]
    fn option_into_value() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(7_i64)), Value::Int(7));
    }

    #[test]
    fn kind_serde_names() {
        let json = serde_json::to_string(&ValueKind::EncodedText).unwrap();
        assert_eq!(json, "\"encoded_text\"");
        let back: ValueKind = serde_json::from_str("\"timestamp\"").unwrap();
        assert_eq!(back, ValueKind::Timestamp);
    }
}
