//! Timestamp and date converters.
//!
//! Encoding is strict; decoding is lenient. A stored value that does not
//! parse comes back as its raw storage value instead of failing the read.

use super::{Convert, Options, mismatch};
use crate::Result;
use crate::value::{SqlValue, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse formats tried in order on decode. `%.f` also matches no fraction.
const TIMESTAMP_PARSE_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Canonical text form: `YYYY-MM-DD HH:MM:SS`, with `.ffffff` only when the
/// value has a sub-second part.
pub(crate) fn format_timestamp(ts: &NaiveDateTime) -> String {
    if ts.nanosecond() == 0 {
        ts.format(TIMESTAMP_FORMAT).to_string()
    } else {
        ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
    }
}

pub(crate) fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    TIMESTAMP_PARSE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

/// Dates with time of day.
#[derive(Debug, Clone)]
pub struct TimestampConverter {
    attr: Option<String>,
}

impl TimestampConverter {
    pub(crate) fn configure(opts: &mut Options<'_>) -> Result<Self> {
        opts.no_args()?;
        Ok(Self {
            attr: opts.attr_name(),
        })
    }
}

impl Convert for TimestampConverter {
    fn validate(&self, value: Value) -> Result<Value> {
        match value {
            Value::Timestamp(_) => Ok(value),
            other => Err(mismatch("timestamp", &other, self.attr.as_ref())),
        }
    }

    fn to_storage(&self, value: &Value) -> Result<SqlValue> {
        match value {
            Value::Timestamp(ts) => Ok(SqlValue::Text(format_timestamp(ts))),
            other => Err(mismatch("timestamp", other, self.attr.as_ref())),
        }
    }

    fn from_storage(&self, value: SqlValue) -> Value {
        let parsed = match &value {
            SqlValue::Text(s) => parse_timestamp(s),
            SqlValue::Integer(secs) => DateTime::from_timestamp(*secs, 0).map(|dt| dt.naive_utc()),
            _ => None,
        };
        parsed.map_or_else(
            || {
                tracing::debug!(stored = ?value, "timestamp did not parse; returning stored value");
                Value::from(value)
            },
            Value::Timestamp,
        )
    }

    fn storage_type_name(&self) -> String {
        "DATETIME".to_string()
    }
}

/// Calendar dates. Timestamps are accepted and truncated to their date.
#[derive(Debug, Clone)]
pub struct DateConverter {
    attr: Option<String>,
}

impl DateConverter {
    pub(crate) fn configure(opts: &mut Options<'_>) -> Result<Self> {
        opts.no_args()?;
        Ok(Self {
            attr: opts.attr_name(),
        })
    }
}

impl Convert for DateConverter {
    fn validate(&self, value: Value) -> Result<Value> {
        match value {
            Value::Date(_) => Ok(value),
            Value::Timestamp(ts) => Ok(Value::Date(ts.date())),
            other => Err(mismatch("date", &other, self.attr.as_ref())),
        }
    }

    fn to_storage(&self, value: &Value) -> Result<SqlValue> {
        let date = match value {
            Value::Date(d) => *d,
            Value::Timestamp(ts) => ts.date(),
            other => return Err(mismatch("date", other, self.attr.as_ref())),
        };
        Ok(SqlValue::Text(date.format(DATE_FORMAT).to_string()))
    }

    fn from_storage(&self, value: SqlValue) -> Value {
        let parsed = match &value {
            SqlValue::Text(s) => s
                .get(..10)
                .and_then(|head| NaiveDate::parse_from_str(head, DATE_FORMAT).ok()),
            _ => None,
        };
        parsed.map_or_else(
            || {
                tracing::debug!(stored = ?value, "date did not parse; returning stored value");
                Value::from(value)
            },
            Value::Date,
        )
    }

    fn storage_type_name(&self) -> String {
        "DATE".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::Converter;
    use crate::value::ValueKind;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").unwrap()
    }

    #[test]
    fn timestamp_text_form() {
        let conv = Converter::standalone(ValueKind::Timestamp).unwrap();
        assert_eq!(
            conv.to_storage(&Value::Timestamp(ts("2024-03-01 12:30:05"))).unwrap(),
            SqlValue::Text("2024-03-01 12:30:05".into())
        );
        assert_eq!(
            conv.to_storage(&Value::Timestamp(ts("2024-03-01 12:30:05.25"))).unwrap(),
            SqlValue::Text("2024-03-01 12:30:05.250000".into())
        );
    }

    #[test]
    fn timestamp_decode_accepts_several_forms() {
        let conv = Converter::standalone(ValueKind::Timestamp).unwrap();
        let expected = Value::Timestamp(ts("2024-03-01 12:30:05"));
        assert_eq!(
            conv.from_storage(SqlValue::Text("2024-03-01 12:30:05".into())),
            expected
        );
        assert_eq!(
            conv.from_storage(SqlValue::Text("2024-03-01T12:30:05".into())),
            expected
        );
        assert_eq!(
            conv.from_storage(SqlValue::Integer(0)),
            Value::Timestamp(ts("1970-01-01 00:00:00"))
        );
        assert_eq!(
            conv.from_storage(SqlValue::Text("2024-03-01 12:30:05.123456".into())),
            Value::Timestamp(ts("2024-03-01 12:30:05.123456"))
        );
    }

    #[test]
    fn timestamp_decode_falls_back_to_raw() {
        let conv = Converter::standalone(ValueKind::Timestamp).unwrap();
        assert_eq!(
            conv.from_storage(SqlValue::Text("yesterday".into())),
            Value::Text("yesterday".into())
        );
        assert_eq!(conv.from_storage(SqlValue::Real(1.5)), Value::Real(1.5));
    }

    #[test]
    fn timestamp_requires_timestamp() {
        let conv = Converter::standalone(ValueKind::Timestamp).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert!(conv.validate(Value::Date(date)).unwrap_err().is_type_mismatch());
    }

    #[test]
    fn date_truncates_timestamps() {
        let conv = Converter::standalone(ValueKind::Date).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(
            conv.validate(Value::Timestamp(ts("2024-03-01 23:59:59"))).unwrap(),
            Value::Date(date)
        );
        assert_eq!(
            conv.to_storage(&Value::Date(date)).unwrap(),
            SqlValue::Text("2024-03-01".into())
        );
    }

    #[test]
    fn date_decodes_first_ten_chars() {
        let conv = Converter::standalone(ValueKind::Date).unwrap();
        assert_eq!(
            conv.from_storage(SqlValue::Text("2024-03-01 10:00:00".into())),
            Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
        assert_eq!(
            conv.from_storage(SqlValue::Text("2024-3".into())),
            Value::Text("2024-3".into())
        );
        assert_eq!(conv.from_storage(SqlValue::Integer(7)), Value::Int(7));
    }
}
