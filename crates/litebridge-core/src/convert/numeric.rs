//! Boolean, integer, real and fixed-point decimal converters.
//!
//! Range checks are inclusive. A configured bound of zero is not enforced:
//! zero bounds are dropped at construction time, so `min = 0` behaves as if
//! no minimum had been given.

use super::{Convert, Options, label, mismatch};
use crate::Result;
use crate::attribute::OptionValue;
use crate::error::{Error, ValidationErrorKind};
use crate::value::{SqlValue, Value};
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt::Display;
use std::str::FromStr;

/// Largest scale the decimal backend can represent.
const MAX_DECIMAL_SCALE: u32 = 28;

const DEFAULT_PRECISION: u32 = 12;
const DEFAULT_SCALE: u32 = 2;

fn check_bounds<T>(attr: Option<&String>, value: &T, min: Option<&T>, max: Option<&T>) -> Result<()>
where
    T: PartialOrd + Display,
{
    if let Some(min) = min {
        if value < min {
            return Err(Error::validation(
                attr.cloned(),
                ValidationErrorKind::Min,
                format!(
                    "Value {value} of attr {} is less than the minimum allowed value {min}",
                    label(attr)
                ),
            ));
        }
    }
    if let Some(max) = max {
        if value > max {
            return Err(Error::validation(
                attr.cloned(),
                ValidationErrorKind::Max,
                format!(
                    "Value {value} of attr {} is greater than the maximum allowed value {max}",
                    label(attr)
                ),
            ));
        }
    }
    Ok(())
}

fn storage_truthy(value: &SqlValue) -> bool {
    match value {
        SqlValue::Null => false,
        SqlValue::Integer(i) => *i != 0,
        SqlValue::Real(r) => *r != 0.0,
        SqlValue::Text(s) => !s.is_empty(),
        SqlValue::Blob(b) => !b.is_empty(),
    }
}

/// Booleans. Any value is accepted and coerced by truthiness.
#[derive(Debug, Clone)]
pub struct BoolConverter {
    attr: Option<String>,
}

impl BoolConverter {
    pub(crate) fn configure(opts: &mut Options<'_>) -> Result<Self> {
        opts.no_args()?;
        Ok(Self {
            attr: opts.attr_name(),
        })
    }
}

impl Convert for BoolConverter {
    fn validate(&self, value: Value) -> Result<Value> {
        Ok(Value::Bool(value.is_truthy()))
    }

    fn to_storage(&self, value: &Value) -> Result<SqlValue> {
        match value {
            Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
            other => Err(mismatch("bool", other, self.attr.as_ref())),
        }
    }

    fn from_storage(&self, value: SqlValue) -> Value {
        Value::Bool(storage_truthy(&value))
    }

    fn storage_type_name(&self) -> String {
        "BOOLEAN".to_string()
    }
}

/// 64-bit integers with optional inclusive bounds.
#[derive(Debug, Clone)]
pub struct IntConverter {
    attr: Option<String>,
    min: Option<i64>,
    max: Option<i64>,
}

impl IntConverter {
    pub(crate) fn configure(opts: &mut Options<'_>) -> Result<Self> {
        opts.no_args()?;
        let min = Self::bound(opts, "min")?;
        let max = Self::bound(opts, "max")?;
        Ok(Self {
            attr: opts.attr_name(),
            min,
            max,
        })
    }

    fn bound(opts: &mut Options<'_>, key: &str) -> Result<Option<i64>> {
        match opts.take(key) {
            None => Ok(None),
            Some(OptionValue::Int(v)) => Ok((v != 0).then_some(v)),
            Some(other) => Err(opts.config_error(format!(
                "'{key}' argument for attribute {} must be int. Got: {other}",
                opts.attr_label()
            ))),
        }
    }

    pub fn min(&self) -> Option<i64> {
        self.min
    }

    pub fn max(&self) -> Option<i64> {
        self.max
    }
}

impl Convert for IntConverter {
    fn validate(&self, value: Value) -> Result<Value> {
        let v = match value {
            Value::Int(v) => v,
            Value::Bool(b) => i64::from(b),
            other => return Err(mismatch("int", &other, self.attr.as_ref())),
        };
        check_bounds(self.attr.as_ref(), &v, self.min.as_ref(), self.max.as_ref())?;
        Ok(Value::Int(v))
    }

    fn to_storage(&self, value: &Value) -> Result<SqlValue> {
        match value.as_i64() {
            Some(v) => Ok(SqlValue::Integer(v)),
            None => Err(mismatch("int", value, self.attr.as_ref())),
        }
    }

    fn from_storage(&self, value: SqlValue) -> Value {
        Value::from(value)
    }

    fn storage_type_name(&self) -> String {
        "INTEGER".to_string()
    }
}

/// Coerce a value to f64 the way the real converter does.
#[allow(clippy::cast_precision_loss)]
fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Real(v) => Some(*v),
        Value::Int(v) => Some(*v as f64),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Decimal(d) => d.to_string().parse().ok(),
        Value::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// 64-bit floats with optional inclusive bounds.
#[derive(Debug, Clone)]
pub struct RealConverter {
    attr: Option<String>,
    min: Option<f64>,
    max: Option<f64>,
}

impl RealConverter {
    pub(crate) fn configure(opts: &mut Options<'_>) -> Result<Self> {
        opts.no_args()?;
        let min = Self::bound(opts, "min")?;
        let max = Self::bound(opts, "max")?;
        Ok(Self {
            attr: opts.attr_name(),
            min,
            max,
        })
    }

    #[allow(clippy::cast_precision_loss)]
    fn bound(opts: &mut Options<'_>, key: &str) -> Result<Option<f64>> {
        let Some(option) = opts.take(key) else {
            return Ok(None);
        };
        let parsed = match &option {
            OptionValue::Int(v) => Some(*v as f64),
            OptionValue::Real(v) => Some(*v),
            OptionValue::Text(s) => s.trim().parse().ok(),
            OptionValue::Bool(_) => None,
        };
        match parsed {
            Some(v) => Ok((v != 0.0).then_some(v)),
            None => Err(opts.config_error(format!(
                "Invalid value for '{key}' argument for attribute {}: {option}",
                opts.attr_label()
            ))),
        }
    }
}

impl Convert for RealConverter {
    fn validate(&self, value: Value) -> Result<Value> {
        let v = coerce_f64(&value).ok_or_else(|| mismatch("real", &value, self.attr.as_ref()))?;
        check_bounds(self.attr.as_ref(), &v, self.min.as_ref(), self.max.as_ref())?;
        Ok(Value::Real(v))
    }

    fn to_storage(&self, value: &Value) -> Result<SqlValue> {
        coerce_f64(value)
            .map(SqlValue::Real)
            .ok_or_else(|| mismatch("real", value, self.attr.as_ref()))
    }

    #[allow(clippy::cast_precision_loss)]
    fn from_storage(&self, value: SqlValue) -> Value {
        match value {
            SqlValue::Integer(i) => Value::Real(i as f64),
            other => Value::from(other),
        }
    }

    fn storage_type_name(&self) -> String {
        "REAL".to_string()
    }
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    let s = s.trim();
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

/// Floats go through their shortest round-trip text form so `0.1` becomes
/// `0.1` rather than its exact binary expansion.
fn decimal_from_f64(v: f64) -> Option<Decimal> {
    if v.is_finite() {
        parse_decimal(&v.to_string())
    } else {
        None
    }
}

fn coerce_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Decimal(d) => Some(*d),
        Value::Int(i) => Some(Decimal::from(*i)),
        Value::Bool(b) => Some(Decimal::from(i64::from(*b))),
        Value::Real(r) => decimal_from_f64(*r),
        Value::Text(s) => parse_decimal(s),
        _ => None,
    }
}

/// Fixed-point decimals stored as canonical text.
///
/// An attribute-bound converter quantizes to its scale with round-half-even
/// on both encode and decode. A standalone converter reports the default
/// `DECIMAL(12, 2)` type but leaves values unquantized.
#[derive(Debug, Clone)]
pub struct DecimalConverter {
    attr: Option<String>,
    precision: u32,
    scale: u32,
    quantize: bool,
    min: Option<Decimal>,
    max: Option<Decimal>,
}

impl DecimalConverter {
    pub(crate) fn configure(opts: &mut Options<'_>) -> Result<Self> {
        if opts.is_standalone() {
            return Ok(Self {
                attr: None,
                precision: DEFAULT_PRECISION,
                scale: DEFAULT_SCALE,
                quantize: false,
                min: None,
                max: None,
            });
        }

        let args = opts.args();
        if args.len() > 2 {
            return Err(opts.config_error(
                "Too many positional parameters for Decimal (expected: precision and scale)",
            ));
        }
        let precision = match args.first() {
            Some(arg) => Some(arg.clone()),
            None => opts.take("precision"),
        };
        let precision = Self::digits(opts, "precision", precision, DEFAULT_PRECISION)?;
        let scale = match args.get(1) {
            Some(arg) => Some(arg.clone()),
            None => opts.take("scale"),
        };
        let scale = Self::digits(opts, "scale", scale, DEFAULT_SCALE)?;

        if scale > precision {
            return Err(Error::validation(
                opts.attr_name(),
                ValidationErrorKind::Scale,
                "'scale' must be less or equal 'precision'",
            ));
        }
        if scale > MAX_DECIMAL_SCALE {
            return Err(Error::validation(
                opts.attr_name(),
                ValidationErrorKind::Scale,
                format!(
                    "'scale' for attribute {} must not exceed {MAX_DECIMAL_SCALE}. Got: {scale}",
                    opts.attr_label()
                ),
            ));
        }

        let min = Self::bound(opts, "min")?;
        let max = Self::bound(opts, "max")?;
        Ok(Self {
            attr: opts.attr_name(),
            precision,
            scale,
            quantize: true,
            min,
            max,
        })
    }

    fn digits(
        opts: &Options<'_>,
        key: &str,
        option: Option<OptionValue>,
        default: u32,
    ) -> Result<u32> {
        let value = match option {
            None => i64::from(default),
            Some(OptionValue::Int(v)) => v,
            Some(other) => {
                return Err(opts.config_error(format!(
                    "'{key}' positional argument for attribute {} must be int. Got: {other}",
                    opts.attr_label()
                )));
            }
        };
        let kind = if key == "precision" {
            ValidationErrorKind::Precision
        } else {
            ValidationErrorKind::Scale
        };
        if value <= 0 {
            return Err(Error::validation(
                opts.attr_name(),
                kind,
                format!(
                    "'{key}' positional argument for attribute {} must be positive. Got: {value}",
                    opts.attr_label()
                ),
            ));
        }
        u32::try_from(value).map_err(|_| {
            Error::validation(
                opts.attr_name(),
                kind,
                format!("'{key}' for attribute {} is too large. Got: {value}", opts.attr_label()),
            )
        })
    }

    fn bound(opts: &mut Options<'_>, key: &str) -> Result<Option<Decimal>> {
        let Some(option) = opts.take(key) else {
            return Ok(None);
        };
        let parsed = match &option {
            OptionValue::Int(v) => Some(Decimal::from(*v)),
            OptionValue::Real(v) => decimal_from_f64(*v),
            OptionValue::Text(s) => parse_decimal(s),
            OptionValue::Bool(_) => None,
        };
        match parsed {
            Some(v) => Ok((!v.is_zero()).then_some(v)),
            None => Err(opts.config_error(format!(
                "Invalid value for '{key}' argument for attribute {}: {option}",
                opts.attr_label()
            ))),
        }
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Round to the configured scale (half-even) and pad to exactly that
    /// many fractional digits. Identity for a standalone converter.
    ///
    /// Fails when the value has too many integer digits to carry `scale`
    /// fractional digits.
    pub fn quantize(&self, value: Decimal) -> Result<Decimal> {
        if !self.quantize {
            return Ok(value);
        }
        let mut rounded =
            value.round_dp_with_strategy(self.scale, RoundingStrategy::MidpointNearestEven);
        rounded.rescale(self.scale);
        if rounded.scale() < self.scale {
            return Err(Error::validation(
                self.attr.clone(),
                ValidationErrorKind::Precision,
                format!(
                    "Value {value} cannot be represented with {} fractional digits",
                    self.scale
                ),
            ));
        }
        Ok(rounded)
    }
}

impl Convert for DecimalConverter {
    fn validate(&self, value: Value) -> Result<Value> {
        let d = coerce_decimal(&value)
            .ok_or_else(|| mismatch("decimal", &value, self.attr.as_ref()))?;
        check_bounds(self.attr.as_ref(), &d, self.min.as_ref(), self.max.as_ref())?;
        Ok(Value::Decimal(d))
    }

    fn to_storage(&self, value: &Value) -> Result<SqlValue> {
        let d = coerce_decimal(value)
            .ok_or_else(|| mismatch("decimal", value, self.attr.as_ref()))?;
        Ok(SqlValue::Text(self.quantize(d)?.to_string()))
    }

    fn from_storage(&self, value: SqlValue) -> Value {
        let parsed = match &value {
            SqlValue::Text(s) => parse_decimal(s),
            SqlValue::Integer(i) => Some(Decimal::from(*i)),
            SqlValue::Real(r) => decimal_from_f64(*r),
            SqlValue::Null | SqlValue::Blob(_) => None,
        };
        match parsed.map(|d| self.quantize(d)) {
            Some(Ok(d)) => Value::Decimal(d),
            Some(Err(_)) | None => {
                tracing::debug!(stored = ?value, "decimal did not parse; returning stored value");
                Value::from(value)
            }
        }
    }

    fn storage_type_name(&self) -> String {
        format!("DECIMAL({}, {})", self.precision, self.scale)
    }
}
