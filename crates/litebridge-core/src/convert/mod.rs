//! The converter registry.
//!
//! A [`Converter`] validates a domain [`Value`] and translates it to and from
//! the engine's [`SqlValue`] storage form. Converters are selected by
//! [`ConverterType`], a closed dispatch table over [`ValueKind`], and are
//! configured once from an [`Attribute`]'s positional arguments and keyword
//! options. Configuration errors surface at construction; after that a
//! converter is immutable and can be shared freely across threads.
//!
//! NULL passes through every converter unchanged in both directions.
//!
//! | Kind | Converter | Storage type |
//! |------|-----------|--------------|
//! | `Bool` | [`BoolConverter`] | `BOOLEAN` |
//! | `Text` | [`UnicodeConverter`] | `VARCHAR(n)` / `TEXT` |
//! | `EncodedText` | [`EncodedTextConverter`] | `VARCHAR(n)` / `TEXT` |
//! | `Int` | [`IntConverter`] | `INTEGER` |
//! | `Real` | [`RealConverter`] | `REAL` |
//! | `Decimal` | [`DecimalConverter`] | `DECIMAL(p, s)` |
//! | `Blob` | [`BlobConverter`] | `BLOB` |
//! | `Timestamp` | [`TimestampConverter`] | `DATETIME` |
//! | `Date` | [`DateConverter`] | `DATE` |

mod blob;
mod numeric;
mod temporal;
mod text;

pub use blob::BlobConverter;
pub use numeric::{BoolConverter, DecimalConverter, IntConverter, RealConverter};
pub use temporal::{DateConverter, TimestampConverter};
pub use text::{EncodedTextConverter, TextEncoding, UnicodeConverter};

use crate::Result;
use crate::attribute::{Attribute, OptionValue};
use crate::error::Error;
use crate::value::{SqlValue, Value, ValueKind};
use std::collections::BTreeMap;
use std::fmt;

/// Validation and two-way translation for one domain kind.
///
/// Implementations never see NULL; [`Converter`] handles it.
pub trait Convert: fmt::Debug + Send + Sync {
    /// Check a value and coerce it into the converter's domain kind.
    fn validate(&self, value: Value) -> Result<Value>;

    /// Translate a validated value into its storage form.
    fn to_storage(&self, value: &Value) -> Result<SqlValue>;

    /// Translate a stored value back into the domain.
    ///
    /// Never fails: values that cannot be interpreted come back raw.
    fn from_storage(&self, value: SqlValue) -> Value;

    /// Column type used in DDL.
    fn storage_type_name(&self) -> String;
}

/// The registry's dispatch table: one entry per converter implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConverterType {
    Bool,
    Unicode,
    EncodedText,
    Int,
    Real,
    Decimal,
    Blob,
    Timestamp,
    Date,
}

impl ConverterType {
    /// The converter registered for a value kind.
    pub const fn for_kind(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Bool => ConverterType::Bool,
            ValueKind::Text => ConverterType::Unicode,
            ValueKind::EncodedText => ConverterType::EncodedText,
            ValueKind::Int => ConverterType::Int,
            ValueKind::Real => ConverterType::Real,
            ValueKind::Decimal => ConverterType::Decimal,
            ValueKind::Blob => ConverterType::Blob,
            ValueKind::Timestamp => ConverterType::Timestamp,
            ValueKind::Date => ConverterType::Date,
        }
    }

    /// The converter registered for a runtime value.
    ///
    /// NULL carries no kind, so no converter can be chosen for it.
    pub fn for_value(value: &Value) -> Result<Self> {
        value
            .kind()
            .map(Self::for_kind)
            .ok_or_else(|| Error::type_mismatch("a value with a registered kind", "NULL", None))
    }

    /// The kind this converter handles.
    pub const fn kind(self) -> ValueKind {
        match self {
            ConverterType::Bool => ValueKind::Bool,
            ConverterType::Unicode => ValueKind::Text,
            ConverterType::EncodedText => ValueKind::EncodedText,
            ConverterType::Int => ValueKind::Int,
            ConverterType::Real => ValueKind::Real,
            ConverterType::Decimal => ValueKind::Decimal,
            ConverterType::Blob => ValueKind::Blob,
            ConverterType::Timestamp => ValueKind::Timestamp,
            ConverterType::Date => ValueKind::Date,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ConverterType::Bool => "BoolConverter",
            ConverterType::Unicode => "UnicodeConverter",
            ConverterType::EncodedText => "EncodedTextConverter",
            ConverterType::Int => "IntConverter",
            ConverterType::Real => "RealConverter",
            ConverterType::Decimal => "DecimalConverter",
            ConverterType::Blob => "BlobConverter",
            ConverterType::Timestamp => "TimestampConverter",
            ConverterType::Date => "DateConverter",
        }
    }

    /// Construct a converter, configured from `attribute` when given.
    ///
    /// Every option the converter does not consume is reported as unknown.
    pub fn build(self, attribute: Option<&Attribute>) -> Result<Converter> {
        let mut opts = Options::new(attribute);
        let inner = match self {
            ConverterType::Bool => Inner::Bool(BoolConverter::configure(&mut opts)?),
            ConverterType::Unicode => Inner::Unicode(UnicodeConverter::configure(&mut opts)?),
            ConverterType::EncodedText => {
                Inner::EncodedText(EncodedTextConverter::configure(&mut opts)?)
            }
            ConverterType::Int => Inner::Int(IntConverter::configure(&mut opts)?),
            ConverterType::Real => Inner::Real(RealConverter::configure(&mut opts)?),
            ConverterType::Decimal => Inner::Decimal(DecimalConverter::configure(&mut opts)?),
            ConverterType::Blob => Inner::Blob(BlobConverter::configure(&mut opts)?),
            ConverterType::Timestamp => {
                Inner::Timestamp(TimestampConverter::configure(&mut opts)?)
            }
            ConverterType::Date => Inner::Date(DateConverter::configure(&mut opts)?),
        };
        opts.finish()?;
        Ok(Converter {
            attribute: attribute.cloned(),
            converter_type: self,
            inner,
        })
    }
}

impl fmt::Display for ConverterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
enum Inner {
    Bool(BoolConverter),
    Unicode(UnicodeConverter),
    EncodedText(EncodedTextConverter),
    Int(IntConverter),
    Real(RealConverter),
    Decimal(DecimalConverter),
    Blob(BlobConverter),
    Timestamp(TimestampConverter),
    Date(DateConverter),
}

impl Inner {
    fn as_convert(&self) -> &dyn Convert {
        match self {
            Inner::Bool(c) => c,
            Inner::Unicode(c) => c,
            Inner::EncodedText(c) => c,
            Inner::Int(c) => c,
            Inner::Real(c) => c,
            Inner::Decimal(c) => c,
            Inner::Blob(c) => c,
            Inner::Timestamp(c) => c,
            Inner::Date(c) => c,
        }
    }
}

/// A configured converter, optionally bound to the attribute it serializes.
#[derive(Debug, Clone)]
pub struct Converter {
    attribute: Option<Attribute>,
    converter_type: ConverterType,
    inner: Inner,
}

impl Converter {
    /// Build the converter for a declared attribute.
    pub fn for_attribute(attribute: &Attribute) -> Result<Self> {
        ConverterType::for_kind(attribute.kind).build(Some(attribute))
    }

    /// Build an unbound converter with default configuration.
    pub fn standalone(kind: ValueKind) -> Result<Self> {
        ConverterType::for_kind(kind).build(None)
    }

    /// The attribute this converter was configured from, if any.
    pub fn attribute(&self) -> Option<&Attribute> {
        self.attribute.as_ref()
    }

    pub fn kind(&self) -> ValueKind {
        self.converter_type.kind()
    }

    pub fn converter_type(&self) -> ConverterType {
        self.converter_type
    }

    pub fn validate(&self, value: Value) -> Result<Value> {
        if value.is_null() {
            return Ok(value);
        }
        self.inner.as_convert().validate(value)
    }

    pub fn to_storage(&self, value: &Value) -> Result<SqlValue> {
        if value.is_null() {
            return Ok(SqlValue::Null);
        }
        self.inner.as_convert().to_storage(value)
    }

    pub fn from_storage(&self, value: SqlValue) -> Value {
        if value.is_null() {
            return Value::Null;
        }
        self.inner.as_convert().from_storage(value)
    }

    /// Validate then encode, the path taken for every bound parameter.
    pub fn encode(&self, value: Value) -> Result<SqlValue> {
        let value = self.validate(value)?;
        self.to_storage(&value)
    }

    pub fn storage_type_name(&self) -> String {
        self.inner.as_convert().storage_type_name()
    }
}

/// Configuration being consumed by a converter under construction.
pub(crate) struct Options<'a> {
    attribute: Option<&'a Attribute>,
    remaining: BTreeMap<String, OptionValue>,
}

impl<'a> Options<'a> {
    fn new(attribute: Option<&'a Attribute>) -> Self {
        Self {
            attribute,
            remaining: attribute.map(|a| a.options.clone()).unwrap_or_default(),
        }
    }

    /// Is the converter being built without an attribute?
    pub(crate) fn is_standalone(&self) -> bool {
        self.attribute.is_none()
    }

    pub(crate) fn attr_name(&self) -> Option<String> {
        self.attribute.map(Attribute::qualified_name)
    }

    pub(crate) fn args(&self) -> &'a [OptionValue] {
        self.attribute.map_or(&[], |a| a.args.as_slice())
    }

    /// Fail if any positional argument was given.
    pub(crate) fn no_args(&self) -> Result<()> {
        self.reject_args(self.args())
    }

    pub(crate) fn reject_args(&self, args: &[OptionValue]) -> Result<()> {
        if args.is_empty() {
            return Ok(());
        }
        let listed = args
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let plural = if args.len() > 1 { "s" } else { "" };
        Err(self.config_error(format!(
            "Unexpected positional argument{plural} for attribute {}: {listed}",
            self.attr_label()
        )))
    }

    /// Remove and return a keyword option.
    pub(crate) fn take(&mut self, key: &str) -> Option<OptionValue> {
        self.remaining.remove(key)
    }

    pub(crate) fn config_error(&self, message: impl Into<String>) -> Error {
        Error::config(self.attr_name(), message)
    }

    pub(crate) fn attr_label(&self) -> String {
        self.attr_name().unwrap_or_else(|| "<standalone>".to_string())
    }

    fn finish(self) -> Result<()> {
        match self.remaining.keys().next() {
            Some(key) => Err(Error::config(
                self.attr_name(),
                format!("Unknown option {key:?}"),
            )),
            None => Ok(()),
        }
    }
}

/// `Entity.name` or a placeholder, for messages.
pub(crate) fn label(attr: Option<&String>) -> &str {
    attr.map_or("<standalone>", String::as_str)
}

/// Type mismatch against a converter's expected kind.
pub(crate) fn mismatch(expected: &'static str, value: &Value, attr: Option<&String>) -> Error {
    Error::type_mismatch(expected, value.type_name(), attr.cloned())
}
