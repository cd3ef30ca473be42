//! Core types and traits for Litebridge.
//!
//! This crate holds everything that does not touch the embedded engine:
//!
//! - [`Value`] / [`SqlValue`] for domain and storage values
//! - the converter registry ([`Converter`], [`ConverterType`])
//! - [`Attribute`] schema descriptors that configure converters
//! - the [`Error`] taxonomy
//! - [`DbConnection`], [`DbCursor`] and [`ConnectionPool`] interfaces

pub mod attribute;
pub mod connection;
pub mod convert;
pub mod error;
pub mod row;
pub mod value;

pub use attribute::{Attribute, OptionValue};
pub use connection::{ConnectionPool, DbConnection, DbCursor, IsolationLevel, ScalarFunction};
pub use convert::{Convert, Converter, ConverterType, TextEncoding};
pub use error::{
    BridgeError, BridgeErrorKind, ConfigError, ConnectionError, ConnectionErrorKind, Error,
    PoolError, PoolErrorKind, QueryError, QueryErrorKind, Result, TypeError, ValidationError,
    ValidationErrorKind,
};
pub use row::{ColumnInfo, Row};
pub use value::{SqlValue, Value, ValueKind};
