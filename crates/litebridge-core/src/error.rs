//! Error types for provider operations.
//!
//! Every failure surfaced by the provider is an [`Error`]. Converter and pool
//! errors are raised on the calling thread at the point of violation. Errors
//! produced by an operation marshalled onto the shared-database worker thread
//! are carried back and returned to the caller unchanged, so a failing
//! `execute` on a shared connection yields the same `Error::Query` it would
//! have produced on a private one.

use std::fmt;

/// The primary error type for all provider operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-related errors (open, missing file, closed handle)
    Connection(ConnectionError),
    /// Statement errors reported by the engine
    Query(QueryError),
    /// Runtime type mismatches and unsupported domain types
    Type(TypeError),
    /// Invalid or unknown converter configuration
    Config(ConfigError),
    /// A value failed a validation rule
    Validation(ValidationError),
    /// Pool consistency violations
    Pool(PoolError),
    /// Call-marshalling bridge lifecycle failures
    Bridge(BridgeError),
    /// I/O errors
    Io(std::io::Error),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// The engine refused to open the database
    Connect,
    /// The database file does not exist and creation was not requested
    NotFound,
    /// The connection (or cursor) has already been closed
    Closed,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub message: String,
    /// Primary engine result code, when the engine produced one
    pub code: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Database is busy or locked
    Busy,
    /// Permission denied
    Permission,
    /// Table or column not found
    NotFound,
    /// Data too large for the engine
    DataTruncation,
    /// The running statement was interrupted
    Interrupted,
    /// API misuse: wrong binding count, several statements, DML-only calls
    Misuse,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    /// Attribute the value was destined for, e.g. `Person.age`
    pub attribute: Option<String>,
}

#[derive(Debug)]
pub struct ConfigError {
    pub attribute: Option<String>,
    pub message: String,
}

/// A value that failed one converter validation rule.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub attribute: Option<String>,
    pub kind: ValidationErrorKind,
    pub message: String,
}

/// The validation rule that was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Value is below the configured minimum
    Min,
    /// Value is above the configured maximum
    Max,
    /// Text is longer than the configured maximum length
    MaxLength,
    /// Empty text
    Empty,
    /// Text cannot be represented in the required encoding
    Encoding,
    /// Decimal precision is not positive
    Precision,
    /// Decimal scale is not positive, exceeds the precision, or is unsupported
    Scale,
}

#[derive(Debug)]
pub struct PoolError {
    pub kind: PoolErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolErrorKind {
    /// The connection handed back is not the calling thread's pooled connection
    NotOwned,
}

#[derive(Debug)]
pub struct BridgeError {
    pub kind: BridgeErrorKind,
    /// Name of the marshalled operation
    pub operation: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeErrorKind {
    /// The worker thread has stopped and can no longer run operations
    WorkerStopped,
    /// The operation panicked on the worker thread
    OperationPanicked,
    /// The worker thread tried to marshal an operation onto itself
    Reentrant,
}

impl Error {
    /// Is this a validation (range, length, emptiness, encoding) failure?
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// Is this a runtime type mismatch?
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, Error::Type(_))
    }

    /// Was a running statement interrupted?
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Error::Query(q) if q.kind == QueryErrorKind::Interrupted)
    }

    /// Get the validation rule that failed, if this is a validation error.
    pub fn validation_kind(&self) -> Option<ValidationErrorKind> {
        match self {
            Error::Validation(v) => Some(v.kind),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }

    pub(crate) fn type_mismatch(
        expected: &'static str,
        actual: impl Into<String>,
        attribute: Option<String>,
    ) -> Self {
        Error::Type(TypeError {
            expected,
            actual: actual.into(),
            attribute,
        })
    }

    pub(crate) fn config(attribute: Option<String>, message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            attribute,
            message: message.into(),
        })
    }

    pub(crate) fn validation(
        attribute: Option<String>,
        kind: ValidationErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Error::Validation(ValidationError {
            attribute,
            kind,
            message: message.into(),
        })
    }
}

impl QueryError {
    /// Is this a constraint violation?
    pub fn is_constraint_violation(&self) -> bool {
        self.kind == QueryErrorKind::Constraint
    }
}

impl BridgeError {
    pub fn worker_stopped(operation: &'static str) -> Self {
        Self {
            kind: BridgeErrorKind::WorkerStopped,
            operation,
        }
    }

    pub fn panicked(operation: &'static str) -> Self {
        Self {
            kind: BridgeErrorKind::OperationPanicked,
            operation,
        }
    }

    pub fn reentrant(operation: &'static str) -> Self {
        Self {
            kind: BridgeErrorKind::Reentrant,
            operation,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => write!(f, "Query error: {}", e.message),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Validation(e) => write!(f, "Validation error: {}", e),
            Error::Pool(e) => write!(f, "Pool error: {}", e.message),
            Error::Bridge(e) => write!(f, "Bridge error: {}", e),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(attr) = &self.attribute {
            write!(
                f,
                "value type for attribute {} must be {}, got {}",
                attr, self.expected, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(attr) = &self.attribute {
            write!(f, "{} (attribute {})", self.message, attr)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            BridgeErrorKind::WorkerStopped => write!(
                f,
                "shared database worker has stopped; cannot run '{}'",
                self.operation
            ),
            BridgeErrorKind::OperationPanicked => {
                write!(f, "operation '{}' panicked on the worker thread", self.operation)
            }
            BridgeErrorKind::Reentrant => write!(
                f,
                "operation '{}' was submitted from the worker thread itself",
                self.operation
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Validation(err)
    }
}

impl From<PoolError> for Error {
    fn from(err: PoolError) -> Self {
        Error::Pool(err)
    }
}

impl From<BridgeError> for Error {
    fn from(err: BridgeError) -> Self {
        Error::Bridge(err)
    }
}

/// Result type alias for provider operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupted_and_sql_helpers() {
        let err = Error::Query(QueryError {
            kind: QueryErrorKind::Interrupted,
            sql: Some("SELECT 1".to_string()),
            message: "interrupted".to_string(),
            code: Some(9),
        });

        assert!(err.is_interrupted());
        assert_eq!(err.sql(), Some("SELECT 1"));
        assert!(!err.is_validation());
    }

    #[test]
    fn validation_kind_is_exposed() {
        let err = Error::validation(
            Some("Person.name".to_string()),
            ValidationErrorKind::MaxLength,
            "too long",
        );
        assert!(err.is_validation());
        assert_eq!(err.validation_kind(), Some(ValidationErrorKind::MaxLength));
        assert_eq!(err.to_string(), "Validation error: too long");
    }

    #[test]
    fn type_error_mentions_attribute() {
        let err = Error::type_mismatch("int", "TEXT", Some("Person.age".to_string()));
        assert!(err.is_type_mismatch());
        assert_eq!(
            err.to_string(),
            "Type error: value type for attribute Person.age must be int, got TEXT"
        );
    }

    #[test]
    fn bridge_error_display() {
        let err = Error::from(BridgeError::worker_stopped("execute"));
        assert_eq!(
            err.to_string(),
            "Bridge error: shared database worker has stopped; cannot run 'execute'"
        );
    }
}
