//! Connection, cursor and pool interfaces.
//!
//! These traits are the surface the ORM layer programs against:
//!
//! - [`DbConnection`] - statement execution, transactions, function registration
//! - [`DbCursor`] - a statement's result rows and bookkeeping
//! - [`ConnectionPool`] - hands out connections and takes them back
//!
//! A private engine connection and a facade that forwards every call to the
//! shared-database worker implement the same traits, so callers cannot tell
//! them apart. Every method takes `&self`: real connections use interior
//! mutability, facades hold nothing but a handle to the worker.

use crate::error::Result;
use crate::row::{ColumnInfo, Row};
use crate::value::SqlValue;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// How an implicit transaction is opened before a data-modifying statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Locks are taken lazily on first access.
    #[default]
    Deferred,
    /// A write lock is taken immediately.
    Immediate,
    /// No other connection may read or write until commit.
    Exclusive,
}

impl IsolationLevel {
    /// Get the keyword used in `BEGIN <level>`.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::Deferred => "DEFERRED",
            IsolationLevel::Immediate => "IMMEDIATE",
            IsolationLevel::Exclusive => "EXCLUSIVE",
        }
    }
}

impl FromStr for IsolationLevel {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "" | "DEFERRED" => Ok(IsolationLevel::Deferred),
            "IMMEDIATE" => Ok(IsolationLevel::Immediate),
            "EXCLUSIVE" => Ok(IsolationLevel::Exclusive),
            _ => Err(crate::Error::Custom(format!("invalid isolation level: {s:?}"))),
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A scalar SQL function callable from statements.
///
/// Shared so the same function can be registered from any thread and run on
/// whichever thread owns the connection.
pub type ScalarFunction = Arc<dyn Fn(&[SqlValue]) -> Result<SqlValue> + Send + Sync>;

/// Results and bookkeeping for one statement at a time.
pub trait DbCursor {
    /// Prepare and run one statement, binding `?` placeholders positionally.
    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<()>;

    /// Run a data-modifying statement once per parameter set.
    fn executemany(&self, sql: &str, param_sets: &[Vec<SqlValue>]) -> Result<()>;

    /// Commit any open transaction, then run several `;`-separated statements.
    fn executescript(&self, script: &str) -> Result<()>;

    fn fetchone(&self) -> Result<Option<Row>>;

    /// Fetch up to `size` rows, or up to [`arraysize`](Self::arraysize) when `None`.
    fn fetchmany(&self, size: Option<usize>) -> Result<Vec<Row>>;

    fn fetchall(&self) -> Result<Vec<Row>>;

    /// Release the statement. Further use fails.
    fn close(&self) -> Result<()>;

    /// Rows modified by the last data-modifying statement, or -1.
    fn rowcount(&self) -> Result<i64>;

    /// Row id of the last inserted row, if the last statement inserted one.
    fn lastrowid(&self) -> Result<Option<i64>>;

    /// Column names of the current result set, `None` if it returns no rows.
    fn description(&self) -> Result<Option<Arc<ColumnInfo>>>;

    fn arraysize(&self) -> Result<usize>;

    fn set_arraysize(&self, size: usize) -> Result<()>;
}

/// A connection to one database.
pub trait DbConnection {
    type Cursor: DbCursor;

    /// Create a cursor with no statement.
    fn cursor(&self) -> Result<Self::Cursor>;

    /// Shorthand for creating a cursor and running `sql` on it.
    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<Self::Cursor>;

    fn executemany(&self, sql: &str, param_sets: &[Vec<SqlValue>]) -> Result<Self::Cursor>;

    fn executescript(&self, script: &str) -> Result<Self::Cursor>;

    fn commit(&self) -> Result<()>;

    fn rollback(&self) -> Result<()>;

    /// Close the connection. Closing twice is a no-op.
    fn close(&self) -> Result<()>;

    /// Register a scalar function taking `n_args` arguments (-1 for any).
    fn create_function(&self, name: &str, n_args: i32, func: ScalarFunction) -> Result<()>;

    /// Abort the statement currently running on this connection, from any
    /// thread. Never blocks.
    fn interrupt(&self);

    /// SQL text that recreates the schema and contents of the database.
    fn iterdump(&self) -> Result<Vec<String>>;

    /// `None` means autocommit.
    fn isolation_level(&self) -> Result<Option<IsolationLevel>>;

    fn set_isolation_level(&self, level: Option<IsolationLevel>) -> Result<()>;

    /// Rows modified since the connection was opened.
    fn total_changes(&self) -> Result<i64>;

    fn in_transaction(&self) -> Result<bool>;
}

/// Hands out connections and takes them back after each unit of work.
pub trait ConnectionPool {
    type Connection: DbConnection;

    fn connect(&self) -> Result<Self::Connection>;

    /// Roll back and keep the connection for reuse.
    fn release(&self, conn: &Self::Connection) -> Result<()>;

    /// Discard the connection.
    fn close(&self, conn: &Self::Connection) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolation_level_default() {
        assert_eq!(IsolationLevel::default(), IsolationLevel::Deferred);
    }

    #[test]
    fn test_isolation_level_parse() {
        assert_eq!(
            "immediate".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::Immediate
        );
        assert_eq!("".parse::<IsolationLevel>().unwrap(), IsolationLevel::Deferred);
        assert!("SERIALIZABLE".parse::<IsolationLevel>().is_err());
        assert_eq!(IsolationLevel::Exclusive.to_string(), "EXCLUSIVE");
    }
}
