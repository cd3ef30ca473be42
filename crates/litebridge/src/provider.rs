//! The provider surface: pools, converters and statement helpers.

use litebridge_core::{
    Attribute, ColumnInfo, ConnectionPool, Converter, DbConnection, DbCursor, Error,
    IsolationLevel, Result, Row, ScalarFunction, SqlValue, Value, ValueKind,
    error::{ConfigError, PoolError, PoolErrorKind},
};
use litebridge_sqlite::{
    Connection, Cursor, MemoryPool, SharedConnection, SharedCursor, ThreadLocalPool,
};
use std::path::Path;
use std::sync::Arc;

pub use litebridge_sqlite::quote_name;

/// Placeholder style understood by the engine.
pub const PARAM_STYLE: &str = "qmark";

/// Most parameters a statement builder should bind in one statement.
pub const MAX_PARAMS_COUNT: usize = 200;

/// Whether `(a, b) = (?, ?)` comparisons are supported.
pub const ROW_VALUE_SYNTAX: bool = false;

/// Location that selects the process-wide shared in-memory database.
pub const MEMORY_LOCATION: &str = ":memory:";

/// Get a pool for `location`.
///
/// `":memory:"` selects the shared in-memory database, reached from every
/// thread through the worker. Anything else is a database file with one
/// connection per thread; `create_db` allows creating it when missing.
pub fn get_pool(location: impl AsRef<Path>, create_db: bool) -> Result<Pool> {
    let location = location.as_ref();
    if location.as_os_str() == MEMORY_LOCATION {
        tracing::debug!("using shared in-memory database");
        return Ok(Pool::Memory(MemoryPool));
    }
    Ok(Pool::File(ThreadLocalPool::new(location, create_db)?))
}

/// Get the converter for a declared attribute.
pub fn get_converter(attribute: &Attribute) -> Result<Converter> {
    Converter::for_attribute(attribute)
}

/// Get an unbound converter for `kind` with default configuration.
pub fn get_converter_for_kind(kind: ValueKind) -> Result<Converter> {
    Converter::standalone(kind)
}

/// Parse a JSON array of attribute declarations.
pub fn load_attributes(json: &str) -> Result<Vec<Attribute>> {
    serde_json::from_str(json).map_err(|e| {
        Error::Config(ConfigError {
            attribute: None,
            message: format!("Invalid attribute declarations: {e}"),
        })
    })
}

/// `n` comma-separated `?` placeholders.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Row id of the row the cursor's last statement inserted.
pub fn last_rowid(cursor: &impl DbCursor) -> Result<Option<i64>> {
    cursor.lastrowid()
}

/// Validate and encode each value with its converter, stopping at the first
/// failure so nothing reaches the engine.
pub fn encode_params<'a, I>(pairs: I) -> Result<Vec<SqlValue>>
where
    I: IntoIterator<Item = (&'a Converter, Value)>,
{
    pairs
        .into_iter()
        .map(|(converter, value)| converter.encode(value))
        .collect()
}

/// Decode a row column by column. Columns beyond the converters come back raw.
pub fn decode_row(converters: &[Converter], row: Row) -> Vec<Value> {
    let mut converters = converters.iter();
    row.into_values()
        .into_iter()
        .map(|raw| match converters.next() {
            Some(converter) => converter.from_storage(raw),
            None => Value::from(raw),
        })
        .collect()
}

/// Either kind of pool [`get_pool`] hands out.
#[derive(Debug)]
pub enum Pool {
    File(ThreadLocalPool),
    Memory(MemoryPool),
}

impl Pool {
    pub fn is_memory(&self) -> bool {
        matches!(self, Pool::Memory(_))
    }

    fn mismatch(&self) -> Error {
        Error::Pool(PoolError {
            kind: PoolErrorKind::NotOwned,
            message: format!(
                "Connection was not handed out by this {} pool",
                if self.is_memory() { "in-memory" } else { "file" }
            ),
        })
    }
}

impl ConnectionPool for Pool {
    type Connection = PoolConnection;

    fn connect(&self) -> Result<PoolConnection> {
        match self {
            Pool::File(pool) => pool.connect().map(PoolConnection::File),
            Pool::Memory(pool) => pool.connect().map(PoolConnection::Memory),
        }
    }

    fn release(&self, conn: &PoolConnection) -> Result<()> {
        match (self, conn) {
            (Pool::File(pool), PoolConnection::File(c)) => pool.release(c),
            (Pool::Memory(pool), PoolConnection::Memory(c)) => pool.release(c),
            _ => Err(self.mismatch()),
        }
    }

    fn close(&self, conn: &PoolConnection) -> Result<()> {
        match (self, conn) {
            (Pool::File(pool), PoolConnection::File(c)) => pool.close(c),
            (Pool::Memory(pool), PoolConnection::Memory(c)) => pool.close(c),
            _ => Err(self.mismatch()),
        }
    }
}

/// A connection from a [`Pool`]: a private engine connection or the shared facade.
#[derive(Debug, Clone)]
pub enum PoolConnection {
    File(Connection),
    Memory(SharedConnection),
}

macro_rules! dispatch {
    ($self:ident, $conn:ident => $body:expr) => {
        match $self {
            PoolConnection::File($conn) => $body,
            PoolConnection::Memory($conn) => $body,
        }
    };
}

macro_rules! dispatch_cursor {
    ($self:ident, $conn:ident => $body:expr) => {
        match $self {
            PoolConnection::File($conn) => $body.map(PoolCursor::File),
            PoolConnection::Memory($conn) => $body.map(PoolCursor::Memory),
        }
    };
}

impl DbConnection for PoolConnection {
    type Cursor = PoolCursor;

    fn cursor(&self) -> Result<PoolCursor> {
        dispatch_cursor!(self, c => c.cursor())
    }

    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<PoolCursor> {
        dispatch_cursor!(self, c => c.execute(sql, params))
    }

    fn executemany(&self, sql: &str, param_sets: &[Vec<SqlValue>]) -> Result<PoolCursor> {
        dispatch_cursor!(self, c => c.executemany(sql, param_sets))
    }

    fn executescript(&self, script: &str) -> Result<PoolCursor> {
        dispatch_cursor!(self, c => c.executescript(script))
    }

    fn commit(&self) -> Result<()> {
        dispatch!(self, c => c.commit())
    }

    fn rollback(&self) -> Result<()> {
        dispatch!(self, c => c.rollback())
    }

    fn close(&self) -> Result<()> {
        dispatch!(self, c => c.close())
    }

    fn create_function(&self, name: &str, n_args: i32, func: ScalarFunction) -> Result<()> {
        dispatch!(self, c => c.create_function(name, n_args, func))
    }

    fn interrupt(&self) {
        dispatch!(self, c => c.interrupt());
    }

    fn iterdump(&self) -> Result<Vec<String>> {
        dispatch!(self, c => c.iterdump())
    }

    fn isolation_level(&self) -> Result<Option<IsolationLevel>> {
        dispatch!(self, c => c.isolation_level())
    }

    fn set_isolation_level(&self, level: Option<IsolationLevel>) -> Result<()> {
        dispatch!(self, c => c.set_isolation_level(level))
    }

    fn total_changes(&self) -> Result<i64> {
        dispatch!(self, c => c.total_changes())
    }

    fn in_transaction(&self) -> Result<bool> {
        dispatch!(self, c => c.in_transaction())
    }
}

/// A cursor from a [`PoolConnection`].
#[derive(Debug)]
pub enum PoolCursor {
    File(Cursor),
    Memory(SharedCursor),
}

macro_rules! dispatch_rows {
    ($self:ident, $cur:ident => $body:expr) => {
        match $self {
            PoolCursor::File($cur) => $body,
            PoolCursor::Memory($cur) => $body,
        }
    };
}

impl DbCursor for PoolCursor {
    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<()> {
        dispatch_rows!(self, c => c.execute(sql, params))
    }

    fn executemany(&self, sql: &str, param_sets: &[Vec<SqlValue>]) -> Result<()> {
        dispatch_rows!(self, c => c.executemany(sql, param_sets))
    }

    fn executescript(&self, script: &str) -> Result<()> {
        dispatch_rows!(self, c => c.executescript(script))
    }

    fn fetchone(&self) -> Result<Option<Row>> {
        dispatch_rows!(self, c => c.fetchone())
    }

    fn fetchmany(&self, size: Option<usize>) -> Result<Vec<Row>> {
        dispatch_rows!(self, c => c.fetchmany(size))
    }

    fn fetchall(&self) -> Result<Vec<Row>> {
        dispatch_rows!(self, c => c.fetchall())
    }

    fn close(&self) -> Result<()> {
        dispatch_rows!(self, c => c.close())
    }

    fn rowcount(&self) -> Result<i64> {
        dispatch_rows!(self, c => c.rowcount())
    }

    fn lastrowid(&self) -> Result<Option<i64>> {
        dispatch_rows!(self, c => c.lastrowid())
    }

    fn description(&self) -> Result<Option<Arc<ColumnInfo>>> {
        dispatch_rows!(self, c => c.description())
    }

    fn arraysize(&self) -> Result<usize> {
        dispatch_rows!(self, c => c.arraysize())
    }

    fn set_arraysize(&self, size: usize) -> Result<()> {
        dispatch_rows!(self, c => c.set_arraysize(size))
    }
}
