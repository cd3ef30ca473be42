//! Litebridge - a SQLite provider for object-relational mappers.
//!
//! Litebridge sits between an ORM's query layer and the embedded engine:
//!
//! - Typed converters that validate domain values and translate them to and
//!   from storage
//! - Per-thread connection pools for database files
//! - A process-wide shared in-memory database, owned by one worker thread and
//!   reachable from every thread through a call-marshalling bridge
//!
//! # Quick Start
//!
//! ```ignore
//! use litebridge::prelude::*;
//!
//! let pool = get_pool(":memory:", true)?;
//! let conn = pool.connect()?;
//! conn.executescript("CREATE TABLE person (id INTEGER PRIMARY KEY, age INTEGER)")?;
//!
//! let age = Attribute::new("Person", "age", ValueKind::Int)
//!     .option("min", 1)
//!     .option("max", 150);
//! let converter = get_converter(&age)?;
//!
//! let params = encode_params([(&converter, Value::Int(42))])?;
//! conn.execute("INSERT INTO person (age) VALUES (?)", &params)?;
//! conn.commit()?;
//! pool.release(&conn)?;
//! ```
//!
//! Connections from either kind of pool implement [`DbConnection`], so calling
//! code cannot tell the shared facade from a private connection.

pub mod provider;

pub use litebridge_core::{
    Attribute, ColumnInfo, ConnectionPool, Convert, Converter, ConverterType, DbConnection,
    DbCursor, Error, IsolationLevel, OptionValue, Result, Row, ScalarFunction, SqlValue,
    TextEncoding, Value, ValueKind, error,
};
pub use litebridge_sqlite::{
    Bridge, Connection, Cursor, InterruptHandle, MemoryPool, OpenFlags, SharedConnection,
    SharedCursor, SharedDatabase, SqliteConfig, ThreadLocalPool, sqlite_version,
};
pub use provider::{
    MAX_PARAMS_COUNT, MEMORY_LOCATION, PARAM_STYLE, Pool, PoolConnection, PoolCursor,
    ROW_VALUE_SYNTAX, decode_row, encode_params, get_converter, get_converter_for_kind, get_pool,
    last_rowid, load_attributes, placeholders, quote_name,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::provider::{
        Pool, PoolConnection, PoolCursor, decode_row, encode_params, get_converter,
        get_converter_for_kind, get_pool, last_rowid, placeholders, quote_name,
    };
    pub use litebridge_core::{
        Attribute, ConnectionPool, Converter, DbConnection, DbCursor, Error, Result, Row,
        SqlValue, Value, ValueKind,
    };
}
