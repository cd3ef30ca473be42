//! Embedded SQLite engine boundary for Litebridge.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! Everything that talks to the engine lives here:
//!
//! - [`Connection`] / [`Cursor`]: the real engine objects, confined to the
//!   thread that opened them
//! - [`ThreadLocalPool`]: one connection per thread for file databases
//! - [`Bridge`]: ships closures to a single worker thread and waits for the result
//! - [`SharedConnection`] / [`SharedCursor`]: facades that forward every call
//!   through the bridge, and [`SharedDatabase`] for the process-wide
//!   in-memory database
//!
//! # Example
//!
//! ```rust,ignore
//! use litebridge_core::{DbConnection, DbCursor, SqlValue};
//! use litebridge_sqlite::SharedDatabase;
//!
//! let conn = SharedDatabase::global()?;
//! conn.executescript("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")?;
//! conn.execute("INSERT INTO users (name) VALUES (?)", &[SqlValue::from("Alice")])?;
//! let rows = conn.execute("SELECT name FROM users", &[])?.fetchall()?;
//! ```
//!
//! # Type Mapping
//!
//! | `SqlValue` | SQLite storage class |
//! |-----------|-------------|
//! | `Integer(i64)` | INTEGER |
//! | `Real(f64)` | REAL |
//! | `Text(String)` | TEXT (read back as UTF-8, invalid bytes replaced) |
//! | `Blob(Vec<u8>)` | BLOB |
//! | `Null` | NULL |
//!
//! # Thread Safety
//!
//! `Connection` and `Cursor` are `!Send`. `SharedConnection`, `SharedCursor`
//! and `InterruptHandle` are `Send + Sync`.

pub mod bridge;
pub mod connection;
pub mod dump;
pub mod ffi;
pub mod function;
pub mod pool;
pub mod shared;
pub mod types;

pub use bridge::{Bridge, CursorId, Resources};
pub use connection::{Connection, Cursor, InterruptHandle, OpenFlags, SqliteConfig};
pub use dump::quote_name;
pub use function::register_builtins;
pub use pool::ThreadLocalPool;
pub use shared::{MemoryPool, SharedConnection, SharedCursor, SharedDatabase};

/// Re-export the SQLite library version.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}

/// Re-export the SQLite library version number.
pub fn sqlite_version_number() -> i32 {
    ffi::version_number()
}
