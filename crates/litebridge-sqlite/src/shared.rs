//! Facades over the worker-owned connection, and the process-wide shared
//! in-memory database.
//!
//! [`SharedConnection`] and [`SharedCursor`] implement the same traits as the
//! real [`Connection`](crate::Connection) and [`Cursor`](crate::Cursor), but
//! every call is shipped to the worker through the [`Bridge`]. The one
//! exception is [`interrupt`](DbConnection::interrupt), which must reach the
//! engine while the worker is busy and so goes straight to it.

use crate::bridge::{Bridge, CursorId};
use crate::connection::SqliteConfig;
use litebridge_core::{
    ColumnInfo, ConnectionPool, DbConnection, DbCursor, Error, IsolationLevel, Result, Row,
    ScalarFunction, SqlValue,
    error::{PoolError, PoolErrorKind},
};
use std::sync::{Arc, Mutex, MutexGuard};

/// A connection whose calls all run on the worker thread.
///
/// Cheap to clone and safe to share between threads.
#[derive(Debug, Clone)]
pub struct SharedConnection {
    bridge: Arc<Bridge>,
}

impl SharedConnection {
    /// Start a dedicated worker with its own connection.
    pub fn spawn(config: SqliteConfig) -> Result<Self> {
        Ok(Self {
            bridge: Arc::new(Bridge::spawn(config)?),
        })
    }

    /// Do both facades forward to the same worker?
    pub fn same_connection(&self, other: &SharedConnection) -> bool {
        Arc::ptr_eq(&self.bridge, &other.bridge)
    }

    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    /// Stop the worker after everything already queued has run.
    pub fn shutdown(&self) -> Result<()> {
        self.bridge.shutdown()
    }

    fn wrap(&self, id: CursorId) -> SharedCursor {
        SharedCursor {
            bridge: Arc::clone(&self.bridge),
            id,
        }
    }
}

impl DbConnection for SharedConnection {
    type Cursor = SharedCursor;

    fn cursor(&self) -> Result<SharedCursor> {
        let id = self.bridge.submit("cursor", |res| {
            let cursor = res.connection().cursor()?;
            Ok(res.insert_cursor(cursor))
        })?;
        Ok(self.wrap(id))
    }

    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<SharedCursor> {
        let sql = sql.to_string();
        let params = params.to_vec();
        let id = self.bridge.submit("execute", move |res| {
            let cursor = res.connection().execute(&sql, &params)?;
            Ok(res.insert_cursor(cursor))
        })?;
        Ok(self.wrap(id))
    }

    fn executemany(&self, sql: &str, param_sets: &[Vec<SqlValue>]) -> Result<SharedCursor> {
        let sql = sql.to_string();
        let param_sets = param_sets.to_vec();
        let id = self.bridge.submit("executemany", move |res| {
            let cursor = res.connection().executemany(&sql, &param_sets)?;
            Ok(res.insert_cursor(cursor))
        })?;
        Ok(self.wrap(id))
    }

    fn executescript(&self, script: &str) -> Result<SharedCursor> {
        let script = script.to_string();
        let id = self.bridge.submit("executescript", move |res| {
            let cursor = res.connection().executescript(&script)?;
            Ok(res.insert_cursor(cursor))
        })?;
        Ok(self.wrap(id))
    }

    fn commit(&self) -> Result<()> {
        self.bridge.submit("commit", |res| res.connection().commit())
    }

    fn rollback(&self) -> Result<()> {
        self.bridge.submit("rollback", |res| res.connection().rollback())
    }

    fn close(&self) -> Result<()> {
        self.bridge.submit("close", |res| res.connection().close())
    }

    fn create_function(&self, name: &str, n_args: i32, func: ScalarFunction) -> Result<()> {
        let name = name.to_string();
        self.bridge.submit("create_function", move |res| {
            res.connection().create_function(&name, n_args, func)
        })
    }

    fn interrupt(&self) {
        self.bridge.interrupt();
    }

    fn iterdump(&self) -> Result<Vec<String>> {
        self.bridge.submit("iterdump", |res| res.connection().iterdump())
    }

    fn isolation_level(&self) -> Result<Option<IsolationLevel>> {
        self.bridge
            .submit("isolation_level", |res| res.connection().isolation_level())
    }

    fn set_isolation_level(&self, level: Option<IsolationLevel>) -> Result<()> {
        self.bridge.submit("set_isolation_level", move |res| {
            res.connection().set_isolation_level(level)
        })
    }

    fn total_changes(&self) -> Result<i64> {
        self.bridge
            .submit("total_changes", |res| res.connection().total_changes())
    }

    fn in_transaction(&self) -> Result<bool> {
        self.bridge
            .submit("in_transaction", |res| res.connection().in_transaction())
    }
}

/// A cursor living on the worker thread.
///
/// Dropping the facade releases the worker-side cursor without waiting.
#[derive(Debug)]
pub struct SharedCursor {
    bridge: Arc<Bridge>,
    id: CursorId,
}

impl SharedCursor {
    pub fn id(&self) -> CursorId {
        self.id
    }
}

impl Drop for SharedCursor {
    fn drop(&mut self) {
        let id = self.id;
        self.bridge.post("release_cursor", move |res| {
            res.remove_cursor(id);
        });
    }
}

impl DbCursor for SharedCursor {
    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<()> {
        let sql = sql.to_string();
        let params = params.to_vec();
        self.bridge
            .submit_cursor("cursor.execute", self.id, move |c| c.execute(&sql, &params))
    }

    fn executemany(&self, sql: &str, param_sets: &[Vec<SqlValue>]) -> Result<()> {
        let sql = sql.to_string();
        let param_sets = param_sets.to_vec();
        self.bridge.submit_cursor("cursor.executemany", self.id, move |c| {
            c.executemany(&sql, &param_sets)
        })
    }

    fn executescript(&self, script: &str) -> Result<()> {
        let script = script.to_string();
        self.bridge
            .submit_cursor("cursor.executescript", self.id, move |c| c.executescript(&script))
    }

    fn fetchone(&self) -> Result<Option<Row>> {
        self.bridge.submit_cursor("fetchone", self.id, |c| c.fetchone())
    }

    fn fetchmany(&self, size: Option<usize>) -> Result<Vec<Row>> {
        self.bridge
            .submit_cursor("fetchmany", self.id, move |c| c.fetchmany(size))
    }

    fn fetchall(&self) -> Result<Vec<Row>> {
        self.bridge.submit_cursor("fetchall", self.id, |c| c.fetchall())
    }

    fn close(&self) -> Result<()> {
        self.bridge.submit_cursor("cursor.close", self.id, |c| c.close())
    }

    fn rowcount(&self) -> Result<i64> {
        self.bridge.submit_cursor("rowcount", self.id, |c| c.rowcount())
    }

    fn lastrowid(&self) -> Result<Option<i64>> {
        self.bridge.submit_cursor("lastrowid", self.id, |c| c.lastrowid())
    }

    fn description(&self) -> Result<Option<Arc<ColumnInfo>>> {
        self.bridge
            .submit_cursor("description", self.id, |c| c.description())
    }

    fn arraysize(&self) -> Result<usize> {
        self.bridge.submit_cursor("arraysize", self.id, |c| c.arraysize())
    }

    fn set_arraysize(&self, size: usize) -> Result<()> {
        self.bridge
            .submit_cursor("set_arraysize", self.id, move |c| c.set_arraysize(size))
    }
}

static GLOBAL: Mutex<Option<SharedConnection>> = Mutex::new(None);

fn global_slot() -> MutexGuard<'static, Option<SharedConnection>> {
    match GLOBAL.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// The process-wide shared in-memory database.
pub struct SharedDatabase;

impl SharedDatabase {
    /// The shared connection, starting its worker on first use.
    ///
    /// Concurrent first calls all receive the same connection; only one of
    /// them starts the worker.
    pub fn global() -> Result<SharedConnection> {
        let mut slot = global_slot();
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }
        let conn = SharedConnection::spawn(SqliteConfig::memory())?;
        *slot = Some(conn.clone());
        Ok(conn)
    }

    pub fn is_running() -> bool {
        global_slot().is_some()
    }

    /// Stop the worker and clear the global slot; the next
    /// [`global`](Self::global) starts a fresh, empty database.
    pub fn shutdown() -> Result<()> {
        let conn = global_slot().take();
        match conn {
            Some(conn) => conn.shutdown(),
            None => Ok(()),
        }
    }
}

/// Pool for `":memory:"`: every thread gets the shared connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryPool;

impl MemoryPool {
    /// Is `conn` the shared connection currently in the global slot?
    fn check_owned(self, conn: &SharedConnection) -> Result<()> {
        match global_slot().as_ref() {
            Some(current) if current.same_connection(conn) => Ok(()),
            _ => Err(Error::Pool(PoolError {
                kind: PoolErrorKind::NotOwned,
                message: "Connection is not the shared in-memory database".to_string(),
            })),
        }
    }
}

impl ConnectionPool for MemoryPool {
    type Connection = SharedConnection;

    fn connect(&self) -> Result<SharedConnection> {
        SharedDatabase::global()
    }

    fn release(&self, conn: &SharedConnection) -> Result<()> {
        self.check_owned(conn)?;
        conn.rollback()
    }

    /// Rolls back only; closing would destroy the database for every thread.
    fn close(&self, conn: &SharedConnection) -> Result<()> {
        self.check_owned(conn)?;
        conn.rollback()
    }
}
