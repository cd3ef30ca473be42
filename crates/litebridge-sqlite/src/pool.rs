//! Per-thread connection pool for file databases.
//!
//! Engine connections cannot cross threads, so each pool keeps at most one
//! open connection per (pool, thread) pair in thread-local storage. The
//! first `connect` on a thread opens it; later calls on the same thread
//! return the same connection until it is closed. Dropping the pool drops
//! the calling thread's connection; entries other threads hold for a dropped
//! pool are pruned on their next `connect`, or when the thread exits.

use crate::connection::{Connection, OpenFlags, SqliteConfig};
use crate::function;
use litebridge_core::{
    ConnectionPool, DbConnection, Error, Result,
    error::{ConnectionError, ConnectionErrorKind, PoolError, PoolErrorKind},
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CONNECTIONS: RefCell<HashMap<u64, Cached>> = RefCell::new(HashMap::new());
}

/// A thread's connection, tied to the liveness of the pool that opened it.
struct Cached {
    conn: Connection,
    pool: Weak<()>,
}

/// Hands each thread its own connection to one database file.
#[derive(Debug)]
pub struct ThreadLocalPool {
    id: u64,
    alive: Arc<()>,
    path: PathBuf,
    create: bool,
    config: SqliteConfig,
}

impl ThreadLocalPool {
    /// Create a pool for the file at `path`. Nothing is opened until the
    /// first [`connect`](ConnectionPool::connect).
    ///
    /// Relative paths are resolved against the current directory now, so a
    /// later directory change does not move the database.
    pub fn new(path: impl AsRef<Path>, create: bool) -> Result<Self> {
        let path = std::path::absolute(path.as_ref())?;
        let flags = if create {
            OpenFlags::create_read_write()
        } else {
            OpenFlags::read_write()
        };
        let config = SqliteConfig::file(path.to_string_lossy().into_owned()).flags(flags);
        Ok(Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            alive: Arc::new(()),
            path,
            create,
            config,
        })
    }

    /// Absolute path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn current(&self) -> Option<Connection> {
        CONNECTIONS.with(|map| map.borrow().get(&self.id).map(|c| c.conn.clone()))
    }

    /// Drop this thread's connections whose pool no longer exists.
    fn prune_dropped(&self) {
        let dead: Vec<Cached> = CONNECTIONS.with(|map| {
            let mut map = map.borrow_mut();
            let ids: Vec<u64> = map
                .iter()
                .filter(|(_, c)| c.pool.strong_count() == 0)
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| map.remove(id)).collect()
        });
        if !dead.is_empty() {
            tracing::debug!(count = dead.len(), "closing connections of dropped pools");
        }
    }

    fn forget(&self) {
        CONNECTIONS.with(|map| map.borrow_mut().remove(&self.id));
    }

    fn check_owned(&self, conn: &Connection) -> Result<()> {
        match self.current() {
            Some(current) if current.same_connection(conn) => Ok(()),
            _ => Err(Error::Pool(PoolError {
                kind: PoolErrorKind::NotOwned,
                message: format!(
                    "Connection is not owned by this pool on the current thread ({})",
                    self.path.display()
                ),
            })),
        }
    }
}

impl ConnectionPool for ThreadLocalPool {
    type Connection = Connection;

    #[tracing::instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    fn connect(&self) -> Result<Connection> {
        if let Some(conn) = self.current() {
            tracing::debug!("reusing pooled connection");
            return Ok(conn);
        }

        self.prune_dropped();
        if !self.create && !self.path.exists() {
            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::NotFound,
                message: format!("Database file is not found: {:?}", self.path),
                source: None,
            }));
        }

        let conn = Connection::open(&self.config)?;
        function::register_builtins(&conn)?;
        let cached = Cached {
            conn: conn.clone(),
            pool: Arc::downgrade(&self.alive),
        };
        CONNECTIONS.with(|map| map.borrow_mut().insert(self.id, cached));
        tracing::debug!("opened pooled connection");
        Ok(conn)
    }

    fn release(&self, conn: &Connection) -> Result<()> {
        self.check_owned(conn)?;
        if let Err(e) = conn.rollback() {
            tracing::warn!(error = %e, path = %self.path.display(), "rollback on release failed; discarding connection");
            self.forget();
            let _ = conn.close();
            return Err(e);
        }
        Ok(())
    }

    fn close(&self, conn: &Connection) -> Result<()> {
        self.check_owned(conn)?;
        self.forget();
        conn.close()
    }
}

impl Drop for ThreadLocalPool {
    fn drop(&mut self) {
        // Thread-local storage may already be gone during thread teardown
        let _ = CONNECTIONS.try_with(|map| map.borrow_mut().remove(&self.id));
    }
}
