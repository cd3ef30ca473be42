//! Thread-confined SQLite connections and cursors.
//!
//! A [`Connection`] wraps one engine handle and is deliberately `!Send`: the
//! handle may only ever be used by the thread that opened it. Sharing one
//! database across threads goes through [`crate::bridge`] instead.
//!
//! Transaction handling follows the classic DB-API model. With an isolation
//! level set, a `BEGIN <level>` is issued implicitly before the first
//! INSERT, UPDATE, DELETE or REPLACE outside a transaction, and nothing is
//! committed until [`Connection::commit`]. With no isolation level the
//! connection is in autocommit mode.

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::borrow_as_ptr)] // FFI requires raw pointers
#![allow(clippy::result_large_err)] // Error type is defined in litebridge-core

use crate::ffi;
use crate::function;
use crate::types;
use litebridge_core::{
    ColumnInfo, DbConnection, DbCursor, Error, IsolationLevel, Result, Row, ScalarFunction,
    SqlValue,
    error::{ConnectionError, ConnectionErrorKind, QueryError, QueryErrorKind},
};
use std::cell::{Cell, RefCell};
use std::ffi::{CStr, CString, c_char, c_int};
use std::ptr;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

/// Default number of rows returned by `fetchmany(None)`.
pub const DEFAULT_ARRAYSIZE: usize = 1;

/// Configuration for opening SQLite connections.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for in-memory database.
    pub path: String,
    /// Open flags (read-only, read-write, create, etc.)
    pub flags: OpenFlags,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
    /// Isolation level for implicit transactions; `None` for autocommit.
    pub isolation_level: Option<IsolationLevel>,
}

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    /// Open for reading only.
    pub read_only: bool,
    /// Open for reading and writing.
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
    /// Enable URI filename interpretation.
    pub uri: bool,
    /// Skip SQLite's internal mutexes; safe because handles never leave their thread.
    pub no_mutex: bool,
}

impl OpenFlags {
    /// Create flags for read-only access.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access (database must exist).
    pub fn read_write() -> Self {
        Self {
            read_write: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access with creation if needed.
    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    fn to_sqlite_flags(self) -> c_int {
        let mut flags = 0;

        if self.read_only {
            flags |= ffi::SQLITE_OPEN_READONLY;
        }
        if self.read_write {
            flags |= ffi::SQLITE_OPEN_READWRITE;
        }
        if self.create {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        if self.no_mutex {
            flags |= ffi::SQLITE_OPEN_NOMUTEX;
        }

        // Default to read-write if no mode specified
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }

        flags
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: 5000,
            isolation_level: Some(IsolationLevel::Deferred),
        }
    }
}

impl SqliteConfig {
    /// Create a new config for a file-based database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Create a new config for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Set open flags.
    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set busy timeout.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    /// Set the initial isolation level.
    pub fn isolation_level(mut self, level: Option<IsolationLevel>) -> Self {
        self.isolation_level = level;
        self
    }
}

struct InterruptTarget(*mut ffi::sqlite3);

// SAFETY: the pointer is only passed to sqlite3_interrupt, which SQLite
// documents as callable from any thread, and it is nulled under the same
// mutex before the handle is closed.
unsafe impl Send for InterruptTarget {}

/// Interrupts whatever statement is running on a connection, from any thread.
///
/// After the connection closes, interrupting is a no-op.
#[derive(Clone)]
pub struct InterruptHandle {
    target: Arc<Mutex<InterruptTarget>>,
}

impl InterruptHandle {
    pub fn interrupt(&self) {
        let target = match self.target.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !target.0.is_null() {
            // SAFETY: non-null means the handle is still open; closing takes
            // this lock first
            unsafe { ffi::sqlite3_interrupt(target.0) };
        }
    }

    fn clear(&self) {
        let mut target = match self.target.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        target.0 = ptr::null_mut();
    }
}

impl std::fmt::Debug for InterruptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptHandle").finish_non_exhaustive()
    }
}

struct RawConnection {
    db: Cell<*mut ffi::sqlite3>,
    path: String,
    isolation_level: Cell<Option<IsolationLevel>>,
    interrupt: InterruptHandle,
}

impl RawConnection {
    fn close(&self) -> Result<()> {
        let db = self.db.replace(ptr::null_mut());
        if db.is_null() {
            return Ok(());
        }
        self.interrupt.clear();
        // SAFETY: db was open; close_v2 defers the free until outstanding
        // statements are finalized
        let rc = unsafe { ffi::sqlite3_close_v2(db) };
        tracing::debug!(path = %self.path, "closed sqlite connection");
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Closed,
                message: format!("Failed to close database: {}", ffi::error_string(rc)),
                source: None,
            }))
        }
    }
}

impl Drop for RawConnection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// A connection to a SQLite database, confined to the thread that opened it.
///
/// Cloning is cheap and yields another handle to the same connection.
#[derive(Clone)]
pub struct Connection {
    raw: Rc<RawConnection>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("path", &self.raw.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Connection {
    /// Open a new SQLite connection with the given configuration.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: "Invalid path: contains null byte".to_string(),
                source: None,
            })
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = config.flags.to_sqlite_flags();

        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let msg = if db.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: db is a handle SQLite allocated for the failed open
                unsafe {
                    let msg = ffi::last_error_message(db);
                    ffi::sqlite3_close_v2(db);
                    msg
                }
            };

            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: format!("Failed to open database {:?}: {}", config.path, msg),
                source: None,
            }));
        }

        if config.busy_timeout_ms > 0 {
            let ms = c_int::try_from(config.busy_timeout_ms).unwrap_or(c_int::MAX);
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_busy_timeout(db, ms);
            }
        }

        tracing::debug!(path = %config.path, "opened sqlite connection");

        Ok(Self {
            raw: Rc::new(RawConnection {
                db: Cell::new(db),
                path: config.path.clone(),
                isolation_level: Cell::new(config.isolation_level),
                interrupt: InterruptHandle {
                    target: Arc::new(Mutex::new(InterruptTarget(db))),
                },
            }),
        })
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::memory())
    }

    /// Open a file-based database.
    pub fn open_file(path: impl Into<String>) -> Result<Self> {
        Self::open(&SqliteConfig::file(path))
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.raw.path
    }

    pub fn is_closed(&self) -> bool {
        self.raw.db.get().is_null()
    }

    /// Do both handles refer to the same underlying connection?
    pub fn same_connection(&self, other: &Connection) -> bool {
        Rc::ptr_eq(&self.raw, &other.raw)
    }

    /// A handle that can interrupt this connection from another thread.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.raw.interrupt.clone()
    }

    pub(crate) fn db(&self) -> Result<*mut ffi::sqlite3> {
        let db = self.raw.db.get();
        if db.is_null() {
            Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Closed,
                message: "Cannot operate on a closed database.".to_string(),
                source: None,
            }))
        } else {
            Ok(db)
        }
    }

    /// Execute SQL directly without preparing (for DDL, transaction control, scripts).
    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        let db = self.db()?;
        let c_sql = CString::new(sql).map_err(|_| nul_error(sql))?;

        let mut errmsg: *mut c_char = ptr::null_mut();

        // SAFETY: All pointers are valid
        let rc = unsafe { ffi::sqlite3_exec(db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg) };

        if rc != ffi::SQLITE_OK {
            let msg = if errmsg.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: errmsg was allocated by SQLite and must be freed by us
                unsafe {
                    let msg = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
                    ffi::sqlite3_free(errmsg.cast());
                    msg
                }
            };
            return Err(query_error(sql, rc, msg));
        }

        Ok(())
    }

    /// Get the last insert rowid.
    pub fn last_insert_rowid(&self) -> Result<i64> {
        let db = self.db()?;
        // SAFETY: db is valid
        Ok(unsafe { ffi::sqlite3_last_insert_rowid(db) })
    }

    /// Get the number of rows changed by the most recent statement.
    pub fn changes(&self) -> Result<i64> {
        let db = self.db()?;
        // SAFETY: db is valid
        Ok(i64::from(unsafe { ffi::sqlite3_changes(db) }))
    }

    /// Open the implicit transaction a data-modifying statement needs.
    fn begin_implicit(&self, sql: &str) -> Result<()> {
        let Some(level) = self.raw.isolation_level.get() else {
            return Ok(());
        };
        if !is_dml(sql) || self.in_transaction()? {
            return Ok(());
        }
        tracing::trace!(level = level.as_sql(), "beginning implicit transaction");
        self.execute_raw(&format!("BEGIN {}", level.as_sql()))
    }
}

impl DbConnection for Connection {
    type Cursor = Cursor;

    fn cursor(&self) -> Result<Cursor> {
        self.db()?;
        Ok(Cursor::new(self.clone()))
    }

    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<Cursor> {
        let cursor = self.cursor()?;
        cursor.execute(sql, params)?;
        Ok(cursor)
    }

    fn executemany(&self, sql: &str, param_sets: &[Vec<SqlValue>]) -> Result<Cursor> {
        let cursor = self.cursor()?;
        cursor.executemany(sql, param_sets)?;
        Ok(cursor)
    }

    fn executescript(&self, script: &str) -> Result<Cursor> {
        let cursor = self.cursor()?;
        cursor.executescript(script)?;
        Ok(cursor)
    }

    fn commit(&self) -> Result<()> {
        if self.in_transaction()? {
            self.execute_raw("COMMIT")?;
        }
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        if self.in_transaction()? {
            self.execute_raw("ROLLBACK")?;
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.raw.close()
    }

    fn create_function(&self, name: &str, n_args: i32, func: ScalarFunction) -> Result<()> {
        function::register(self, name, n_args, func)
    }

    fn interrupt(&self) {
        self.raw.interrupt.interrupt();
    }

    fn iterdump(&self) -> Result<Vec<String>> {
        crate::dump::iterdump(self)
    }

    fn isolation_level(&self) -> Result<Option<IsolationLevel>> {
        self.db()?;
        Ok(self.raw.isolation_level.get())
    }

    fn set_isolation_level(&self, level: Option<IsolationLevel>) -> Result<()> {
        if level.is_none() {
            self.commit()?;
        }
        self.raw.isolation_level.set(level);
        Ok(())
    }

    fn total_changes(&self) -> Result<i64> {
        let db = self.db()?;
        // SAFETY: db is valid
        Ok(i64::from(unsafe { ffi::sqlite3_total_changes(db) }))
    }

    fn in_transaction(&self) -> Result<bool> {
        let db = self.db()?;
        // SAFETY: db is valid
        Ok(unsafe { ffi::sqlite3_get_autocommit(db) } == 0)
    }
}

/// A prepared statement that may still have rows to produce.
struct Statement {
    raw: *mut ffi::sqlite3_stmt,
    sql: String,
    columns: Arc<ColumnInfo>,
}

impl Statement {
    fn prepare(db: *mut ffi::sqlite3, sql: &str) -> Result<Self> {
        let raw = prepare_stmt(db, sql)?;

        // SAFETY: raw is a freshly prepared statement
        let col_count = unsafe { ffi::sqlite3_column_count(raw) };
        let names = (0..col_count)
            .map(|i| {
                // SAFETY: i is within column_count
                unsafe { types::column_name(raw, i) }.unwrap_or_else(|| format!("col{i}"))
            })
            .collect();

        Ok(Self {
            raw,
            sql: sql.to_string(),
            columns: Arc::new(ColumnInfo::new(names)),
        })
    }

    fn bind_all(&self, db: *mut ffi::sqlite3, params: &[SqlValue]) -> Result<()> {
        // SAFETY: raw is valid
        let expected = unsafe { ffi::sqlite3_bind_parameter_count(self.raw) };
        if usize::try_from(expected).ok() != Some(params.len()) {
            return Err(misuse(
                &self.sql,
                format!(
                    "Incorrect number of bindings supplied. The current statement uses {}, and there are {} supplied.",
                    expected,
                    params.len()
                ),
            ));
        }
        for (i, param) in params.iter().enumerate() {
            let index = (i + 1) as c_int;
            // SAFETY: raw is valid, index is 1-based and within parameter count
            let rc = unsafe { types::bind_value(self.raw, index, param) };
            if rc != ffi::SQLITE_OK {
                return Err(bind_error(db, &self.sql, i + 1, rc));
            }
        }
        Ok(())
    }

    /// Reset for another execution with fresh bindings.
    fn reset(&self) {
        // SAFETY: raw is valid; the reset result repeats the last step error,
        // which was already reported
        unsafe { ffi::sqlite3_reset(self.raw) };
    }

    /// Step once, returning the row produced, if any.
    fn step(&self, db: *mut ffi::sqlite3) -> Result<Option<Row>> {
        // SAFETY: raw is valid
        let rc = unsafe { ffi::sqlite3_step(self.raw) };
        match rc {
            ffi::SQLITE_ROW => {
                let values = (0..self.columns.len())
                    .map(|i| {
                        // SAFETY: raw just returned SQLITE_ROW, i is a valid column
                        unsafe { types::read_column(self.raw, i as c_int) }
                    })
                    .collect();
                Ok(Some(Row::with_columns(Arc::clone(&self.columns), values)))
            }
            ffi::SQLITE_DONE => Ok(None),
            _ => Err(step_error(db, &self.sql)),
        }
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        // SAFETY: raw is valid and finalized exactly once; finalizing after
        // close_v2 is what lets SQLite release the zombie handle
        unsafe { ffi::sqlite3_finalize(self.raw) };
    }
}

struct CursorState {
    stmt: Option<Statement>,
    /// First row, stepped during execute
    pending: Option<Row>,
    description: Option<Arc<ColumnInfo>>,
    rowcount: i64,
    lastrowid: Option<i64>,
    arraysize: usize,
    closed: bool,
}

/// Results and bookkeeping for statements run on a [`Connection`].
///
/// Rows are produced lazily: each fetch steps the underlying statement.
pub struct Cursor {
    conn: Connection,
    state: RefCell<CursorState>,
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("conn", &self.conn)
            .finish_non_exhaustive()
    }
}

impl Cursor {
    fn new(conn: Connection) -> Self {
        Self {
            conn,
            state: RefCell::new(CursorState {
                stmt: None,
                pending: None,
                description: None,
                rowcount: -1,
                lastrowid: None,
                arraysize: DEFAULT_ARRAYSIZE,
                closed: false,
            }),
        }
    }

    /// The connection this cursor runs on.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Fail if either the cursor or its connection has been closed.
    fn check_open(&self) -> Result<*mut ffi::sqlite3> {
        if self.state.borrow().closed {
            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Closed,
                message: "Cannot operate on a closed cursor.".to_string(),
                source: None,
            }));
        }
        self.conn.db()
    }

    fn reset_state(state: &mut CursorState) {
        state.stmt = None;
        state.pending = None;
        state.description = None;
        state.rowcount = -1;
    }

    fn next_row(&self) -> Result<Option<Row>> {
        let db = self.check_open()?;
        let mut state = self.state.borrow_mut();
        if let Some(row) = state.pending.take() {
            return Ok(Some(row));
        }
        let Some(stmt) = state.stmt.as_ref() else {
            return Ok(None);
        };
        match stmt.step(db) {
            Ok(Some(row)) => Ok(Some(row)),
            Ok(None) => {
                state.stmt = None;
                Ok(None)
            }
            Err(e) => {
                state.stmt = None;
                Err(e)
            }
        }
    }
}

impl DbCursor for Cursor {
    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<()> {
        let db = self.check_open()?;
        Self::reset_state(&mut self.state.borrow_mut());

        let stmt = Statement::prepare(db, sql)?;
        stmt.bind_all(db, params)?;
        self.conn.begin_implicit(sql)?;
        let first = stmt.step(db)?;

        let mut state = self.state.borrow_mut();
        if !stmt.columns.is_empty() {
            state.description = Some(Arc::clone(&stmt.columns));
        }
        if is_dml(sql) {
            state.rowcount = self.conn.changes()?;
        }
        if is_insert(sql) {
            state.lastrowid = Some(self.conn.last_insert_rowid()?);
        }
        if first.is_some() {
            state.pending = first;
            state.stmt = Some(stmt);
        }
        Ok(())
    }

    fn executemany(&self, sql: &str, param_sets: &[Vec<SqlValue>]) -> Result<()> {
        let db = self.check_open()?;
        Self::reset_state(&mut self.state.borrow_mut());

        if !is_dml(sql) {
            return Err(misuse(sql, "executemany() can only execute DML statements."));
        }
        let stmt = Statement::prepare(db, sql)?;
        self.conn.begin_implicit(sql)?;

        let mut total = 0;
        for params in param_sets {
            stmt.reset();
            stmt.bind_all(db, params)?;
            while stmt.step(db)?.is_some() {}
            total += self.conn.changes()?;
        }

        let mut state = self.state.borrow_mut();
        state.rowcount = total;
        if is_insert(sql) && !param_sets.is_empty() {
            state.lastrowid = Some(self.conn.last_insert_rowid()?);
        }
        Ok(())
    }

    fn executescript(&self, script: &str) -> Result<()> {
        self.check_open()?;
        Self::reset_state(&mut self.state.borrow_mut());
        self.conn.commit()?;
        self.conn.execute_raw(script)
    }

    fn fetchone(&self) -> Result<Option<Row>> {
        self.next_row()
    }

    fn fetchmany(&self, size: Option<usize>) -> Result<Vec<Row>> {
        let size = match size {
            Some(n) => n,
            None => self.arraysize()?,
        };
        let mut rows = Vec::with_capacity(size);
        while rows.len() < size {
            match self.next_row()? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        Ok(rows)
    }

    fn fetchall(&self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row()? {
            rows.push(row);
        }
        Ok(rows)
    }

    fn close(&self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.stmt = None;
        state.pending = None;
        state.closed = true;
        Ok(())
    }

    fn rowcount(&self) -> Result<i64> {
        Ok(self.state.borrow().rowcount)
    }

    fn lastrowid(&self) -> Result<Option<i64>> {
        Ok(self.state.borrow().lastrowid)
    }

    fn description(&self) -> Result<Option<Arc<ColumnInfo>>> {
        Ok(self.state.borrow().description.clone())
    }

    fn arraysize(&self) -> Result<usize> {
        Ok(self.state.borrow().arraysize)
    }

    fn set_arraysize(&self, size: usize) -> Result<()> {
        self.state.borrow_mut().arraysize = size;
        Ok(())
    }
}

/// First keyword of a statement, uppercased, skipping leading whitespace
/// and `--` comments.
/// Skip leading whitespace and comments, and also `;` when `semicolons` is set.
fn skip_trivia(sql: &str, semicolons: bool) -> &str {
    let mut rest = sql;
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || (semicolons && c == ';'));
        if let Some(comment) = rest.strip_prefix("--") {
            rest = comment.find('\n').map_or("", |end| &comment[end + 1..]);
        } else if let Some(comment) = rest.strip_prefix("/*") {
            rest = comment.find("*/").map_or("", |end| &comment[end + 2..]);
        } else {
            return rest;
        }
    }
}

fn leading_keyword(sql: &str) -> String {
    skip_trivia(sql, false)
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or("")
        .to_ascii_uppercase()
}

fn is_dml(sql: &str) -> bool {
    matches!(
        leading_keyword(sql).as_str(),
        "INSERT" | "UPDATE" | "DELETE" | "REPLACE"
    )
}

fn is_insert(sql: &str) -> bool {
    matches!(leading_keyword(sql).as_str(), "INSERT" | "REPLACE")
}

fn prepare_stmt(db: *mut ffi::sqlite3, sql: &str) -> Result<*mut ffi::sqlite3_stmt> {
    let c_sql = CString::new(sql).map_err(|_| nul_error(sql))?;
    let len = c_int::try_from(c_sql.as_bytes().len())
        .map_err(|_| query_error(sql, ffi::SQLITE_TOOBIG, "SQL statement is too long".to_string()))?;

    let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
    let mut tail: *const c_char = ptr::null();

    // SAFETY: All pointers are valid
    let rc = unsafe { ffi::sqlite3_prepare_v2(db, c_sql.as_ptr(), len, &mut stmt, &mut tail) };

    if rc != ffi::SQLITE_OK {
        return Err(prepare_error(db, sql));
    }
    if stmt.is_null() {
        return Err(misuse(sql, "SQL text contains no statement."));
    }

    let consumed = if tail.is_null() {
        c_sql.as_bytes().len()
    } else {
        (tail as usize).saturating_sub(c_sql.as_ptr() as usize)
    };
    let remainder = sql.get(consumed..).unwrap_or("");
    if !skip_trivia(remainder, true).is_empty() {
        // SAFETY: stmt is valid and not yet handed out
        unsafe { ffi::sqlite3_finalize(stmt) };
        return Err(misuse(sql, "You can only execute one statement at a time."));
    }

    Ok(stmt)
}

fn prepare_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    // SAFETY: db is valid
    let (msg, code) = unsafe { (ffi::last_error_message(db), ffi::sqlite3_errcode(db)) };
    query_error(sql, code, msg)
}

fn bind_error(db: *mut ffi::sqlite3, sql: &str, param_index: usize, rc: c_int) -> Error {
    // SAFETY: db is valid
    let msg = unsafe { ffi::last_error_message(db) };
    Error::Query(QueryError {
        kind: error_code_to_kind(rc, &msg),
        sql: Some(sql.to_string()),
        message: format!("Failed to bind parameter {}: {}", param_index, msg),
        code: Some(rc),
    })
}

fn step_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    // SAFETY: db is valid
    let (msg, code) = unsafe { (ffi::last_error_message(db), ffi::sqlite3_errcode(db)) };
    query_error(sql, code, msg)
}

fn query_error(sql: &str, code: c_int, message: String) -> Error {
    Error::Query(QueryError {
        kind: error_code_to_kind(code, &message),
        sql: Some(sql.to_string()),
        message,
        code: Some(code & 0xff),
    })
}

fn nul_error(sql: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Syntax,
        sql: Some(sql.to_string()),
        message: "SQL contains null byte".to_string(),
        code: None,
    })
}

fn misuse(sql: &str, message: impl Into<String>) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Misuse,
        sql: Some(sql.to_string()),
        message: message.into(),
        code: None,
    })
}

fn error_code_to_kind(code: c_int, message: &str) -> QueryErrorKind {
    match code & 0xff {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => QueryErrorKind::Busy,
        ffi::SQLITE_PERM | ffi::SQLITE_AUTH => QueryErrorKind::Permission,
        ffi::SQLITE_NOTFOUND => QueryErrorKind::NotFound,
        ffi::SQLITE_TOOBIG => QueryErrorKind::DataTruncation,
        ffi::SQLITE_INTERRUPT => QueryErrorKind::Interrupted,
        ffi::SQLITE_MISUSE | ffi::SQLITE_RANGE => QueryErrorKind::Misuse,
        ffi::SQLITE_ERROR if message.contains("syntax error") => QueryErrorKind::Syntax,
        ffi::SQLITE_ERROR if message.starts_with("no such") => QueryErrorKind::NotFound,
        _ => QueryErrorKind::Database,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> Connection {
        let conn = Connection::open_memory().unwrap();
        conn.execute_raw("CREATE TABLE person (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)")
            .unwrap();
        conn
    }

    #[test]
    fn test_open_memory() {
        let conn = Connection::open_memory().unwrap();
        assert_eq!(conn.path(), ":memory:");
        assert!(!conn.is_closed());
    }

    #[test]
    fn test_open_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.db");
        let config =
            SqliteConfig::file(path.to_string_lossy().into_owned()).flags(OpenFlags::read_write());
        let err = Connection::open(&config).unwrap_err();
        assert!(matches!(
            err,
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                ..
            })
        ));
    }

    #[test]
    fn test_execute_and_fetch() {
        let conn = people();
        conn.execute(
            "INSERT INTO person (name, age) VALUES (?, ?)",
            &[SqlValue::from("Alice"), SqlValue::Integer(30)],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO person (name, age) VALUES (?, ?)",
            &[SqlValue::from("Bob"), SqlValue::Null],
        )
        .unwrap();

        let cursor = conn
            .execute("SELECT name, age FROM person ORDER BY id", &[])
            .unwrap();
        let description = cursor.description().unwrap().unwrap();
        assert_eq!(description.names(), ["name", "age"]);

        let first = cursor.fetchone().unwrap().unwrap();
        assert_eq!(first.get_by_name("name"), Some(&SqlValue::from("Alice")));
        let rest = cursor.fetchall().unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].get(1), Some(&SqlValue::Null));
        assert!(cursor.fetchone().unwrap().is_none());
    }

    #[test]
    fn test_rowcount_and_lastrowid() {
        let conn = people();
        let cursor = conn
            .execute("INSERT INTO person (name) VALUES ('A')", &[])
            .unwrap();
        assert_eq!(cursor.rowcount().unwrap(), 1);
        assert_eq!(cursor.lastrowid().unwrap(), Some(1));

        conn.execute("INSERT INTO person (name) VALUES ('B')", &[])
            .unwrap();
        let cursor = conn.execute("UPDATE person SET age = 1", &[]).unwrap();
        assert_eq!(cursor.rowcount().unwrap(), 2);

        let cursor = conn.execute("SELECT * FROM person", &[]).unwrap();
        assert_eq!(cursor.rowcount().unwrap(), -1);
    }

    #[test]
    fn test_executemany() {
        let conn = people();
        let cursor = conn
            .executemany(
                "INSERT INTO person (name) VALUES (?)",
                &[
                    vec![SqlValue::from("a")],
                    vec![SqlValue::from("b")],
                    vec![SqlValue::from("c")],
                ],
            )
            .unwrap();
        assert_eq!(cursor.rowcount().unwrap(), 3);
        assert_eq!(cursor.lastrowid().unwrap(), Some(3));

        let err = conn
            .executemany("SELECT ?", &[vec![SqlValue::Integer(1)]])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Query(QueryError {
                kind: QueryErrorKind::Misuse,
                ..
            })
        ));
    }

    #[test]
    fn test_fetchmany_uses_arraysize() {
        let conn = Connection::open_memory().unwrap();
        let cursor = conn
            .execute(
                "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < 5) SELECT x FROM n",
                &[],
            )
            .unwrap();
        assert_eq!(cursor.fetchmany(None).unwrap().len(), 1);
        cursor.set_arraysize(3).unwrap();
        assert_eq!(cursor.fetchmany(None).unwrap().len(), 3);
        assert_eq!(cursor.fetchmany(Some(10)).unwrap().len(), 1);
    }

    #[test]
    fn test_implicit_transaction() {
        let conn = people();
        assert!(!conn.in_transaction().unwrap());
        conn.execute("INSERT INTO person (name) VALUES ('A')", &[])
            .unwrap();
        assert!(conn.in_transaction().unwrap());
        conn.rollback().unwrap();

        let rows = conn
            .execute("SELECT count(*) FROM person", &[])
            .unwrap()
            .fetchall()
            .unwrap();
        assert_eq!(rows[0].get(0), Some(&SqlValue::Integer(0)));

        conn.execute("INSERT INTO person (name) VALUES ('B')", &[])
            .unwrap();
        conn.commit().unwrap();
        assert!(!conn.in_transaction().unwrap());
        assert_eq!(conn.total_changes().unwrap(), 2);
    }

    #[test]
    fn test_autocommit_mode() {
        let conn = people();
        conn.execute("INSERT INTO person (name) VALUES ('A')", &[])
            .unwrap();
        assert!(conn.in_transaction().unwrap());

        // Switching to autocommit commits the open transaction first.
        conn.set_isolation_level(None).unwrap();
        assert!(!conn.in_transaction().unwrap());
        conn.execute("INSERT INTO person (name) VALUES ('B')", &[])
            .unwrap();
        assert!(!conn.in_transaction().unwrap());
        assert_eq!(conn.isolation_level().unwrap(), None);
    }

    #[test]
    fn test_binding_count_mismatch() {
        let conn = people();
        let err = conn
            .execute("INSERT INTO person (name, age) VALUES (?, ?)", &[SqlValue::Null])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Query error: Incorrect number of bindings supplied. The current statement uses 2, and there are 1 supplied."
        );
    }

    #[test]
    fn test_one_statement_at_a_time() {
        let conn = people();
        let err = conn.execute("SELECT 1; SELECT 2", &[]).unwrap_err();
        assert!(matches!(
            err,
            Error::Query(QueryError {
                kind: QueryErrorKind::Misuse,
                ..
            })
        ));
        assert!(conn.execute("SELECT 1;  ", &[]).is_ok());
        assert!(conn.execute("SELECT 1; -- note", &[]).is_ok());
        assert!(conn.execute("SELECT 1; /* trailing */ ;\n", &[]).is_ok());
        assert!(conn.execute("SELECT 1; /* first */ SELECT 2", &[]).is_err());
    }

    #[test]
    fn test_error_kinds() {
        let conn = people();
        let err = conn.execute("SELEC 1", &[]).unwrap_err();
        assert!(matches!(
            err,
            Error::Query(QueryError {
                kind: QueryErrorKind::Syntax,
                ..
            })
        ));
        assert_eq!(err.sql(), Some("SELEC 1"));

        let err = conn.execute("SELECT * FROM nowhere", &[]).unwrap_err();
        assert!(matches!(
            err,
            Error::Query(QueryError {
                kind: QueryErrorKind::NotFound,
                ..
            })
        ));

        conn.execute("INSERT INTO person (id, name) VALUES (1, 'a')", &[])
            .unwrap();
        let err = conn
            .execute("INSERT INTO person (id, name) VALUES (1, 'b')", &[])
            .unwrap_err();
        match err {
            Error::Query(q) => assert!(q.is_constraint_violation()),
            other => panic!("expected query error, got {other:?}"),
        }
    }

    #[test]
    fn test_executescript_commits_first() {
        let conn = people();
        conn.execute("INSERT INTO person (name) VALUES ('A')", &[])
            .unwrap();
        assert!(conn.in_transaction().unwrap());
        conn.executescript(
            "CREATE TABLE pet (name TEXT); INSERT INTO pet VALUES ('rex'); INSERT INTO pet VALUES ('tom');",
        )
        .unwrap();
        assert!(!conn.in_transaction().unwrap());
        conn.rollback().unwrap();

        let rows = conn
            .execute("SELECT count(*) FROM person", &[])
            .unwrap()
            .fetchall()
            .unwrap();
        assert_eq!(rows[0].get(0), Some(&SqlValue::Integer(1)));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let conn = Connection::open_memory().unwrap();
        let row = conn
            .execute("SELECT CAST(x'61ff62' AS TEXT)", &[])
            .unwrap()
            .fetchone()
            .unwrap()
            .unwrap();
        assert_eq!(row.get(0), Some(&SqlValue::Text("a\u{FFFD}b".into())));
    }

    #[test]
    fn test_closed_connection_and_cursor() {
        let conn = people();
        let cursor = conn.cursor().unwrap();
        cursor.close().unwrap();
        assert!(matches!(
            cursor.execute("SELECT 1", &[]).unwrap_err(),
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Closed,
                ..
            })
        ));

        let open_cursor = conn.execute("SELECT 1 UNION ALL SELECT 2", &[]).unwrap();
        conn.close().unwrap();
        conn.close().unwrap();
        assert!(conn.is_closed());
        assert!(open_cursor.fetchone().is_err());
        assert!(conn.cursor().is_err());
        // Interrupting a closed connection does nothing.
        conn.interrupt();
    }

    #[test]
    fn test_leading_keyword() {
        assert_eq!(leading_keyword("  insert into t values (1)"), "INSERT");
        assert_eq!(leading_keyword("-- note\nUPDATE t SET x = 1"), "UPDATE");
        assert_eq!(leading_keyword("SELECT(1)"), "SELECT");
        assert_eq!(leading_keyword("/* a */ -- b\n delete from t"), "DELETE");
        assert!(is_dml("replace into t values (1)"));
        assert!(!is_dml("CREATE TABLE t (x)"));
    }

    #[test]
    fn test_clones_share_connection() {
        let conn = Connection::open_memory().unwrap();
        let other = conn.clone();
        assert!(conn.same_connection(&other));
        assert!(!conn.same_connection(&Connection::open_memory().unwrap()));
    }
}
