//! Call-marshalling bridge to a single worker thread.
//!
//! The worker owns one engine [`Connection`] plus every cursor created on it.
//! Callers on any thread [`submit`](Bridge::submit) closures over those
//! resources; closures run one at a time, in the order they were queued, and
//! the caller blocks on a private one-shot channel until its own result
//! arrives. An operation's error comes back unchanged.
//!
//! ```text
//! caller A ──┐                        ┌─> reply A
//!            ├─> FIFO queue ─> worker ┤
//! caller B ──┘                        └─> reply B
//! ```

use crate::connection::{Connection, Cursor, InterruptHandle, SqliteConfig};
use crate::function;
use litebridge_core::{
    BridgeError, Error, Result,
    error::{ConnectionError, ConnectionErrorKind},
};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, mpsc};
use std::thread::{self, JoinHandle, ThreadId};

/// Name of the worker thread.
pub const WORKER_THREAD_NAME: &str = "sqlite-memory-db";

/// Identifies a cursor owned by the worker.
pub type CursorId = u64;

/// Everything the worker owns. Only ever touched on the worker thread.
pub struct Resources {
    connection: Connection,
    cursors: HashMap<CursorId, Cursor>,
    next_cursor: CursorId,
}

impl Resources {
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Take ownership of `cursor` and hand back its id.
    pub fn insert_cursor(&mut self, cursor: Cursor) -> CursorId {
        self.next_cursor += 1;
        self.cursors.insert(self.next_cursor, cursor);
        self.next_cursor
    }

    pub fn cursor(&self, id: CursorId) -> Result<&Cursor> {
        self.cursors.get(&id).ok_or_else(|| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Closed,
                message: "Cannot operate on a closed cursor.".to_string(),
                source: None,
            })
        })
    }

    pub fn remove_cursor(&mut self, id: CursorId) -> Option<Cursor> {
        self.cursors.remove(&id)
    }

    /// Number of live worker-side cursors.
    pub fn cursor_count(&self) -> usize {
        self.cursors.len()
    }
}

type Operation = Box<dyn FnOnce(&mut Resources) + Send>;

enum Message {
    Call {
        name: &'static str,
        seq: u64,
        operation: Operation,
    },
    Shutdown,
}

/// Handle to the worker thread and its queue.
pub struct Bridge {
    sender: mpsc::Sender<Message>,
    interrupt: InterruptHandle,
    worker_id: ThreadId,
    worker: Mutex<Option<JoinHandle<()>>>,
    seq: AtomicU64,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("worker_id", &self.worker_id)
            .finish_non_exhaustive()
    }
}

impl Bridge {
    /// Start a worker thread that opens a connection with `config`.
    ///
    /// Returns once the connection is open, or with the error that
    /// prevented opening it.
    pub fn spawn(config: SqliteConfig) -> Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        let worker = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || run_worker(&config, &receiver, &ready_tx))?;
        let worker_id = worker.thread().id();

        let interrupt = match ready_rx.recv() {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                let _ = worker.join();
                return Err(e);
            }
            Err(_) => {
                let _ = worker.join();
                return Err(BridgeError::worker_stopped("open").into());
            }
        };

        Ok(Self {
            sender,
            interrupt,
            worker_id,
            worker: Mutex::new(Some(worker)),
            seq: AtomicU64::new(0),
        })
    }

    /// Is the current thread the worker?
    pub fn on_worker_thread(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    /// Run `operation` on the worker and wait for its result.
    pub fn submit<T, F>(&self, name: &'static str, operation: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Resources) -> Result<T> + Send + 'static,
    {
        if self.on_worker_thread() {
            return Err(BridgeError::reentrant(name).into());
        }

        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        let call: Operation = Box::new(move |resources| {
            let result = panic::catch_unwind(AssertUnwindSafe(|| operation(resources)))
                .unwrap_or_else(|_| Err(BridgeError::panicked(name).into()));
            // The caller only disappears if its thread died while waiting
            let _ = reply_tx.send(result);
        });

        self.enqueue(name, call)?;
        reply_rx
            .recv()
            .map_err(|_| BridgeError::worker_stopped(name))?
    }

    /// Run `operation` against one worker-side cursor and wait for its result.
    pub fn submit_cursor<T, F>(&self, name: &'static str, id: CursorId, operation: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Cursor) -> Result<T> + Send + 'static,
    {
        self.submit(name, move |resources| operation(resources.cursor(id)?))
    }

    /// Queue `operation` without waiting for it. Failures are logged.
    pub fn post<F>(&self, name: &'static str, operation: F)
    where
        F: FnOnce(&mut Resources) + Send + 'static,
    {
        let call: Operation = Box::new(move |resources| {
            if panic::catch_unwind(AssertUnwindSafe(|| operation(resources))).is_err() {
                tracing::warn!(operation = name, "posted operation panicked");
            }
        });
        if self.enqueue(name, call).is_err() {
            tracing::trace!(operation = name, "worker stopped; dropping posted operation");
        }
    }

    fn enqueue(&self, name: &'static str, operation: Operation) -> Result<()> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.sender
            .send(Message::Call {
                name,
                seq,
                operation,
            })
            .map_err(|_| Error::from(BridgeError::worker_stopped(name)))
    }

    /// Interrupt whatever the worker is running right now, without queueing.
    pub fn interrupt(&self) {
        self.interrupt.interrupt();
    }

    /// Push the stop sentinel and wait for the worker to drain the queue.
    ///
    /// Operations queued before the sentinel still run. Calling this more
    /// than once is harmless.
    pub fn shutdown(&self) -> Result<()> {
        let _ = self.sender.send(Message::Shutdown);
        if self.on_worker_thread() {
            return Ok(());
        }
        let worker = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(worker) = worker {
            worker
                .join()
                .map_err(|_| Error::from(BridgeError::panicked("shutdown")))?;
        }
        Ok(())
    }

    /// Has the worker thread exited?
    pub fn is_stopped(&self) -> bool {
        match self.worker.lock() {
            Ok(guard) => guard.as_ref().is_none_or(JoinHandle::is_finished),
            Err(_) => true,
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn open_resources(config: &SqliteConfig) -> Result<Resources> {
    let connection = Connection::open(config)?;
    function::register_builtins(&connection)?;
    Ok(Resources {
        connection,
        cursors: HashMap::new(),
        next_cursor: 0,
    })
}

fn run_worker(
    config: &SqliteConfig,
    receiver: &mpsc::Receiver<Message>,
    ready: &mpsc::SyncSender<Result<InterruptHandle>>,
) {
    let mut resources = match open_resources(config) {
        Ok(resources) => resources,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let _ = ready.send(Ok(resources.connection.interrupt_handle()));
    tracing::info!(path = %config.path, "shared database worker started");

    while let Ok(message) = receiver.recv() {
        match message {
            Message::Call {
                name,
                seq,
                operation,
            } => {
                tracing::trace!(operation = name, seq, "running marshalled operation");
                operation(&mut resources);
            }
            Message::Shutdown => break,
        }
    }

    resources.cursors.clear();
    let _ = litebridge_core::DbConnection::close(&resources.connection);
    tracing::info!(path = %config.path, "shared database worker stopped");
}
