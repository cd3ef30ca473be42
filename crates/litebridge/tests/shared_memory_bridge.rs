use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use litebridge::prelude::*;
use litebridge::{MEMORY_LOCATION, SharedConnection, SqliteConfig};

const THREADS: usize = 16;

#[test]
fn concurrent_callers_get_their_own_results() {
    let pool = get_pool(MEMORY_LOCATION, false).unwrap();
    let barrier = Barrier::new(THREADS);

    let results: Vec<(i64, i64)> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS as i64)
            .map(|i| {
                let pool = &pool;
                let barrier = &barrier;
                s.spawn(move || {
                    let conn = pool.connect().unwrap();
                    barrier.wait();
                    let row = conn
                        .execute("SELECT ? * 10", &[SqlValue::Integer(i)])
                        .unwrap()
                        .fetchone()
                        .unwrap()
                        .unwrap();
                    (i, row.get(0).and_then(SqlValue::as_i64).unwrap())
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.len(), THREADS);
    for (i, got) in results {
        assert_eq!(got, i * 10, "caller {i} received another caller's result");
    }
}

#[test]
fn simultaneous_executions_do_not_overlap() {
    let pool = get_pool(MEMORY_LOCATION, false).unwrap();
    let conn = pool.connect().unwrap();

    // Each call records when it started and finished on the worker.
    let spans: Arc<Mutex<Vec<(Instant, Instant)>>> = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&spans);
    conn.create_function(
        "slow_echo",
        1,
        Arc::new(move |args: &[SqlValue]| -> Result<SqlValue> {
            let start = Instant::now();
            thread::sleep(Duration::from_millis(50));
            recorder.lock().unwrap().push((start, Instant::now()));
            Ok(args[0].clone())
        }),
    )
    .unwrap();

    let barrier = Barrier::new(2);
    let echoed: Vec<String> = thread::scope(|s| {
        let handles: Vec<_> = ["left", "right"]
            .into_iter()
            .map(|tag| {
                let pool = &pool;
                let barrier = &barrier;
                s.spawn(move || {
                    let conn = pool.connect().unwrap();
                    barrier.wait();
                    let rows = conn
                        .execute("SELECT slow_echo(?)", &[SqlValue::from(tag)])
                        .unwrap()
                        .fetchall()
                        .unwrap();
                    rows[0].get(0).and_then(SqlValue::as_str).unwrap().to_string()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(echoed, ["left", "right"]);

    let mut spans = spans.lock().unwrap().clone();
    assert_eq!(spans.len(), 2);
    spans.sort_by_key(|(start, _)| *start);
    assert!(
        spans[0].1 <= spans[1].0,
        "worker ran two operations at the same time"
    );
}

#[test]
fn worker_errors_surface_unchanged() {
    let pool = get_pool(MEMORY_LOCATION, false).unwrap();
    let conn = pool.connect().unwrap();
    let err = conn
        .execute("SELECT * FROM table_that_is_not_there", &[])
        .unwrap_err();
    match err {
        Error::Query(q) => {
            assert!(q.message.contains("no such table"));
            assert_eq!(
                q.sql.as_deref(),
                Some("SELECT * FROM table_that_is_not_there")
            );
        }
        other => panic!("expected query error, got {other:?}"),
    }
}

#[test]
fn memory_pool_release_keeps_database() {
    let pool = get_pool(MEMORY_LOCATION, false).unwrap();
    let conn = pool.connect().unwrap();
    conn.executescript("CREATE TABLE IF NOT EXISTS kept (x INTEGER)")
        .unwrap();
    conn.execute("INSERT INTO kept VALUES (1)", &[]).unwrap();
    conn.commit().unwrap();
    pool.close(&conn).unwrap();

    let other = thread::spawn(|| {
        let pool = get_pool(MEMORY_LOCATION, false).unwrap();
        let conn = pool.connect().unwrap();
        let row = conn
            .execute("SELECT count(*) FROM kept", &[])
            .unwrap()
            .fetchone()
            .unwrap()
            .unwrap();
        row.get(0).and_then(SqlValue::as_i64).unwrap()
    })
    .join()
    .unwrap();
    assert!(other >= 1);
}

#[test]
fn interrupt_reaches_a_busy_worker() {
    // A private worker, so the interrupt cannot hit other tests' statements.
    let conn = SharedConnection::spawn(SqliteConfig::memory()).unwrap();
    let done = AtomicBool::new(false);

    let outcome = thread::scope(|s| {
        let runner = s.spawn(|| {
            let result = conn.execute(
                "WITH RECURSIVE forever(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM forever) \
                 SELECT count(*) FROM forever",
                &[],
            );
            done.store(true, Ordering::SeqCst);
            result
        });

        // Statements only observe interrupts while running, so keep asking.
        while !done.load(Ordering::SeqCst) {
            conn.interrupt();
            thread::sleep(Duration::from_millis(10));
        }
        runner.join().unwrap()
    });

    let err = outcome.unwrap_err();
    assert!(err.is_interrupted(), "expected interruption, got {err:?}");

    // The worker is still usable afterwards.
    let row = conn
        .execute("SELECT 42", &[])
        .unwrap()
        .fetchone()
        .unwrap()
        .unwrap();
    assert_eq!(row.get(0), Some(&SqlValue::Integer(42)));
}

#[test]
fn shared_cursor_survives_other_callers() {
    let conn = SharedConnection::spawn(SqliteConfig::memory()).unwrap();
    conn.executescript(
        "CREATE TABLE n (x INTEGER);
         INSERT INTO n VALUES (1), (2), (3), (4);",
    )
    .unwrap();

    let cursor = conn.execute("SELECT x FROM n ORDER BY x", &[]).unwrap();
    assert_eq!(cursor.fetchone().unwrap().unwrap().get(0), Some(&SqlValue::Integer(1)));

    let clone = conn.clone();
    thread::spawn(move || {
        clone.execute("SELECT count(*) FROM n", &[]).unwrap().fetchall().unwrap();
    })
    .join()
    .unwrap();

    let rest = cursor.fetchall().unwrap();
    let xs: Vec<i64> = rest.iter().filter_map(|r| r.get(0).and_then(SqlValue::as_i64)).collect();
    assert_eq!(xs, [2, 3, 4]);
}
