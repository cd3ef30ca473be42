use std::thread;

use litebridge::error::{ConnectionErrorKind, PoolErrorKind};
use litebridge::prelude::*;

fn count(conn: &PoolConnection, table: &str) -> i64 {
    conn.execute(&format!("SELECT count(*) FROM {}", quote_name(table)), &[])
        .unwrap()
        .fetchone()
        .unwrap()
        .unwrap()
        .get(0)
        .and_then(SqlValue::as_i64)
        .unwrap()
}

#[test]
fn each_thread_gets_its_own_connection() {
    let dir = tempfile::tempdir().unwrap();
    let pool = get_pool(dir.path().join("threads.db"), true).unwrap();
    let conn = pool.connect().unwrap();
    conn.executescript("CREATE TABLE log (who TEXT)").unwrap();

    thread::scope(|s| {
        for who in ["a", "b", "c"] {
            let pool = &pool;
            s.spawn(move || {
                let conn = pool.connect().unwrap();
                let again = pool.connect().unwrap();
                match (&conn, &again) {
                    (PoolConnection::File(x), PoolConnection::File(y)) => {
                        assert!(x.same_connection(y));
                    }
                    _ => panic!("file pool handed out a shared connection"),
                }
                conn.execute("INSERT INTO log VALUES (?)", &[SqlValue::from(who)])
                    .unwrap();
                conn.commit().unwrap();
            });
        }
    });

    assert_eq!(count(&conn, "log"), 3);
}

#[test]
fn missing_file_without_create() {
    let dir = tempfile::tempdir().unwrap();
    let pool = get_pool(dir.path().join("absent.db"), false).unwrap();
    match pool.connect().unwrap_err() {
        Error::Connection(e) => assert_eq!(e.kind, ConnectionErrorKind::NotFound),
        other => panic!("expected not-found error, got {other:?}"),
    }
    assert!(!dir.path().join("absent.db").exists());
}

#[test]
fn release_rolls_back_uncommitted_work() {
    let dir = tempfile::tempdir().unwrap();
    let pool = get_pool(dir.path().join("release.db"), true).unwrap();
    let conn = pool.connect().unwrap();
    conn.executescript("CREATE TABLE t (x INTEGER)").unwrap();

    conn.execute("INSERT INTO t VALUES (1)", &[]).unwrap();
    conn.commit().unwrap();
    conn.execute("INSERT INTO t VALUES (2)", &[]).unwrap();
    assert!(conn.in_transaction().unwrap());

    pool.release(&conn).unwrap();
    let conn = pool.connect().unwrap();
    assert!(!conn.in_transaction().unwrap());
    assert_eq!(count(&conn, "t"), 1);
}

#[test]
fn failed_release_discards_the_connection() {
    let dir = tempfile::tempdir().unwrap();
    let pool = get_pool(dir.path().join("broken.db"), true).unwrap();
    let conn = pool.connect().unwrap();

    // A handle closed behind the pool's back cannot roll back.
    conn.close().unwrap();
    assert!(pool.release(&conn).is_err());

    let fresh = pool.connect().unwrap();
    match (&conn, &fresh) {
        (PoolConnection::File(old), PoolConnection::File(new)) => {
            assert!(!old.same_connection(new));
            assert!(!new.is_closed());
        }
        _ => panic!("file pool handed out a shared connection"),
    }
    assert!(fresh.execute("SELECT 1", &[]).is_ok());
}

#[test]
fn close_then_connect_opens_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let pool = get_pool(dir.path().join("close.db"), true).unwrap();
    let conn = pool.connect().unwrap();
    pool.close(&conn).unwrap();
    assert!(conn.execute("SELECT 1", &[]).is_err());

    let fresh = pool.connect().unwrap();
    assert!(fresh.execute("SELECT 1", &[]).is_ok());
}

#[test]
fn connections_from_elsewhere_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let pool = get_pool(dir.path().join("owner.db"), true).unwrap();
    let memory = get_pool(":memory:", false).unwrap();

    let shared = memory.connect().unwrap();
    match pool.release(&shared).unwrap_err() {
        Error::Pool(e) => assert_eq!(e.kind, PoolErrorKind::NotOwned),
        other => panic!("expected pool error, got {other:?}"),
    }

    let mine = pool.connect().unwrap();
    let other_pool = get_pool(dir.path().join("owner.db"), true).unwrap();
    assert!(matches!(
        other_pool.release(&mine),
        Err(Error::Pool(_))
    ));
}

#[test]
fn file_pool_reports_its_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("path.db");
    let pool = get_pool(&path, true).unwrap();
    match &pool {
        Pool::File(p) => {
            assert!(p.path().is_absolute());
            assert!(p.path().ends_with("path.db"));
        }
        Pool::Memory(_) => panic!("expected a file pool"),
    }
}

#[test]
fn dump_of_a_file_database() {
    let dir = tempfile::tempdir().unwrap();
    let pool = get_pool(dir.path().join("dump.db"), true).unwrap();
    let conn = pool.connect().unwrap();
    conn.executescript(
        "CREATE TABLE kv (k TEXT PRIMARY KEY, v BLOB);
         INSERT INTO kv VALUES ('a', x'00ff');",
    )
    .unwrap();
    let dump = conn.iterdump().unwrap();
    assert_eq!(dump.first().map(String::as_str), Some("BEGIN TRANSACTION;"));
    assert!(dump.contains(&"INSERT INTO \"kv\" VALUES('a',X'00FF');".to_string()));
    assert_eq!(dump.last().map(String::as_str), Some("COMMIT;"));
}
