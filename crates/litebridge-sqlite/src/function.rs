//! Scalar SQL functions implemented in Rust.

#![allow(clippy::cast_sign_loss)]

use crate::connection::Connection;
use crate::ffi;
use crate::types;
use litebridge_core::{
    DbConnection, Error, Result, ScalarFunction, SqlValue,
    error::{QueryError, QueryErrorKind},
};
use std::ffi::{CString, c_int, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Register `func` under `name` on `conn`.
pub(crate) fn register(conn: &Connection, name: &str, n_args: i32, func: ScalarFunction) -> Result<()> {
    let db = conn.db()?;
    let c_name = CString::new(name).map_err(|_| {
        Error::Query(QueryError {
            kind: QueryErrorKind::Misuse,
            sql: None,
            message: format!("Invalid function name {name:?}: contains null byte"),
            code: None,
        })
    })?;

    let user_data = Box::into_raw(Box::new(func));

    // SAFETY: db is open; user_data is a leaked box that SQLite owns from
    // here on and releases through destroy_function, even when registration fails
    let rc = unsafe {
        ffi::sqlite3_create_function_v2(
            db,
            c_name.as_ptr(),
            n_args,
            ffi::SQLITE_UTF8,
            user_data.cast(),
            Some(call_function),
            None,
            None,
            Some(destroy_function),
        )
    };

    if rc != ffi::SQLITE_OK {
        // SAFETY: db is open
        let msg = unsafe { ffi::last_error_message(db) };
        return Err(Error::Query(QueryError {
            kind: QueryErrorKind::Misuse,
            sql: None,
            message: format!("Failed to register function {name}: {msg}"),
            code: Some(rc),
        }));
    }

    tracing::debug!(name, n_args, "registered scalar function");
    Ok(())
}

unsafe extern "C" fn call_function(
    ctx: *mut ffi::sqlite3_context,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) {
    // SAFETY: user data is the boxed function installed by `register`, and
    // argv holds argc live values for the duration of the call
    unsafe {
        let func = &*ffi::sqlite3_user_data(ctx).cast::<ScalarFunction>();
        let args: Vec<SqlValue> = if argv.is_null() || argc <= 0 {
            Vec::new()
        } else {
            std::slice::from_raw_parts(argv, argc as usize)
                .iter()
                .map(|&value| types::read_value(value))
                .collect()
        };

        match panic::catch_unwind(AssertUnwindSafe(|| func(&args))) {
            Ok(Ok(result)) => types::set_result(ctx, &result),
            Ok(Err(e)) => types::set_error(ctx, &e.to_string()),
            Err(_) => types::set_error(ctx, "user-defined function raised a panic"),
        }
    }
}

unsafe extern "C" fn destroy_function(user_data: *mut c_void) {
    if !user_data.is_null() {
        // SAFETY: user_data came from Box::into_raw in `register` and SQLite
        // calls this exactly once
        drop(unsafe { Box::from_raw(user_data.cast::<ScalarFunction>()) });
    }
}

/// `pow(base, exponent)`, returning an integer when both arguments are
/// integers and the result fits, a real otherwise. NULL in, NULL out.
pub fn pow(args: &[SqlValue]) -> Result<SqlValue> {
    let [base, exponent] = args else {
        return Err(Error::Custom(format!(
            "pow() takes exactly 2 arguments ({} given)",
            args.len()
        )));
    };
    if base.is_null() || exponent.is_null() {
        return Ok(SqlValue::Null);
    }

    if let (SqlValue::Integer(b), SqlValue::Integer(e)) = (base, exponent) {
        if let Ok(e) = u32::try_from(*e) {
            if let Some(v) = b.checked_pow(e) {
                return Ok(SqlValue::Integer(v));
            }
        }
    }

    let (Some(b), Some(e)) = (numeric(base), numeric(exponent)) else {
        return Err(Error::Custom(format!(
            "pow() arguments must be numbers, got {} and {}",
            base.type_name(),
            exponent.type_name()
        )));
    };
    Ok(SqlValue::Real(b.powf(e)))
}

#[allow(clippy::cast_precision_loss)]
fn numeric(value: &SqlValue) -> Option<f64> {
    match value {
        SqlValue::Integer(v) => Some(*v as f64),
        SqlValue::Real(v) => Some(*v),
        SqlValue::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Functions every provider connection gets on open.
pub fn register_builtins(conn: &Connection) -> Result<()> {
    conn.create_function("pow", 2, Arc::new(pow))
}

#[cfg(test)]
mod tests {
    use super::*;
    use litebridge_core::DbCursor;

    fn scalar(conn: &Connection, sql: &str) -> Result<SqlValue> {
        let row = conn.execute(sql, &[])?.fetchone()?.unwrap();
        Ok(row.get(0).cloned().unwrap())
    }

    #[test]
    fn test_pow_integers() {
        assert_eq!(
            pow(&[SqlValue::Integer(2), SqlValue::Integer(10)]).unwrap(),
            SqlValue::Integer(1024)
        );
        assert_eq!(
            pow(&[SqlValue::Integer(2), SqlValue::Integer(-1)]).unwrap(),
            SqlValue::Real(0.5)
        );
        // Overflow falls back to a real
        assert!(matches!(
            pow(&[SqlValue::Integer(10), SqlValue::Integer(40)]).unwrap(),
            SqlValue::Real(_)
        ));
    }

    #[test]
    fn test_pow_nulls_and_errors() {
        assert_eq!(
            pow(&[SqlValue::Null, SqlValue::Integer(2)]).unwrap(),
            SqlValue::Null
        );
        assert!(pow(&[SqlValue::Blob(vec![1]), SqlValue::Integer(2)]).is_err());
        assert!(pow(&[SqlValue::Integer(2)]).is_err());
    }

    #[test]
    fn test_builtin_pow_in_sql() {
        let conn = Connection::open_memory().unwrap();
        register_builtins(&conn).unwrap();
        assert_eq!(scalar(&conn, "SELECT pow(3, 3)").unwrap(), SqlValue::Integer(27));
        assert_eq!(scalar(&conn, "SELECT pow(4.0, 0.5)").unwrap(), SqlValue::Real(2.0));
        assert_eq!(scalar(&conn, "SELECT pow(NULL, 1)").unwrap(), SqlValue::Null);
    }

    #[test]
    fn test_custom_function() {
        let conn = Connection::open_memory().unwrap();
        conn.create_function(
            "shout",
            1,
            Arc::new(|args: &[SqlValue]| -> Result<SqlValue> {
                Ok(SqlValue::Text(
                    args[0].as_str().unwrap_or_default().to_uppercase(),
                ))
            }),
        )
        .unwrap();
        assert_eq!(
            scalar(&conn, "SELECT shout('hi')").unwrap(),
            SqlValue::from("HI")
        );
    }

    #[test]
    fn test_function_error_and_panic() {
        let conn = Connection::open_memory().unwrap();
        conn.create_function(
            "fail",
            0,
            Arc::new(|_: &[SqlValue]| -> Result<SqlValue> {
                Err(Error::Custom("nope".into()))
            }),
        )
        .unwrap();
        conn.create_function(
            "boom",
            0,
            Arc::new(|_: &[SqlValue]| -> Result<SqlValue> { panic!("boom") }),
        )
        .unwrap();

        let err = scalar(&conn, "SELECT fail()").unwrap_err();
        assert!(err.to_string().contains("nope"));
        let err = scalar(&conn, "SELECT boom()").unwrap_err();
        assert!(err.to_string().contains("panic"));
    }
}
