//! Moving storage values across the FFI boundary.
//!
//! SQLite has five storage classes, mirrored one-to-one by [`SqlValue`]:
//! INTEGER, REAL, TEXT, BLOB and NULL. Text read from the engine is decoded
//! as UTF-8 with U+FFFD substituted for invalid sequences, for both result
//! columns and function arguments.

#![allow(clippy::cast_sign_loss)]

use crate::ffi;
use litebridge_core::SqlValue;
use std::ffi::{CStr, c_int};

/// Bind a value to a prepared statement parameter.
///
/// Returns the SQLite result code of the bind call.
///
/// # Safety
/// - `stmt` must be a valid, non-null prepared statement handle
/// - `index` must be a valid 1-based parameter index
pub unsafe fn bind_value(stmt: *mut ffi::sqlite3_stmt, index: c_int, value: &SqlValue) -> c_int {
    // SAFETY: caller guarantees stmt and index; text and blob are copied
    // by SQLite (SQLITE_TRANSIENT) before the borrow ends
    unsafe {
        match value {
            SqlValue::Null => ffi::sqlite3_bind_null(stmt, index),
            SqlValue::Integer(v) => ffi::sqlite3_bind_int64(stmt, index, *v),
            SqlValue::Real(v) => ffi::sqlite3_bind_double(stmt, index, *v),
            SqlValue::Text(s) => {
                let Ok(len) = c_int::try_from(s.len()) else {
                    return ffi::SQLITE_TOOBIG;
                };
                ffi::sqlite3_bind_text(
                    stmt,
                    index,
                    s.as_ptr().cast(),
                    len,
                    ffi::SQLITE_TRANSIENT(),
                )
            }
            SqlValue::Blob(b) => {
                let Ok(len) = c_int::try_from(b.len()) else {
                    return ffi::SQLITE_TOOBIG;
                };
                ffi::sqlite3_bind_blob(stmt, index, b.as_ptr().cast(), len, ffi::SQLITE_TRANSIENT())
            }
        }
    }
}

/// Read a column value from the current result row.
///
/// # Safety
/// - `stmt` must be a valid prepared statement that has just returned SQLITE_ROW
/// - `index` must be a valid 0-based column index
pub unsafe fn read_column(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> SqlValue {
    // SAFETY: caller guarantees stmt is positioned on a row; pointers from
    // column_text/column_blob stay valid until the next step, and we copy
    // them out immediately
    unsafe {
        match ffi::sqlite3_column_type(stmt, index) {
            ffi::SQLITE_INTEGER => SqlValue::Integer(ffi::sqlite3_column_int64(stmt, index)),
            ffi::SQLITE_FLOAT => SqlValue::Real(ffi::sqlite3_column_double(stmt, index)),
            ffi::SQLITE_TEXT => {
                let ptr = ffi::sqlite3_column_text(stmt, index);
                let len = ffi::sqlite3_column_bytes(stmt, index);
                if ptr.is_null() {
                    SqlValue::Null
                } else {
                    SqlValue::Text(lossy_text(ptr.cast(), len))
                }
            }
            ffi::SQLITE_BLOB => {
                let ptr = ffi::sqlite3_column_blob(stmt, index);
                let len = ffi::sqlite3_column_bytes(stmt, index);
                SqlValue::Blob(copy_bytes(ptr.cast(), len))
            }
            _ => SqlValue::Null,
        }
    }
}

/// Get the column name from a result.
///
/// # Safety
/// - `stmt` must be a valid prepared statement
/// - `index` must be a valid 0-based column index
pub unsafe fn column_name(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Option<String> {
    // SAFETY: caller guarantees stmt and index
    unsafe {
        let ptr = ffi::sqlite3_column_name(stmt, index);
        if ptr.is_null() {
            None
        } else {
            Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
        }
    }
}

/// Read a function argument.
///
/// # Safety
/// `value` must be a valid protected value passed to a function callback.
pub unsafe fn read_value(value: *mut ffi::sqlite3_value) -> SqlValue {
    // SAFETY: caller guarantees value is a live argument
    unsafe {
        match ffi::sqlite3_value_type(value) {
            ffi::SQLITE_INTEGER => SqlValue::Integer(ffi::sqlite3_value_int64(value)),
            ffi::SQLITE_FLOAT => SqlValue::Real(ffi::sqlite3_value_double(value)),
            ffi::SQLITE_TEXT => {
                let ptr = ffi::sqlite3_value_text(value);
                let len = ffi::sqlite3_value_bytes(value);
                if ptr.is_null() {
                    SqlValue::Null
                } else {
                    SqlValue::Text(lossy_text(ptr.cast(), len))
                }
            }
            ffi::SQLITE_BLOB => {
                let ptr = ffi::sqlite3_value_blob(value);
                let len = ffi::sqlite3_value_bytes(value);
                SqlValue::Blob(copy_bytes(ptr.cast(), len))
            }
            _ => SqlValue::Null,
        }
    }
}

/// Set the result of a function call.
///
/// # Safety
/// `ctx` must be the context of the function call currently executing.
pub unsafe fn set_result(ctx: *mut ffi::sqlite3_context, value: &SqlValue) {
    // SAFETY: caller guarantees ctx; text and blob are copied (SQLITE_TRANSIENT)
    unsafe {
        match value {
            SqlValue::Null => ffi::sqlite3_result_null(ctx),
            SqlValue::Integer(v) => ffi::sqlite3_result_int64(ctx, *v),
            SqlValue::Real(v) => ffi::sqlite3_result_double(ctx, *v),
            SqlValue::Text(s) => match c_int::try_from(s.len()) {
                Ok(len) => {
                    ffi::sqlite3_result_text(ctx, s.as_ptr().cast(), len, ffi::SQLITE_TRANSIENT());
                }
                Err(_) => set_error(ctx, "result text is too large"),
            },
            SqlValue::Blob(b) => match c_int::try_from(b.len()) {
                Ok(len) => {
                    ffi::sqlite3_result_blob(ctx, b.as_ptr().cast(), len, ffi::SQLITE_TRANSIENT());
                }
                Err(_) => set_error(ctx, "result blob is too large"),
            },
        }
    }
}

/// Make the current function call fail with `message`.
///
/// # Safety
/// `ctx` must be the context of the function call currently executing.
pub unsafe fn set_error(ctx: *mut ffi::sqlite3_context, message: &str) {
    let len = c_int::try_from(message.len()).unwrap_or(c_int::MAX);
    // SAFETY: SQLite copies the message before returning
    unsafe { ffi::sqlite3_result_error(ctx, message.as_ptr().cast(), len) };
}

/// # Safety
/// `ptr` must point to at least `len` readable bytes, or be null.
unsafe fn lossy_text(ptr: *const u8, len: c_int) -> String {
    if ptr.is_null() || len <= 0 {
        return String::new();
    }
    // SAFETY: caller guarantees the range is readable
    let slice = unsafe { std::slice::from_raw_parts(ptr, len as usize) };
    String::from_utf8_lossy(slice).into_owned()
}

/// # Safety
/// `ptr` must point to at least `len` readable bytes, or be null.
unsafe fn copy_bytes(ptr: *const u8, len: c_int) -> Vec<u8> {
    if ptr.is_null() || len <= 0 {
        return Vec::new();
    }
    // SAFETY: caller guarantees the range is readable
    unsafe { std::slice::from_raw_parts(ptr, len as usize) }.to_vec()
}
