//! SQL text dump of a database.

use crate::connection::Connection;
use litebridge_core::{DbConnection, DbCursor, Result, SqlValue};

/// Quote an identifier, doubling embedded quotes.
pub fn quote_name(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn text_column(value: Option<&SqlValue>) -> String {
    value.and_then(SqlValue::as_str).unwrap_or_default().to_string()
}

/// Statements that recreate the schema and contents of `conn`'s database,
/// wrapped in a single transaction.
pub fn iterdump(conn: &Connection) -> Result<Vec<String>> {
    let mut out = vec!["BEGIN TRANSACTION;".to_string()];

    let tables = conn
        .execute(
            "SELECT name, sql FROM sqlite_master \
             WHERE sql NOT NULL AND type == 'table' ORDER BY name",
            &[],
        )?
        .fetchall()?;

    for table in &tables {
        let name = text_column(table.get(0));
        let sql = text_column(table.get(1));

        if name == "sqlite_sequence" {
            out.push("DELETE FROM \"sqlite_sequence\";".to_string());
        } else if name == "sqlite_stat1" {
            out.push("ANALYZE \"sqlite_master\";".to_string());
        } else if name.starts_with("sqlite_") {
            continue;
        } else {
            out.push(format!("{sql};"));
        }

        let columns: Vec<String> = conn
            .execute(&format!("PRAGMA table_info({})", quote_name(&name)), &[])?
            .fetchall()?
            .iter()
            .map(|row| text_column(row.get(1)))
            .collect();
        if columns.is_empty() {
            continue;
        }

        let values = columns
            .iter()
            .map(|c| format!("quote({})", quote_name(c)))
            .collect::<Vec<_>>()
            .join(" || ',' || ");
        let select = format!(
            "SELECT 'INSERT INTO ' || {} || ' VALUES(' || {} || ')' FROM {}",
            sql_string(&quote_name(&name)),
            values,
            quote_name(&name)
        );
        for row in conn.execute(&select, &[])?.fetchall()? {
            out.push(format!("{};", text_column(row.get(0))));
        }
    }

    let others = conn
        .execute(
            "SELECT sql FROM sqlite_master \
             WHERE sql NOT NULL AND type IN ('index', 'trigger', 'view') ORDER BY rowid",
            &[],
        )?
        .fetchall()?;
    for row in &others {
        out.push(format!("{};", text_column(row.get(0))));
    }

    out.push("COMMIT;".to_string());
    tracing::trace!(statements = out.len(), "dumped database");
    Ok(out)
}

fn sql_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
