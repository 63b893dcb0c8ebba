use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::SecondsFormat;
use parking_lot::Mutex;
use rusqlite::hooks::Action;
use rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};

use sqlproxy_client::protocol::{ExecResponse, QueryResponse, Value};

use super::Backend;
use crate::error::{BackendError, BackendResult};

/// SQLite engine behind a single connection.
///
/// The connection is guarded by a mutex, so statements from different
/// workers run one at a time.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    /// Set by the update hook whenever a row is inserted.
    inserted: Arc<AtomicBool>,
}

impl SqliteBackend {
    /// Open the database at `dsn`; `:memory:` opens a private in-memory one.
    pub fn open(dsn: &str) -> BackendResult<Self> {
        let conn = if dsn == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(dsn)
        }
        .map_err(|e| BackendError::Unavailable(format!("{}: {}", dsn, e)))?;

        let inserted = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&inserted);
        conn.update_hook(Some(move |action: Action, _db: &str, _table: &str, _rowid: i64| {
            if action == Action::SQLITE_INSERT {
                flag.store(true, Ordering::Relaxed);
            }
        }));

        Ok(Self {
            conn: Mutex::new(conn),
            inserted,
        })
    }

    pub fn open_in_memory() -> BackendResult<Self> {
        Self::open(":memory:")
    }

    /// Check that the database answers.
    pub fn ping(&self) -> BackendResult<()> {
        self.conn
            .lock()
            .query_row("SELECT 1", [], |_| Ok(()))
            .map_err(|e| BackendError::Unavailable(format!("failed to ping database: {}", e)))
    }
}

struct SqlArg<'a>(&'a Value);

impl ToSql for SqlArg<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self.0 {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Bool(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Value::Int64(n) => ToSqlOutput::Owned(SqlValue::Integer(*n)),
            Value::Float64(n) => ToSqlOutput::Owned(SqlValue::Real(*n)),
            Value::String(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::Timestamp(ts) => ToSqlOutput::Owned(SqlValue::Text(
                ts.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            )),
        })
    }
}

fn to_value(cell: ValueRef<'_>) -> BackendResult<Value> {
    Ok(match cell {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Int64(n),
        ValueRef::Real(n) => Value::Float64(n),
        ValueRef::Text(bytes) => Value::String(
            String::from_utf8(bytes.to_vec())
                .map_err(|e| BackendError::TypeCoercion(format!("invalid UTF-8 text: {}", e)))?,
        ),
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    })
}

impl Backend for SqliteBackend {
    fn query(&self, text: &str, args: &[Value]) -> BackendResult<QueryResponse> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(text)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt.query(params_from_iter(args.iter().map(SqlArg)))?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for idx in 0..columns.len() {
                values.push(to_value(row.get_ref(idx)?)?);
            }
            result.push(values);
        }

        Ok(QueryResponse {
            columns,
            rows: result,
        })
    }

    fn execute(&self, text: &str, args: &[Value]) -> BackendResult<ExecResponse> {
        let conn = self.conn.lock();
        self.inserted.store(false, Ordering::Relaxed);
        let affected = conn.execute(text, params_from_iter(args.iter().map(SqlArg)))?;

        // Only an id this statement produced is reported. Rowids can be
        // reused, so comparing ids before and after is not enough.
        let last_insert_id = if self.inserted.swap(false, Ordering::Relaxed) {
            conn.last_insert_rowid()
        } else {
            0
        };

        Ok(ExecResponse {
            rows_affected: affected as i64,
            last_insert_id,
        })
    }
}
