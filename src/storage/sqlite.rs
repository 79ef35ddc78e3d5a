//! SQLite connection implementation

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use rusqlite::types::ValueRef;
use crate::row::{Row, Value};
use crate::{Error, Result};
use super::Connection;

static NEXT_CONNECTION_ID: AtomicI64 = AtomicI64::new(1);

/// A rusqlite-backed physical connection
pub struct SqliteConnection {
    conn: rusqlite::Connection,
    id: i64,
    last_error: Option<(String, String)>,
}

impl SqliteConnection {
    /// Open a database file (creates if doesn't exist); `:memory:` opens a private in-memory database
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = if path == Path::new(":memory:") {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(path)
        }
        .map_err(|e| Error::Connection(format!("cannot open {}: {}", path.display(), e)))?;
        Ok(Self::from_connection(conn))
    }

    /// Wrap an already opened rusqlite connection verbatim
    pub fn from_connection(conn: rusqlite::Connection) -> Self {
        Self {
            conn,
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            last_error: None,
        }
    }

    fn record<T>(&mut self, result: rusqlite::Result<T>) -> Result<T> {
        result.map_err(|e| {
            let err = Error::from(e);
            if let Error::Query { code, message } = &err {
                self.last_error = Some((code.clone(), message.clone()));
            }
            err
        })
    }
}

impl Connection for SqliteConnection {
    fn driver_name(&self) -> &str {
        "sqlite"
    }

    fn client_version(&self) -> String {
        format!("SQLite {}", rusqlite::version())
    }

    fn server_version_query(&self) -> &'static str {
        "SELECT sqlite_version() AS version"
    }

    fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
        let result = run_query(&self.conn, sql);
        self.record(result)
    }

    fn execute(&mut self, sql: &str) -> Result<u64> {
        let result = run_execute(&self.conn, sql);
        self.record(result)
    }

    fn quote(&mut self, value: &str) -> Result<String> {
        let result = self
            .conn
            .query_row("SELECT quote(?1)", [value], |row| row.get::<_, String>(0));
        self.record(result)
    }

    fn begin(&mut self) -> Result<()> {
        let result = self.conn.execute_batch("BEGIN");
        self.record(result)
    }

    fn commit(&mut self) -> Result<()> {
        let result = self.conn.execute_batch("COMMIT");
        self.record(result)
    }

    fn rollback(&mut self) -> Result<()> {
        let result = self.conn.execute_batch("ROLLBACK");
        self.record(result)
    }

    fn set_autocommit(&mut self, _enabled: bool) -> Result<()> {
        // SQLite leaves autocommit mode on BEGIN and re-enters it on COMMIT/ROLLBACK
        Ok(())
    }

    fn apply_session_defaults(&mut self) -> Result<()> {
        let result = self.conn.busy_timeout(Duration::from_secs(5));
        self.record(result)?;
        // multi-way joins over the value tables build large temp b-trees
        let result = self.conn.pragma_update(None, "temp_store", "MEMORY");
        self.record(result)
    }

    fn connection_id(&self) -> i64 {
        self.id
    }

    fn last_insert_id(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    fn last_error(&self) -> Option<(String, String)> {
        self.last_error.clone()
    }
}

fn run_query(conn: &rusqlite::Connection, sql: &str) -> rusqlite::Result<Vec<Row>> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = stmt.query([])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        let mut out = Row::new();
        for (i, name) in columns.iter().enumerate() {
            out.push(name.clone(), value_from_ref(row.get_ref(i)?));
        }
        result.push(out);
    }
    Ok(result)
}

fn run_execute(conn: &rusqlite::Connection, sql: &str) -> rusqlite::Result<u64> {
    match conn.execute(sql, []) {
        Ok(changed) => Ok(changed as u64),
        // PRAGMA and friends report rows; run them for their effect
        Err(rusqlite::Error::ExecuteReturnedResults) => {
            run_query(conn, sql)?;
            Ok(0)
        }
        Err(e) => Err(e),
    }
}

fn value_from_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(r) => Value::Real(r),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(e, message) => {
                let message = message.unwrap_or_else(|| e.to_string());
                Error::query(e.extended_code.to_string(), message)
            }
            other => Error::query("HY000", other.to_string()),
        }
    }
}
