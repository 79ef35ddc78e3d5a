//! Storage Layer - physical backend connections
//!
//! A `Connection` is the single live link to the relational backend that a
//! `RelationalAdapter` drives. SQLite is the shipped backend:
//! - sqlite: rusqlite connection to a file or `:memory:`
//!
//! `schema` holds the triple store tables used by the reference store.

pub mod schema;
pub mod sqlite;

#[cfg(test)]
pub(crate) mod testing;

pub use sqlite::SqliteConnection;

use crate::config::StoreConfig;
use crate::row::Row;
use crate::{Error, Result};

/// Physical backend operations. Statements are plain SQL text.
pub trait Connection: Send {
    /// Driver name as reported by the backend ("sqlite", "mysql", ...)
    fn driver_name(&self) -> &str;

    /// Client library version string
    fn client_version(&self) -> String;

    /// SQL returning the server version as the first column of one row
    fn server_version_query(&self) -> &'static str;

    /// Run a row-returning statement
    fn query(&mut self, sql: &str) -> Result<Vec<Row>>;

    /// Run a statement for its effect, returning the affected-row count
    fn execute(&mut self, sql: &str) -> Result<u64>;

    /// Quote a string literal with the backend's own delimiters
    fn quote(&mut self, value: &str) -> Result<String>;

    fn begin(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;

    /// Toggle session autocommit. Backends whose `begin` already suspends
    /// autocommit may treat this as a no-op.
    fn set_autocommit(&mut self, enabled: bool) -> Result<()>;

    /// Session settings needed for multi-join reads over the value tables
    fn apply_session_defaults(&mut self) -> Result<()>;

    fn connection_id(&self) -> i64;
    fn last_insert_id(&self) -> i64;

    /// Code and message of the most recent failed statement
    fn last_error(&self) -> Option<(String, String)>;
}

/// Open a new connection described by `config`
pub fn open(config: &StoreConfig) -> Result<Box<dyn Connection>> {
    let protocol = config.protocol.as_deref().ok_or_else(|| {
        Error::Connection(
            "the protocol has to be given (e.g. sqlite); set `protocol` in the store configuration".to_string(),
        )
    })?;

    match protocol.to_lowercase().as_str() {
        "sqlite" => {
            let path = config
                .name
                .as_deref()
                .or(config.host.as_deref())
                .ok_or_else(|| Error::Connection("sqlite needs a database path in `name` or `host`".to_string()))?;
            if config.user.is_some() || config.password.is_some() {
                tracing::debug!("sqlite ignores configured credentials");
            }
            let mut conn = SqliteConnection::open(path)?;
            conn.apply_session_defaults()?;
            Ok(Box::new(conn))
        }
        other => Err(Error::Connection(format!("unsupported protocol: {}", other))),
    }
}
