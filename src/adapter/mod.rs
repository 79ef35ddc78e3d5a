//! Database Adapters
//!
//! An `Adapter` is the store's only way to talk SQL:
//! - `RelationalAdapter` owns one backend connection and tracks transaction depth
//! - `CachedAdapter` wraps any adapter and memoizes reads by SQL hash
//!
//! Both expose the identical contract, so callers never know whether a
//! cache sits in front of the connection.

pub mod transaction;
pub mod relational;
pub mod cached;

pub use transaction::{savepoint_label, Nesting, TransactionDepth};
pub use relational::RelationalAdapter;
pub use cached::{cache_key, CachedAdapter, CachedRows, CacheStore, MemoryCache};

use crate::config::StoreConfig;
use crate::row::Row;
use crate::storage::Connection;
use crate::Result;

/// Adapter operation that issued a logged statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    FetchList,
    FetchRow,
    GetNumberOfRows,
    SimpleQuery,
    Exec,
    BeginTransaction,
    Commit,
    Rollback,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::FetchList => "fetchList",
            Operation::FetchRow => "fetchRow",
            Operation::GetNumberOfRows => "getNumberOfRows",
            Operation::SimpleQuery => "simpleQuery",
            Operation::Exec => "exec",
            Operation::BeginTransaction => "beginTransaction",
            Operation::Commit => "commit",
            Operation::Rollback => "rollback",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One statement the adapter was asked to run, in submission order
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct QueryLogEntry {
    pub sql: String,
    pub operation: Operation,
}

/// The read/write and transaction contract shared by all adapters.
///
/// Adapters are single-caller objects: the depth counter and query log are
/// plain mutable state, so share one across threads only behind external
/// serialization, or give each worker its own adapter.
pub trait Adapter {
    /// Adopt `existing` verbatim, or open a connection from the configuration.
    /// A no-op returning the current handle while one is live.
    fn connect(&mut self, existing: Option<Box<dyn Connection>>) -> Result<&mut dyn Connection>;

    /// Drop the connection; the next operation reconnects implicitly
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Backend-quoted literal with the outer delimiters removed
    fn escape(&mut self, value: &str) -> Result<String>;

    fn fetch_list(&mut self, sql: &str) -> Result<Vec<Row>>;
    fn fetch_row(&mut self, sql: &str) -> Result<Option<Row>>;
    fn get_number_of_rows(&mut self, sql: &str) -> Result<usize>;
    fn simple_query(&mut self, sql: &str) -> Result<bool>;
    fn exec(&mut self, sql: &str) -> Result<u64>;

    fn begin_transaction(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;

    /// Roll back the innermost level. Returns how many logical levels were
    /// unwound, which exceeds one only when savepoints had gone missing.
    fn rollback(&mut self) -> Result<u32>;

    /// Logical reading of the depth counter, not the backend's own state
    fn in_transaction(&self) -> bool;
    fn transaction_depth(&self) -> u32;
    fn transactions_are_nestable(&mut self) -> Result<bool>;

    fn driver_name(&mut self) -> Result<String>;
    fn dbs_name(&mut self) -> Result<Option<String>>;
    fn server_version(&mut self) -> Result<String>;
    fn connection_id(&mut self) -> Result<i64>;
    fn last_insert_id(&mut self) -> Result<i64>;
    fn error_code(&self) -> Option<String>;
    fn error_message(&self) -> Option<String>;

    /// Every statement submitted through this adapter instance
    fn queries(&self) -> &[QueryLogEntry];

    fn config(&self) -> &StoreConfig;
}
