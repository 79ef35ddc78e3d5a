//! # Tristore - SQL middleware for an RDF triple store
//!
//! Tristore sits between an RDF store and its relational backend.
//!
//! Tristore provides:
//! - A relational adapter that emulates nested transactions with savepoints
//! - A caching adapter that memoizes reads and clears on any mutation
//! - An insert query handler that deduplicates triples before writing them
//! - A reference triple storage layer over the `{prefix}_{store}_*` tables

pub mod config;
pub mod row;
pub mod storage;
pub mod adapter;
pub mod triple;
pub mod insert;
pub mod store;
pub mod table;

// Re-exports for convenient access
pub use config::StoreConfig;
pub use row::{Row, Value};
pub use adapter::{Adapter, CachedAdapter, CacheStore, MemoryCache, Operation, QueryLogEntry, RelationalAdapter};
pub use triple::{TermType, Triple};
pub use insert::{InsertBody, InsertOutcome, InsertQueryHandler, InsertRequest, PatternEvaluator, PatternQuery, Store};
pub use store::RelationalStore;

/// Result type alias for Tristore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Tristore operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error [{code}]: {message}")]
    Query { code: String, message: String },

    #[error("Transaction misuse: {0} called without a matching beginTransaction")]
    TransactionMisuse(&'static str),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a query error from a backend code and message
    pub fn query(code: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Query {
            code: code.into(),
            message: message.into(),
        }
    }

    /// True if the backend reported that a savepoint no longer exists.
    ///
    /// SQLite says "no such savepoint: X", MySQL answers with error 1305
    /// "SAVEPOINT X does not exist".
    pub fn is_missing_savepoint(&self) -> bool {
        match self {
            Error::Query { code, message } => {
                let message = message.to_lowercase();
                code == "1305"
                    || message.contains("no such savepoint")
                    || (message.contains("savepoint") && message.contains("does not exist"))
            }
            _ => false,
        }
    }
}
