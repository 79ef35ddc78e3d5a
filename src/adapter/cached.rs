//! Read-through caching in front of an adapter
//!
//! Reads are memoized under the blake3 hash of their exact SQL text.
//! Any successful `exec`/`simple_query` clears the whole store: there is
//! no per-table tracking, so a mutation never leaves a stale read behind.
//!
//! Transaction boundaries go straight to the wrapped adapter, with one
//! addition: `rollback`, and a `disconnect` that abandons an open
//! transaction, also clear the store. Mutations already clear it when they
//! run, but a read cached after them inside the transaction would otherwise
//! keep serving rows the rollback undid.

use std::sync::Arc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use crate::config::StoreConfig;
use crate::row::Row;
use crate::storage::Connection;
use crate::Result;
use super::{Adapter, QueryLogEntry};

/// Cache key for a read: hex blake3 digest of the SQL text
pub fn cache_key(sql: &str) -> String {
    blake3::hash(sql.as_bytes()).to_hex().to_string()
}

/// A memoized read result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CachedRows {
    List(Vec<Row>),
    Row(Option<Row>),
}

/// Pluggable cache store. Implementations synchronize internally so one
/// store can sit behind several adapters.
pub trait CacheStore {
    fn has(&self, key: &str) -> bool;
    fn get(&self, key: &str) -> Option<CachedRows>;
    fn set(&self, key: &str, value: CachedRows);
    fn clear(&self);
}

impl<C: CacheStore + ?Sized> CacheStore for Arc<C> {
    fn has(&self, key: &str) -> bool {
        (**self).has(key)
    }

    fn get(&self, key: &str) -> Option<CachedRows> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: CachedRows) {
        (**self).set(key, value)
    }

    fn clear(&self) {
        (**self).clear()
    }
}

/// Unbounded in-process cache store
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, CachedRows>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheStore for MemoryCache {
    fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn get(&self, key: &str) -> Option<CachedRows> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn set(&self, key: &str, value: CachedRows) {
        self.entries.insert(key.to_string(), value);
    }

    fn clear(&self) {
        self.entries.clear();
    }
}

/// Adapter wrapper that serves repeated reads from a `CacheStore`
pub struct CachedAdapter<A, C = MemoryCache> {
    inner: A,
    cache: C,
}

impl<A: Adapter> CachedAdapter<A, MemoryCache> {
    pub fn new(inner: A) -> Self {
        Self::with_cache(inner, MemoryCache::new())
    }
}

impl<A: Adapter, C: CacheStore> CachedAdapter<A, C> {
    pub fn with_cache(inner: A, cache: C) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    pub fn into_inner(self) -> A {
        self.inner
    }

    fn invalidate(&self) {
        tracing::debug!("mutation observed, clearing query cache");
        self.cache.clear();
    }
}

impl<A: Adapter, C: CacheStore> Adapter for CachedAdapter<A, C> {
    fn connect(&mut self, existing: Option<Box<dyn Connection>>) -> Result<&mut dyn Connection> {
        self.inner.connect(existing)
    }

    fn disconnect(&mut self) {
        let abandoned = self.inner.in_transaction();
        self.inner.disconnect();
        if abandoned {
            self.invalidate();
        }
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn escape(&mut self, value: &str) -> Result<String> {
        self.inner.escape(value)
    }

    fn fetch_list(&mut self, sql: &str) -> Result<Vec<Row>> {
        let key = cache_key(sql);
        if let Some(CachedRows::List(rows)) = self.cache.get(&key) {
            tracing::debug!(%key, "cache hit");
            return Ok(rows);
        }

        tracing::debug!(%key, "cache miss");
        let rows = self.inner.fetch_list(sql)?;
        self.cache.set(&key, CachedRows::List(rows.clone()));
        Ok(rows)
    }

    fn fetch_row(&mut self, sql: &str) -> Result<Option<Row>> {
        let key = cache_key(sql);
        if let Some(CachedRows::Row(row)) = self.cache.get(&key) {
            tracing::debug!(%key, "cache hit");
            return Ok(row);
        }

        tracing::debug!(%key, "cache miss");
        let row = self.inner.fetch_row(sql)?;
        self.cache.set(&key, CachedRows::Row(row.clone()));
        Ok(row)
    }

    fn get_number_of_rows(&mut self, sql: &str) -> Result<usize> {
        self.inner.get_number_of_rows(sql)
    }

    fn simple_query(&mut self, sql: &str) -> Result<bool> {
        let ok = self.inner.simple_query(sql)?;
        self.invalidate();
        Ok(ok)
    }

    fn exec(&mut self, sql: &str) -> Result<u64> {
        let affected = self.inner.exec(sql)?;
        self.invalidate();
        Ok(affected)
    }

    fn begin_transaction(&mut self) -> Result<()> {
        self.inner.begin_transaction()
    }

    fn commit(&mut self) -> Result<()> {
        self.inner.commit()
    }

    fn rollback(&mut self) -> Result<u32> {
        let result = self.inner.rollback();
        self.invalidate();
        result
    }

    fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }

    fn transaction_depth(&self) -> u32 {
        self.inner.transaction_depth()
    }

    fn transactions_are_nestable(&mut self) -> Result<bool> {
        self.inner.transactions_are_nestable()
    }

    fn driver_name(&mut self) -> Result<String> {
        self.inner.driver_name()
    }

    fn dbs_name(&mut self) -> Result<Option<String>> {
        self.inner.dbs_name()
    }

    fn server_version(&mut self) -> Result<String> {
        self.inner.server_version()
    }

    fn connection_id(&mut self) -> Result<i64> {
        self.inner.connection_id()
    }

    fn last_insert_id(&mut self) -> Result<i64> {
        self.inner.last_insert_id()
    }

    fn error_code(&self) -> Option<String> {
        self.inner.error_code()
    }

    fn error_message(&self) -> Option<String> {
        self.inner.error_message()
    }

    fn queries(&self) -> &[QueryLogEntry] {
        self.inner.queries()
    }

    fn config(&self) -> &StoreConfig {
        self.inner.config()
    }
}
