//! Relational adapter: one backend connection plus transaction depth

use crate::config::StoreConfig;
use crate::row::Row;
use crate::storage::{self, Connection};
use crate::{Error, Result};
use super::transaction::{Nesting, Step, TransactionDepth};
use super::{Adapter, Operation, QueryLogEntry};

/// Adapter over a single connection, connecting lazily on first use.
///
/// Nested `begin_transaction` calls become savepoints named after the depth
/// at which they were opened (`LEVEL1`, `LEVEL2`, ...). Drivers without
/// savepoint support get a flattened transaction instead.
pub struct RelationalAdapter {
    config: StoreConfig,
    conn: Option<Box<dyn Connection>>,
    depth: TransactionDepth,
    queries: Vec<QueryLogEntry>,
    driver_name: Option<String>,
    server_version: Option<String>,
}

impl RelationalAdapter {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            conn: None,
            depth: TransactionDepth::default(),
            queries: Vec::new(),
            driver_name: None,
            server_version: None,
        }
    }

    /// Live connection, opening one if needed
    fn connection(&mut self) -> Result<&mut dyn Connection> {
        self.connect(None)
    }

    fn log(&mut self, sql: &str, operation: Operation) {
        self.queries.push(QueryLogEntry {
            sql: sql.to_string(),
            operation,
        });
    }

    fn query_logged(&mut self, sql: &str, operation: Operation) -> Result<Vec<Row>> {
        self.log(sql, operation);
        tracing::debug!(%operation, sql, "query");
        self.connection()?.query(sql)
    }

    fn execute_logged(&mut self, sql: &str, operation: Operation) -> Result<u64> {
        self.log(sql, operation);
        tracing::debug!(%operation, sql, "execute");
        self.connection()?.execute(sql)
    }

    fn nesting(&mut self) -> Result<Nesting> {
        let driver = self.driver_name()?;
        Ok(Nesting::for_driver(&driver))
    }
}

/// Strip exactly one delimiter from each end of a quoted literal
fn strip_delimiters(quoted: &str) -> String {
    let inner = quoted.strip_prefix('\'').unwrap_or(quoted);
    inner.strip_suffix('\'').unwrap_or(inner).to_string()
}

impl Adapter for RelationalAdapter {
    fn connect(&mut self, existing: Option<Box<dyn Connection>>) -> Result<&mut dyn Connection> {
        if let Some(conn) = existing {
            tracing::debug!(driver = conn.driver_name(), "adopting existing connection");
            self.conn = Some(conn);
            self.driver_name = None;
            self.server_version = None;
        } else if self.conn.is_none() {
            tracing::debug!(protocol = ?self.config.protocol, "opening connection");
            self.conn = Some(storage::open(&self.config)?);
        }

        match self.conn.as_deref_mut() {
            Some(conn) => Ok(conn),
            None => Err(Error::Connection("no connection available".to_string())),
        }
    }

    fn disconnect(&mut self) {
        if self.depth.is_open() {
            // the backend owns whatever was still open; we cannot roll it back here
            tracing::warn!(depth = self.depth.get(), "disconnecting with an open transaction, treating it as abandoned");
            self.depth = TransactionDepth::default();
        }
        self.conn = None;
        self.driver_name = None;
        self.server_version = None;
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn escape(&mut self, value: &str) -> Result<String> {
        let quoted = self.connection()?.quote(value)?;
        Ok(strip_delimiters(&quoted))
    }

    fn fetch_list(&mut self, sql: &str) -> Result<Vec<Row>> {
        self.query_logged(sql, Operation::FetchList)
    }

    fn fetch_row(&mut self, sql: &str) -> Result<Option<Row>> {
        Ok(self.query_logged(sql, Operation::FetchRow)?.into_iter().next())
    }

    fn get_number_of_rows(&mut self, sql: &str) -> Result<usize> {
        Ok(self.query_logged(sql, Operation::GetNumberOfRows)?.len())
    }

    fn simple_query(&mut self, sql: &str) -> Result<bool> {
        self.execute_logged(sql, Operation::SimpleQuery)?;
        Ok(true)
    }

    fn exec(&mut self, sql: &str) -> Result<u64> {
        self.execute_logged(sql, Operation::Exec)
    }

    fn begin_transaction(&mut self) -> Result<()> {
        let step = self.nesting()?.on_begin(self.depth.get());
        match step {
            Step::Physical => {
                let conn = self.connection()?;
                conn.set_autocommit(false)?;
                conn.begin()?;
            }
            Step::Savepoint(label) => {
                self.execute_logged(&format!("SAVEPOINT {}", label), Operation::BeginTransaction)?;
            }
            Step::Skip => {}
        }
        self.depth.enter();
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let depth = self.depth.leave("commit")?;
        match self.nesting()?.on_end(depth) {
            Step::Physical => self.connection()?.commit()?,
            Step::Savepoint(label) => {
                self.execute_logged(&format!("RELEASE SAVEPOINT {}", label), Operation::Commit)?;
            }
            Step::Skip => {}
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<u32> {
        let mut depth = self.depth.leave("rollback")?;
        let nesting = self.nesting()?;
        let mut unwound = 1;

        // each lost savepoint costs one more level; depth 0 always ends physically
        loop {
            match nesting.on_end(depth) {
                Step::Physical => {
                    let conn = self.connection()?;
                    conn.rollback()?;
                    conn.set_autocommit(true)?;
                    return Ok(unwound);
                }
                Step::Skip => return Ok(unwound),
                Step::Savepoint(label) => {
                    let sql = format!("ROLLBACK TO SAVEPOINT {}", label);
                    match self.execute_logged(&sql, Operation::Rollback) {
                        Ok(_) => return Ok(unwound),
                        Err(e) if e.is_missing_savepoint() => {
                            tracing::warn!(savepoint = %label, depth, "savepoint no longer exists, rolling back one level further");
                            depth = self.depth.leave("rollback")?;
                            unwound += 1;
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }
    }

    fn in_transaction(&self) -> bool {
        self.depth.is_open()
    }

    fn transaction_depth(&self) -> u32 {
        self.depth.get()
    }

    fn transactions_are_nestable(&mut self) -> Result<bool> {
        Ok(self.nesting()? == Nesting::Savepoints)
    }

    fn driver_name(&mut self) -> Result<String> {
        if let Some(name) = &self.driver_name {
            return Ok(name.clone());
        }
        let name = self.connection()?.driver_name().to_string();
        self.driver_name = Some(name.clone());
        Ok(name)
    }

    fn dbs_name(&mut self) -> Result<Option<String>> {
        let client = self.connection()?.client_version().to_lowercase();
        let server = self.server_version()?.to_lowercase();
        let name = ["mariadb", "mysql", "sqlite"]
            .into_iter()
            .find(|name| server.contains(name) || client.contains(name));
        Ok(name.map(str::to_string))
    }

    fn server_version(&mut self) -> Result<String> {
        if let Some(version) = &self.server_version {
            return Ok(version.clone());
        }
        let sql = self.connection()?.server_version_query();
        let version = self
            .fetch_row(sql)?
            .and_then(|row| row.get_index(0).map(ToString::to_string))
            .ok_or_else(|| Error::query("HY000", "server version unavailable"))?;
        self.server_version = Some(version.clone());
        Ok(version)
    }

    fn connection_id(&mut self) -> Result<i64> {
        Ok(self.connection()?.connection_id())
    }

    fn last_insert_id(&mut self) -> Result<i64> {
        Ok(self.connection()?.last_insert_id())
    }

    fn error_code(&self) -> Option<String> {
        self.conn.as_ref()?.last_error().map(|(code, _)| code)
    }

    fn error_message(&self) -> Option<String> {
        self.conn.as_ref()?.last_error().map(|(_, message)| message)
    }

    fn queries(&self) -> &[QueryLogEntry] {
        &self.queries
    }

    fn config(&self) -> &StoreConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::RecordingConnection;

    fn recording(driver: &str) -> (RelationalAdapter, crate::storage::testing::Journal) {
        let (conn, journal) = RecordingConnection::new(driver);
        let mut adapter = RelationalAdapter::new(StoreConfig::default());
        adapter.connect(Some(Box::new(conn))).unwrap();
        (adapter, journal)
    }

    fn sqlite_file(dir: &tempfile::TempDir) -> RelationalAdapter {
        let path = dir.path().join("store.db");
        RelationalAdapter::new(StoreConfig::sqlite(path.to_string_lossy()))
    }

    fn create_users(adapter: &mut RelationalAdapter) {
        adapter
            .simple_query("CREATE TABLE transactionTest (id INTEGER PRIMARY KEY, name VARCHAR(30) NOT NULL)")
            .unwrap();
    }

    fn count(adapter: &mut RelationalAdapter) -> usize {
        adapter.fetch_list("SELECT * FROM transactionTest").unwrap().len()
    }

    #[test]
    fn test_nested_begin_commit_statements() {
        let (mut adapter, journal) = recording("mysql");
        assert!(!adapter.in_transaction());

        for _ in 0..3 {
            adapter.begin_transaction().unwrap();
            assert!(adapter.in_transaction());
        }
        for remaining in (0..3).rev() {
            adapter.commit().unwrap();
            assert_eq!(adapter.in_transaction(), remaining > 0);
        }

        assert_eq!(
            journal.statements(),
            vec![
                "SET autocommit=0",
                "BEGIN",
                "SAVEPOINT LEVEL1",
                "SAVEPOINT LEVEL2",
                "RELEASE SAVEPOINT LEVEL2",
                "RELEASE SAVEPOINT LEVEL1",
                "COMMIT",
            ]
        );
    }

    #[test]
    fn test_unmatched_commit_and_rollback_are_misuse() {
        let (mut adapter, journal) = recording("mysql");
        assert!(matches!(adapter.commit(), Err(Error::TransactionMisuse("commit"))));
        assert!(matches!(adapter.rollback(), Err(Error::TransactionMisuse("rollback"))));
        assert_eq!(adapter.transaction_depth(), 0);
        assert!(journal.statements().is_empty());
    }

    #[test]
    fn test_flattened_transactions_without_savepoints() {
        let (mut adapter, journal) = recording("pgsql");
        assert!(!adapter.transactions_are_nestable().unwrap());

        adapter.begin_transaction().unwrap();
        adapter.begin_transaction().unwrap();
        assert_eq!(adapter.rollback().unwrap(), 1);
        assert!(adapter.in_transaction());
        assert_eq!(adapter.rollback().unwrap(), 1);
        assert!(!adapter.in_transaction());

        assert_eq!(
            journal.statements(),
            vec!["SET autocommit=0", "BEGIN", "ROLLBACK", "SET autocommit=1"]
        );
    }

    #[test]
    fn test_rollback_skips_one_lost_savepoint() {
        let (conn, journal) = RecordingConnection::new("mysql");
        let mut adapter = RelationalAdapter::new(StoreConfig::default());
        adapter.connect(Some(Box::new(conn.losing_savepoint("LEVEL2")))).unwrap();

        for _ in 0..3 {
            adapter.begin_transaction().unwrap();
        }
        assert_eq!(adapter.rollback().unwrap(), 2);
        assert_eq!(adapter.transaction_depth(), 1);

        let statements = journal.statements();
        assert_eq!(
            &statements[statements.len() - 2..],
            &["ROLLBACK TO SAVEPOINT LEVEL2", "ROLLBACK TO SAVEPOINT LEVEL1"]
        );
    }

    #[test]
    fn test_rollback_falls_through_to_physical_rollback() {
        let (conn, journal) = RecordingConnection::new("mysql");
        let conn = conn.losing_savepoint("LEVEL1").losing_savepoint("LEVEL2");
        let mut adapter = RelationalAdapter::new(StoreConfig::default());
        adapter.connect(Some(Box::new(conn))).unwrap();

        for _ in 0..3 {
            adapter.begin_transaction().unwrap();
        }
        assert_eq!(adapter.rollback().unwrap(), 3);
        assert!(!adapter.in_transaction());

        let statements = journal.statements();
        assert_eq!(
            &statements[statements.len() - 4..],
            &[
                "ROLLBACK TO SAVEPOINT LEVEL2",
                "ROLLBACK TO SAVEPOINT LEVEL1",
                "ROLLBACK",
                "SET autocommit=1",
            ]
        );
    }

    #[test]
    fn test_query_log_records_operations() {
        let (mut adapter, _journal) = recording("mysql");
        adapter.fetch_list("SELECT 1").unwrap();
        adapter.fetch_row("SELECT 2").unwrap();
        adapter.get_number_of_rows("SELECT 3").unwrap();
        adapter.simple_query("CREATE TABLE x (id INT)").unwrap();
        adapter.exec("DELETE FROM x").unwrap();
        adapter.begin_transaction().unwrap();
        adapter.begin_transaction().unwrap();
        adapter.commit().unwrap();
        adapter.rollback().unwrap();

        let ops: Vec<_> = adapter.queries().iter().map(|q| q.operation.as_str()).collect();
        assert_eq!(
            ops,
            vec!["fetchList", "fetchRow", "getNumberOfRows", "simpleQuery", "exec", "beginTransaction", "commit"]
        );
        assert_eq!(adapter.queries()[5].sql, "SAVEPOINT LEVEL1");
    }

    #[test]
    fn test_failed_statement_is_logged_and_propagated() {
        let (mut adapter, _journal) = recording("mysql");
        let err = adapter.exec("FAIL please").unwrap_err();
        assert!(matches!(err, Error::Query { ref code, .. } if code == "1064"));
        assert_eq!(adapter.queries().len(), 1);
    }

    #[test]
    fn test_connect_adopts_and_is_idempotent() {
        let (mut adapter, _journal) = recording("mysql");
        assert!(adapter.is_connected());
        assert_eq!(adapter.connect(None).unwrap().connection_id(), 42);
        assert_eq!(adapter.driver_name().unwrap(), "mysql");
        assert_eq!(adapter.connection_id().unwrap(), 42);
    }

    #[test]
    fn test_connect_without_protocol_fails() {
        let mut adapter = RelationalAdapter::new(StoreConfig::default());
        assert!(matches!(adapter.fetch_list("SELECT 1"), Err(Error::Connection(_))));
        assert!(!adapter.is_connected());
    }

    #[test]
    fn test_escape_strips_one_delimiter_each_side() {
        let mut adapter = RelationalAdapter::new(StoreConfig::sqlite_in_memory());
        assert_eq!(adapter.escape("foo").unwrap(), "foo");
        assert_eq!(adapter.escape("it's").unwrap(), "it''s");
        assert_eq!(adapter.escape("a'").unwrap(), "a''");
    }

    #[test]
    fn test_sqlite_introspection() {
        let mut adapter = RelationalAdapter::new(StoreConfig::sqlite_in_memory());
        assert_eq!(adapter.driver_name().unwrap(), "sqlite");
        assert!(adapter.transactions_are_nestable().unwrap());
        assert_eq!(adapter.dbs_name().unwrap().as_deref(), Some("sqlite"));

        let version = adapter.server_version().unwrap();
        assert!(version.starts_with('3'));
        let logged = adapter.queries().len();
        assert_eq!(adapter.server_version().unwrap(), version);
        assert_eq!(adapter.queries().len(), logged);

        assert!(adapter.error_code().is_none());
        assert!(adapter.fetch_list("SELECT * FROM missing").is_err());
        assert_eq!(adapter.error_code().as_deref(), Some("1"));
        assert!(adapter.error_message().unwrap().contains("missing"));
    }

    #[test]
    fn test_commit_survives_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let mut adapter = sqlite_file(&dir);
        create_users(&mut adapter);

        adapter.begin_transaction().unwrap();
        adapter.simple_query("INSERT INTO transactionTest (id, name) VALUES (1, 'foo')").unwrap();
        adapter.simple_query("INSERT INTO transactionTest (id, name) VALUES (2, 'bar')").unwrap();
        assert_eq!(count(&mut adapter), 2);
        adapter.commit().unwrap();

        adapter.disconnect();
        assert!(!adapter.is_connected());
        assert_eq!(count(&mut adapter), 2);
        assert!(adapter.is_connected());
    }

    #[test]
    fn test_rollback_reverts_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut adapter = sqlite_file(&dir);
        create_users(&mut adapter);

        adapter.begin_transaction().unwrap();
        assert!(adapter.in_transaction());
        adapter.simple_query("INSERT INTO transactionTest (id, name) VALUES (1, 'foo')").unwrap();
        adapter.simple_query("INSERT INTO transactionTest (id, name) VALUES (2, 'bar')").unwrap();
        assert_eq!(count(&mut adapter), 2);

        assert_eq!(adapter.rollback().unwrap(), 1);
        assert_eq!(count(&mut adapter), 0);
    }

    #[test]
    fn test_nested_rollback_only_undoes_inner_level() {
        let dir = tempfile::tempdir().unwrap();
        let mut adapter = sqlite_file(&dir);
        create_users(&mut adapter);

        adapter.begin_transaction().unwrap();
        adapter.simple_query("INSERT INTO transactionTest (id, name) VALUES (1, 'baz-level0')").unwrap();

        adapter.begin_transaction().unwrap();
        adapter.simple_query("INSERT INTO transactionTest (id, name) VALUES (2, 'foo-level1')").unwrap();
        adapter.simple_query("INSERT INTO transactionTest (id, name) VALUES (3, 'bar-level1')").unwrap();
        assert_eq!(count(&mut adapter), 3);

        adapter.rollback().unwrap();
        assert_eq!(adapter.transaction_depth(), 1);
        assert_eq!(count(&mut adapter), 1);

        adapter.rollback().unwrap();
        assert!(!adapter.in_transaction());
        assert_eq!(count(&mut adapter), 0);
    }

    #[test]
    fn test_sqlite_rolls_back_schema_with_the_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let mut adapter = sqlite_file(&dir);

        adapter.begin_transaction().unwrap();
        create_users(&mut adapter);
        adapter.simple_query("INSERT INTO transactionTest (id, name) VALUES (1, 'baz-level0')").unwrap();

        adapter.begin_transaction().unwrap();
        adapter.simple_query("INSERT INTO transactionTest (id, name) VALUES (2, 'foo-level1')").unwrap();
        adapter.simple_query("INSERT INTO transactionTest (id, name) VALUES (3, 'bar-level1')").unwrap();

        assert_eq!(adapter.rollback().unwrap(), 1);
        assert_eq!(count(&mut adapter), 1);

        // no implicit commit on DDL: the table goes away with the transaction
        assert_eq!(adapter.rollback().unwrap(), 1);
        assert!(!adapter.in_transaction());
        match adapter.fetch_list("SELECT * FROM transactionTest") {
            Err(Error::Query { message, .. }) => assert!(message.contains("no such table")),
            other => panic!("expected a missing table, got {:?}", other),
        }
    }

    #[test]
    fn test_server_version_is_read_once() {
        let (conn, journal) = RecordingConnection::new("mysql");
        let conn = conn.with_rows(
            "SELECT version() AS version",
            vec![Row::new().with("version", "10.11.6-MariaDB")],
        );
        let mut adapter = RelationalAdapter::new(StoreConfig::default());
        adapter.connect(Some(Box::new(conn))).unwrap();

        assert_eq!(adapter.server_version().unwrap(), "10.11.6-MariaDB");
        assert_eq!(adapter.dbs_name().unwrap().as_deref(), Some("mariadb"));
        assert_eq!(journal.statements(), vec!["SELECT version() AS version"]);
        assert_eq!(adapter.queries()[0].operation, Operation::FetchRow);
    }

    #[test]
    fn test_disconnect_abandons_open_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let mut adapter = sqlite_file(&dir);
        create_users(&mut adapter);

        adapter.begin_transaction().unwrap();
        adapter.simple_query("INSERT INTO transactionTest (id, name) VALUES (1, 'baz-level0')").unwrap();
        adapter.disconnect();

        assert!(!adapter.in_transaction());
        assert_eq!(count(&mut adapter), 0);
    }

    #[test]
    fn test_sqlite_lost_savepoint_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut adapter = sqlite_file(&dir);
        create_users(&mut adapter);

        adapter.begin_transaction().unwrap();
        adapter.simple_query("INSERT INTO transactionTest (id, name) VALUES (1, 'a')").unwrap();
        adapter.begin_transaction().unwrap();
        adapter.simple_query("INSERT INTO transactionTest (id, name) VALUES (2, 'b')").unwrap();

        // something else released the savepoint behind the adapter's back
        adapter.simple_query("RELEASE SAVEPOINT LEVEL1").unwrap();

        assert_eq!(adapter.rollback().unwrap(), 2);
        assert!(!adapter.in_transaction());
        assert_eq!(count(&mut adapter), 0);
    }

    #[test]
    fn test_failed_physical_commit_still_closes_level() {
        let dir = tempfile::tempdir().unwrap();
        let mut adapter = sqlite_file(&dir);
        create_users(&mut adapter);

        adapter.begin_transaction().unwrap();
        adapter.simple_query("INSERT INTO transactionTest (id, name) VALUES (1, 'a')").unwrap();
        // ends the physical transaction, like an implicit commit would
        adapter.simple_query("COMMIT").unwrap();
        assert!(adapter.in_transaction());

        assert!(matches!(adapter.commit(), Err(Error::Query { .. })));
        assert_eq!(adapter.transaction_depth(), 0);
        assert_eq!(count(&mut adapter), 1);
    }
}
