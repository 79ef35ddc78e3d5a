//! Recording connection double for adapter tests

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use crate::row::Row;
use crate::{Error, Result};
use super::Connection;

/// Shared view of what a `RecordingConnection` saw
#[derive(Clone, Default)]
pub struct Journal {
    statements: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    fn push(&self, sql: &str) {
        self.statements.lock().unwrap().push(sql.to_string());
    }
}

/// Records every physical statement and answers from canned rows
pub struct RecordingConnection {
    driver: String,
    journal: Journal,
    rows: HashMap<String, Vec<Row>>,
    lost_savepoints: HashSet<String>,
}

impl RecordingConnection {
    pub fn new(driver: &str) -> (Self, Journal) {
        let journal = Journal::default();
        let conn = Self {
            driver: driver.to_string(),
            journal: journal.clone(),
            rows: HashMap::new(),
            lost_savepoints: HashSet::new(),
        };
        (conn, journal)
    }

    pub fn with_rows(mut self, sql: &str, rows: Vec<Row>) -> Self {
        self.rows.insert(sql.to_string(), rows);
        self
    }

    /// Make `ROLLBACK TO SAVEPOINT <label>` fail as if the savepoint vanished
    pub fn losing_savepoint(mut self, label: &str) -> Self {
        self.lost_savepoints.insert(label.to_string());
        self
    }
}

impl Connection for RecordingConnection {
    fn driver_name(&self) -> &str {
        &self.driver
    }

    fn client_version(&self) -> String {
        format!("{} recording", self.driver)
    }

    fn server_version_query(&self) -> &'static str {
        "SELECT version() AS version"
    }

    fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
        self.journal.push(sql);
        Ok(self.rows.get(sql).cloned().unwrap_or_default())
    }

    fn execute(&mut self, sql: &str) -> Result<u64> {
        self.journal.push(sql);
        if let Some(label) = sql.strip_prefix("ROLLBACK TO SAVEPOINT ") {
            if self.lost_savepoints.contains(label) {
                return Err(Error::query("1305", format!("SAVEPOINT {} does not exist", label)));
            }
        }
        if sql.starts_with("FAIL") {
            return Err(Error::query("1064", "syntax error"));
        }
        Ok(1)
    }

    fn quote(&mut self, value: &str) -> Result<String> {
        Ok(format!("'{}'", value.replace('\'', "''")))
    }

    fn begin(&mut self) -> Result<()> {
        self.journal.push("BEGIN");
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.journal.push("COMMIT");
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.journal.push("ROLLBACK");
        Ok(())
    }

    fn set_autocommit(&mut self, enabled: bool) -> Result<()> {
        self.journal.push(if enabled { "SET autocommit=1" } else { "SET autocommit=0" });
        Ok(())
    }

    fn apply_session_defaults(&mut self) -> Result<()> {
        Ok(())
    }

    fn connection_id(&self) -> i64 {
        42
    }

    fn last_insert_id(&self) -> i64 {
        0
    }

    fn last_error(&self) -> Option<(String, String)> {
        None
    }
}
