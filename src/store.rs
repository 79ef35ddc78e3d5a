//! Reference triple storage over an `Adapter`
//!
//! Every term gets one id in `id2val`; subjects and objects are mirrored
//! into `s2val` / `o2val` under that id. A triple row is shared by every
//! graph holding it; graph membership lives in `g2t`. A batch is written
//! inside one transaction level, so it nests under any transaction the
//! caller opened.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::adapter::Adapter;
use crate::insert::{InsertOutcome, Store};
use crate::storage::schema::{self, TYPE_BNODE, TYPE_LITERAL, TYPE_URI};
use crate::triple::{TermType, Triple};
use crate::{Error, Result};

static BATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Triple store backed by the `{prefix}triple|id2val|s2val|o2val|g2t` tables
pub struct RelationalStore<A> {
    db: A,
}

impl<A: Adapter> RelationalStore<A> {
    pub fn new(db: A) -> Self {
        Self { db }
    }

    pub fn adapter(&self) -> &A {
        &self.db
    }

    pub fn into_inner(self) -> A {
        self.db
    }

    /// Create the store tables and indexes
    pub fn setup(&mut self) -> Result<()> {
        let prefix = self.db.config().table_prefix();
        for stmt in schema::all_schema_statements(&prefix) {
            self.db.simple_query(&stmt)?;
        }
        tracing::info!(prefix = %prefix, "store tables ready");
        Ok(())
    }

    /// Number of stored `(s, p, o, graph)` occurrences, optionally restricted
    /// to one graph
    pub fn count_triples(&mut self, graph: Option<&str>) -> Result<usize> {
        let prefix = self.db.config().table_prefix();
        let sql = match graph {
            Some(g) => {
                let g = self.db.escape(g)?;
                format!(
                    "SELECT COUNT(*) AS n FROM {prefix}g2t gt JOIN {prefix}id2val gval ON gt.g = gval.id WHERE gval.val = '{g}'"
                )
            }
            None => format!("SELECT COUNT(*) AS n FROM {prefix}g2t"),
        };
        let n = self
            .db
            .fetch_row(&sql)?
            .and_then(|row| row.get("n").and_then(|v| v.as_i64()))
            .unwrap_or(0);
        Ok(n as usize)
    }

    /// Id of `value` in `id2val`, inserting it when unknown
    fn term_id(&mut self, prefix: &str, value: &str) -> Result<i64> {
        let escaped = self.db.escape(value)?;
        let lookup = format!("SELECT id FROM {prefix}id2val WHERE val = '{escaped}'");
        if let Some(id) = self.db.fetch_row(&lookup)?.and_then(|row| row.get("id").and_then(|v| v.as_i64())) {
            return Ok(id);
        }

        self.db.exec(&format!("INSERT INTO {prefix}id2val (val) VALUES ('{escaped}')"))?;
        let id = self.db.last_insert_id()?;
        if id <= 0 {
            return Err(Error::query("HY000", format!("no id assigned to term {}", value)));
        }
        Ok(id)
    }

    fn mirror(&mut self, insert_ignore: &str, table: &str, id: i64, value: &str) -> Result<()> {
        let escaped = self.db.escape(value)?;
        self.db
            .exec(&format!("{insert_ignore} INTO {table} (id, val) VALUES ({id}, '{escaped}')"))?;
        Ok(())
    }

    fn write_batch(&mut self, triples: &[Triple], graph: &str) -> Result<usize> {
        let prefix = self.db.config().table_prefix();
        let insert_ignore = match self.db.driver_name()?.as_str() {
            "sqlite" => "INSERT OR IGNORE",
            _ => "INSERT IGNORE",
        };
        let g = self.term_id(&prefix, graph)?;
        let mut written = 0;

        for triple in triples {
            let s = self.term_id(&prefix, &triple.s)?;
            let p = self.term_id(&prefix, &triple.p)?;
            let o = self.term_id(&prefix, &triple.o)?;
            self.mirror(insert_ignore, &format!("{prefix}s2val"), s, &triple.s)?;
            self.mirror(insert_ignore, &format!("{prefix}o2val"), o, &triple.o)?;

            let lang_dt = match (&triple.o_lang, &triple.o_datatype) {
                (Some(lang), _) => self.term_id(&prefix, lang)?,
                (None, Some(dt)) => self.term_id(&prefix, dt)?,
                (None, None) => 0,
            };

            let existing = format!(
                "SELECT t FROM {prefix}triple WHERE s = {s} AND p = {p} AND o = {o} AND o_lang_dt = {lang_dt} LIMIT 1"
            );
            let t = match self.db.fetch_row(&existing)?.and_then(|row| row.get("t").and_then(|v| v.as_i64())) {
                Some(t) => t,
                None => {
                    self.db.exec(&format!(
                        "INSERT INTO {prefix}triple (s, p, o, o_lang_dt, s_type, o_type) VALUES ({s}, {p}, {o}, {lang_dt}, {}, {})",
                        type_code(triple.s_type),
                        type_code(triple.o_type),
                    ))?;
                    self.db.last_insert_id()?
                }
            };

            // a triple already in this graph adds no membership row
            written += self
                .db
                .exec(&format!("{insert_ignore} INTO {prefix}g2t (g, t) VALUES ({g}, {t})"))? as usize;
        }
        Ok(written)
    }
}

fn type_code(kind: TermType) -> i64 {
    match kind {
        TermType::Uri => TYPE_URI,
        TermType::Bnode => TYPE_BNODE,
        TermType::Literal => TYPE_LITERAL,
    }
}

/// Rewrite bnode labels to `_:b{batch}_{label}`. The same label maps to the
/// same replacement within one call.
pub fn relabel_bnodes(triples: &mut [Triple], graph: &str) {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut hasher = blake3::Hasher::new();
    hasher.update(graph.as_bytes());
    hasher.update(&nanos.to_le_bytes());
    hasher.update(&BATCH_COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    let batch = hasher.finalize().to_hex();
    let batch = &batch.as_str()[..8];

    let mut labels: HashMap<String, String> = HashMap::new();
    let mut rename = |value: &mut String| {
        let fresh = labels
            .entry(value.clone())
            .or_insert_with(|| format!("_:b{}_{}", batch, value.trim_start_matches("_:")));
        *value = fresh.clone();
    };

    for triple in triples.iter_mut() {
        if triple.s_type == TermType::Bnode {
            rename(&mut triple.s);
        }
        if triple.o_type == TermType::Bnode {
            rename(&mut triple.o);
        }
    }
}

impl<A: Adapter> Store for RelationalStore<A> {
    fn db(&mut self) -> &mut dyn Adapter {
        &mut self.db
    }

    fn insert(&mut self, mut triples: Vec<Triple>, target_graph: &str, keep_bnode_ids: bool) -> Result<InsertOutcome> {
        let started = Instant::now();
        if !keep_bnode_ids {
            relabel_bnodes(&mut triples, target_graph);
        }

        self.db.begin_transaction()?;
        let written = match self.write_batch(&triples, target_graph) {
            Ok(n) => n,
            Err(e) => {
                if let Err(rollback_err) = self.db.rollback() {
                    tracing::warn!(error = %rollback_err, "rollback after failed insert also failed");
                }
                return Err(e);
            }
        };
        self.db.commit()?;

        let outcome = InsertOutcome {
            triples_inserted: written,
            elapsed: started.elapsed(),
        };
        tracing::info!(graph = target_graph, inserted = written, elapsed_ms = outcome.elapsed.as_millis() as u64, "stored triples");
        Ok(outcome)
    }
}
