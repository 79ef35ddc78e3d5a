//! Insert query handling
//!
//! Turns an insert request into deduplicated writes:
//! - `INSERT DATA`-style requests carry explicit triples; every triple already
//!   stored in the target graph is dropped before the storage insert runs
//! - `INSERT ... WHERE` requests are evaluated first; bnode labels produced by
//!   the evaluation are kept verbatim in storage
//!
//! Empty writes are never sent: a zero-row insert would still register the
//! target graph.

use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::adapter::Adapter;
use crate::triple::Triple;
use crate::{Error, Result};

/// Result of an insert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct InsertOutcome {
    pub triples_inserted: usize,
    pub elapsed: Duration,
}

impl InsertOutcome {
    /// The zero-effect result
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Storage layer the handler writes through
pub trait Store {
    /// Adapter used for reads and writes against the store tables
    fn db(&mut self) -> &mut dyn Adapter;

    /// Insert `triples` into `target_graph`. With `keep_bnode_ids` false the
    /// store may assign fresh labels to anonymous nodes.
    fn insert(&mut self, triples: Vec<Triple>, target_graph: &str, keep_bnode_ids: bool) -> Result<InsertOutcome>;
}

/// A construct template plus the graph pattern binding its variables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternQuery {
    pub template: Vec<Triple>,
    pub pattern: String,
}

/// Evaluates a pattern query against the current store state
pub trait PatternEvaluator {
    /// Instantiated triples; empty when nothing matched
    fn evaluate(&mut self, query: &PatternQuery) -> Result<Vec<Triple>>;
}

/// What to insert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InsertBody {
    /// Explicit triples. `None` is an insert without data and does nothing.
    Triples(Option<Vec<Triple>>),
    /// Triples produced by evaluating a pattern query
    Pattern(PatternQuery),
}

/// A parsed insert request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertRequest {
    pub target_graph: Option<String>,
    pub body: InsertBody,
    /// Keep bnode labels of explicit triples. Pattern inserts always keep them.
    #[serde(default)]
    pub keep_bnode_ids: bool,
}

impl InsertRequest {
    pub fn triples(target_graph: impl Into<String>, triples: Vec<Triple>) -> Self {
        Self {
            target_graph: Some(target_graph.into()),
            body: InsertBody::Triples(Some(triples)),
            keep_bnode_ids: false,
        }
    }

    pub fn pattern(target_graph: impl Into<String>, query: PatternQuery) -> Self {
        Self {
            target_graph: Some(target_graph.into()),
            body: InsertBody::Pattern(query),
            keep_bnode_ids: false,
        }
    }
}

/// Runs insert requests against a `Store`
pub struct InsertQueryHandler<'a> {
    store: &'a mut dyn Store,
    evaluator: Option<&'a mut dyn PatternEvaluator>,
}

impl<'a> InsertQueryHandler<'a> {
    pub fn new(store: &'a mut dyn Store) -> Self {
        Self { store, evaluator: None }
    }

    pub fn with_evaluator(mut self, evaluator: &'a mut dyn PatternEvaluator) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn run_query(&mut self, request: &InsertRequest) -> Result<InsertOutcome> {
        let graph = request
            .target_graph
            .as_deref()
            .filter(|g| !g.is_empty())
            .ok_or_else(|| Error::Configuration("insert request has no target graph".to_string()))?;

        match &request.body {
            InsertBody::Triples(None) => Ok(InsertOutcome::empty()),
            InsertBody::Triples(Some(candidates)) => {
                let mut fresh = Vec::with_capacity(candidates.len());
                for triple in candidates {
                    if self.exists(triple, graph)? {
                        tracing::debug!(s = %triple.s, p = %triple.p, o = %triple.o, graph, "triple already stored");
                    } else {
                        fresh.push(triple.clone());
                    }
                }

                if fresh.is_empty() {
                    return Ok(InsertOutcome::empty());
                }
                let outcome = self.store.insert(fresh, graph, request.keep_bnode_ids)?;
                tracing::info!(graph, inserted = outcome.triples_inserted, "insert data");
                Ok(outcome)
            }
            InsertBody::Pattern(query) => {
                let evaluator = self.evaluator.as_deref_mut().ok_or_else(|| {
                    Error::Configuration("pattern insert needs a pattern evaluator".to_string())
                })?;
                let triples = evaluator.evaluate(query)?;
                if triples.is_empty() {
                    return Ok(InsertOutcome::empty());
                }
                let outcome = self.store.insert(triples, graph, true)?;
                tracing::info!(graph, inserted = outcome.triples_inserted, "insert where");
                Ok(outcome)
            }
        }
    }

    /// Dedup probe: exact `(s, p, o, graph)` match over the value tables
    fn exists(&mut self, triple: &Triple, graph: &str) -> Result<bool> {
        let db = self.store.db();
        let prefix = db.config().table_prefix();
        let s = db.escape(&triple.s)?;
        let p = db.escape(&triple.p)?;
        let o = db.escape(&triple.o)?;
        let g = db.escape(graph)?;

        let sql = format!(
            r#"
            SELECT t.t
              FROM {prefix}triple t
                   LEFT JOIN {prefix}s2val sval ON t.s = sval.id
                   LEFT JOIN {prefix}id2val pval ON t.p = pval.id
                   LEFT JOIN {prefix}o2val oval ON t.o = oval.id
                   LEFT JOIN {prefix}g2t gt ON t.t = gt.t
                   LEFT JOIN {prefix}id2val gval ON gt.g = gval.id
             WHERE sval.val = '{s}'
                   AND pval.val = '{p}'
                   AND oval.val = '{o}'
                   AND gval.val = '{g}'
             LIMIT 1
            "#
        );
        Ok(db.fetch_row(&sql)?.is_some())
    }
}
