//! Nested transaction bookkeeping
//!
//! The backend only knows flat transactions plus savepoints. Nesting is
//! emulated with a depth counter `D`: level 0 is a physical transaction,
//! every deeper level is a savepoint labelled from the depth itself.

use crate::{Error, Result};

/// Drivers known to support SAVEPOINT / RELEASE / ROLLBACK TO
pub const NESTABLE_DRIVERS: &[&str] = &["mysql", "sqlite"];

/// Savepoint label for a depth value: `LEVEL{depth}`
pub fn savepoint_label(depth: u32) -> String {
    format!("LEVEL{}", depth)
}

/// Logical transaction depth of one adapter. Never negative.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransactionDepth(u32);

impl TransactionDepth {
    pub fn get(&self) -> u32 {
        self.0
    }

    pub fn is_open(&self) -> bool {
        self.0 > 0
    }

    /// Record a successful begin, returning the new depth
    pub fn enter(&mut self) -> u32 {
        self.0 += 1;
        self.0
    }

    /// Close one level, returning the post-decrement depth.
    /// Fails without touching the counter when nothing is open.
    pub fn leave(&mut self, operation: &'static str) -> Result<u32> {
        if self.0 == 0 {
            return Err(Error::TransactionMisuse(operation));
        }
        self.0 -= 1;
        Ok(self.0)
    }
}

/// What a transaction boundary turns into on the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// BEGIN / COMMIT / ROLLBACK of the physical transaction
    Physical,
    /// SAVEPOINT / RELEASE SAVEPOINT / ROLLBACK TO SAVEPOINT with this label
    Savepoint(String),
    /// Nothing to send: a nested level of a flattened transaction
    Skip,
}

/// How nested levels map onto the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nesting {
    Savepoints,
    /// No savepoint support: only the outermost level reaches the backend
    Flattened,
}

impl Nesting {
    pub fn for_driver(driver: &str) -> Self {
        if NESTABLE_DRIVERS.contains(&driver) {
            Nesting::Savepoints
        } else {
            Nesting::Flattened
        }
    }

    /// Step for a begin issued at `depth` (before increment)
    pub fn on_begin(self, depth: u32) -> Step {
        match (self, depth) {
            (_, 0) => Step::Physical,
            (Nesting::Savepoints, d) => Step::Savepoint(savepoint_label(d)),
            (Nesting::Flattened, _) => Step::Skip,
        }
    }

    /// Step for a commit or rollback leaving `depth` (after decrement)
    pub fn on_end(self, depth: u32) -> Step {
        self.on_begin(depth)
    }
}
